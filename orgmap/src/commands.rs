use crate::CLAP_STYLING;
use clap::{ArgAction, arg, command, value_parser};
use std::path::PathBuf;

fn cookies_arg() -> clap::Arg {
    arg!(-c --"cookies" <PATH>)
        .required(false)
        .help("JSON export of browser cookies (default: cookies_path from the config file)")
        .value_parser(value_parser!(PathBuf))
}

fn config_arg() -> clap::Arg {
    arg!(--"config" <PATH>)
        .required(false)
        .help("Config file to read (default: ~/.config/orgmap/config.toml)")
        .value_parser(value_parser!(PathBuf))
}

fn timeout_arg() -> clap::Arg {
    arg!(--"timeout" <SECONDS>)
        .required(false)
        .help("Request timeout in seconds")
        .value_parser(value_parser!(u64))
}

fn url_arg() -> clap::Arg {
    arg!(<URL>)
        .required(true)
        .help("A record or page URL from a Salesforce org")
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("orgmap")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("orgmap")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Increase log verbosity (-v info, -vv debug, -vvv trace)")
                .required(false)
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Writes a default orgmap config file")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Config directory, or a path ending in .toml")
                        .default_value("~/.config/orgmap/"),
                )
                .arg(
                    arg!(-f --"force")
                        .help("Overwrite an existing config file at the specified location.")
                        .required(false),
                ),
        )
        .subcommand(
            command!("session")
                .about("Shows which session cookie would be used for a page, without calling the API")
                .arg(url_arg())
                .arg(cookies_arg())
                .arg(config_arg())
                .arg(timeout_arg())
                .arg(
                    arg!(--"resolve")
                        .required(false)
                        .help("Also resolve the API endpoint and version the session works against")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("analyze")
                .about(
                    "Crawls the records related to the record at URL and reports the \
                relationship graph.",
                )
                .arg(url_arg())
                .arg(cookies_arg())
                .arg(config_arg())
                .arg(timeout_arg())
                .arg(
                    arg!(-d --"depth" <DEPTH>)
                        .required(false)
                        .help("Maximum link distance from the starting record")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    arg!(--"children-limit" <NUM>)
                        .required(false)
                        .help("Maximum child records per relationship (0: safety cap only)")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    arg!(--"node-cap" <NUM>)
                        .required(false)
                        .help("Maximum number of records in the graph")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    arg!(-t --"track" <OBJECT>)
                        .required(false)
                        .help("Object type to follow; repeat for several (replaces the configured list)")
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, dot")
                        .value_parser(["text", "json", "dot"])
                        .default_value("text"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"show-events")
                        .required(false)
                        .help("Print the diagnostic event log after the run")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("objects")
                .about("Lists the queryable business objects of the org")
                .arg(url_arg())
                .arg(cookies_arg())
                .arg(config_arg())
                .arg(timeout_arg())
                .arg(
                    arg!(-s --"search" <TERM>)
                        .required(false)
                        .help("Only show objects whose name or label contains TERM"),
                ),
        )
}
