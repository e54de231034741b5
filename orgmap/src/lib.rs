// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export the helpers the subcommands share
pub use handlers::{
    CliOverrides, config_target, level_for, load_cookie_store, load_settings, parse_format,
    write_default_config,
};

// Re-export the analysis entry points from orgmap-core
pub use orgmap_core::{AnalysisResult, AnalyzeOptions, CrawlOptions, Settings};
