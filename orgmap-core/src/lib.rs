pub mod cache;
pub mod config;
pub mod crawl;
pub mod error;
pub mod filter;
pub mod ids;
pub mod model;
pub mod report;
pub mod session;
pub mod sobjects;

pub use cache::{Clock, MetadataCache, SqliteTier, SystemClock};
pub use config::Settings;
pub use crawl::{CrawlOptions, CrawlProgressCallback, GraphCrawler};
pub use error::AnalyzeError;
pub use filter::{TrackedObjects, is_config_object_name};
pub use model::{AnalysisResult, EdgeDirection, GraphEdge, GraphNode, RecordGraph};
pub use session::{AnalyzeOptions, SessionContext};

const BANNER: &str = r#"
                                        
   ___  _ __ __ _ _ __ ___   __ _ _ __  
  / _ \| '__/ _` | '_ ` _ \ / _` | '_ \ 
 | (_) | | | (_| | | | | | | (_| | |_) |
  \___/|_|  \__, |_| |_| |_|\__,_| .__/ 
            |___/                |_|    
"#;

pub fn print_banner() {
    println!("{}", BANNER);
    println!(
        "  orgmap v{} - record relationship explorer\n",
        env!("CARGO_PKG_VERSION")
    );
}
