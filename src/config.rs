use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "featix")]
#[command(about = "genomic feature indexing and search engine")]
pub struct Config {
    /// Directory holding per-file indexes and histograms
    #[arg(long, env = "FEATIX_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Worker pool size for histogram computation
    #[arg(long, env = "FEATIX_WORKER_THREADS", default_value = "4")]
    pub worker_threads: usize,

    /// Cap on unpaginated search results
    #[arg(long, env = "FEATIX_MAX_SEARCH_RESULTS", default_value = "100000")]
    pub max_search_results: usize,

    /// Number of pending records that triggers an index flush within
    /// one chromosome
    #[arg(long, env = "FEATIX_INDEX_BUFFER_SIZE", default_value = "2000000")]
    pub index_buffer_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("./data"),
            worker_threads: 4,
            max_search_results: 100_000,
            index_buffer_size: 2_000_000,
            log_level: "info".to_string(),
        }
    }
}
