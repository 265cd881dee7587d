/// Pipeline configuration loaded when no `--config` is given
pub const DEFAULT_PIPELINE_CONFIG: &str = "config/pipeline_config.yaml";

/// Neo4j Bolt URI used when the pipeline configuration omits one
pub const DEFAULT_BOLT_URI: &str = "bolt://localhost:7687";

/// Label added to every node so edges can match endpoints through one index
pub const DEFAULT_BASE_LABEL: &str = "Entity";

/// Rows per `UNWIND` statement sent over Bolt
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Output directory for CSV export when the configuration omits one
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Environment variable that overrides the configured Neo4j password
pub const NEO4J_PASSWORD_ENV: &str = "NEO4J_PASSWORD";

/// Progress update interval (tick every N records)
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Buffer size for the XML input reader
pub const READ_BUFFER_SIZE: usize = 128 * 1024;

/// Hex digits kept from the MD5 digest of a derived edge id
pub const EDGE_ID_HASH_LEN: usize = 12;

/// Reported in adapter metadata
pub const ADAPTER_NAME: &str = "SBGNAdapter";
pub const ADAPTER_VERSION: &str = "0.1.0";
pub const ADAPTER_DATA_TYPE: &str = "sbgn";
