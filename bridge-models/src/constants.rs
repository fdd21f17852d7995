/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "bridge.toml";

/// Directory for the SQLite database file, relative to the runtime root.
pub const DATA_DIR: &str = "data";

/// Directory for rolling log files, relative to the runtime root.
pub const LOG_DIR: &str = "logs";

/// Shared-secret header checked on protected routes and the device transport.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Plain environment variables applied on top of the layered configuration.
pub const CHAOS_LATENCY_ENV: &str = "CHAOS_LATENCY";
pub const CHAOS_DROP_RATE_ENV: &str = "CHAOS_DROP_RATE";
pub const API_KEY_ENV: &str = "API_KEY";
