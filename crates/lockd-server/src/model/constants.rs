// Configuration keys and defaults

/// Prefix for environment variable overrides (`LOCKD__SERVER__PORT`)
pub const ENV_PREFIX: &str = "LOCKD";
pub const ENV_SEPARATOR: &str = "__";

// Server
pub const SERVER_ADDRESS_PROPERTY: &str = "server.address";
pub const SERVER_PORT_PROPERTY: &str = "server.port";
pub const SERVER_CPU_PROPERTY: &str = "server.cpu";
pub const SERVER_KEEPALIVE_SECS_PROPERTY: &str = "server.keepalive_secs";
pub const SERVER_LINGER_SECS_PROPERTY: &str = "server.linger_secs";
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 9527;
pub const DEFAULT_KEEPALIVE_SECS: i64 = 15;
pub const DEFAULT_LINGER_SECS: i64 = 0;

// Logging
pub const LOGGING_DIR_PROPERTY: &str = "logging.dir";
pub const LOGGING_LEVEL_PROPERTY: &str = "logging.level";
pub const LOGGING_CONSOLE_PROPERTY: &str = "logging.console";
pub const LOGGING_FILE_PROPERTY: &str = "logging.file";
pub const DEFAULT_LOGGING_LEVEL: &str = "info";

// Locks
pub const LOCKS_PROPERTY: &str = "locks";

// Flat top-level keys of older JSON configuration files, read when the key
// above is absent. Key case may or may not be preserved by the loader, so
// both spellings are listed.
pub const LEGACY_BIND_IP_KEYS: &[&str] = &["BindIp", "bindip"];
pub const LEGACY_LISTEN_PORT_KEYS: &[&str] = &["ListenPort", "listenport"];
pub const LEGACY_CPU_KEYS: &[&str] = &["CPU", "cpu"];
pub const LEGACY_LOG_PATH_KEYS: &[&str] = &["LogPath", "logpath"];
pub const LEGACY_LOCKS_KEYS: &[&str] = &["Locks"];
