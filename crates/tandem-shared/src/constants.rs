/// Application name
pub const APP_NAME: &str = "Tandem";

/// Maximum message body size in bytes (8 KiB)
pub const MAX_MESSAGE_BODY_BYTES: usize = 8_192;

/// Default HTTP/WebSocket port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
