/// Default port for the framed TLS listener.
pub const DEFAULT_FRAMED_PORT: u16 = 5000;

/// Default port for the HTTP listener (static assets + web socket upgrade).
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default port for the admin control plane.
pub const DEFAULT_ADMIN_PORT: u16 = 5001;

/// Default idle timeout before a framed session is swept, in milliseconds.
/// Also the sweep period.
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 45_000;

/// Sender identity stamped onto operator-initiated broadcasts.
pub const ADMIN_SENDER: &str = "_admin_";

/// Body sentinel carried by heartbeat records.
pub const HEARTBEAT_BODY: &str = "ping";

/// Error body sent when a registration collides with a live identity.
pub const ERROR_ID_TAKEN: &str = "ID_TAKEN";

/// Error body sent when a registration carries an empty identity.
pub const ERROR_INVALID_ID: &str = "INVALID_ID";

/// Literal reply for a failed control-plane authentication.
pub const ADMIN_AUTH_FAILED: &str = "ERROR:AUTH_FAILED";
