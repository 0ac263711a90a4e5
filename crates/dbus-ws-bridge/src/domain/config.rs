//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is built from CLI arguments in `main.rs` or from [`Default`] in tests.
//! Nothing in this module reads the environment.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use url::form_urlencoded;

/// WebSocket path clients connect to.
pub const WS_PATH: &str = "/ws/v1";

/// Query parameter that selects the bus for one connection.
pub const BUS_QUERY_PARAM: &str = "connection";

/// Which message bus a client connection is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BusTarget {
    /// The per-login-session bus.
    #[default]
    Session,
    /// The system-wide bus.
    System,
}

impl BusTarget {
    /// Picks the bus from a handshake query string such as
    /// `connection=system`.  Without the parameter `default` is used.
    ///
    /// # Errors
    ///
    /// Returns a message naming the bad value when the parameter is present
    /// but is neither `session` nor `system`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dbus_ws_bridge::domain::BusTarget;
    ///
    /// let bus = BusTarget::from_query(Some("connection=system"), BusTarget::Session);
    /// assert_eq!(bus, Ok(BusTarget::System));
    /// assert_eq!(BusTarget::from_query(None, BusTarget::Session), Ok(BusTarget::Session));
    /// ```
    pub fn from_query(query: Option<&str>, default: BusTarget) -> Result<BusTarget, String> {
        let Some(query) = query else {
            return Ok(default);
        };
        // Later occurrences win, as with any form-encoded parameter.
        form_urlencoded::parse(query.as_bytes())
            .filter(|(name, _)| *name == BUS_QUERY_PARAM)
            .last()
            .map_or(Ok(default), |(_, value)| value.parse())
    }
}

impl FromStr for BusTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "session" => Ok(BusTarget::Session),
            "system" => Ok(BusTarget::System),
            other => Err(format!("unknown bus '{other}', expected 'session' or 'system'")),
        }
    }
}

impl fmt::Display for BusTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BusTarget::Session => "session",
            BusTarget::System => "system",
        })
    }
}

/// All runtime configuration for the bridge.
///
/// Build this struct once at startup and wrap it in an `Arc` so it can be
/// shared across connection tasks.
///
/// # Example
///
/// ```rust
/// use dbus_ws_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 2024);
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// The address and port the WebSocket server binds to.
    ///
    /// Defaults to loopback: anyone who can reach the port can call methods on
    /// the user's session bus.
    pub ws_bind_addr: SocketAddr,

    /// Bus used when the client does not pass `?connection=`.
    pub default_bus: BusTarget,

    /// Upper bound on one D-Bus method call.  An expired call is answered with
    /// a `MethodError` named `org.freedesktop.DBus.Error.Timeout`.
    pub call_timeout: Duration,

    /// Interval between WebSocket pings.  `Duration::ZERO` disables them.
    pub ping_interval: Duration,

    /// Per-subscription buffer of undelivered signals on the D-Bus side.
    pub signal_queue_capacity: usize,

    /// Maximum nesting accepted when decoding client values.
    pub max_value_depth: usize,
}

impl Default for BridgeConfig {
    /// | Field                 | Default          |
    /// |-----------------------|------------------|
    /// | ws_bind_addr          | `127.0.0.1:2024` |
    /// | default_bus           | session          |
    /// | call_timeout          | 25 seconds       |
    /// | ping_interval         | 30 seconds       |
    /// | signal_queue_capacity | 64               |
    /// | max_value_depth       | 64               |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 2024)),
            default_bus: BusTarget::Session,
            call_timeout: Duration::from_secs(25),
            ping_interval: Duration::from_secs(30),
            signal_queue_capacity: 64,
            max_value_depth: 64,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
