use std::time::Duration;

/// Port of the hub's local WebSocket API.
pub const WS_DEFAULT_PORT: u16 = 8088;

/// Time allowed for the TCP + WebSocket upgrade of a new connection.
pub const WS_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time to wait for a pong response (or any incoming message).
///
/// Acts as a read deadline: if nothing arrives within this window the
/// socket is considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often to send pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(5);

/// Timeout for a single request/response exchange.
pub const WS_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum accepted message size in bytes (1 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Deadline after which a queued command is declared stalled.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(60);

/// Time an activity switch may take before success is assumed.
pub const ACTIVITY_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Delay between startup and the first keep-alive tick.
pub const KEEPALIVE_INITIAL_DELAY: Duration = Duration::from_secs(5);

/// Interval between keep-alive refreshes.
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(20);

/// Local TCP port hubs call back on when answering a discovery ping.
pub const DISCOVERY_PORT: u16 = 61991;

/// UDP port hubs listen on for discovery pings.
pub const DISCOVERY_PING_PORT: u16 = 5224;

/// How often the discovery ping is re-broadcast.
pub const DISCOVERY_PING_INTERVAL: Duration = Duration::from_secs(1);

/// Service name carried in the discovery ping.
pub const DISCOVERY_SERVICE: &str = "_logitech-reverse-bonjour._tcp.local.";

/// Response code for a completed request.
pub const CODE_OK: u16 = 200;

/// Response code for an in-progress notice (request still running).
pub const CODE_IN_PROGRESS: u16 = 100;

/// Hub command names.
pub mod cmd {
    /// Credentialed handshake.
    pub const PAIR: &str = "vnd.logitech.connect/vnd.logitech.pair";
    /// Full hub configuration, including the activity list.
    pub const GET_CONFIG: &str = "vnd.logitech.harmony/vnd.logitech.harmony.engine?config";
    /// Currently running activity.
    pub const GET_CURRENT_ACTIVITY: &str =
        "vnd.logitech.harmony/vnd.logitech.harmony.engine?getCurrentActivity";
    /// Start (or stop, with the off sentinel) an activity.
    pub const RUN_ACTIVITY: &str = "harmony.activityengine?runactivity";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grace_period_is_shorter_than_watchdog() {
        assert!(ACTIVITY_GRACE_PERIOD < WATCHDOG_TIMEOUT);
    }

    #[test]
    fn keepalive_fires_well_inside_pong_wait() {
        assert!(KEEPALIVE_PERIOD < WS_PONG_WAIT);
        assert!(WS_PING_PERIOD < WS_PONG_WAIT);
    }
}
