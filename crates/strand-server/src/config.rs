use std::time::Duration;

/// Tuning knobs for an [`crate::Acceptor`], mirroring the parameter set a
/// production listener exposes for connection admission, worker-pool
/// sizing and backpressure.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Worker threads kept alive even when idle.
    pub min_servers: usize,
    /// Worker threads the pool may grow to under load.
    pub max_servers: usize,
    /// Sockets the acceptor will hold open at once; beyond this, newly
    /// accepted connections are closed immediately.
    pub max_connections: usize,
    /// Work queue depth past which the acceptor throttles new accepts.
    pub max_queue_depth: usize,
    /// `SO_SNDBUF` applied to accepted sockets.
    pub send_buf_size: usize,
    /// `SO_RCVBUF` applied to accepted sockets.
    pub recv_buf_size: usize,
    /// How long an idle worker above `min_servers` waits before exiting.
    pub server_idle_ttl: Duration,
    /// Maximum mio events drained per `poll` wakeup.
    pub poll_batch: usize,
    /// `poll` timeout when the listener has nothing else to do.
    pub listener_sleep: Duration,
    /// Sleep applied per throttle step when the queue is over depth.
    pub throttle_sleep: Duration,
    /// Throttle steps allowed per poll cycle before giving up and
    /// accepting anyway.
    pub cycle_max_throttles: usize,
    /// How often accept/request/throttle counters are logged.
    pub stat_log_interval: Duration,
    /// `SO_SNDTIMEO` applied to accepted sockets.
    pub send_timeout: Duration,
    /// `SO_RCVTIMEO` applied to accepted sockets.
    pub recv_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            min_servers: 8,
            max_servers: 16,
            max_connections: 6000,
            max_queue_depth: 128,
            send_buf_size: 16384,
            recv_buf_size: 32768,
            server_idle_ttl: Duration::from_secs(300),
            poll_batch: 128,
            listener_sleep: Duration::from_millis(1000),
            throttle_sleep: Duration::from_micros(4000),
            cycle_max_throttles: 40,
            stat_log_interval: Duration::from_secs(300),
            send_timeout: Duration::from_secs(10),
            recv_timeout: Duration::from_secs(10),
        }
    }
}
