/// Owned live connection lifecycle: connect, subscribe, keep-alive, reconnect and teardown.
pub mod controller;

/// Historical REST fetch through a pluggable [`HistoricalClient`](historical::HistoricalClient).
pub mod historical;

/// Idle read timeout for live streams.
pub mod timeout;

/// Pluggable WebSocket [`Transport`](transport::Transport).
pub mod transport;
