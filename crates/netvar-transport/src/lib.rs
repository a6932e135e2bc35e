//! UDP transport for network variable lists.
//!
//! Binds a local port, sends raw datagrams to the controller endpoint
//! (broadcast by default) and receives datagrams with a poll timeout so a
//! receive loop can notice shutdown.
//!
//! This is the lowest layer of netvar. Delivery is best-effort: no ordering,
//! acknowledgment or retransmission is assumed by anything built on top.

pub mod error;
pub mod sink;
pub mod udp;

pub use error::{Result, TransportError};
pub use sink::DatagramSink;
pub use udp::{TransportConfig, UdpTransport, DEFAULT_BROADCAST_ENDPOINT, DEFAULT_PORT};
