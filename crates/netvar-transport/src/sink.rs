use std::sync::Arc;

use crate::error::Result;

/// Outbound half of a datagram transport.
///
/// List engines only ever push complete frames; they never wait for a reply.
/// `UdpTransport` implements this by sending to its configured destination,
/// tests implement it with an in-memory recorder.
pub trait DatagramSink: Send + Sync {
    /// Send one complete datagram to the peer endpoint.
    fn send_datagram(&self, datagram: &[u8]) -> Result<()>;
}

impl<T: DatagramSink + ?Sized> DatagramSink for Arc<T> {
    fn send_datagram(&self, datagram: &[u8]) -> Result<()> {
        (**self).send_datagram(datagram)
    }
}
