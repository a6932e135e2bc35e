use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use netvar_frame::MAX_FRAME_SIZE;
use netvar_transport::{DatagramSink, TransportConfig, UdpTransport};
use tracing::{debug, info, warn};

use crate::declaration::Declaration;
use crate::error::{ListError, Result};
use crate::list::NetvarList;
use crate::options::{ChangeHandler, ListOptions};
use crate::registry::DispatchRegistry;

const RECEIVE_POLL: Duration = Duration::from_millis(200);
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    /// Receive buffer size. Larger datagrams are truncated by the OS.
    pub recv_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            recv_buffer_size: MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.transport.endpoint = endpoint.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.transport.port = port;
        self
    }

    pub fn with_send_port(mut self, send_port: u16) -> Self {
        self.transport.send_port = Some(send_port);
        self
    }
}

/// One UDP socket shared by any number of open lists.
///
/// A background thread receives datagrams and routes them to lists by list
/// id. Dropping the client stops that thread; lists opened from it keep
/// working for sends but receive nothing further.
pub struct NetvarClient {
    transport: Arc<UdpTransport>,
    registry: Arc<DispatchRegistry>,
    config: ClientConfig,
    running: Arc<AtomicBool>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl NetvarClient {
    /// Bind `0.0.0.0:<port>` and start receiving.
    pub fn bind(config: ClientConfig) -> Result<Self> {
        let transport = UdpTransport::bind(&receive_config(&config))?;
        Self::start(transport, config)
    }

    /// Bind an explicit local address and start receiving.
    pub fn bind_addr(addr: SocketAddr, config: ClientConfig) -> Result<Self> {
        let transport = UdpTransport::bind_addr(addr, &receive_config(&config))?;
        Self::start(transport, config)
    }

    fn start(transport: UdpTransport, config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(transport);
        let registry = Arc::new(DispatchRegistry::new());
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let transport = Arc::clone(&transport);
            let registry = Arc::clone(&registry);
            let running = Arc::clone(&running);
            let buffer_size = config.recv_buffer_size.max(1);
            thread::Builder::new()
                .name("netvar-recv".to_string())
                .spawn(move || receive_loop(&transport, &registry, &running, buffer_size))
                .map_err(ListError::Spawn)?
        };

        info!(
            local = ?transport.local_addr().ok(),
            destination = %transport.destination(),
            "netvar client started"
        );

        Ok(Self {
            transport,
            registry,
            config,
            running,
            receiver: Mutex::new(Some(handle)),
        })
    }

    /// Open a list with default options and no change handler.
    pub fn open_list(&self, list_id: u16, declaration: Declaration) -> Result<NetvarList> {
        self.open_list_with_options(list_id, declaration, ListOptions::default(), None)
    }

    /// Open a list with explicit options and an optional change handler.
    pub fn open_list_with_options(
        &self,
        list_id: u16,
        declaration: Declaration,
        options: ListOptions,
        on_change: Option<ChangeHandler>,
    ) -> Result<NetvarList> {
        let sink: Arc<dyn DatagramSink> = self.transport.clone();
        NetvarList::open(
            list_id,
            declaration,
            options,
            on_change,
            sink,
            Arc::clone(&self.registry),
        )
    }

    /// GVL definition for `list`, using this client's endpoint and port.
    pub fn definition(&self, list: &NetvarList) -> String {
        list.definition(&self.config.transport.endpoint, self.config.transport.port)
    }

    pub fn registry(&self) -> &Arc<DispatchRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    pub fn destination(&self) -> SocketAddr {
        self.transport.destination()
    }

    /// Stop the receive thread and wait for it. Idempotent.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        let handle = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
            debug!("netvar client stopped");
        }
    }
}

impl Drop for NetvarClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for NetvarClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetvarClient")
            .field("transport", &self.transport)
            .field("registry", &self.registry)
            .finish()
    }
}

/// The receive loop polls so that shutdown is noticed.
fn receive_config(config: &ClientConfig) -> TransportConfig {
    let mut transport = config.transport.clone();
    transport.poll_timeout = transport.poll_timeout.or(Some(RECEIVE_POLL));
    transport
}

fn receive_loop(
    transport: &UdpTransport,
    registry: &DispatchRegistry,
    running: &AtomicBool,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size];
    while running.load(Ordering::Acquire) {
        match transport.recv(&mut buf) {
            Ok(Some((len, _from))) => {
                registry.route(&buf[..len]);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "receive failed");
                thread::sleep(RECEIVE_ERROR_BACKOFF);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddrV4};

    use super::*;

    fn loopback() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
    }

    #[test]
    fn default_config_matches_controller_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.transport.endpoint, "255.255.255.255");
        assert_eq!(config.transport.port, 1202);
        assert_eq!(config.recv_buffer_size, 65535);
    }

    #[test]
    fn builders_adjust_transport() {
        let config = ClientConfig::default()
            .with_endpoint("10.0.0.5")
            .with_port(1300)
            .with_send_port(1301);
        assert_eq!(config.transport.endpoint, "10.0.0.5");
        assert_eq!(config.transport.port, 1300);
        assert_eq!(config.transport.effective_send_port(), 1301);
    }

    #[test]
    fn lists_register_with_the_client_registry() {
        let client = NetvarClient::bind_addr(
            loopback(),
            ClientConfig::default().with_endpoint("127.0.0.1"),
        )
        .expect("bind should succeed");

        let list = client
            .open_list(7, Declaration::new().bool("a", 1, false))
            .expect("open should succeed");
        assert_eq!(client.registry().list_ids(), vec![7]);

        let xml = client.definition(&list);
        assert!(xml.contains("<ListIdentifier>7</ListIdentifier>"));
        assert!(xml.contains(r#"Value="127.0.0.1""#));

        drop(list);
        assert!(client.registry().is_empty());
        client.shutdown();
        client.shutdown();
    }
}
