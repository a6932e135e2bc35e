//! Routes received datagrams to the lists that registered for them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use netvar_frame::{decode_header, hex};
use tracing::{debug, trace, warn};

use crate::error::Result;

/// Receives frames addressed to one list id.
pub trait FrameHandler: Send + Sync {
    /// Handle one frame. Returns the number of variables that changed.
    fn on_frame(&self, var_id: u16, payload: &[u8]) -> Result<usize>;
}

impl<F> FrameHandler for F
where
    F: Fn(u16, &[u8]) -> Result<usize> + Send + Sync,
{
    fn on_frame(&self, var_id: u16, payload: &[u8]) -> Result<usize> {
        self(var_id, payload)
    }
}

/// Handle returned by [`DispatchRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listeners = HashMap<u16, Vec<(ListenerId, Arc<dyn FrameHandler>)>>;

/// List-id keyed handler table shared by the receive loop and open lists.
#[derive(Default)]
pub struct DispatchRegistry {
    listeners: Mutex<Listeners>,
    next_id: AtomicU64,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for frames carrying `list_id`.
    pub fn register(&self, list_id: u16, handler: Arc<dyn FrameHandler>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().entry(list_id).or_default().push((id, handler));
        debug!(list_id, listener = id.0, "registered list listener");
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let mut removed = false;
        listeners.retain(|_, handlers| {
            let before = handlers.len();
            handlers.retain(|(hid, _)| *hid != id);
            removed |= handlers.len() != before;
            !handlers.is_empty()
        });
        removed
    }

    /// Deliver one datagram to every handler of its list id.
    ///
    /// Runts and foreign datagrams are dropped silently. Handler errors are
    /// logged and do not stop delivery to the others. Returns the number of
    /// handlers invoked.
    pub fn route(&self, datagram: &[u8]) -> usize {
        let header = match decode_header(datagram) {
            Ok(header) => header,
            Err(err) => {
                trace!(len = datagram.len(), error = %err, "dropping datagram");
                return 0;
            }
        };
        debug!(list_id = header.list_id, "RECV {}", hex::to_hex(datagram));

        let handlers: Vec<Arc<dyn FrameHandler>> = match self.lock().get(&header.list_id) {
            Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return 0,
        };

        let payload = header.payload(datagram);
        for handler in &handlers {
            if let Err(err) = handler.on_frame(header.var_id, payload) {
                warn!(
                    list_id = header.list_id,
                    var_id = header.var_id,
                    error = %err,
                    "failed to apply frame"
                );
            }
        }
        handlers.len()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// List ids with at least one handler, ascending.
    pub fn list_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchRegistry")
            .field("list_ids", &self.list_ids())
            .finish()
    }
}
