//! The variable list engine.
//!
//! A list holds two tables. The pending table is what local callers have
//! set and what goes on the wire. The live table mirrors the last known
//! state, updated both by local sets and by inbound frames. Inbound frames
//! never touch the pending table, so a controller echo cannot overwrite a
//! value the application is about to send.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use bytes::BytesMut;
use netvar_frame::{
    decode_value, encode_packed, encode_single, encode_value, hex, FieldLayout, Value,
};
use netvar_transport::DatagramSink;
use tracing::{debug, trace, warn};

use crate::counter::SequenceCounter;
use crate::cyclic::CyclicTask;
use crate::declaration::Declaration;
use crate::definition::{render_gvl, GvlSettings};
use crate::error::{ListError, Result};
use crate::options::{ChangeHandler, ListOptions};
use crate::registry::{DispatchRegistry, FrameHandler, ListenerId};
use crate::table::{Update, ValueTable};

/// An open network variable list.
///
/// All methods take `&self`; the list can be shared across threads. Dropping
/// the list disposes it.
pub struct NetvarList {
    shared: Arc<ListShared>,
    registry: Arc<DispatchRegistry>,
    listener: Mutex<Option<ListenerId>>,
    cyclic: Mutex<Option<CyclicTask>>,
}

struct ListShared {
    list_id: u16,
    options: ListOptions,
    /// Names in ascending idx order; the packed payload order.
    sorted_names: Vec<String>,
    layout: Vec<FieldLayout>,
    by_idx: HashMap<u16, String>,
    sink: Arc<dyn DatagramSink>,
    on_change: Option<ChangeHandler>,
    state: Mutex<ListState>,
    /// Held for the whole of an inbound dispatch, callbacks included.
    dispatch_gate: Mutex<()>,
    dispatching: Mutex<Option<ThreadId>>,
    disposed: AtomicBool,
}

struct ListState {
    live: ValueTable,
    pending: ValueTable,
    var_counters: HashMap<String, SequenceCounter>,
    packed_counter: SequenceCounter,
    buf: BytesMut,
}

impl NetvarList {
    /// Open a list sending through `sink` and receiving through `registry`.
    ///
    /// Fails if a variable name is declared twice. With `options.cyclic`,
    /// the pending state is re-sent every cycle interval until dispose.
    pub fn open(
        list_id: u16,
        declaration: Declaration,
        options: ListOptions,
        on_change: Option<ChangeHandler>,
        sink: Arc<dyn DatagramSink>,
        registry: Arc<DispatchRegistry>,
    ) -> Result<Self> {
        declaration.validate()?;

        let mut layout: Vec<FieldLayout> = declaration
            .entries()
            .iter()
            .map(|(name, slot)| FieldLayout::new(name.clone(), slot.idx(), slot.kind()))
            .collect();
        // A single frame for a shared idx belongs to the first declared name.
        let mut by_idx: HashMap<u16, String> = HashMap::new();
        for field in &layout {
            by_idx.entry(field.idx).or_insert_with(|| field.name.clone());
        }
        layout.sort_by_key(|field| field.idx);
        let sorted_names: Vec<String> = layout.iter().map(|field| field.name.clone()).collect();

        let table = ValueTable::from_declaration(&declaration);
        let shared = Arc::new(ListShared {
            list_id,
            options,
            sorted_names,
            layout,
            by_idx,
            sink,
            on_change,
            state: Mutex::new(ListState {
                live: table.clone(),
                pending: table,
                var_counters: HashMap::new(),
                packed_counter: SequenceCounter::packed(),
                buf: BytesMut::new(),
            }),
            dispatch_gate: Mutex::new(()),
            dispatching: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });

        let handler: Arc<dyn FrameHandler> = shared.clone();
        let listener = registry.register(list_id, handler);

        let cyclic = if shared.options.cyclic {
            let ticker = Arc::clone(&shared);
            let spawned = CyclicTask::spawn(
                &format!("netvar-cyclic-{list_id}"),
                shared.options.cycle_interval(),
                move || ticker.send_snapshot(),
            );
            match spawned {
                Ok(task) => Some(task),
                Err(err) => {
                    registry.unregister(listener);
                    return Err(ListError::Spawn(err));
                }
            }
        } else {
            None
        };

        debug!(
            list_id,
            variables = shared.sorted_names.len(),
            packed = shared.options.packed,
            cyclic = shared.options.cyclic,
            "list opened"
        );

        Ok(Self {
            shared,
            registry,
            listener: Mutex::new(Some(listener)),
            cyclic: Mutex::new(cyclic),
        })
    }

    pub fn list_id(&self) -> u16 {
        self.shared.list_id
    }

    pub fn options(&self) -> &ListOptions {
        &self.shared.options
    }

    /// Variable names in ascending idx order.
    pub fn sorted_names(&self) -> &[String] {
        &self.shared.sorted_names
    }

    /// Field layout in ascending idx order, for inspection and definitions.
    pub fn layout(&self) -> &[FieldLayout] {
        &self.shared.layout
    }

    /// Set one variable and send it.
    ///
    /// Returns `Ok(false)` for an undeclared name. The value must have the
    /// declared kind and fit in a frame; otherwise nothing changes.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        self.ensure_open()?;
        let value = value.into();
        let mut state = lock(&self.shared.state);
        let Some(staged) = stage(&mut state, name, value)? else {
            trace!(list_id = self.shared.list_id, name, "set on undeclared variable");
            return Ok(false);
        };

        let sent = if self.shared.options.packed {
            self.shared.send_packed(&mut state)
        } else {
            self.shared.send_single(&mut state, name)
        };
        if let Err(err) = sent {
            unstage(&mut state, vec![staged]);
            return Err(err);
        }
        Ok(true)
    }

    /// Set several variables and send them together.
    ///
    /// Undeclared names are skipped. In packed mode one packed frame is sent;
    /// otherwise one frame per applied variable, in the order given. On a
    /// kind mismatch the updates before it stay applied and are sent, and the
    /// mismatch is returned. Updates whose frame could not be built are
    /// rolled back.
    pub fn set_more<I, S, V>(&self, updates: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, V)>,
        S: AsRef<str>,
        V: Into<Value>,
    {
        self.ensure_open()?;
        let mut state = lock(&self.shared.state);
        let mut applied: Vec<Staged> = Vec::new();
        let mut failure = None;

        for (name, value) in updates {
            let name = name.as_ref();
            match stage(&mut state, name, value.into()) {
                Ok(Some(staged)) => applied.push(staged),
                Ok(None) => {
                    trace!(list_id = self.shared.list_id, name, "skipping undeclared variable")
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if !applied.is_empty() {
            if self.shared.options.packed {
                if let Err(err) = self.shared.send_packed(&mut state) {
                    unstage(&mut state, applied);
                    return Err(err);
                }
            } else {
                let mut sent = 0;
                while sent < applied.len() {
                    if let Err(err) = self.shared.send_single(&mut state, &applied[sent].name) {
                        unstage(&mut state, applied.split_off(sent));
                        return Err(err);
                    }
                    sent += 1;
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Current live value of a variable.
    pub fn get(&self, name: &str) -> Option<Value> {
        lock(&self.shared.state).live.value(name).cloned()
    }

    /// Apply an inbound frame's payload as if it had been received.
    ///
    /// Returns the number of variables that changed.
    pub fn handle_frame(&self, var_id: u16, payload: &[u8]) -> Result<usize> {
        self.shared.on_frame(var_id, payload)
    }

    /// Send the full pending state now, as the cyclic task does.
    pub fn send_snapshot(&self) -> Result<()> {
        self.ensure_open()?;
        self.shared.send_snapshot();
        Ok(())
    }

    /// GVL definition a controller can import to talk to this list.
    pub fn definition(&self, endpoint: &str, port: u16) -> String {
        let settings = GvlSettings {
            list_id: self.shared.list_id,
            packed: self.shared.options.packed,
            cyclic: self.shared.options.cyclic,
            cycle_interval_ms: self.shared.options.cycle_interval_ms,
            endpoint: endpoint.to_string(),
            port,
        };
        render_gvl(&settings, self.layout())
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Stop the cyclic task and inbound delivery. Idempotent.
    ///
    /// After this returns, no further frames are sent and no change handler
    /// runs, except that a handler calling dispose on its own list finishes
    /// its current invocation.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if !self.shared.is_dispatching_thread() {
            drop(lock(&self.shared.dispatch_gate));
        }
        if let Some(task) = lock(&self.cyclic).take() {
            task.cancel();
        }
        if let Some(id) = lock(&self.listener).take() {
            self.registry.unregister(id);
        }
        debug!(list_id = self.shared.list_id, "list disposed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(ListError::Disposed);
        }
        Ok(())
    }
}

impl Drop for NetvarList {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for NetvarList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetvarList")
            .field("list_id", &self.shared.list_id)
            .field("variables", &self.shared.sorted_names)
            .field("options", &self.shared.options)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Values a staged update replaced, kept until its frame is built.
struct Staged {
    name: String,
    pending: Value,
    live: Option<Value>,
}

/// Stage `value` into pending and mirror it into live.
///
/// Returns `None` for an undeclared name.
fn stage(state: &mut ListState, name: &str, value: Value) -> Result<Option<Staged>> {
    let Some(expected) = state.pending.get(name).map(|slot| slot.kind()) else {
        return Ok(None);
    };
    if expected != value.kind() {
        return Err(ListError::KindMismatch {
            name: name.to_string(),
            expected,
            found: value.kind(),
        });
    }
    // Reject values the wire cannot carry before anything changes.
    state.buf.clear();
    encode_value(&value, &mut state.buf)?;

    let previous = match state.pending.update(name, value) {
        Update::Applied { previous } => previous,
        Update::UnknownName => return Ok(None),
        Update::KindMismatch { expected, rejected } => {
            return Err(ListError::KindMismatch {
                name: name.to_string(),
                expected,
                found: rejected.kind(),
            })
        }
    };
    let ListState { live, pending, .. } = state;
    let live_previous = live.value(name).cloned();
    live.commit_from(pending, name);
    Ok(Some(Staged {
        name: name.to_string(),
        pending: previous,
        live: live_previous,
    }))
}

/// Undo staged updates, latest first.
fn unstage(state: &mut ListState, staged: Vec<Staged>) {
    for entry in staged.into_iter().rev() {
        state.pending.update(&entry.name, entry.pending);
        if let Some(live) = entry.live {
            state.live.update(&entry.name, live);
        }
    }
}

impl ListShared {
    fn send_single(&self, state: &mut ListState, name: &str) -> Result<()> {
        let Some(slot) = state.pending.get(name) else {
            return Ok(());
        };
        let counter = state
            .var_counters
            .get(name)
            .copied()
            .unwrap_or_else(SequenceCounter::per_variable);
        state.buf.clear();
        encode_single(self.list_id, slot, counter.peek(), &mut state.buf)?;
        state
            .var_counters
            .entry(name.to_string())
            .or_insert(counter)
            .advance();
        self.transmit(&state.buf);
        Ok(())
    }

    fn send_packed(&self, state: &mut ListState) -> Result<()> {
        // The counter only moves once a frame was actually built.
        let counter = state.packed_counter.peek();
        state.buf.clear();
        encode_packed(
            self.list_id,
            counter,
            state.pending.slots_in(&self.sorted_names),
            &mut state.buf,
        )?;
        state.packed_counter.advance();
        self.transmit(&state.buf);
        Ok(())
    }

    fn send_snapshot(&self) {
        let mut state = lock(&self.state);
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let result = if self.options.packed {
            self.send_packed(&mut state)
        } else {
            self.sorted_names
                .iter()
                .try_for_each(|name| self.send_single(&mut state, name))
        };
        if let Err(err) = result {
            warn!(list_id = self.list_id, error = %err, "failed to encode snapshot");
        }
    }

    fn transmit(&self, datagram: &[u8]) {
        debug!(list_id = self.list_id, "SEND {}", hex::to_hex(datagram));
        if let Err(err) = self.sink.send_datagram(datagram) {
            warn!(list_id = self.list_id, error = %err, "failed to send frame");
        }
    }

    /// Decode into live; returns the changed variables and the decode outcome.
    fn apply(
        &self,
        state: &mut ListState,
        var_id: u16,
        payload: &[u8],
    ) -> (Vec<(String, Value)>, Result<()>) {
        let mut changes = Vec::new();
        let names: Vec<&String> = if var_id == netvar_frame::PACKED_VAR_ID {
            self.sorted_names.iter().collect()
        } else {
            match self.by_idx.get(&var_id) {
                Some(name) => vec![name],
                None => {
                    trace!(list_id = self.list_id, var_id, "frame for undeclared idx");
                    return (changes, Ok(()));
                }
            }
        };

        let mut offset = 0usize;
        for name in names {
            let Some(kind) = state.live.get(name).map(|slot| slot.kind()) else {
                continue;
            };
            match decode_value(kind, payload, offset) {
                Ok((value, consumed)) => {
                    offset += consumed;
                    if let Update::Applied { previous } = state.live.update(name, value.clone()) {
                        if previous != value {
                            changes.push((name.clone(), value));
                        }
                    }
                }
                Err(source) => {
                    let err = ListError::Decode {
                        list_id: self.list_id,
                        var_id,
                        field: name.clone(),
                        source,
                    };
                    return (changes, Err(err));
                }
            }
        }
        (changes, Ok(()))
    }

    fn is_dispatching_thread(&self) -> bool {
        *lock(&self.dispatching) == Some(thread::current().id())
    }
}

impl FrameHandler for ListShared {
    fn on_frame(&self, var_id: u16, payload: &[u8]) -> Result<usize> {
        let _gate = lock(&self.dispatch_gate);
        if self.disposed.load(Ordering::Acquire) {
            return Ok(0);
        }

        let (changes, outcome) = {
            let mut state = lock(&self.state);
            self.apply(&mut state, var_id, payload)
        };

        if let Some(on_change) = &self.on_change {
            let _marker = DispatchMarker::enter(&self.dispatching);
            for (name, value) in &changes {
                if self.disposed.load(Ordering::Acquire) {
                    break;
                }
                on_change(name, value);
            }
        }

        outcome.map(|()| changes.len())
    }
}

/// Records the current thread as dispatching until dropped.
struct DispatchMarker<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> DispatchMarker<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *lock(slot) = Some(thread::current().id());
        Self(slot)
    }
}

impl Drop for DispatchMarker<'_> {
    fn drop(&mut self) {
        *lock(self.0) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use netvar_transport::TransportError;

    use super::*;

    #[derive(Default)]
    struct Capture {
        frames: Mutex<Vec<Vec<u8>>>,
    }

    impl DatagramSink for Capture {
        fn send_datagram(&self, datagram: &[u8]) -> netvar_transport::Result<()> {
            self.frames.lock().unwrap().push(datagram.to_vec());
            Ok(())
        }
    }

    struct Failing(AtomicUsize);

    impl DatagramSink for Failing {
        fn send_datagram(&self, _datagram: &[u8]) -> netvar_transport::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Io(std::io::Error::other("unreachable network")))
        }
    }

    fn open(options: ListOptions, sink: Arc<dyn DatagramSink>) -> NetvarList {
        NetvarList::open(
            1,
            Declaration::new().bool("a", 1, false).word("b", 2, 0),
            options,
            None,
            sink,
            Arc::new(DispatchRegistry::new()),
        )
        .expect("open should succeed")
    }

    #[test]
    fn set_rejects_unencodable_string_without_staging() {
        let sink = Arc::new(Capture::default());
        let list = NetvarList::open(
            1,
            Declaration::new().string("s", 1, "ok"),
            ListOptions::default(),
            None,
            sink.clone(),
            Arc::new(DispatchRegistry::new()),
        )
        .unwrap();

        let err = list.set("s", Value::String("a\0b".into())).unwrap_err();
        assert!(matches!(err, ListError::Frame(_)));
        assert_eq!(list.get("s"), Some(Value::String("ok".into())));
        assert!(sink.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn send_failure_is_not_an_error() {
        let sink = Arc::new(Failing(AtomicUsize::new(0)));
        let list = open(ListOptions::default(), sink.clone());

        assert!(list.set("a", true).unwrap());
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
        assert_eq!(list.get("a"), Some(Value::Bool(true)));
    }

    #[test]
    fn layout_is_sorted_by_idx() {
        let list = NetvarList::open(
            9,
            Declaration::new().word("z", 5, 0).bool("y", 2, false),
            ListOptions::default(),
            None,
            Arc::new(Capture::default()),
            Arc::new(DispatchRegistry::new()),
        )
        .unwrap();
        let layout = list.layout();
        assert_eq!(layout[0].name, "y");
        assert_eq!(layout[1].name, "z");
        assert_eq!(list.sorted_names(), ["y", "z"]);
    }

    #[test]
    fn dispose_unregisters_and_is_idempotent() {
        let registry = Arc::new(DispatchRegistry::new());
        let list = NetvarList::open(
            3,
            Declaration::new().bool("a", 1, false),
            ListOptions::default(),
            None,
            Arc::new(Capture::default()),
            Arc::clone(&registry),
        )
        .unwrap();
        assert_eq!(registry.list_ids(), vec![3]);

        list.dispose();
        list.dispose();
        assert!(list.is_disposed());
        assert!(registry.is_empty());
        assert!(matches!(list.set("a", true), Err(ListError::Disposed)));
        assert!(matches!(list.send_snapshot(), Err(ListError::Disposed)));
    }

    #[test]
    fn drop_disposes() {
        let registry = Arc::new(DispatchRegistry::new());
        {
            let _list = NetvarList::open(
                3,
                Declaration::new().bool("a", 1, false),
                ListOptions::default(),
                None,
                Arc::new(Capture::default()),
                Arc::clone(&registry),
            )
            .unwrap();
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
    }

    fn frames(sink: &Capture) -> Vec<Vec<u8>> {
        sink.frames.lock().unwrap().clone()
    }

    #[test]
    fn shared_idx_routes_single_frame_to_first_declared_name() {
        let list = NetvarList::open(
            1,
            Declaration::new().word("first", 2, 0).word("second", 2, 0),
            ListOptions::default(),
            None,
            Arc::new(Capture::default()),
            Arc::new(DispatchRegistry::new()),
        )
        .unwrap();

        assert_eq!(list.handle_frame(2, &[7, 0]).unwrap(), 1);
        assert_eq!(list.get("first"), Some(Value::Word(7)));
        assert_eq!(list.get("second"), Some(Value::Word(0)));
    }

    fn oversized_packed(sink: Arc<Capture>) -> NetvarList {
        NetvarList::open(
            1,
            Declaration::new()
                .string("a", 1, "x".repeat(40_000))
                .string("b", 2, ""),
            ListOptions::default().with_packed(true),
            None,
            sink,
            Arc::new(DispatchRegistry::new()),
        )
        .unwrap()
    }

    #[test]
    fn set_rolls_back_when_packed_frame_is_too_large() {
        let sink = Arc::new(Capture::default());
        let list = oversized_packed(sink.clone());

        let err = list.set("b", Value::String("y".repeat(30_000))).unwrap_err();
        assert!(matches!(
            err,
            ListError::Frame(netvar_frame::FrameError::FrameTooLarge { .. })
        ));
        assert_eq!(list.get("b"), Some(Value::String(String::new())));
        assert!(frames(&sink).is_empty());

        // The list is still usable and the packed counter did not move.
        assert!(list.set("b", Value::String("ok".into())).unwrap());
        let sent = frames(&sink);
        assert_eq!(sent.len(), 1);
        assert_eq!(&sent[0][16..18], &[1, 0]);
        assert_eq!(list.get("b"), Some(Value::String("ok".into())));
    }

    #[test]
    fn set_more_rolls_back_every_update_of_an_oversized_packed_frame() {
        let sink = Arc::new(Capture::default());
        let list = oversized_packed(sink.clone());

        let err = list
            .set_more([
                ("b", Value::String("first".into())),
                ("b", Value::String("z".repeat(30_000))),
            ])
            .unwrap_err();
        assert!(matches!(err, ListError::Frame(_)));
        assert_eq!(list.get("b"), Some(Value::String(String::new())));
        assert!(frames(&sink).is_empty());
    }

    #[test]
    fn zero_cycle_interval_ticks_at_the_default_rate() {
        let sink = Arc::new(Capture::default());
        let options: ListOptions =
            serde_json::from_str(r#"{"cyclic": true, "cycle_interval_ms": 0}"#).unwrap();
        let list = open(options, sink.clone());

        std::thread::sleep(std::time::Duration::from_millis(100));
        list.dispose();
        assert!(frames(&sink).is_empty());
    }
}
