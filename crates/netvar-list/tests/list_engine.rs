use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use netvar_frame::{decode_header, FrameError, Value, VariableKind};
use netvar_list::{
    ChangeHandler, ClientConfig, Declaration, DispatchRegistry, ListError, ListOptions,
    NetvarClient, NetvarList,
};
use netvar_transport::DatagramSink;

#[derive(Default)]
struct RecordingSink {
    frames: Mutex<Vec<Vec<u8>>>,
}

impl RecordingSink {
    fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap().clone()
    }

    fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

impl DatagramSink for RecordingSink {
    fn send_datagram(&self, datagram: &[u8]) -> netvar_transport::Result<()> {
        self.frames.lock().unwrap().push(datagram.to_vec());
        Ok(())
    }
}

type Changes = Arc<Mutex<Vec<(String, Value)>>>;

fn recorder() -> (Changes, ChangeHandler) {
    let changes: Changes = Arc::default();
    let sink = Arc::clone(&changes);
    let handler: ChangeHandler = Arc::new(move |name: &str, value: &Value| {
        sink.lock().unwrap().push((name.to_string(), value.clone()));
    });
    (changes, handler)
}

fn machine() -> Declaration {
    Declaration::new()
        .bool("emergency", 1, false)
        .word("working", 2, 0)
        .dword("counter", 3, 1425)
}

fn open_with(
    declaration: Declaration,
    options: ListOptions,
    on_change: Option<ChangeHandler>,
) -> (NetvarList, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let list = NetvarList::open(
        1,
        declaration,
        options,
        on_change,
        sink.clone(),
        Arc::new(DispatchRegistry::new()),
    )
    .expect("list should open");
    (list, sink)
}

#[test]
fn set_sends_single_variable_frame() {
    let (list, sink) = open_with(machine(), ListOptions::default(), None);

    assert!(list.set("emergency", true).unwrap());

    let frames = sink.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(
        frames[0],
        vec![
            0x00, 0x2d, 0x53, 0x33, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00,
            0x15, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
        ]
    );
    assert_eq!(list.get("emergency"), Some(Value::Bool(true)));
}

#[test]
fn unknown_names_are_ignored() {
    let (list, sink) = open_with(machine(), ListOptions::default(), None);

    assert!(!list.set("unknownName", true).unwrap());
    assert_eq!(sink.count(), 0);
    assert_eq!(list.get("unknownName"), None);
}

#[test]
fn sorted_names_follow_idx_not_declaration_order() {
    let declaration = Declaration::new()
        .dword("c", 30, 0)
        .bool("a", 10, false)
        .word("b", 20, 0);
    let (list, _sink) = open_with(declaration, ListOptions::default(), None);
    assert_eq!(list.sorted_names(), ["a", "b", "c"]);
}

#[test]
fn duplicate_names_fail_to_open() {
    let result = NetvarList::open(
        1,
        Declaration::new().bool("x", 1, false).bool("x", 2, true),
        ListOptions::default(),
        None,
        Arc::new(RecordingSink::default()),
        Arc::new(DispatchRegistry::new()),
    );
    assert!(matches!(result, Err(ListError::DuplicateVariable(name)) if name == "x"));
}

#[test]
fn kind_mismatch_leaves_value_unchanged() {
    let (list, sink) = open_with(machine(), ListOptions::default(), None);

    let err = list.set("working", true).unwrap_err();
    assert!(matches!(
        err,
        ListError::KindMismatch {
            expected: VariableKind::Word,
            found: VariableKind::Bool,
            ..
        }
    ));
    assert_eq!(list.get("working"), Some(Value::Word(0)));
    assert_eq!(sink.count(), 0);
}

#[test]
fn per_variable_counters_start_at_zero_and_are_independent() {
    let (list, sink) = open_with(machine(), ListOptions::default(), None);

    list.set("emergency", true).unwrap();
    list.set("emergency", false).unwrap();
    list.set("working", Value::Word(3)).unwrap();

    let counters: Vec<(u16, u16)> = sink
        .frames()
        .iter()
        .map(|frame| {
            let header = decode_header(frame).unwrap();
            (header.var_id, header.counter)
        })
        .collect();
    assert_eq!(counters, vec![(1, 0), (1, 1), (2, 0)]);
}

#[test]
fn packed_set_sends_whole_list_with_counter_from_one() {
    let options = ListOptions::default().with_packed(true);
    let (list, sink) = open_with(machine(), options, None);

    list.set("working", Value::Word(7)).unwrap();
    list.set("emergency", true).unwrap();

    let frames = sink.frames();
    assert_eq!(frames.len(), 2);

    let first = decode_header(&frames[0]).unwrap();
    assert!(first.is_packed());
    assert_eq!(first.item_count, 3);
    assert_eq!(first.total_length, 20 + 1 + 2 + 4);
    assert_eq!(first.counter, 1);
    assert_eq!(
        first.payload(&frames[0]),
        &[0x00, 0x07, 0x00, 0x91, 0x05, 0x00, 0x00]
    );

    let second = decode_header(&frames[1]).unwrap();
    assert_eq!(second.counter, 2);
    assert_eq!(second.payload(&frames[1])[0], 0x01);
}

#[test]
fn set_more_sends_one_frame_per_applied_variable() {
    let (list, sink) = open_with(machine(), ListOptions::default(), None);

    list.set_more([
        ("counter", Value::Dword(9)),
        ("ghost", Value::Bool(true)),
        ("emergency", Value::Bool(true)),
    ])
    .unwrap();

    let var_ids: Vec<u16> = sink
        .frames()
        .iter()
        .map(|frame| decode_header(frame).unwrap().var_id)
        .collect();
    assert_eq!(var_ids, vec![3, 1]);
    assert_eq!(list.get("counter"), Some(Value::Dword(9)));
    assert_eq!(list.get("emergency"), Some(Value::Bool(true)));
}

#[test]
fn set_more_packed_sends_one_frame() {
    let options = ListOptions::default().with_packed(true);
    let (list, sink) = open_with(machine(), options, None);

    list.set_more([("working", Value::Word(1)), ("counter", Value::Dword(2))])
        .unwrap();

    let frames = sink.frames();
    assert_eq!(frames.len(), 1);
    let header = decode_header(&frames[0]).unwrap();
    assert_eq!(header.payload(&frames[0]), &[0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00]);
}

#[test]
fn set_more_keeps_updates_before_a_mismatch() {
    let (list, sink) = open_with(machine(), ListOptions::default(), None);

    let err = list
        .set_more([
            ("working", Value::Word(4)),
            ("emergency", Value::Word(1)),
            ("counter", Value::Dword(8)),
        ])
        .unwrap_err();

    assert!(matches!(err, ListError::KindMismatch { name, .. } if name == "emergency"));
    assert_eq!(list.get("working"), Some(Value::Word(4)));
    assert_eq!(list.get("emergency"), Some(Value::Bool(false)));
    assert_eq!(list.get("counter"), Some(Value::Dword(1425)));
    assert_eq!(sink.count(), 1);
}

#[test]
fn inbound_single_frame_updates_live_and_notifies_once() {
    let (changes, handler) = recorder();
    let (list, _sink) = open_with(machine(), ListOptions::default(), Some(handler));

    assert_eq!(list.handle_frame(2, &[0x07, 0x00]).unwrap(), 1);
    assert_eq!(list.handle_frame(2, &[0x07, 0x00]).unwrap(), 0);
    assert_eq!(list.get("working"), Some(Value::Word(7)));
    assert_eq!(
        *changes.lock().unwrap(),
        vec![("working".to_string(), Value::Word(7))]
    );

    // Undeclared idx is ignored.
    assert_eq!(list.handle_frame(9, &[0x01]).unwrap(), 0);
}

#[test]
fn inbound_packed_frame_notifies_only_changed_fields() {
    let (changes, handler) = recorder();
    let (list, _sink) = open_with(machine(), ListOptions::default(), Some(handler));

    // emergency=1, working=0 (unchanged), counter=1426
    let payload = [0x01, 0x00, 0x00, 0x92, 0x05, 0x00, 0x00];
    assert_eq!(list.handle_frame(0, &payload).unwrap(), 2);

    let names: Vec<String> = changes
        .lock()
        .unwrap()
        .iter()
        .map(|(name, _)| name.clone())
        .collect();
    assert_eq!(names, ["emergency", "counter"]);
    assert_eq!(list.get("counter"), Some(Value::Dword(1426)));
}

#[test]
fn inbound_values_do_not_leak_into_pending_state() {
    let options = ListOptions::default().with_packed(true);
    let (list, sink) = open_with(machine(), options, None);

    list.handle_frame(0, &[0x01, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00])
        .unwrap();
    assert_eq!(list.get("working"), Some(Value::Word(5)));

    list.send_snapshot().unwrap();
    let frames = sink.frames();
    let header = decode_header(&frames[0]).unwrap();
    assert_eq!(
        header.payload(&frames[0]),
        &[0x00, 0x00, 0x00, 0x91, 0x05, 0x00, 0x00]
    );
}

#[test]
fn packed_string_terminator_is_accounted_for() {
    let declaration = Declaration::new()
        .string("label", 1, "")
        .word("working", 2, 0);
    let (list, _sink) = open_with(declaration, ListOptions::default(), None);

    let payload = [b'a', b'b', b'c', 0x00, 0x05, 0x00];
    assert_eq!(list.handle_frame(0, &payload).unwrap(), 2);
    assert_eq!(list.get("label"), Some(Value::String("abc".into())));
    assert_eq!(list.get("working"), Some(Value::Word(5)));
}

#[test]
fn packed_terminator_failure_commits_earlier_fields_only() {
    let declaration = Declaration::new()
        .word("working", 1, 0)
        .string("label", 2, "old")
        .bool("flag", 3, false);
    let (changes, handler) = recorder();
    let (list, _sink) = open_with(declaration, ListOptions::default(), Some(handler));

    let err = list
        .handle_frame(0, &[0x09, 0x00, b'a', b'b'])
        .unwrap_err();
    match err {
        ListError::Decode {
            list_id,
            var_id,
            field,
            source,
        } => {
            assert_eq!(list_id, 1);
            assert_eq!(var_id, 0);
            assert_eq!(field, "label");
            assert_eq!(
                source,
                FrameError::TerminatorNotFound {
                    kind: VariableKind::String,
                    offset: 2
                }
            );
        }
        other => panic!("expected decode error, got {other:?}"),
    }

    assert_eq!(list.get("working"), Some(Value::Word(9)));
    assert_eq!(list.get("label"), Some(Value::String("old".into())));
    assert_eq!(list.get("flag"), Some(Value::Bool(false)));
    assert_eq!(changes.lock().unwrap().len(), 1);
}

#[test]
fn change_handler_may_call_back_into_the_list() {
    let slot: Arc<OnceLock<Arc<NetvarList>>> = Arc::new(OnceLock::new());
    let inner = Arc::clone(&slot);
    let handler: ChangeHandler = Arc::new(move |name: &str, value: &Value| {
        if let (Some(list), "emergency", Value::Bool(true)) = (inner.get(), name, value) {
            list.set("working", Value::Word(99)).unwrap();
        }
    });
    let (list, sink) = open_with(machine(), ListOptions::default(), Some(handler));
    let list = Arc::new(list);
    assert!(slot.set(Arc::clone(&list)).is_ok());

    list.handle_frame(1, &[0x01]).unwrap();

    assert_eq!(list.get("working"), Some(Value::Word(99)));
    assert_eq!(sink.count(), 1);
}

#[test]
fn dispose_from_handler_stops_remaining_notifications() {
    let slot: Arc<OnceLock<Arc<NetvarList>>> = Arc::new(OnceLock::new());
    let inner = Arc::clone(&slot);
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let handler: ChangeHandler = Arc::new(move |_name: &str, _value: &Value| {
        seen.fetch_add(1, Ordering::SeqCst);
        if let Some(list) = inner.get() {
            list.dispose();
        }
    });
    let (list, _sink) = open_with(machine(), ListOptions::default(), Some(handler));
    let list = Arc::new(list);
    assert!(slot.set(Arc::clone(&list)).is_ok());

    list.handle_frame(0, &[0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00])
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(list.is_disposed());
    assert_eq!(list.handle_frame(1, &[0x00]).unwrap(), 0);
}

#[test]
fn cyclic_sends_until_disposed() {
    let options = ListOptions::default().with_cyclic(Duration::from_millis(20));
    let (list, sink) = open_with(machine(), options, None);

    thread::sleep(Duration::from_millis(150));
    list.dispose();
    let sent = sink.count();
    // Unpacked cyclic sends one frame per variable each tick.
    assert!(sent >= 3, "expected cyclic frames, got {sent}");
    assert_eq!(sent % 3, 0);

    thread::sleep(Duration::from_millis(80));
    assert_eq!(sink.count(), sent);

    list.dispose();
    assert!(matches!(list.set("emergency", true), Err(ListError::Disposed)));
}

#[test]
fn cyclic_packed_sends_incrementing_counters() {
    let options = ListOptions::default()
        .with_cyclic(Duration::from_millis(20))
        .with_packed(true);
    let (list, sink) = open_with(machine(), options, None);

    thread::sleep(Duration::from_millis(100));
    list.dispose();

    let counters: Vec<u16> = sink
        .frames()
        .iter()
        .map(|frame| decode_header(frame).unwrap().counter)
        .collect();
    assert!(counters.len() >= 2, "expected cyclic frames, got {counters:?}");
    let expected: Vec<u16> = (1..=counters.len() as u16).collect();
    assert_eq!(counters, expected);
}

#[test]
fn registry_ignores_runt_datagrams() {
    let registry = Arc::new(DispatchRegistry::new());
    let list = NetvarList::open(
        1,
        machine(),
        ListOptions::default(),
        None,
        Arc::new(RecordingSink::default()),
        Arc::clone(&registry),
    )
    .unwrap();

    assert_eq!(registry.route(&[0u8; 10]), 0);
    assert_eq!(list.get("emergency"), Some(Value::Bool(false)));
}

#[test]
fn registry_delivers_to_open_list() {
    let registry = Arc::new(DispatchRegistry::new());
    let list = NetvarList::open(
        1,
        machine(),
        ListOptions::default(),
        None,
        Arc::new(RecordingSink::default()),
        Arc::clone(&registry),
    )
    .unwrap();

    let frame = [
        0x00, 0x2d, 0x53, 0x33, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00, 0x01, 0x00, 0x16,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80,
    ];
    assert_eq!(registry.route(&frame), 1);
    assert_eq!(list.get("working"), Some(Value::Word(-32768)));
}

fn loopback() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn loopback_udp_exchange_between_clients() {
    let receiver = NetvarClient::bind_addr(
        loopback(),
        ClientConfig::default().with_endpoint("127.0.0.1").with_send_port(9),
    )
    .expect("receiver should bind");
    let receiver_port = receiver.local_addr().unwrap().port();

    let sender = NetvarClient::bind_addr(
        loopback(),
        ClientConfig::default()
            .with_endpoint("127.0.0.1")
            .with_send_port(receiver_port),
    )
    .expect("sender should bind");

    let (changes, handler) = recorder();
    let mirror = receiver
        .open_list_with_options(1, machine(), ListOptions::default(), Some(handler))
        .unwrap();
    let origin = sender.open_list(1, machine()).unwrap();

    origin.set("emergency", true).unwrap();
    origin.set("counter", Value::Dword(77)).unwrap();

    assert!(
        wait_for(|| mirror.get("counter") == Some(Value::Dword(77))),
        "frames should arrive over loopback"
    );
    assert_eq!(mirror.get("emergency"), Some(Value::Bool(true)));
    assert_eq!(changes.lock().unwrap().len(), 2);
}
