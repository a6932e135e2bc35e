use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use netvar_frame::{decode_header, Value};
use netvar_list::{ChangeHandler, ListOptions, NetvarClient};
use netvar_transport::UdpTransport;
use tracing::info;

use crate::cmd::{load_declaration, ListenArgs};
use crate::exit::{list_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_change, print_frame, OutputFormat};

const POLL: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    match &args.decl {
        Some(path) => listen_changes(&args, path, &running, format),
        None => listen_raw(&args, &running, format),
    }
}

/// Mirror the declared list and print each change.
fn listen_changes(
    args: &ListenArgs,
    decl: &Path,
    running: &AtomicBool,
    format: OutputFormat,
) -> CliResult<i32> {
    let declaration = load_declaration(decl)?;

    let client = NetvarClient::bind(args.net.client_config())
        .map_err(|err| list_error("bind failed", err))?;

    let (events, received) = mpsc::channel::<(String, Value)>();
    let on_change: ChangeHandler = Arc::new(move |name: &str, value: &Value| {
        let _ = events.send((name.to_string(), value.clone()));
    });
    let list = client
        .open_list_with_options(
            args.list_id,
            declaration,
            ListOptions::default(),
            Some(on_change),
        )
        .map_err(|err| list_error("open list failed", err))?;
    info!(list_id = args.list_id, port = args.net.port, "listening for changes");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let (name, value) = match received.recv_timeout(POLL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        print_change(list.list_id(), &name, &value, format);
        printed = printed.saturating_add(1);
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    list.dispose();
    client.shutdown();
    Ok(SUCCESS)
}

/// Print every frame for the list id without decoding the payload.
fn listen_raw(args: &ListenArgs, running: &AtomicBool, format: OutputFormat) -> CliResult<i32> {
    let mut config = args.net.client_config().transport;
    config.poll_timeout = Some(POLL);
    let transport =
        UdpTransport::bind(&config).map_err(|err| transport_error("bind failed", err))?;
    info!(list_id = args.list_id, port = args.net.port, "listening for raw frames");

    let mut buf = vec![0u8; netvar_frame::MAX_FRAME_SIZE];
    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let len = match transport.recv(&mut buf) {
            Ok(Some((len, _from))) => len,
            Ok(None) => continue,
            Err(err) => return Err(transport_error("receive failed", err)),
        };
        let datagram = &buf[..len];
        let Ok(header) = decode_header(datagram) else {
            continue;
        };
        if header.list_id != args.list_id {
            continue;
        }

        print_frame(&header, header.payload(datagram), format);
        printed = printed.saturating_add(1);
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
