use std::fmt;
use std::io;

use netvar_frame::FrameError;
use netvar_list::ListError;
use netvar_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        TransportError::Send { source, .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {source}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn list_error(context: &str, err: ListError) -> CliError {
    match err {
        ListError::Transport(err) => transport_error(context, err),
        ListError::Frame(err) => frame_error(context, err),
        ListError::DuplicateVariable(_)
        | ListError::InvalidDeclaration(_)
        | ListError::KindMismatch { .. }
        | ListError::Decode { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ListError::Disposed => CliError::new(FAILURE, format!("{context}: {err}")),
        ListError::Spawn(source) => io_error(context, source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_problems_are_data_invalid() {
        let err = list_error("load", ListError::DuplicateVariable("x".into()));
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("load: "));
    }

    #[test]
    fn unresolvable_endpoint_is_transport_error() {
        let err = list_error(
            "bind",
            ListError::Transport(TransportError::Resolve {
                endpoint: "nowhere:1202".into(),
            }),
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn permission_denied_maps_through_io() {
        let err = transport_error(
            "bind",
            TransportError::Io(io::Error::from(io::ErrorKind::PermissionDenied)),
        );
        assert_eq!(err.code, PERMISSION_DENIED);
    }
}
