//! Control socket requests and responses.
//!
//! A request is a kind byte and a NUL, followed by its fields:
//!
//! - `B`: title, description, hotkey, command and `t`/`f` for overwrite,
//!   each terminated by a NUL
//! - `U`: the hotkey, terminated by a NUL
//! - `S`: one event mask byte
//!
//! The daemon answers with newline-terminated lines. Bind and unbind get a
//! single [`Response`]; a subscription gets status lines until either side
//! hangs up.

use crate::status::EventMask;

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "RHKD_SOCKET_PATH";

/// Largest request accepted, in bytes.
pub const MAX_REQUEST_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Bind(BindRequest),
    Unbind { hotkey: String },
    Subscribe(EventMask),
}

/// A binding added at runtime. Empty title or description means none.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BindRequest {
    pub title: String,
    pub description: String,
    pub hotkey: String,
    pub command: String,
    /// Replace hotkeys already bound to the same chains.
    pub overwrite: bool,
}

/// Outcome of a bind or unbind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok(String),
    Error(String),
}

const OK_PREFIX: &str = "ok: ";
const ERROR_PREFIX: &str = "error: ";

impl Response {
    pub fn line(&self) -> String {
        match self {
            Response::Ok(message) => format!("{OK_PREFIX}{message}"),
            Response::Error(message) => format!("{ERROR_PREFIX}{message}"),
        }
    }

    pub fn parse(line: &str) -> Option<Self> {
        if let Some(message) = line.strip_prefix(OK_PREFIX) {
            Some(Response::Ok(message.to_string()))
        } else {
            line.strip_prefix(ERROR_PREFIX)
                .map(|message| Response::Error(message.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_lines() {
        let ok = Response::Ok("bound 2 hotkeys".into());
        assert_eq!(ok.line(), "ok: bound 2 hotkeys");
        assert_eq!(Response::parse(&ok.line()), Some(ok));
        let err = Response::Error("'super + a' is not bound".into());
        assert_eq!(Response::parse(&err.line()), Some(err));
        assert_eq!(Response::parse("Hsuper + a"), None);
    }
}
