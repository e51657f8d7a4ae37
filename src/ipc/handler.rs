//! Applies control socket requests to the session.

use super::connection::Reply;
use super::protocol::{BindRequest, Request, Response};
use crate::config::scanner::Block;
use crate::display::Display;
use crate::session::Session;

fn non_empty(text: String) -> Option<String> {
    Some(text).filter(|t| !t.is_empty())
}

impl From<BindRequest> for Block {
    fn from(bind: BindRequest) -> Self {
        Block {
            line: 0,
            binding: bind.hotkey,
            command: bind.command,
            title: non_empty(bind.title),
            description: non_empty(bind.description),
        }
    }
}

/// Handle one request from a connection task.
pub fn handle_request<D: Display>(session: &mut Session<D>, request: Request) -> Reply {
    match request {
        Request::Bind(bind) => {
            let overwrite = bind.overwrite;
            Reply::Done(match session.bind(bind.into(), overwrite) {
                Ok(count) => Response::Ok(format!("bound {count} hotkeys")),
                Err(e) => Response::Error(e.to_string()),
            })
        }
        Request::Unbind { hotkey } => Reply::Done(match session.unbind(&hotkey) {
            Ok(count) => Response::Ok(format!("unbound {count} hotkeys")),
            Err(e) => Response::Error(e.to_string()),
        }),
        Request::Subscribe(mask) => Reply::Subscribed(session.subscribe(mask)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::display::fake::FakeDisplay;
    use crate::session::{Bootstrapper, SessionOptions, env};
    use crate::status::EventMask;

    fn with_session(config: &str, test: impl FnOnce(&mut Session<FakeDisplay>)) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rhkdrc");
        std::fs::write(&path, config).unwrap();
        let options = SessionOptions {
            config_path: Some(path.to_string_lossy().into_owned()),
            ..SessionOptions::default()
        };
        let env = HashMap::from([(env::LOGIN_SHELL_ENV, "/bin/sh")]);
        let mut boot = Bootstrapper::new();
        let session = boot
            .init_globals(&options, || Ok(FakeDisplay::default()), &env)
            .unwrap();
        test(session);
    }

    fn done(reply: Reply) -> Response {
        match reply {
            Reply::Done(response) => response,
            Reply::Subscribed(_) => panic!("unexpected subscription"),
        }
    }

    #[test]
    fn bind_carries_title_and_description() {
        with_session("", |session| {
            let reply = handle_request(
                session,
                Request::Bind(BindRequest {
                    title: "Browser".into(),
                    description: String::new(),
                    hotkey: "super + b".into(),
                    command: "firefox".into(),
                    overwrite: false,
                }),
            );
            assert_eq!(done(reply), Response::Ok("bound 1 hotkeys".into()));
            let hotkey = session.hotkeys().get(0).unwrap();
            assert_eq!(hotkey.title.as_deref(), Some("Browser"));
            assert_eq!(hotkey.description, None);
        });
    }

    #[test]
    fn failures_become_error_responses() {
        with_session("super + a\n\tone\n", |session| {
            let reply = handle_request(
                session,
                Request::Bind(BindRequest {
                    hotkey: "super + a".into(),
                    command: "two".into(),
                    ..BindRequest::default()
                }),
            );
            assert_eq!(
                done(reply),
                Response::Error("'super + a' is already bound".into())
            );
            let reply = handle_request(
                session,
                Request::Unbind {
                    hotkey: "super + a".into(),
                },
            );
            assert_eq!(done(reply), Response::Ok("unbound 1 hotkeys".into()));
        });
    }

    #[test]
    fn subscribe_returns_a_stream() {
        with_session("", |session| {
            let Reply::Subscribed(mut lines) =
                handle_request(session, Request::Subscribe(EventMask::RELOAD))
            else {
                panic!("expected a subscription");
            };
            session.reload_cmd();
            assert_eq!(lines.try_recv().unwrap(), "RConfig reloaded");
        });
    }
}
