//! Hotkeys bound and unbound at runtime over the control socket.
//!
//! Runtime bindings outlive a reload: they are applied again after the
//! config files, replacing config hotkeys on the same chains. Unbinding a
//! config hotkey lasts until the next reload.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::Session;
use crate::config::scanner::Block;
use crate::config::{self, BlockError};
use crate::display::Display;
use crate::hotkey::{Hotkey, HotkeyList};
use crate::keymap::StandardModifiers;
use crate::status::{EventMask, Status};

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error("'{0}' is already bound")]
    Taken(String),
    #[error("'{0}' is not bound")]
    NotBound(String),
}

/// A binding received over the socket, minus the chains unbound since.
#[derive(Debug)]
pub(super) struct RuntimeBinding {
    block: Block,
    unbound: HashSet<String>,
}

impl RuntimeBinding {
    fn hotkeys(&self, modifiers: &StandardModifiers) -> Result<Vec<Hotkey>, BlockError> {
        let mut hotkeys = config::build_hotkeys(&self.block, modifiers)?;
        hotkeys.retain(|h| !self.unbound.contains(&h.chain_repr()));
        Ok(hotkeys)
    }
}

/// Replace the hotkeys on the chains of `hotkeys` with them.
fn install(list: &mut HotkeyList, hotkeys: Vec<Hotkey>) {
    let chains: HashSet<String> = hotkeys.iter().map(Hotkey::chain_repr).collect();
    list.retain(|h| !chains.contains(&h.chain_repr()));
    for hotkey in hotkeys {
        list.push(hotkey);
    }
}

impl<D: Display> Session<D> {
    /// Bind `block`'s hotkeys. Chains that are already bound are an error
    /// unless `overwrite` is set.
    pub fn bind(&mut self, block: Block, overwrite: bool) -> Result<usize, BindError> {
        let result = self.try_bind(block, overwrite);
        self.report(&result, "bound");
        result
    }

    fn try_bind(&mut self, block: Block, overwrite: bool) -> Result<usize, BindError> {
        let hotkeys = config::build_hotkeys(&block, &self.modifiers)?;
        let chains: HashSet<String> = hotkeys.iter().map(Hotkey::chain_repr).collect();
        let taken = self.hotkeys.iter().any(|h| chains.contains(&h.chain_repr()));
        if taken && !overwrite {
            return Err(BindError::Taken(block.binding));
        }

        for binding in &mut self.runtime {
            binding.unbound.extend(chains.iter().cloned());
        }
        let count = hotkeys.len();
        install(&mut self.hotkeys, hotkeys);
        info!(binding = %block.binding, count, overwrite, "bound at runtime");
        self.runtime.push(RuntimeBinding {
            block,
            unbound: HashSet::new(),
        });
        self.rebind();
        Ok(count)
    }

    /// Remove every hotkey on a chain `binding` expands to.
    pub fn unbind(&mut self, binding: &str) -> Result<usize, BindError> {
        let result = self.try_unbind(binding);
        self.report(&result, "unbound");
        result
    }

    fn try_unbind(&mut self, binding: &str) -> Result<usize, BindError> {
        let chains = config::chain_reprs(binding, &self.modifiers)?;
        let removed = self.hotkeys.retain(|h| !chains.contains(&h.chain_repr()));
        if removed == 0 {
            return Err(BindError::NotBound(binding.to_string()));
        }
        for runtime in &mut self.runtime {
            runtime.unbound.extend(chains.iter().cloned());
        }
        info!(binding, removed, "unbound at runtime");
        self.rebind();
        Ok(removed)
    }

    /// Stream status lines of the classes in `mask`.
    pub fn subscribe(&mut self, mask: EventMask) -> mpsc::UnboundedReceiver<String> {
        info!(mask = mask.bits(), "subscriber added");
        self.subscribers.add(mask)
    }

    /// Apply the runtime bindings on top of freshly loaded config files.
    pub(super) fn apply_runtime(&mut self) -> Vec<Status> {
        let mut statuses = Vec::new();
        for binding in &self.runtime {
            match binding.hotkeys(&self.modifiers) {
                Ok(hotkeys) => install(&mut self.hotkeys, hotkeys),
                Err(e) => {
                    warn!(binding = %binding.block.binding, error = %e, "runtime binding dropped");
                    statuses.push(Status::Error(format!("{}: {e}", binding.block.binding)));
                }
            }
        }
        statuses
    }

    fn rebind(&mut self) {
        self.chain.reset();
        if self.grabbed
            && let Err(e) = self.grab()
        {
            warn!(error = %e, "regrab after runtime binding failed");
        }
    }

    fn report(&mut self, result: &Result<usize, BindError>, verb: &str) {
        let status = match result {
            Ok(count) => Status::Notify(format!("{verb} {count} hotkeys")),
            Err(e) => Status::Error(e.to_string()),
        };
        self.publish(&[status]);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::display::fake::{self, FakeDisplay};
    use crate::hotkey::KeyEventKind;
    use crate::session::{Bootstrapper, SessionOptions, env};

    const SUPER: u16 = 0x40;

    struct Fixture {
        dir: tempfile::TempDir,
        boot: Bootstrapper<FakeDisplay>,
    }

    impl Fixture {
        fn new(config: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("rhkdrc");
            std::fs::write(&path, config).unwrap();
            let options = SessionOptions {
                config_path: Some(path.to_string_lossy().into_owned()),
                ..SessionOptions::default()
            };
            let env = HashMap::from([(env::LOGIN_SHELL_ENV, "/bin/sh")]);
            let mut boot = Bootstrapper::new();
            boot.init_globals(&options, || Ok(FakeDisplay::default()), &env)
                .unwrap();
            Self { dir, boot }
        }

        fn session(&mut self) -> &mut Session<FakeDisplay> {
            match self.boot.session.as_mut() {
                Some(session) => session,
                None => panic!("session not initialized"),
            }
        }
    }

    fn block(binding: &str, command: &str) -> Block {
        Block {
            binding: binding.into(),
            command: command.into(),
            ..Block::default()
        }
    }

    fn commands(session: &Session<FakeDisplay>) -> Vec<String> {
        session.hotkeys().iter().map(|h| h.command.clone()).collect()
    }

    #[test]
    fn bind_adds_and_grabs() {
        let mut fx = Fixture::new("super + a\n\tone\n");
        let session = fx.session();
        session.grab().unwrap();
        let count = session.bind(block("super + {b,c}", "echo {b,c}"), false).unwrap();
        assert_eq!(count, 2);
        assert_eq!(commands(session), vec!["one", "echo b", "echo c"]);
        let grabs = session.display().grabs.borrow().clone();
        assert!(grabs.contains(&(fake::kc_letter('c'), SUPER)));
    }

    #[test]
    fn bind_refuses_taken_chain_without_overwrite() {
        let mut fx = Fixture::new("super + a\n\tone\n");
        let session = fx.session();
        let err = session.bind(block("super + a", "two"), false).unwrap_err();
        assert!(matches!(err, BindError::Taken(_)));
        assert_eq!(commands(session), vec!["one"]);

        session.bind(block("super + a", "two"), true).unwrap();
        assert_eq!(commands(session), vec!["two"]);
    }

    #[test]
    fn bad_binding_is_an_error() {
        let mut fx = Fixture::new("");
        let err = fx.session().bind(block("super + Retrun", "x"), false).unwrap_err();
        assert!(matches!(err, BindError::Block(BlockError::Chord(_))));
    }

    #[test]
    fn runtime_bindings_survive_reload() {
        let mut fx = Fixture::new("super + a\n\tone\n\nsuper + b\n\tconfig b\n");
        let session = fx.session();
        session.bind(block("super + b", "runtime b"), true).unwrap();
        session.bind(block("super + c", "runtime c"), false).unwrap();
        session.reload_cmd();
        assert_eq!(commands(session), vec!["one", "runtime b", "runtime c"]);
    }

    #[test]
    fn unbind_removes_until_reload() {
        let mut fx = Fixture::new("super + {a,b}\n\t{one,two}\n");
        let session = fx.session();
        session.bind(block("super + {c,d}", "{three,four}"), false).unwrap();

        assert_eq!(session.unbind("super + {a,c}").unwrap(), 2);
        assert_eq!(commands(session), vec!["two", "four"]);
        assert!(matches!(
            session.unbind("super + a"),
            Err(BindError::NotBound(_))
        ));

        // Config hotkeys come back, runtime ones stay unbound.
        session.reload_cmd();
        assert_eq!(commands(session), vec!["one", "two", "four"]);
    }

    #[test]
    fn bound_hotkey_fires() {
        let mut fx = Fixture::new("");
        let out = fx.dir.path().join("out");
        let session = fx.session();
        session
            .bind(block("super + x", &format!("; echo hit > {}", out.display())), false)
            .unwrap();
        session
            .process_key(fake::kc_letter('x'), SUPER, KeyEventKind::Press)
            .unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hit\n");
    }

    #[test]
    fn subscribers_hear_bind_results() {
        let mut fx = Fixture::new("super + a\n\tone\n");
        let session = fx.session();
        let mut events = session.subscribe(EventMask::NOTIFICATIONS | EventMask::ERRORS);
        session.bind(block("super + b", "two"), false).unwrap();
        let _ = session.unbind("super + z");
        assert_eq!(events.try_recv().unwrap(), "Nbound 1 hotkeys");
        assert_eq!(events.try_recv().unwrap(), "X'super + z' is not bound");
    }
}
