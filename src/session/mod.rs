//! Session bootstrapper.
//!
//! [`Bootstrapper::init_globals`] builds a [`Session`] on first use and
//! reloads it on every later call, so the display connection is opened
//! exactly once. A `Session` only exists fully initialized.

mod bindings;
pub mod env;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::chain::{ChainTracker, TimerAction};
use crate::config::{self, ConfigError};
use crate::display::{AllowMode, Display, DisplayError};
use crate::executor::Executor;
use crate::hotkey::{Chord, HotkeyList, KeyEventKind, KeyInput, MOD_ANY, keysym};
use crate::keymap::{Keymap, LockMasks, StandardModifiers};
use crate::status::{Status, StatusFifo, Subscribers};

use self::bindings::RuntimeBinding;
pub use self::bindings::BindError;
use self::env::Environment;

/// Default chain timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default abort key.
pub const DEFAULT_ABORT_KEYSYM: &str = "Escape";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Display(#[from] DisplayError),
    #[error("the '{0}' environment variable is not defined")]
    MissingShell(&'static str),
    #[error("neither XDG_CONFIG_HOME nor HOME is defined")]
    NoConfigHome,
    #[error("unknown abort keysym '{0}'")]
    AbortKeysym(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Startup options, usually from the command line.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Explicit primary config path; empty or absent means the default.
    pub config_path: Option<String>,
    /// Loaded after the primary config, in this order.
    pub extra_configs: Vec<PathBuf>,
    pub timeout: Duration,
    /// File receiving the output of every command.
    pub redirect: Option<PathBuf>,
    pub status_fifo: Option<PathBuf>,
    pub abort_keysym: String,
    /// Keyboard mapping changes to follow; -1 follows all of them.
    pub mapping_count: i64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            extra_configs: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            redirect: None,
            status_fifo: None,
            abort_keysym: DEFAULT_ABORT_KEYSYM.to_string(),
            mapping_count: 0,
        }
    }
}

/// What [`setup`] acquires.
pub struct Setup<D> {
    pub display: D,
    pub shell: String,
    pub keymap: Keymap,
    pub hotkeys: HotkeyList,
    pub pid: u32,
}

/// Open the display, resolve the shell and load the key-symbol table.
pub fn setup<D: Display>(
    connect: impl FnOnce() -> Result<D, DisplayError>,
    env: &impl Environment,
) -> Result<Setup<D>, SessionError> {
    let display = connect()?;
    let shell = env::resolve_shell(env)?;
    let keymap = Keymap::load(&display)?;
    Ok(Setup {
        display,
        shell,
        keymap,
        hotkeys: HotkeyList::new(),
        pid: std::process::id(),
    })
}

/// Holds the session once it has been initialized.
pub struct Bootstrapper<D: Display> {
    session: Option<Session<D>>,
}

impl<D: Display> Default for Bootstrapper<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Display> Bootstrapper<D> {
    pub fn new() -> Self {
        Self { session: None }
    }

    /// Initialize the session, or reload it if it already exists.
    ///
    /// `connect` is only called on the first initialization.
    pub fn init_globals(
        &mut self,
        options: &SessionOptions,
        connect: impl FnOnce() -> Result<D, DisplayError>,
        env: &impl Environment,
    ) -> Result<&mut Session<D>, SessionError> {
        let session = match self.session.take() {
            Some(mut session) => {
                session.reload_cmd();
                session
            }
            None => Session::init(options, connect, env)?,
        };
        Ok(self.session.insert(session))
    }
}

/// Fully initialized session state.
pub struct Session<D: Display> {
    display: D,
    keymap: Keymap,
    modifiers: StandardModifiers,
    locks: LockMasks,
    abort_keysym: String,
    abort: Chord,
    hotkeys: HotkeyList,
    chain: ChainTracker,
    config_file: PathBuf,
    extra_configs: Vec<PathBuf>,
    shell: String,
    timeout: Duration,
    executor: Executor,
    status: Option<StatusFifo>,
    subscribers: Subscribers,
    runtime: Vec<RuntimeBinding>,
    mapping_count: i64,
    pid: u32,
    running: bool,
    grabbed: bool,
}

impl<D: Display> Session<D> {
    fn init(
        options: &SessionOptions,
        connect: impl FnOnce() -> Result<D, DisplayError>,
        env: &impl Environment,
    ) -> Result<Self, SessionError> {
        let config_file = env::resolve_config_path(options.config_path.as_deref(), env)?;
        let Setup {
            display,
            shell,
            keymap,
            hotkeys,
            pid,
        } = setup(connect, env)?;

        let modifiers = keymap.standard_modifiers();
        let locks = keymap.lock_masks();
        let abort = abort_chord(&options.abort_keysym)?;
        debug!(?modifiers, ?locks, abort = %abort, "keyboard state derived");

        let redirect = options.redirect.as_deref().and_then(Executor::open_redirect);
        let status = options.status_fifo.as_deref().and_then(open_status);
        let executor = Executor::new(shell.clone(), redirect).with_env(env::PID_ENV, pid.to_string());

        let mut session = Self {
            display,
            keymap,
            modifiers,
            locks,
            abort_keysym: options.abort_keysym.clone(),
            abort,
            hotkeys,
            chain: ChainTracker::new(),
            config_file,
            extra_configs: options.extra_configs.clone(),
            shell,
            timeout: options.timeout,
            executor,
            status,
            subscribers: Subscribers::default(),
            runtime: Vec::new(),
            mapping_count: options.mapping_count,
            pid,
            running: false,
            grabbed: false,
        };

        config::load_config(&session.config_file, &session.modifiers, &mut session.hotkeys)?;
        for path in &session.extra_configs {
            load_logged(path, &session.modifiers, &mut session.hotkeys);
        }
        if session.timeout.is_zero() {
            info!("chain timeout disabled");
        }

        if session.hotkeys.is_empty() {
            warn!(config = %session.config_file.display(), "no hotkeys loaded");
        }
        session.running = true;
        session.display.flush()?;
        info!(
            config = %session.config_file.display(),
            hotkeys = session.hotkeys.len(),
            "session initialized"
        );
        Ok(session)
    }

    /// Drop every hotkey and forget any chain in progress.
    pub fn cleanup(&mut self) {
        info!("cleanup");
        self.hotkeys.clear();
        self.chain.reset();
    }

    /// Reload the primary config, then the extra configs in order.
    ///
    /// Load failures are logged and reported to subscribers; the session
    /// keeps whatever loaded. Runtime bindings are applied on top. Keys are
    /// regrabbed if they were grabbed.
    pub fn reload_cmd(&mut self) {
        info!("reload");
        self.cleanup();
        let mut statuses = Vec::new();
        for path in std::iter::once(&self.config_file).chain(&self.extra_configs) {
            statuses.extend(load_logged(path, &self.modifiers, &mut self.hotkeys));
        }
        statuses.extend(self.apply_runtime());
        statuses.push(Status::Reload);
        self.publish(&statuses);
        if self.grabbed
            && let Err(e) = self.grab()
        {
            warn!(error = %e, "regrab after reload failed");
        }
    }

    /// Grab the abort chord and every chord of every hotkey.
    pub fn grab(&mut self) -> Result<(), DisplayError> {
        self.display.ungrab_all()?;
        let combinations = self.locks.combinations();
        let mut seen = HashSet::new();

        let chords = std::iter::once(&self.abort)
            .chain(self.hotkeys.iter().flat_map(|h| h.chain.iter()));
        for chord in chords {
            let keycodes = self.keymap.keycodes(chord.keysym);
            if keycodes.is_empty() {
                warn!(chord = %chord, "no keycode for keysym, not grabbed");
                continue;
            }
            let masks: Vec<u16> = if chord.modfield == MOD_ANY {
                vec![MOD_ANY]
            } else {
                combinations.iter().map(|l| chord.modfield | l).collect()
            };
            for &keycode in keycodes {
                for &mask in &masks {
                    if !seen.insert((keycode, mask)) {
                        continue;
                    }
                    if !self.display.grab_key(keycode, mask)? {
                        warn!(
                            chord = %chord,
                            keycode,
                            modifiers = format_args!("0x{mask:04x}"),
                            "grab failed, key may be held by another client"
                        );
                    }
                }
            }
        }

        self.display.flush()?;
        self.grabbed = true;
        debug!(grabs = seen.len(), "keys grabbed");
        Ok(())
    }

    pub fn ungrab(&mut self) -> Result<(), DisplayError> {
        self.display.ungrab_all()?;
        self.display.flush()?;
        self.grabbed = false;
        Ok(())
    }

    pub fn toggle_grab(&mut self) -> Result<(), DisplayError> {
        if self.grabbed {
            self.ungrab()
        } else {
            self.grab()
        }
    }

    /// Handle a grabbed key event and run whatever it fires.
    ///
    /// The keyboard is frozen until this releases it, replaying the event
    /// to the focused client when nothing consumed it.
    pub fn process_key(
        &mut self,
        keycode: u8,
        state: u16,
        event: KeyEventKind,
    ) -> Result<TimerAction, DisplayError> {
        let Some(keysym) = self.keymap.keysym(keycode) else {
            self.display.allow_events(AllowMode::Replay)?;
            self.display.flush()?;
            return Ok(TimerAction::Keep);
        };
        let input = KeyInput {
            keysym,
            modfield: self.locks.clean(state),
            event,
        };

        let outcome = self.chain.handle(&mut self.hotkeys, &self.abort, &input);
        self.display.allow_events(if outcome.replay {
            AllowMode::Replay
        } else {
            AllowMode::Sync
        })?;
        self.display.flush()?;

        self.publish(&outcome.statuses);
        let timer = match outcome.timer {
            TimerAction::Arm if self.timeout.is_zero() => TimerAction::Cancel,
            timer => timer,
        };
        for index in outcome.fired {
            let Some(hotkey) = self.hotkeys.get(index) else {
                continue;
            };
            info!(hotkey = %hotkey.chain_repr(), command = %hotkey.command, "run");
            if let Err(e) = self.executor.run(&hotkey.command, hotkey.sync) {
                warn!(error = %e, "command failed");
            }
        }
        Ok(timer)
    }

    /// The chain timeout elapsed.
    pub fn chain_timeout(&mut self) {
        let statuses = self.chain.timeout();
        if !statuses.is_empty() {
            debug!("chain timed out");
        }
        self.publish(&statuses);
    }

    /// Follow a keyboard mapping change while the mapping budget lasts.
    ///
    /// Returns whether the session was rebuilt.
    pub fn refresh_mapping(&mut self) -> Result<bool, SessionError> {
        if self.mapping_count == 0 {
            debug!("mapping change ignored");
            return Ok(false);
        }
        self.keymap = Keymap::load(&self.display)?;
        self.modifiers = self.keymap.standard_modifiers();
        self.locks = self.keymap.lock_masks();
        self.abort = abort_chord(&self.abort_keysym)?;
        self.reload_cmd();
        if self.mapping_count > 0 {
            self.mapping_count -= 1;
        }
        info!(remaining = self.mapping_count, "keyboard mapping refreshed");
        Ok(true)
    }

    fn publish(&mut self, statuses: &[Status]) {
        for status in statuses {
            debug!(status = %status.line(), "status");
            if let Some(fifo) = self.status.as_mut()
                && let Err(e) = fifo.write(status)
            {
                debug!(path = %fifo.path().display(), error = %e, "status write failed");
            }
            self.subscribers.send(status);
        }
    }

    pub fn hotkeys(&self) -> &HotkeyList {
        &self.hotkeys
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn extra_configs(&self) -> &[PathBuf] {
        &self.extra_configs
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_grabbed(&self) -> bool {
        self.grabbed
    }

    pub fn is_chained(&self) -> bool {
        self.chain.is_chained()
    }

    pub fn is_locked(&self) -> bool {
        self.chain.is_locked()
    }

    pub fn lock_masks(&self) -> LockMasks {
        self.locks
    }

    pub fn abort_chord(&self) -> &Chord {
        &self.abort
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn display(&self) -> &D {
        &self.display
    }
}

fn abort_chord(name: &str) -> Result<Chord, SessionError> {
    let sym = keysym::lookup(name).ok_or_else(|| SessionError::AbortKeysym(name.to_string()))?;
    Ok(Chord::new(name, sym, 0))
}

fn open_status(path: &Path) -> Option<StatusFifo> {
    match StatusFifo::open(path) {
        Ok(fifo) => Some(fifo),
        Err(e) => {
            warn!(error = %e, "status fifo disabled");
            None
        }
    }
}

/// Load `path`, turning its problems into error statuses.
fn load_logged(path: &Path, modifiers: &StandardModifiers, hotkeys: &mut HotkeyList) -> Vec<Status> {
    match config::load_config(path, modifiers, hotkeys) {
        Ok(report) => report
            .errors
            .iter()
            .map(|(line, e)| Status::Error(format!("{}:{line}: {e}", path.display())))
            .collect(),
        Err(e) => {
            warn!(error = %e, "config not loaded");
            vec![Status::Error(e.to_string())]
        }
    }
}
