//! Status lines: sxhkd-compatible ones on a named pipe, and all of them to
//! socket subscribers that asked for their class.

use std::fs::File;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::stat::{Mode, SFlag};
use tokio::sync::mpsc;

/// Classes of status lines a subscriber can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMask(u8);

impl EventMask {
    pub const NOTIFICATIONS: Self = Self(1);
    pub const RELOAD: Self = Self(1 << 1);
    pub const ERRORS: Self = Self(1 << 2);
    pub const TIMEOUT: Self = Self(1 << 3);
    pub const CHAIN: Self = Self(1 << 4);
    pub const HOTKEY: Self = Self(1 << 5);
    pub const COMMAND: Self = Self(1 << 6);
    pub const ALL: Self = Self(0x7f);

    /// Unknown bits are dropped.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One status notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Chain progress, e.g. `super + w ; a`.
    Hotkey(String),
    Command(String),
    BeginChain,
    EndChain,
    Timeout,
    /// A chain that can complete the current one, with its label.
    Continuation { keys: String, label: String },
    Reload,
    Notify(String),
    Error(String),
}

impl Status {
    /// Wire form, without the trailing newline.
    pub fn line(&self) -> String {
        match self {
            Status::Hotkey(progress) => format!("H{progress}"),
            Status::Command(command) => format!("C{command}"),
            Status::BeginChain => "BBegin chain".to_string(),
            Status::EndChain => "EEnd chain".to_string(),
            Status::Timeout => "TTimeout reached".to_string(),
            Status::Continuation { keys, label } => format!("K{keys}\t{label}"),
            Status::Reload => "RConfig reloaded".to_string(),
            Status::Notify(message) => format!("N{message}"),
            Status::Error(message) => format!("X{message}"),
        }
    }

    pub fn mask(&self) -> EventMask {
        match self {
            Status::Hotkey(_) | Status::Continuation { .. } => EventMask::HOTKEY,
            Status::Command(_) => EventMask::COMMAND,
            Status::BeginChain | Status::EndChain => EventMask::CHAIN,
            Status::Timeout => EventMask::TIMEOUT,
            Status::Reload => EventMask::RELOAD,
            Status::Notify(_) => EventMask::NOTIFICATIONS,
            Status::Error(_) => EventMask::ERRORS,
        }
    }

    /// Whether the line belongs on the sxhkd-compatible fifo.
    pub fn on_fifo(&self) -> bool {
        matches!(
            self,
            Status::Hotkey(_)
                | Status::Command(_)
                | Status::BeginChain
                | Status::EndChain
                | Status::Timeout
        )
    }
}

/// Socket clients receiving status lines.
#[derive(Debug, Default)]
pub struct Subscribers {
    subscribers: Vec<(EventMask, mpsc::UnboundedSender<String>)>,
}

impl Subscribers {
    /// Register a subscriber for the classes in `mask`.
    pub fn add(&mut self, mask: EventMask) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push((mask, tx));
        rx
    }

    /// Deliver `status` to interested subscribers, forgetting the ones that
    /// went away.
    pub fn send(&mut self, status: &Status) {
        let line = status.line();
        let class = status.mask();
        self.subscribers
            .retain(|(mask, tx)| !mask.contains(class) || tx.send(line.clone()).is_ok());
    }

    pub fn count(&self) -> usize {
        self.subscribers.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("{0} exists but is not a fifo")]
    NotFifo(PathBuf),
    #[error("can't stat {path}: {source}")]
    Stat { path: PathBuf, source: Errno },
    #[error("can't create fifo {path}: {source}")]
    Create { path: PathBuf, source: Errno },
    #[error("can't open fifo {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("fifo write failed: {0}")]
    Write(#[from] std::io::Error),
}

/// An open status fifo.
#[derive(Debug)]
pub struct StatusFifo {
    path: PathBuf,
    file: File,
}

impl StatusFifo {
    /// Open `path`, creating the fifo if it does not exist.
    pub fn open(path: &Path) -> Result<Self, StatusError> {
        match nix::sys::stat::stat(path) {
            Ok(st) => {
                let kind = SFlag::from_bits_truncate(st.st_mode & SFlag::S_IFMT.bits());
                if kind != SFlag::S_IFIFO {
                    return Err(StatusError::NotFifo(path.to_path_buf()));
                }
            }
            Err(Errno::ENOENT) => {
                nix::unistd::mkfifo(path, Mode::from_bits_truncate(0o644)).map_err(|source| {
                    StatusError::Create {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
            }
            Err(source) => {
                return Err(StatusError::Stat {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }

        // Read access keeps the open from failing when nobody listens.
        let file = File::options()
            .read(true)
            .write(true)
            .custom_flags(nix::libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| StatusError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `status` if it is a fifo line; others are ignored.
    pub fn write(&mut self, status: &Status) -> Result<(), StatusError> {
        if status.on_fifo() {
            writeln!(self.file, "{}", status.line())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader};

    use super::*;

    #[test]
    fn line_format() {
        assert_eq!(Status::Hotkey("super + w ; a".into()).line(), "Hsuper + w ; a");
        assert_eq!(Status::Command("urxvt".into()).line(), "Curxvt");
        assert_eq!(Status::BeginChain.line(), "BBegin chain");
        assert_eq!(Status::EndChain.line(), "EEnd chain");
        assert_eq!(Status::Timeout.line(), "TTimeout reached");
        let next = Status::Continuation {
            keys: "a".into(),
            label: "Terminal".into(),
        };
        assert_eq!(next.line(), "Ka\tTerminal");
        assert_eq!(Status::Error("bad".into()).line(), "Xbad");
    }

    #[test]
    fn masks_drop_unknown_bits() {
        let mask = EventMask::from_bits(0xff);
        assert_eq!(mask, EventMask::ALL);
        assert!(mask.contains(EventMask::COMMAND | EventMask::RELOAD));
        assert!(EventMask::from_bits(0x80).is_empty());
        assert_eq!((EventMask::CHAIN | EventMask::TIMEOUT).bits(), 24);
    }

    #[test]
    fn subscribers_get_their_classes() {
        let mut subs = Subscribers::default();
        let mut chain = subs.add(EventMask::CHAIN);
        let mut all = subs.add(EventMask::ALL);
        subs.send(&Status::BeginChain);
        subs.send(&Status::Command("urxvt".into()));

        assert_eq!(chain.try_recv().unwrap(), "BBegin chain");
        assert!(chain.try_recv().is_err());
        assert_eq!(all.try_recv().unwrap(), "BBegin chain");
        assert_eq!(all.try_recv().unwrap(), "Curxvt");
    }

    #[test]
    fn closed_subscribers_are_dropped() {
        let mut subs = Subscribers::default();
        let gone = subs.add(EventMask::ALL);
        let _kept = subs.add(EventMask::ERRORS);
        drop(gone);
        subs.send(&Status::Reload);
        assert_eq!(subs.count(), 1);
        subs.send(&Status::Error("x".into()));
        assert_eq!(subs.count(), 1);
    }

    #[test]
    fn creates_fifo_and_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status");
        let mut fifo = StatusFifo::open(&path).unwrap();
        let st = nix::sys::stat::stat(&path).unwrap();
        assert_eq!(
            SFlag::from_bits_truncate(st.st_mode & SFlag::S_IFMT.bits()),
            SFlag::S_IFIFO
        );

        let reader = File::options()
            .read(true)
            .custom_flags(nix::libc::O_NONBLOCK)
            .open(&path)
            .unwrap();
        fifo.write(&Status::BeginChain).unwrap();
        fifo.write(&Status::Hotkey("super + a".into())).unwrap();

        // Both ends share the pipe buffer, so the lines are already there.
        let mut lines = BufReader::new(reader).lines();
        assert_eq!(lines.next().unwrap().unwrap(), "BBegin chain");
        assert_eq!(lines.next().unwrap().unwrap(), "Hsuper + a");
    }

    #[test]
    fn reopens_existing_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status");
        drop(StatusFifo::open(&path).unwrap());
        let fifo = StatusFifo::open(&path).unwrap();
        assert_eq!(fifo.path(), path);
    }

    #[test]
    fn refuses_regular_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            StatusFifo::open(file.path()),
            Err(StatusError::NotFifo(_))
        ));
    }
}
