use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::session::{DEFAULT_ABORT_KEYSYM, SessionOptions};

#[derive(Parser, Debug)]
#[command(name = "rhkd", version, about = "Simple X hotkey daemon")]
pub struct Cli {
    /// Read the main configuration from the given file
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Timeout in seconds for the recording of chord chains (0 disables it)
    #[arg(short = 't', long, default_value_t = 3)]
    pub timeout: u64,

    /// Redirect the commands output to the given file
    #[arg(short = 'r', long = "redir-file")]
    pub redir_file: Option<PathBuf>,

    /// Output status information to the given FIFO
    #[arg(short = 's', long = "status-fifo")]
    pub status_fifo: Option<PathBuf>,

    /// Name of the keysym used for aborting chord chains
    #[arg(short = 'a', long = "abort-keysym", default_value = DEFAULT_ABORT_KEYSYM)]
    pub abort_keysym: String,

    /// Handle the next COUNT mapping notify events (-1 for all of them)
    #[arg(
        short = 'm',
        long = "mapping-count",
        default_value_t = 0,
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i64).range(-1..)
    )]
    pub mapping_count: i64,

    /// Additional configuration files, loaded after the main one
    pub extra_configs: Vec<PathBuf>,
}

impl Cli {
    pub fn into_options(self) -> SessionOptions {
        SessionOptions {
            config_path: self.config,
            extra_configs: self.extra_configs,
            timeout: Duration::from_secs(self.timeout),
            redirect: self.redir_file,
            status_fifo: self.status_fifo,
            abort_keysym: self.abort_keysym,
            mapping_count: self.mapping_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = Cli::try_parse_from(["rhkd"]).unwrap().into_options();
        assert_eq!(options.config_path, None);
        assert_eq!(options.timeout, Duration::from_secs(3));
        assert_eq!(options.abort_keysym, "Escape");
        assert_eq!(options.mapping_count, 0);
        assert!(options.extra_configs.is_empty());
        assert!(options.redirect.is_none() && options.status_fifo.is_none());
    }

    #[test]
    fn all_options() {
        let options = Cli::try_parse_from([
            "rhkd", "-c", "/tmp/rc", "-t", "5", "-r", "/tmp/log", "-s", "/tmp/fifo", "-a",
            "BackSpace", "-m", "-1", "extra1", "extra2",
        ])
        .unwrap()
        .into_options();
        assert_eq!(options.config_path.as_deref(), Some("/tmp/rc"));
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.redirect, Some(PathBuf::from("/tmp/log")));
        assert_eq!(options.status_fifo, Some(PathBuf::from("/tmp/fifo")));
        assert_eq!(options.abort_keysym, "BackSpace");
        assert_eq!(options.mapping_count, -1);
        assert_eq!(
            options.extra_configs,
            vec![PathBuf::from("extra1"), PathBuf::from("extra2")]
        );
    }

    #[test]
    fn mapping_count_below_minus_one_is_rejected() {
        assert!(Cli::try_parse_from(["rhkd", "-m", "-2"]).is_err());
    }
}
