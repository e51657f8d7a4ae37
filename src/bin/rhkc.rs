//! `rhkc`: bind, unbind and watch hotkeys of a running rhkd.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rhkd::ipc::client::{self, ClientError};
use rhkd::ipc::protocol::{BindRequest, Request, Response};
use rhkd::ipc::socket_path;
use rhkd::session::env::ProcessEnv;
use rhkd::status::EventMask;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rhkc", version, about = "Control a running rhkd")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Don't print the daemon's answer (no effect on subscribe)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print status lines of the given classes (all of them by default)
    Subscribe(Subscription),
    /// Add a binding
    Bind(Bind),
    /// Remove every hotkey on the chains a binding expands to
    Unbind {
        /// Hotkey text, in config file syntax
        hotkey: String,
    },
}

#[derive(Args, Debug)]
struct Subscription {
    events: Vec<Event>,

    /// Reconnect when the daemon goes away
    #[arg(short, long = "with-reconnect")]
    reconnect: bool,
}

#[derive(Args, Debug)]
struct Bind {
    /// Replace hotkeys already bound to the same chains
    #[arg(short, long)]
    overwrite: bool,

    /// Hotkey text, in config file syntax
    hotkey: String,

    /// Command text, in config file syntax
    #[arg(short, long)]
    command: String,

    #[arg(short, long)]
    title: Option<String>,

    /// Sequences expand alongside the hotkey's
    #[arg(short, long)]
    description: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Event {
    Notifications,
    Reload,
    Errors,
    Timeout,
    Chain,
    Hotkey,
    Command,
    All,
}

impl From<Event> for EventMask {
    fn from(event: Event) -> Self {
        match event {
            Event::Notifications => EventMask::NOTIFICATIONS,
            Event::Reload => EventMask::RELOAD,
            Event::Errors => EventMask::ERRORS,
            Event::Timeout => EventMask::TIMEOUT,
            Event::Chain => EventMask::CHAIN,
            Event::Hotkey => EventMask::HOTKEY,
            Event::Command => EventMask::COMMAND,
            Event::All => EventMask::ALL,
        }
    }
}

async fn subscribe(path: &Path, sub: Subscription) -> Result<(), ClientError> {
    let mask = sub
        .events
        .into_iter()
        .map(EventMask::from)
        .reduce(|a, b| a | b)
        .unwrap_or(EventMask::ALL);
    loop {
        let mut lines = match client::subscribe(path, mask).await {
            Ok(lines) => lines,
            Err(e) if sub.reconnect => {
                tracing::debug!(error = %e, "subscribe failed, retrying");
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }
            Err(e) => return Err(e),
        };
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => println!("{line}"),
                Ok(None) => break,
                Err(e) if sub.reconnect => {
                    eprintln!("rhkc: {e}");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        if !sub.reconnect {
            return Ok(());
        }
        eprintln!("rhkc: connection lost, reconnecting");
    }
}

async fn run(cli: Cli) -> Result<bool, ClientError> {
    let path = socket_path(&ProcessEnv);
    let request = match cli.command {
        Command::Subscribe(sub) => return subscribe(&path, sub).await.map(|()| true),
        Command::Bind(bind) => Request::Bind(BindRequest {
            title: bind.title.unwrap_or_default(),
            description: bind.description.unwrap_or_default(),
            hotkey: bind.hotkey,
            command: bind.command,
            overwrite: bind.overwrite,
        }),
        Command::Unbind { hotkey } => Request::Unbind { hotkey },
    };
    let response = client::request(&path, request).await?;
    if !cli.quiet {
        match &response {
            Response::Ok(message) => println!("{message}"),
            Response::Error(message) => eprintln!("rhkc: {message}"),
        }
    }
    Ok(matches!(response, Response::Ok(_)))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("rhkc: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_arguments() {
        let cli = Cli::try_parse_from([
            "rhkc", "bind", "-o", "super + {a,b}", "-c", "echo {a,b}", "-t", "Echo",
        ])
        .unwrap();
        let Command::Bind(bind) = cli.command else {
            panic!("expected bind");
        };
        assert!(bind.overwrite);
        assert_eq!(bind.hotkey, "super + {a,b}");
        assert_eq!(bind.command, "echo {a,b}");
        assert_eq!(bind.title.as_deref(), Some("Echo"));
        assert_eq!(bind.description, None);
    }

    #[test]
    fn subscribe_events() {
        let cli = Cli::try_parse_from(["rhkc", "subscribe", "chain", "timeout", "-r"]).unwrap();
        let Command::Subscribe(sub) = cli.command else {
            panic!("expected subscribe");
        };
        assert!(sub.reconnect);
        let mask = sub.events.into_iter().map(EventMask::from).reduce(|a, b| a | b);
        assert_eq!(mask.map(EventMask::bits), Some(24));
    }
}
