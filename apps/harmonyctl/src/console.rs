//! Line-oriented console on stdin.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use harmonyctl_activity::{ChangeResult, HubSession};
use harmonyctl_hub_connection::Connector;
use harmonyctl_protocol::ActivityId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    On(ActivityId),
    Off,
    Refresh,
    Help,
    Quit,
    Unknown(String),
}

impl ConsoleCommand {
    /// Parses one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = words.next()?;
        let arg = words.next();

        Some(match (command.to_ascii_lowercase().as_str(), arg) {
            ("list" | "ls", _) => Self::List,
            ("on", Some(id)) => Self::On(id.into()),
            ("off", _) => Self::Off,
            ("refresh", _) => Self::Refresh,
            ("help" | "?", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,
            _ => Self::Unknown(line.trim().to_string()),
        })
    }
}

const HELP: &str = "commands: list | on <id> | off | refresh | help | quit";

/// Reads commands until `quit`, end of input or Ctrl-C.
pub async fn run<K: Connector>(session: &HubSession<K>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            line = lines.next_line() => line.context("failed to read stdin")?,
        };
        let Some(line) = line else {
            break;
        };

        match ConsoleCommand::parse(&line) {
            None => {}
            Some(ConsoleCommand::Quit) => break,
            Some(ConsoleCommand::Help) => println!("{HELP}"),
            Some(ConsoleCommand::List) => print_records(session),
            Some(ConsoleCommand::Refresh) => {
                if !session.refresh() {
                    println!("refresh already queued");
                }
            }
            Some(ConsoleCommand::On(id)) => {
                if session.records().iter().all(|r| r.id != id) {
                    println!("unknown activity {id}");
                    continue;
                }
                report(session.set_power(id, true).await);
            }
            Some(ConsoleCommand::Off) => report(session.request_activity(None).await),
            Some(ConsoleCommand::Unknown(input)) => println!("unknown command: {input}\n{HELP}"),
        }
    }
    Ok(())
}

pub fn print_records<K: Connector>(session: &HubSession<K>) {
    for record in session.records() {
        let marker = if record.is_on { "*" } else { " " };
        println!("{marker} {:>6}  {}", record.id, record.label);
    }
}

fn report(result: ChangeResult) {
    match result {
        Ok(id) if id.is_off() => println!("hub is off"),
        Ok(id) => println!("activity {id} is on"),
        Err(e) => {
            warn!(error = %e, "activity change failed");
            println!("failed: {e}");
        }
    }
}
