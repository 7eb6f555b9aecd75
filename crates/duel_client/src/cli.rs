//! Command-line interface for the duel client.

use clap::{Parser, Subcommand};
use duel_core::{Coord, Intent, Role};
use std::str::FromStr;
use std::path::PathBuf;

/// Capture Duel - two-player board game client with relay synchronization
#[derive(Parser, Debug)]
#[command(name = "duel")]
#[command(about = "Play capture duel matches over a relay or on one device", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Log file (tracing output never goes to the terminal)
    #[arg(long, global = true, default_value = "duel.log")]
    pub log_file: PathBuf,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join a match on the relay
    Relay {
        /// Path to client config (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Relay websocket URL, overrides config and environment
        #[arg(long)]
        relay_url: Option<String>,

        /// Match to join
        #[arg(long)]
        match_id: Option<String>,

        /// Seat to play (player1 or player2)
        #[arg(long)]
        role: Option<Role>,
    },

    /// Play both seats on this device, no relay
    Hotseat {
        /// Path to client config (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A match intent.
    Intent(Intent),
    /// Redraw the board.
    Board,
    /// Leave the client.
    Quit,
}

/// Unparseable prompt line.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("Unrecognized input '{}': {}", line, reason)]
pub struct InputError {
    /// The line as typed.
    pub line: String,
    /// What was wrong with it.
    pub reason: String,
}

impl FromStr for Input {
    type Err = InputError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| InputError {
            line: line.to_string(),
            reason: reason.to_string(),
        };
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or_else(|| fail("empty line"))?;
        let square = |words: &mut std::str::SplitWhitespace<'_>| -> Result<Coord, InputError> {
            let raw = words.next().ok_or_else(|| fail("expected a square such as E2"))?;
            raw.parse()
                .map_err(|e: duel_core::CoordError| fail(&e.to_string()))
        };
        let input = match verb.to_ascii_lowercase().as_str() {
            "select" | "s" => Input::Intent(Intent::Select {
                at: square(&mut words)?,
            }),
            "move" | "m" | "commit" => Input::Intent(Intent::Commit {
                to: square(&mut words)?,
            }),
            "cancel" | "c" => Input::Intent(Intent::Cancel),
            "resign" => Input::Intent(Intent::Resign),
            "board" | "b" => Input::Board,
            "quit" | "q" | "exit" => Input::Quit,
            _ => return Err(fail("unknown command")),
        };
        if words.next().is_some() {
            return Err(fail("trailing words"));
        }
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_intents() {
        assert_eq!(
            "select e2".parse::<Input>().unwrap(),
            Input::Intent(Intent::Select {
                at: "E2".parse().unwrap()
            })
        );
        assert_eq!(
            "m B4".parse::<Input>().unwrap(),
            Input::Intent(Intent::Commit {
                to: "B4".parse().unwrap()
            })
        );
        assert_eq!("resign".parse::<Input>().unwrap(), Input::Intent(Intent::Resign));
        assert_eq!("q".parse::<Input>().unwrap(), Input::Quit);
    }

    #[test]
    fn test_rejects_bad_lines() {
        assert!("".parse::<Input>().is_err());
        assert!("move".parse::<Input>().is_err());
        assert!("dance E2".parse::<Input>().is_err());
        assert!("cancel now".parse::<Input>().is_err());
    }

    #[test]
    fn test_cli_parses_relay_flags() {
        let cli = Cli::parse_from([
            "duel",
            "relay",
            "--relay-url",
            "ws://localhost:8080/ws",
            "--role",
            "player2",
        ]);
        match cli.command {
            Command::Relay { relay_url, role, .. } => {
                assert_eq!(relay_url.as_deref(), Some("ws://localhost:8080/ws"));
                assert_eq!(role, Some(Role::Player2));
            }
            other => panic!("Unexpected command {:?}", other),
        }
    }
}
