//! Terminal rendering and stdin commands

use thiserror::Error;
use watchsync_core::server::RosterEntry;
use watchsync_core::{
    ConnectionStatus, MediaPlayer, SessionError, SessionObserver, SimulatedPlayer,
};

pub const HELP: &str = "commands: play | pause | seek <seconds> | status | help | quit";

/// A line typed by the user
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsoleCommand {
    Play,
    Pause,
    Seek(f64),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConsoleError {
    #[error("unknown command '{0}', type 'help' for a list")]
    Unknown(String),

    #[error("seek needs a position in seconds")]
    MissingPosition,

    #[error("invalid position '{0}'")]
    InvalidPosition(String),
}

/// Parse one input line; blank lines yield `None`
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "play" | "p" => ConsoleCommand::Play,
        "pause" | "s" => ConsoleCommand::Pause,
        "seek" => {
            let raw = words.next().ok_or(ConsoleError::MissingPosition)?;
            let position: f64 = raw
                .parse()
                .map_err(|_| ConsoleError::InvalidPosition(raw.to_string()))?;
            if !position.is_finite() || position < 0.0 {
                return Err(ConsoleError::InvalidPosition(raw.to_string()));
            }
            ConsoleCommand::Seek(position)
        }
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => return Err(ConsoleError::Unknown(other.to_string())),
    };

    Ok(Some(command))
}

/// Act on a command as a user gesture on the player. Returns false on quit.
pub fn apply(command: ConsoleCommand, player: &mut SimulatedPlayer) -> bool {
    match command {
        ConsoleCommand::Play => player.play(),
        ConsoleCommand::Pause => player.pause(),
        ConsoleCommand::Seek(position) => player.set_current_time(position),
        ConsoleCommand::Status => println!("{}", describe(player)),
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => return false,
    }
    true
}

fn describe(player: &SimulatedPlayer) -> String {
    let state = if player.is_ended() {
        "ended"
    } else if player.is_paused() {
        "paused"
    } else {
        "playing"
    };
    format!(
        "{} at {:.1}s / {:.1}s",
        state,
        player.current_time(),
        player.duration()
    )
}

/// Prints connection changes and the roster to stdout
#[derive(Debug, Default)]
pub struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn on_connection_status(&self, status: ConnectionStatus) {
        println!("Connection status: {}", status);
    }

    fn on_roster(&self, clients: &[RosterEntry]) {
        println!("{}", render_roster(clients, chrono::Local::now()));
    }

    fn on_error(&self, message: String) {
        eprintln!("! {}", message);
    }
}

fn render_roster<Tz>(clients: &[RosterEntry], at: chrono::DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut out = format!("-- users @ {} --", at.format("%H:%M:%S"));
    let width = clients.iter().map(|c| c.username.len()).max().unwrap_or(0);
    for client in clients {
        let line = format!("\n  {:<width$}  {}", client.username, client.status);
        out.push_str(&line);
    }
    out
}

/// Wording for a failed join
pub fn join_failure(server: &str, error: &SessionError) -> String {
    if error.is_transport() {
        format!("Could not reach the session server at {}: {}", server, error)
    } else {
        format!("Could not join the session: {}", error)
    }
}
