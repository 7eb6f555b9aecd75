//! Duel - command-line client
//!
//! Plays one match either against a peer through the relay or with both
//! seats on this device. Moves are typed at the prompt; tracing goes to a
//! log file so it never interleaves with the board.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, Input};
use duel_client::{
    AppEvent, ClientConfig, Connector, EventBus, Identity, LocalHub, MatchDriver, RelayConnector,
    Subscription, SyncSession,
};
use duel_core::{GridOracle, Intent, MatchState, Role, TurnPhase};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli.log_file)?;

    match cli.command {
        Command::Relay {
            config,
            relay_url,
            match_id,
            role,
        } => run_relay(config, relay_url, match_id, role).await,
        Command::Hotseat { config } => run_hotseat(config).await,
    }
}

fn init_logging(path: &Path) -> Result<()> {
    let log_file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .try_init();
    Ok(())
}

/// Builds a session for one seat from the config.
fn build_session(
    config: &ClientConfig,
    role: Role,
    user_id: String,
    bus: EventBus,
) -> Result<SyncSession> {
    let table = config.rule_table()?;
    let board = table.initial_board();
    let state = MatchState::new(
        Arc::new(GridOracle::new(table)),
        role,
        board,
        config.clocks(),
    );
    let identity = Identity::new(user_id, config.match_id().clone(), role, config.is_guest());
    Ok(SyncSession::new(
        identity,
        state,
        config.disconnect_timer(),
        bus,
    ))
}

/// Run one seat against the relay
#[instrument(skip_all)]
async fn run_relay(
    config: Option<PathBuf>,
    relay_url: Option<String>,
    match_id: Option<String>,
    role: Option<Role>,
) -> Result<()> {
    let mut config = ClientConfig::load(config.as_deref())?;
    if let Some(url) = relay_url {
        config = config.with_relay_url(url);
    }
    if let Some(match_id) = match_id {
        config = config.with_match_id(match_id);
    }
    if let Some(role) = role {
        config = config.with_role(role);
    }
    let url = config
        .relay()?
        .context("No relay url: pass --relay-url or set DUEL_RELAY_URL")?;
    let table = config.rule_table()?;

    let bus = EventBus::default();
    let events = bus.subscribe();
    let user_id = config.resolved_user_id();
    info!(%user_id, match_id = %config.match_id(), role = %config.role(), "Starting relay match");
    let session = build_session(&config, *config.role(), user_id, bus)?;
    let mut connector = RelayConnector::new(url);
    let transport = connector.connect().await?;
    let (driver, commands) = MatchDriver::new(session, transport, config.heartbeat_period());
    let driver = driver.with_reconnect(connector, config.reconnect_period());

    let (turn_tx, turn_rx) = watch::channel(Role::Player1);
    let (board_tx, board_rx) = watch::channel(String::new());
    let printer = tokio::spawn(print_events(events, *table.files(), *table.ranks(), turn_tx, board_tx));
    let prompt = tokio::spawn(read_prompt(vec![(*config.role(), commands)], turn_rx, board_rx));

    let session = driver.run().await?;
    prompt.abort();
    printer.abort();
    report(&session);
    Ok(())
}

/// Run both seats on this device
#[instrument(skip_all)]
async fn run_hotseat(config: Option<PathBuf>) -> Result<()> {
    let config = ClientConfig::load(config.as_deref())?;
    let table = config.rule_table()?;
    info!(match_id = %config.match_id(), "Starting hotseat match");

    let bus = EventBus::default();
    let events = bus.subscribe();
    let hub = LocalHub::default();

    let mut drivers = Vec::new();
    let mut senders = Vec::new();
    for role in [Role::Player1, Role::Player2] {
        let user_id = format!("{}-{}", config.resolved_user_id(), role);
        let session = build_session(&config, role, user_id, bus.clone())?;
        let (driver, commands) = MatchDriver::new(session, hub.attach(), config.heartbeat_period());
        drivers.push(tokio::spawn(driver.run()));
        senders.push((role, commands));
    }

    let (turn_tx, turn_rx) = watch::channel(Role::Player1);
    let (board_tx, board_rx) = watch::channel(String::new());
    let printer = tokio::spawn(print_events(events, *table.files(), *table.ranks(), turn_tx, board_tx));
    let prompt = tokio::spawn(read_prompt(senders, turn_rx, board_rx));

    // Either seat settling ends the match for both; the prompt owns the senders.
    let mut sessions = Vec::new();
    for driver in drivers {
        sessions.push(driver.await??);
        prompt.abort();
    }
    printer.abort();
    if let Some(session) = sessions.first() {
        report(session);
    }
    Ok(())
}

/// Reads prompt lines and routes intents to the seat holding the turn.
async fn read_prompt(
    seats: Vec<(Role, mpsc::Sender<Intent>)>,
    turn: watch::Receiver<Role>,
    board: watch::Receiver<String>,
) -> Result<()> {
    println!("commands: select E2 | move E3 | cancel | resign | board | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Input>() {
            Ok(Input::Quit) => break,
            Ok(Input::Board) => println!("{}", *board.borrow()),
            Ok(Input::Intent(intent)) => {
                let active = *turn.borrow();
                let seat = seats
                    .iter()
                    .find(|(role, _)| *role == active)
                    .or_else(|| seats.first());
                if let Some((role, sender)) = seat {
                    debug!(%role, %intent, "Routing intent");
                    if sender.send(intent).await.is_err() {
                        break;
                    }
                }
            }
            Err(e) => println!("{}", e),
        }
    }
    info!("Prompt closed");
    Ok(())
}

/// Prints bus events, tracking whose turn it is for the prompt.
async fn print_events(
    mut events: Subscription,
    files: u8,
    ranks: u8,
    turn: watch::Sender<Role>,
    board: watch::Sender<String>,
) {
    let mut last_shown = None;
    while let Some(event) = events.next().await {
        match event {
            AppEvent::StateChanged(view) => {
                let rendered = view.render(files, ranks);
                board.send_replace(rendered.clone());
                // In hotseat both seats publish; the seat to act speaks for the board.
                let acting = view.local_role == view.current_turn
                    || view.phase != TurnPhase::Locked
                    || view.result.is_some();
                turn.send_replace(view.current_turn);
                let key = (
                    view.current_turn,
                    view.phase,
                    view.selected,
                    view.last_move.as_ref().map(|m| m.seq),
                    view.result.is_some(),
                );
                if acting && last_shown != Some(key) {
                    last_shown = Some(key);
                    println!("{}", rendered);
                }
            }
            AppEvent::MatchEnded(result) => {
                println!("match over: {} by {}", result.outcome(), result.reason());
                if let Some(change) = result.rating_change() {
                    println!("rating change: {}", change);
                }
            }
            AppEvent::PeerPresence { connected, .. } => {
                println!("opponent {}", if connected { "connected" } else { "disconnected" });
            }
            AppEvent::MatchFound { match_id, role } => {
                println!("joined match {} as {}", match_id, role);
            }
            AppEvent::ConnectionLost => {
                warn!("Connection lost");
                println!("connection to relay lost, playing on offline while reconnecting");
            }
        }
    }
}

fn report(session: &SyncSession) {
    match session.result() {
        Some(result) => info!(
            outcome = %result.outcome(),
            reason = %result.reason(),
            provisional = result.provisional(),
            "Match finished"
        ),
        None => info!("Left before the match finished"),
    }
}
