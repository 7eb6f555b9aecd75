//! Relay wire protocol.
//!
//! Messages are JSON objects tagged by `type` with camelCase fields. Inbound
//! frames are parsed into [`Inbound`] and snapshot payloads are converted to
//! [`MatchSnapshot`] before anything touches match state. Conversion is
//! lenient about optional fields and strict about coordinates, roles and the
//! move log sequence.

use chrono::{DateTime, Utc};
use duel_core::{
    Board, CaptureLedger, ClockPair, Coord, Finish, MatchSnapshot, MoveCounts, MoveLog,
    MoveLogEntry, MovedFlags, Outcome, PendingChain, PieceId, ResultReason, Role, SnapshotError,
    TurnPhase, WinCondition,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

// ─────────────────────────────────────────────────────────────
//  Envelopes
// ─────────────────────────────────────────────────────────────

/// Messages this client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Outbound {
    /// Announce presence in a match.
    JoinGame {
        /// Match id.
        match_id: String,
        /// This client's user id.
        user_id: String,
    },
    /// Broadcast the complete post-move state.
    MoveMade {
        /// Match id.
        match_id: String,
        /// State after the move.
        #[serde(rename = "move")]
        snapshot: SnapshotPayload,
        /// User id of the mover.
        actor_id: String,
    },
    /// Authoritative end of match, sent by the winner only.
    GameEnd {
        /// Match id.
        match_id: String,
        /// Winning seat.
        winner_role: Role,
        /// Winner's user id.
        winner_id: Option<String>,
        /// Loser's user id.
        loser_id: Option<String>,
        /// Reason code.
        reason: ResultReason,
        /// Win condition when the match ended on the board.
        win_condition: Option<WinCondition>,
        /// The full move log.
        move_history: Vec<MoveLogPayload>,
    },
    /// Keep-alive.
    PlayerHeartbeat {
        /// Match id.
        match_id: String,
    },
    /// Leave (and forfeit) the match.
    LeaveGame {
        /// Match id.
        match_id: String,
    },
}

impl Outbound {
    /// The message's `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::JoinGame { .. } => "joinGame",
            Outbound::MoveMade { .. } => "moveMade",
            Outbound::GameEnd { .. } => "gameEnd",
            Outbound::PlayerHeartbeat { .. } => "playerHeartbeat",
            Outbound::LeaveGame { .. } => "leaveGame",
        }
    }
}

/// Messages the relay (or the same-device channel) delivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Inbound {
    /// A peer's move broadcast.
    MoveMade {
        /// Match id.
        #[serde(default)]
        match_id: Option<String>,
        /// Snapshot, as an object or a JSON string.
        #[serde(rename = "move")]
        snapshot: Encoded,
        /// User id of the mover.
        #[serde(default)]
        actor_id: Option<String>,
    },
    /// Full state from the relay, e.g. on (re)join.
    GameState {
        /// Match id.
        #[serde(default)]
        match_id: Option<String>,
        /// Roster.
        #[serde(default)]
        players: Vec<PlayerInfo>,
        /// Current match state, if play has started.
        #[serde(default)]
        game: Option<Encoded>,
        /// Result, if the match is over.
        #[serde(default)]
        result: Option<GameEndedPayload>,
    },
    /// The relay's end-of-match notice.
    GameEnded(GameEndedPayload),
    /// The relay's rating settlement.
    RatingUpdate(RatingPayload),
    /// A player joined.
    PlayerJoined(PresencePayload),
    /// A player came back.
    PlayerReconnected(PresencePayload),
    /// A player dropped.
    PlayerDisconnected(PresencePayload),
    /// The opponent dropped.
    OpponentDisconnected(PresencePayload),
    /// Any message type this client does not know.
    #[serde(other)]
    Unknown,
}

impl Inbound {
    /// Parses a text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// A nested payload that may arrive as a JSON object or as a string of JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Encoded(serde_json::Value);

impl Encoded {
    /// Wraps a payload as an inline object.
    pub fn inline<T: Serialize>(payload: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(payload).map(Self)
    }

    /// Decodes the payload whichever way it was encoded.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SnapshotError> {
        let decoded = match &self.0 {
            serde_json::Value::String(text) => serde_json::from_str(text)?,
            other => T::deserialize(other)?,
        };
        Ok(decoded)
    }
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    /// User id.
    pub user_id: String,
    /// Seat.
    pub role: Role,
    /// Current rating.
    #[serde(default)]
    pub rating: Option<i32>,
    /// Guest account.
    #[serde(default)]
    pub guest: bool,
    /// Connected right now.
    #[serde(default = "default_connected")]
    pub connected: bool,
    /// When the player last dropped.
    #[serde(default)]
    pub disconnected_at: Option<DateTime<Utc>>,
}

fn default_connected() -> bool {
    true
}

/// Body of `gameEnded`, also used as `gameState.result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEndedPayload {
    /// Match id.
    #[serde(default)]
    pub match_id: Option<String>,
    /// `player1`, `player2` or `draw`.
    #[serde(default)]
    pub winner: Option<String>,
    /// Reason code.
    pub reason: ResultReason,
    /// Winner's user id.
    #[serde(default)]
    pub winner_id: Option<String>,
    /// Loser's user id.
    #[serde(default)]
    pub loser_id: Option<String>,
    /// Winner's rating delta.
    #[serde(default)]
    pub score: Option<i32>,
}

/// Body of `ratingUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingPayload {
    /// Winner's user id.
    pub winner_id: String,
    /// Loser's user id.
    pub loser_id: String,
    /// Winner's rating after settlement.
    pub winner_new_rating: i32,
    /// Loser's rating after settlement.
    pub loser_new_rating: i32,
    /// Points moved.
    pub change: i32,
    /// Reason code.
    pub reason: ResultReason,
    /// Echo of the delta some relays send.
    #[serde(default)]
    pub score: Option<i32>,
}

/// Body of the presence signals.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    /// Match id.
    #[serde(default)]
    pub match_id: Option<String>,
    /// Whose presence changed.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Disconnect time, for `playerDisconnected`.
    #[serde(default)]
    pub disconnected_at: Option<DateTime<Utc>>,
}

/// Frame on the same-device channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFrame {
    /// Snapshot after the move.
    #[serde(rename = "move")]
    pub snapshot: Encoded,
    /// User id of the mover.
    pub actor_id: String,
}

// ─────────────────────────────────────────────────────────────
//  Snapshot payload
// ─────────────────────────────────────────────────────────────

/// Match snapshot as it appears on the wire. Loosely typed until converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    /// Piece id to coordinate.
    #[serde(default)]
    pub board: BTreeMap<String, String>,
    /// Role holding the turn.
    pub current_turn: String,
    /// Phase of the turn owner.
    #[serde(default)]
    pub phase: Option<String>,
    /// Move log.
    #[serde(default)]
    pub move_log: Vec<MoveLogPayload>,
    /// Captured pieces per captor.
    #[serde(default)]
    pub captures: CapturesPayload,
    /// Has-moved flags.
    #[serde(default)]
    pub moved: BTreeMap<String, bool>,
    /// Lifetime action counts.
    #[serde(default)]
    pub counts: BTreeMap<String, u32>,
    /// Remaining seconds.
    pub clocks: ClockPair,
    /// Open capture chain.
    #[serde(default)]
    pub pending: Option<PendingPayload>,
    /// Sender's action counter.
    #[serde(default)]
    pub version: u64,
    /// Finish declared by the sender.
    #[serde(default)]
    pub finish: Option<FinishPayload>,
}

/// Move log entry on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveLogPayload {
    /// Acting role.
    pub player: String,
    /// Piece id.
    pub piece: String,
    /// Display name.
    #[serde(default)]
    pub piece_name: Option<String>,
    /// Origin.
    pub from: String,
    /// Destination.
    pub to: String,
    /// Position in the log.
    pub seq: u32,
    /// Wall-clock time.
    pub timestamp: DateTime<Utc>,
}

/// Capture ledgers on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturesPayload {
    /// Taken by player1.
    #[serde(default)]
    pub player1: Vec<String>,
    /// Taken by player2.
    #[serde(default)]
    pub player2: Vec<String>,
}

/// Open capture chain on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayload {
    /// Piece that owes the continuation.
    pub piece: String,
    /// Where it stands.
    pub at: String,
    /// Forced relocation targets.
    #[serde(default)]
    pub moves: Vec<String>,
    /// Continuation capture targets.
    #[serde(default)]
    pub attacks: Vec<String>,
    /// Relocation already spent.
    #[serde(default)]
    pub mandatory_used: bool,
}

/// Finish on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishPayload {
    /// `player1`, `player2` or `draw`.
    pub winner: String,
    /// Reason code.
    pub reason: ResultReason,
}

fn coord(raw: &str) -> Result<Coord, SnapshotError> {
    Coord::from_str(raw).map_err(|e| SnapshotError::Coordinate(e.to_string()))
}

fn coords(raw: &[String]) -> Result<Vec<Coord>, SnapshotError> {
    raw.iter().map(|c| coord(c)).collect()
}

fn role(raw: &str) -> Result<Role, SnapshotError> {
    Role::from_str(raw).map_err(|_| SnapshotError::Role(raw.to_string()))
}

/// Parses a `winner` field: a role name or `draw`.
pub fn parse_outcome(raw: &str) -> Result<Outcome, SnapshotError> {
    if raw.eq_ignore_ascii_case("draw") {
        return Ok(Outcome::Draw);
    }
    role(raw).map(Outcome::Winner)
}

fn outcome_name(outcome: Outcome) -> String {
    match outcome {
        Outcome::Winner(role) => role.to_string(),
        Outcome::Draw => "draw".to_string(),
    }
}

impl TryFrom<MoveLogPayload> for MoveLogEntry {
    type Error = SnapshotError;

    fn try_from(entry: MoveLogPayload) -> Result<Self, Self::Error> {
        let piece = PieceId::new(entry.piece);
        Ok(MoveLogEntry {
            player: role(&entry.player)?,
            piece_name: entry.piece_name.unwrap_or_else(|| piece.to_string()),
            piece,
            from: coord(&entry.from)?,
            to: coord(&entry.to)?,
            seq: entry.seq,
            timestamp: entry.timestamp,
        })
    }
}

impl From<&MoveLogEntry> for MoveLogPayload {
    fn from(entry: &MoveLogEntry) -> Self {
        Self {
            player: entry.player.to_string(),
            piece: entry.piece.to_string(),
            piece_name: Some(entry.piece_name.clone()),
            from: entry.from.to_string(),
            to: entry.to.to_string(),
            seq: entry.seq,
            timestamp: entry.timestamp,
        }
    }
}

impl TryFrom<SnapshotPayload> for MatchSnapshot {
    type Error = SnapshotError;

    fn try_from(payload: SnapshotPayload) -> Result<Self, Self::Error> {
        let board = payload
            .board
            .iter()
            .map(|(id, at)| Ok((PieceId::new(id.as_str()), coord(at)?)))
            .collect::<Result<Board, SnapshotError>>()?;

        let current_turn = role(&payload.current_turn)?;
        let phase = match payload.phase.as_deref() {
            Some(raw) => {
                TurnPhase::from_str(raw).map_err(|_| SnapshotError::Phase(raw.to_string()))?
            }
            None => TurnPhase::Select,
        };

        let entries = payload
            .move_log
            .into_iter()
            .map(MoveLogEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let move_log = MoveLog::from_entries(entries).map_err(SnapshotError::LogGap)?;

        let captures = CaptureLedger {
            player1: payload.captures.player1.into_iter().map(PieceId::new).collect(),
            player2: payload.captures.player2.into_iter().map(PieceId::new).collect(),
        };

        let moved: MovedFlags = payload
            .moved
            .iter()
            .filter(|(_, flag)| **flag)
            .map(|(id, _)| PieceId::new(id.as_str()))
            .collect();

        let counts: MoveCounts = payload
            .counts
            .iter()
            .map(|(id, count)| (PieceId::new(id.as_str()), *count))
            .collect();

        let pending = payload
            .pending
            .map(|chain| -> Result<PendingChain, SnapshotError> {
                Ok(PendingChain {
                    piece: PieceId::new(chain.piece),
                    at: coord(&chain.at)?,
                    moves: coords(&chain.moves)?,
                    attacks: coords(&chain.attacks)?,
                    mandatory_used: chain.mandatory_used,
                })
            })
            .transpose()?;

        let finish = payload
            .finish
            .map(|finish| -> Result<Finish, SnapshotError> {
                Ok(Finish {
                    outcome: parse_outcome(&finish.winner)?,
                    reason: finish.reason,
                })
            })
            .transpose()?;

        Ok(MatchSnapshot {
            board,
            current_turn,
            phase,
            move_log,
            captures,
            moved,
            counts,
            clocks: payload.clocks,
            pending,
            version: payload.version,
            finish,
        })
    }
}

impl From<&MatchSnapshot> for SnapshotPayload {
    fn from(snapshot: &MatchSnapshot) -> Self {
        Self {
            board: snapshot
                .board
                .pieces()
                .map(|(id, at)| (id.to_string(), at.to_string()))
                .collect(),
            current_turn: snapshot.current_turn.to_string(),
            phase: Some(snapshot.phase.to_string()),
            move_log: snapshot
                .move_log
                .entries()
                .iter()
                .map(MoveLogPayload::from)
                .collect(),
            captures: CapturesPayload {
                player1: snapshot.captures.player1.iter().map(|p| p.to_string()).collect(),
                player2: snapshot.captures.player2.iter().map(|p| p.to_string()).collect(),
            },
            moved: snapshot
                .moved
                .iter()
                .map(|id| (id.to_string(), true))
                .collect(),
            counts: snapshot
                .counts
                .iter()
                .map(|(id, count)| (id.to_string(), count))
                .collect(),
            clocks: snapshot.clocks,
            pending: snapshot.pending.as_ref().map(|chain| PendingPayload {
                piece: chain.piece.to_string(),
                at: chain.at.to_string(),
                moves: chain.moves.iter().map(|c| c.to_string()).collect(),
                attacks: chain.attacks.iter().map(|c| c.to_string()).collect(),
                mandatory_used: chain.mandatory_used,
            }),
            version: snapshot.version,
            finish: snapshot.finish.map(|finish| FinishPayload {
                winner: outcome_name(finish.outcome),
                reason: finish.reason,
            }),
        }
    }
}

/// Decodes an encoded snapshot and converts it to the internal form.
pub fn decode_snapshot(encoded: &Encoded) -> Result<MatchSnapshot, SnapshotError> {
    encoded.decode::<SnapshotPayload>()?.try_into()
}
