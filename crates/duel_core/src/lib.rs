//! Duel core - match logic for a two-player capture duel
//!
//! This crate holds everything a client needs to play a match without any
//! I/O: the turn phase state machine, the capture chain resolver, clocks,
//! the move log, result resolution and the snapshot format peers exchange.
//!
//! # Architecture
//!
//! - **Rules**: the [`RuleOracle`] boundary and the table-driven [`GridOracle`]
//! - **Machine**: [`MatchState`], one client's optimistic copy of the match
//! - **Chain**: [`CaptureChainResolver`], what a piece still owes after acting
//! - **Snapshot**: [`MatchSnapshot`], the complete state sent with every move
//! - **Result**: [`ResultResolver`], merging game-end notices and rating settlements
//!
//! # Example
//!
//! ```
//! use duel_core::{ClockPair, GridOracle, MatchState, Role, RuleTable, Transition};
//! use std::sync::Arc;
//!
//! let table = RuleTable::standard();
//! let board = table.initial_board();
//! let mut state = MatchState::new(
//!     Arc::new(GridOracle::new(table)),
//!     Role::Player1,
//!     board,
//!     ClockPair::new(600),
//! );
//! state.select("B3".parse().unwrap()).unwrap();
//! assert_eq!(state.commit("B4".parse().unwrap()).unwrap(), Transition::TurnPassed);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod action;
mod chain;
mod clock;
mod history;
mod machine;
mod phases;
mod presence;
mod result;
mod snapshot;
mod types;

pub mod invariants;
pub mod rules;

// Crate-level exports - Domain types
pub use types::{Board, Coord, CoordError, MoveCounts, MovedFlags, PieceId, Role};

// Crate-level exports - Phases and intents
pub use action::{Intent, MoveError, Transition};
pub use phases::{Outcome, PendingChain, Selection, TurnPhase};

// Crate-level exports - Rules
pub use rules::{
    AttackOutcome, AttackStage, CaptureOptions, GridOracle, LegalMoves, PieceRule, RuleOracle,
    RuleTable, RuleTableError, Step, WinCondition,
};

// Crate-level exports - State machine
pub use chain::{CaptureChainResolver, ChainStep};
pub use machine::MatchState;

// Crate-level exports - Records, clocks and presence
pub use clock::{format_clock, ClockPair, ClockTick};
pub use history::{CaptureLedger, MoveLog, MoveLogEntry};
pub use presence::{ConnectionStatus, DisconnectTimer};

// Crate-level exports - Results and snapshots
pub use result::{EndNotice, MatchResult, RatingSettlement, Resolution, ResultReason, ResultResolver};
pub use snapshot::{Finish, MatchSnapshot, Reconciliation, SnapshotError, SnapshotSource};
