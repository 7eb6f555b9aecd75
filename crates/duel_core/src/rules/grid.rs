//! Table-driven rule oracle on a rectangular board.

use super::{AttackOutcome, AttackStage, CaptureOptions, LegalMoves, RuleOracle, WinCondition};
use crate::{Board, Coord, MoveCounts, PieceId, Role};
use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, instrument};

/// A direction as (file delta, rank delta), rank measured towards the owner's front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step(pub i8, pub i8);

impl Step {
    fn oriented(self, owner: Role) -> (i8, i8) {
        (self.0, self.1 * owner.forward())
    }
}

/// Movement and capture rules for one kind of piece.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct PieceRule {
    /// Display name used in the move log.
    name: String,
    /// Directions the piece moves in.
    #[serde(default)]
    steps: Vec<Step>,
    /// Maximum squares per simple move.
    #[serde(default = "default_range")]
    range: u8,
    /// Extra squares along `steps` unlocked after the first move.
    #[serde(default)]
    advance_range: u8,
    /// Directions the piece captures in.
    #[serde(default)]
    attacks: Vec<Step>,
    /// Maximum capture distance.
    #[serde(default = "default_range")]
    attack_range: u8,
    /// May capture right after a simple move.
    #[serde(default)]
    follow_up: bool,
    /// May keep capturing after a capture.
    #[serde(default)]
    chain: bool,
    /// Single-square relocations owed after a capture.
    #[serde(default)]
    recoil: Vec<Step>,
    /// Losing this piece loses the match.
    #[serde(default)]
    commander: bool,
}

fn default_range() -> u8 {
    1
}

fn default_files() -> u8 {
    9
}

fn default_ranks() -> u8 {
    9
}

/// Board dimensions, piece kinds and initial setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct RuleTable {
    /// Number of files (columns).
    #[serde(default = "default_files")]
    files: u8,
    /// Number of ranks (rows).
    #[serde(default = "default_ranks")]
    ranks: u8,
    /// Rules keyed by piece kind, the middle segment of `<p1|p2>_<kind>_<n>`.
    pieces: BTreeMap<String, PieceRule>,
    /// Starting position.
    #[serde(default)]
    setup: BTreeMap<PieceId, Coord>,
}

impl RuleTable {
    /// Creates a table from its parts.
    pub fn new(
        files: u8,
        ranks: u8,
        pieces: BTreeMap<String, PieceRule>,
        setup: BTreeMap<PieceId, Coord>,
    ) -> Self {
        Self {
            files,
            ranks,
            pieces,
            setup,
        }
    }

    /// Loads a table from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuleTableError> {
        debug!("Loading rule table");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RuleTableError::new(format!("Failed to read rule table: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses a table from TOML text.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, RuleTableError> {
        let table: Self = toml::from_str(content)
            .map_err(|e| RuleTableError::new(format!("Failed to parse rule table: {}", e)))?;
        info!(kinds = table.pieces.len(), "Rule table loaded");
        Ok(table)
    }

    /// The built-in 9x9 table: a warden (commander), two strikers and four lancers a side.
    pub fn standard() -> Self {
        let all = [
            Step(-1, -1),
            Step(0, -1),
            Step(1, -1),
            Step(-1, 0),
            Step(1, 0),
            Step(-1, 1),
            Step(0, 1),
            Step(1, 1),
        ];
        let orthogonal = [Step(0, 1), Step(0, -1), Step(1, 0), Step(-1, 0)];

        let mut pieces = BTreeMap::new();
        pieces.insert(
            "warden".to_string(),
            PieceRule {
                name: "Warden".to_string(),
                steps: all.to_vec(),
                range: 1,
                advance_range: 0,
                attacks: all.to_vec(),
                attack_range: 1,
                follow_up: false,
                chain: false,
                recoil: Vec::new(),
                commander: true,
            },
        );
        pieces.insert(
            "striker".to_string(),
            PieceRule {
                name: "Striker".to_string(),
                steps: orthogonal.to_vec(),
                range: 2,
                advance_range: 0,
                attacks: orthogonal.to_vec(),
                attack_range: 2,
                follow_up: false,
                chain: true,
                recoil: vec![Step(0, -1)],
                commander: false,
            },
        );
        pieces.insert(
            "lancer".to_string(),
            PieceRule {
                name: "Lancer".to_string(),
                steps: vec![Step(0, 1)],
                range: 1,
                advance_range: 1,
                attacks: vec![Step(-1, 1), Step(1, 1)],
                attack_range: 1,
                follow_up: true,
                chain: true,
                recoil: Vec::new(),
                commander: false,
            },
        );

        let mut setup = BTreeMap::new();
        let mut put = |id: &str, at: (u8, u8)| {
            setup.insert(PieceId::new(id), Coord::new(at.0, at.1));
        };
        put("p1_warden_1", (4, 1));
        put("p1_striker_1", (2, 1));
        put("p1_striker_2", (6, 1));
        put("p2_warden_1", (4, 9));
        put("p2_striker_1", (2, 9));
        put("p2_striker_2", (6, 9));
        for (n, file) in [1u8, 3, 5, 7].into_iter().enumerate() {
            put(&format!("p1_lancer_{}", n + 1), (file, 3));
            put(&format!("p2_lancer_{}", n + 1), (file, 7));
        }

        Self::new(9, 9, pieces, setup)
    }

    /// Initial board built from the setup section.
    pub fn initial_board(&self) -> Board {
        self.setup
            .iter()
            .map(|(id, at)| (id.clone(), *at))
            .collect()
    }
}

/// Error loading a rule table.
#[derive(Debug, Clone, Display, Error)]
#[display("Rule table error: {} at {}:{}", message, file, line)]
pub struct RuleTableError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl RuleTableError {
    /// Creates a new rule table error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// [`RuleOracle`] backed by a [`RuleTable`].
#[derive(Debug, Clone)]
pub struct GridOracle {
    table: RuleTable,
}

impl GridOracle {
    /// Creates an oracle over the given table.
    pub fn new(table: RuleTable) -> Self {
        Self { table }
    }

    /// The table this oracle answers from.
    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    fn rule_of(&self, piece: &PieceId) -> Option<&PieceRule> {
        let kind = piece.as_str().split('_').nth(1)?;
        self.table.pieces.get(kind)
    }

    fn on_board(&self, coord: &Coord) -> bool {
        coord.file() < self.table.files && coord.rank() <= self.table.ranks
    }

    fn shift(&self, from: &Coord, (df, dr): (i8, i8), distance: u8) -> Option<Coord> {
        let scale = |d: i8| i8::try_from(i16::from(d) * i16::from(distance)).ok();
        from.offset(scale(df)?, scale(dr)?)
            .filter(|c| self.on_board(c))
    }

    /// Enemy pieces reachable along the attack rays, ignoring stage restrictions.
    fn reachable_targets(&self, piece: &PieceId, at: &Coord, board: &Board) -> Vec<Coord> {
        let (Some(rule), Some(owner)) = (self.rule_of(piece), self.piece_owner(piece)) else {
            return Vec::new();
        };
        let mut targets = Vec::new();
        for step in &rule.attacks {
            let dir = step.oriented(owner);
            for distance in 1..=rule.attack_range {
                let Some(square) = self.shift(at, dir, distance) else {
                    break;
                };
                if let Some(occupant) = board.piece_at(&square) {
                    if self.piece_owner(occupant) == Some(owner.opponent())
                        && !targets.contains(&square)
                    {
                        targets.push(square);
                    }
                    break;
                }
            }
        }
        targets
    }
}

impl RuleOracle for GridOracle {
    #[instrument(skip(self, board, _counts), fields(piece = %piece, at = %at))]
    fn legal_moves(
        &self,
        piece: &PieceId,
        at: &Coord,
        first_move: bool,
        board: &Board,
        _counts: &MoveCounts,
    ) -> LegalMoves {
        let (Some(rule), Some(owner)) = (self.rule_of(piece), self.piece_owner(piece)) else {
            return LegalMoves::default();
        };
        let reach = if first_move {
            rule.range
        } else {
            rule.range.saturating_add(rule.advance_range)
        };
        let mut moves = LegalMoves::default();
        for step in &rule.steps {
            let dir = step.oriented(owner);
            for distance in 1..=reach {
                let Some(square) = self.shift(at, dir, distance) else {
                    break;
                };
                if !board.is_empty(&square) {
                    break;
                }
                if distance <= rule.range {
                    moves.simple.push(square);
                } else {
                    moves.advance.push(square);
                }
            }
        }
        moves
    }

    #[instrument(skip(self, board), fields(piece = %piece, at = %at))]
    fn legal_attacks(
        &self,
        piece: &PieceId,
        at: &Coord,
        board: &Board,
        stage: AttackStage,
        initial: bool,
    ) -> Vec<Coord> {
        let Some(rule) = self.rule_of(piece) else {
            return Vec::new();
        };
        let allowed = match stage {
            AttackStage::PreMove => initial || rule.chain,
            AttackStage::PostMove => rule.follow_up,
        };
        if !allowed {
            return Vec::new();
        }
        self.reachable_targets(piece, at, board)
    }

    #[instrument(skip(self, board, _counts), fields(piece = %piece, at = %at))]
    fn mandatory_continuations(
        &self,
        piece: &PieceId,
        at: &Coord,
        board: &Board,
        _counts: &MoveCounts,
    ) -> Vec<Coord> {
        let (Some(rule), Some(owner)) = (self.rule_of(piece), self.piece_owner(piece)) else {
            return Vec::new();
        };
        rule.recoil
            .iter()
            .filter_map(|step| self.shift(at, step.oriented(owner), 1))
            .filter(|square| board.is_empty(square))
            .collect()
    }

    #[instrument(skip(self, board, counts), fields(piece = %piece, at = %at))]
    fn multi_capture_options(
        &self,
        piece: &PieceId,
        at: &Coord,
        board: &Board,
        mandatory_used: bool,
        counts: &MoveCounts,
    ) -> CaptureOptions {
        let attacks = self.legal_attacks(piece, at, board, AttackStage::PreMove, false);
        let moves = if mandatory_used {
            Vec::new()
        } else {
            self.mandatory_continuations(piece, at, board, counts)
        };
        CaptureOptions { moves, attacks }
    }

    #[instrument(skip(self, board), fields(target = %target, attacker = %attacker))]
    fn execute_attack(
        &self,
        target: &Coord,
        board: &Board,
        attacker: &PieceId,
    ) -> Option<AttackOutcome> {
        let from = board.position_of(attacker)?;
        if !self.reachable_targets(attacker, &from, board).contains(target) {
            debug!("Target not reachable");
            return None;
        }
        let captured = board.piece_at(target)?.clone();
        let victim = self.piece_owner(&captured)?;

        let mut next = board.clone();
        next.remove(&captured);
        next.place(attacker.clone(), *target);

        let commander = self.rule_of(&captured).is_some_and(|r| r.commander);
        let survivors = next
            .pieces()
            .filter(|(id, _)| self.piece_owner(id) == Some(victim))
            .count();
        let winner = if commander {
            Some((victim.opponent(), WinCondition::CommanderCaptured))
        } else if survivors == 0 {
            Some((victim.opponent(), WinCondition::NoPiecesLeft))
        } else {
            None
        };

        Some(AttackOutcome {
            board: next,
            captured,
            winner,
        })
    }

    fn piece_owner(&self, piece: &PieceId) -> Option<Role> {
        match piece.as_str().split('_').next()? {
            "p1" => Some(Role::Player1),
            "p2" => Some(Role::Player2),
            _ => None,
        }
    }

    fn display_name(&self, piece: &PieceId) -> String {
        self.rule_of(piece)
            .map(|rule| rule.name.clone())
            .unwrap_or_else(|| piece.to_string())
    }
}
