//! Append-only match records: the move log and the capture ledger.

use super::{Coord, PieceId, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One physical action in the match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveLogEntry {
    /// Who acted.
    pub player: Role,
    /// Piece that moved.
    pub piece: PieceId,
    /// Piece display name at the time of the move.
    pub piece_name: String,
    /// Origin square.
    pub from: Coord,
    /// Destination square.
    pub to: Coord,
    /// 1-based position in the log.
    pub seq: u32,
    /// Wall-clock time of the action.
    pub timestamp: DateTime<Utc>,
}

/// Ordered, append-only move log with contiguous sequence numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoveLog {
    entries: Vec<MoveLogEntry>,
}

impl MoveLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a log from entries, refusing gaps, duplicates or a wrong start.
    ///
    /// Returns the sequence number that broke the chain on failure.
    pub fn from_entries(entries: Vec<MoveLogEntry>) -> Result<Self, u32> {
        for (index, entry) in entries.iter().enumerate() {
            let expected = index as u32 + 1;
            if entry.seq != expected {
                return Err(entry.seq);
            }
        }
        Ok(Self { entries })
    }

    /// Appends an action and returns its sequence number.
    pub fn append(
        &mut self,
        player: Role,
        piece: PieceId,
        piece_name: String,
        from: Coord,
        to: Coord,
    ) -> u32 {
        let seq = self.entries.len() as u32 + 1;
        self.entries.push(MoveLogEntry {
            player,
            piece,
            piece_name,
            from,
            to,
            seq,
            timestamp: Utc::now(),
        });
        seq
    }

    /// All entries in order.
    pub fn entries(&self) -> &[MoveLogEntry] {
        &self.entries
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<&MoveLogEntry> {
        self.entries.last()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether nothing has been played.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks that sequence numbers run 1, 2, 3, ...
    pub fn is_contiguous(&self) -> bool {
        self.entries
            .iter()
            .enumerate()
            .all(|(index, entry)| entry.seq == index as u32 + 1)
    }
}

/// Captured pieces, grouped by the player who took them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureLedger {
    /// Pieces taken by player1, in order.
    #[serde(default)]
    pub player1: Vec<PieceId>,
    /// Pieces taken by player2, in order.
    #[serde(default)]
    pub player2: Vec<PieceId>,
}

impl CaptureLedger {
    /// Records a capture.
    pub fn record(&mut self, captor: Role, captured: PieceId) {
        self.of_mut(captor).push(captured);
    }

    /// Pieces captured by a role.
    pub fn by(&self, captor: Role) -> &[PieceId] {
        match captor {
            Role::Player1 => &self.player1,
            Role::Player2 => &self.player2,
        }
    }

    /// Total captures on both sides.
    pub fn total(&self) -> usize {
        self.player1.len() + self.player2.len()
    }

    fn of_mut(&mut self, captor: Role) -> &mut Vec<PieceId> {
        match captor {
            Role::Player1 => &mut self.player1,
            Role::Player2 => &mut self.player2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> Coord {
        s.parse().unwrap()
    }

    #[test]
    fn test_append_numbers_from_one() {
        let mut log = MoveLog::new();
        let first = log.append(Role::Player1, "p1_a_1".into(), "A".into(), c("A1"), c("A2"));
        let second = log.append(Role::Player2, "p2_a_1".into(), "A".into(), c("A9"), c("A8"));
        assert_eq!((first, second), (1, 2));
        assert!(log.is_contiguous());
    }

    #[test]
    fn test_from_entries_rejects_gap() {
        let mut log = MoveLog::new();
        log.append(Role::Player1, "p1_a_1".into(), "A".into(), c("A1"), c("A2"));
        log.append(Role::Player2, "p2_a_1".into(), "A".into(), c("A9"), c("A8"));
        let mut entries = log.entries().to_vec();
        entries.remove(0);
        assert_eq!(MoveLog::from_entries(entries), Err(2));
    }

    #[test]
    fn test_ledger_keeps_sides_apart() {
        let mut ledger = CaptureLedger::default();
        ledger.record(Role::Player1, "p2_a_1".into());
        ledger.record(Role::Player1, "p2_a_2".into());
        ledger.record(Role::Player2, "p1_a_1".into());
        assert_eq!(ledger.by(Role::Player1).len(), 2);
        assert_eq!(ledger.by(Role::Player2), &[PieceId::new("p1_a_1")]);
        assert_eq!(ledger.total(), 3);
    }
}
