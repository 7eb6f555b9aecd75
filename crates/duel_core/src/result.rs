//! Match result resolution.
//!
//! Two sources can end a match: a game-end notice (observed locally or
//! broadcast by the relay) and the relay's rating settlement. They arrive in
//! either order. The resolver keeps them apart and exposes a merged view in
//! which rating data wins once present. The first notice is terminal; later
//! ones may only fill in numbers the first one lacked.

use super::phases::Outcome;
use super::rules::WinCondition;
use super::Role;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResultReason {
    /// A clock reached zero.
    Timeout,
    /// The commander was captured.
    CommanderCaptured,
    /// The last opposing piece was captured.
    NoPiecesLeft,
    /// A player left the match.
    Resignation,
    /// The relay forfeited a player that stayed disconnected.
    Abandoned,
    /// Agreed or adjudicated draw.
    Draw,
    /// A reason this client does not know.
    #[serde(other)]
    Unknown,
}

impl From<WinCondition> for ResultReason {
    fn from(condition: WinCondition) -> Self {
        match condition {
            WinCondition::CommanderCaptured => ResultReason::CommanderCaptured,
            WinCondition::NoPiecesLeft => ResultReason::NoPiecesLeft,
        }
    }
}

/// A game-end notice, local or relayed.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct EndNotice {
    /// Winner or draw.
    pub outcome: Outcome,
    /// Reason code.
    pub reason: ResultReason,
    /// Winner's user id, when known.
    pub winner_id: Option<String>,
    /// Loser's user id, when known.
    pub loser_id: Option<String>,
    /// Rating delta, when the notice carried one.
    pub rating_change: Option<i32>,
}

/// The relay's rating settlement.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct RatingSettlement {
    /// Role of the winner.
    pub winner_role: Role,
    /// Winner's user id.
    pub winner_id: String,
    /// Loser's user id.
    pub loser_id: String,
    /// Winner's rating after settlement.
    pub winner_new_rating: i32,
    /// Loser's rating after settlement.
    pub loser_new_rating: i32,
    /// Points moved from loser to winner.
    pub change: i32,
    /// Reason code.
    pub reason: ResultReason,
}

/// Reconciled, display-ready match result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    outcome: Outcome,
    reason: ResultReason,
    winner_id: Option<String>,
    loser_id: Option<String>,
    rating_change: Option<i32>,
    winner_new_rating: Option<i32>,
    loser_new_rating: Option<i32>,
    /// True until the relay's rating settlement has been merged in.
    provisional: bool,
}

/// What an incoming notice did to the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// It set the result.
    Applied,
    /// It only added missing numbers to an existing result.
    Enriched,
    /// It was dropped.
    Ignored,
}

/// Merges game-end notices and rating settlements into one result.
#[derive(Debug, Clone, Default)]
pub struct ResultResolver {
    ended: Option<EndNotice>,
    rating: Option<RatingSettlement>,
}

impl ResultResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any source has ended the match.
    pub fn is_resolved(&self) -> bool {
        self.ended.is_some() || self.rating.is_some()
    }

    /// Records a game-end notice.
    #[instrument(skip(self))]
    pub fn record_end(&mut self, notice: EndNotice) -> Resolution {
        if let Some(existing) = self.ended.as_mut() {
            if existing.rating_change.is_none() && notice.rating_change.is_some() {
                debug!(change = ?notice.rating_change, "Filling missing rating delta");
                existing.rating_change = notice.rating_change;
                return Resolution::Enriched;
            }
            debug!(reason = %notice.reason, "Match already ended, notice ignored");
            return Resolution::Ignored;
        }
        if self.rating.is_some() {
            debug!("Settlement already recorded, notice kept for missing fields only");
            self.ended = Some(notice);
            return Resolution::Enriched;
        }
        info!(outcome = %notice.outcome, reason = %notice.reason, "Match ended");
        self.ended = Some(notice);
        Resolution::Applied
    }

    /// Records the relay's rating settlement.
    #[instrument(skip(self))]
    pub fn record_rating(&mut self, settlement: RatingSettlement) -> Resolution {
        if self.rating.is_some() {
            debug!("Duplicate rating settlement ignored");
            return Resolution::Ignored;
        }
        let resolution = if self.ended.is_some() {
            Resolution::Enriched
        } else {
            Resolution::Applied
        };
        info!(
            winner = %settlement.winner_id,
            change = settlement.change,
            "Rating settled"
        );
        self.rating = Some(settlement);
        resolution
    }

    /// The merged result, if the match has ended.
    pub fn result(&self) -> Option<MatchResult> {
        match (&self.ended, &self.rating) {
            (_, Some(rating)) => Some(MatchResult {
                outcome: Outcome::Winner(rating.winner_role),
                reason: rating.reason,
                winner_id: Some(rating.winner_id.clone()),
                loser_id: Some(rating.loser_id.clone()),
                rating_change: Some(rating.change),
                winner_new_rating: Some(rating.winner_new_rating),
                loser_new_rating: Some(rating.loser_new_rating),
                provisional: false,
            }),
            (Some(ended), None) => Some(MatchResult {
                outcome: ended.outcome,
                reason: ended.reason,
                winner_id: ended.winner_id.clone(),
                loser_id: ended.loser_id.clone(),
                rating_change: ended.rating_change,
                winner_new_rating: None,
                loser_new_rating: None,
                provisional: true,
            }),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ended(reason: ResultReason, change: Option<i32>) -> EndNotice {
        EndNotice::new(
            Outcome::Winner(Role::Player1),
            reason,
            Some("alice".into()),
            Some("bob".into()),
            change,
        )
    }

    fn settlement() -> RatingSettlement {
        RatingSettlement::new(
            Role::Player1,
            "alice".into(),
            "bob".into(),
            1216,
            1184,
            16,
            ResultReason::Timeout,
        )
    }

    #[test]
    fn test_first_notice_wins() {
        let mut resolver = ResultResolver::new();
        assert_eq!(resolver.record_end(ended(ResultReason::Timeout, None)), Resolution::Applied);
        assert_eq!(
            resolver.record_end(ended(ResultReason::Resignation, None)),
            Resolution::Ignored
        );
        let result = resolver.result().unwrap();
        assert_eq!(*result.reason(), ResultReason::Timeout);
        assert!(*result.provisional());
    }

    #[test]
    fn test_second_notice_fills_missing_delta_only() {
        let mut resolver = ResultResolver::new();
        resolver.record_end(ended(ResultReason::Timeout, None));
        assert_eq!(
            resolver.record_end(ended(ResultReason::Resignation, Some(12))),
            Resolution::Enriched
        );
        let result = resolver.result().unwrap();
        assert_eq!(*result.reason(), ResultReason::Timeout);
        assert_eq!(*result.rating_change(), Some(12));
    }

    #[test]
    fn test_rating_takes_precedence() {
        let mut resolver = ResultResolver::new();
        resolver.record_end(ended(ResultReason::CommanderCaptured, None));
        assert_eq!(resolver.record_rating(settlement()), Resolution::Enriched);
        let result = resolver.result().unwrap();
        assert!(!*result.provisional());
        assert_eq!(*result.winner_new_rating(), Some(1216));
        assert_eq!(*result.rating_change(), Some(16));
    }

    #[test]
    fn test_rating_alone_resolves_and_duplicates_drop() {
        let mut resolver = ResultResolver::new();
        assert_eq!(resolver.record_rating(settlement()), Resolution::Applied);
        assert!(resolver.is_resolved());
        assert_eq!(resolver.record_rating(settlement()), Resolution::Ignored);
    }

    #[test]
    fn test_unknown_reason_deserializes() {
        let reason: ResultReason = serde_json::from_str("\"mutual_agreement\"").unwrap();
        assert_eq!(reason, ResultReason::Unknown);
    }
}
