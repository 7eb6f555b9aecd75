//! Chain-holds-turn invariant: an open capture chain keeps the turn.

use super::Invariant;
use crate::{MatchState, TurnPhase};

/// Invariant: in `mandatory_move` the local client holds the turn and an
/// unexhausted chain is recorded.
pub struct ChainHoldsTurnInvariant;

impl Invariant<MatchState> for ChainHoldsTurnInvariant {
    fn holds(state: &MatchState) -> bool {
        if state.phase() != TurnPhase::MandatoryMove {
            return true;
        }
        state.current_turn() == state.local_role()
            && state.pending().is_some_and(|chain| !chain.is_exhausted())
    }

    fn description() -> &'static str {
        "Mandatory move keeps the turn with an open chain"
    }
}
