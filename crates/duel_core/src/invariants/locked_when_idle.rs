//! Locked-when-idle invariant: only the turn owner may be out of `locked`.

use super::Invariant;
use crate::{MatchState, TurnPhase};

/// Invariant: a client that does not hold the turn, or whose match is over,
/// is in `locked`.
pub struct LockedWhenIdleInvariant;

impl Invariant<MatchState> for LockedWhenIdleInvariant {
    fn holds(state: &MatchState) -> bool {
        let idle = state.is_frozen() || state.current_turn() != state.local_role();
        !idle || state.phase() == TurnPhase::Locked
    }

    fn description() -> &'static str {
        "Non-active or finished client is locked"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{GridOracle, RuleTable};
    use crate::{ClockPair, Outcome, ResultReason, Role};
    use std::sync::Arc;

    #[test]
    fn test_holds_after_freeze() {
        let table = RuleTable::standard();
        let board = table.initial_board();
        let mut state = MatchState::new(
            Arc::new(GridOracle::new(table)),
            Role::Player1,
            board,
            ClockPair::new(60),
        );
        assert!(LockedWhenIdleInvariant::holds(&state));
        state.select("B3".parse().unwrap()).unwrap();
        state.freeze(Outcome::Winner(Role::Player2), ResultReason::Resignation);
        assert_eq!(state.phase(), TurnPhase::Locked);
        assert!(LockedWhenIdleInvariant::holds(&state));
    }
}
