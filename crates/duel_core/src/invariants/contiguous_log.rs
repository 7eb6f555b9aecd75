//! Contiguous log invariant: sequence numbers run 1, 2, 3, ...

use super::Invariant;
use crate::MatchState;

/// Invariant: move log sequence numbers are contiguous from 1.
pub struct ContiguousLogInvariant;

impl Invariant<MatchState> for ContiguousLogInvariant {
    fn holds(state: &MatchState) -> bool {
        state.log().is_contiguous()
    }

    fn description() -> &'static str {
        "Move log sequence numbers are contiguous from 1"
    }
}
