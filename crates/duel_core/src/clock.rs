//! Per-player countdown clocks.

use super::Role;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Remaining seconds for both players.
///
/// Only ever counts down, except when a server snapshot resynchronizes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockPair {
    /// Player1's remaining seconds.
    pub player1: u32,
    /// Player2's remaining seconds.
    pub player2: u32,
}

/// What a one-second tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockTick {
    /// Nothing ran.
    Idle,
    /// The active clock lost a second and still has time.
    Running(u32),
    /// The active clock is at zero.
    Expired(Role),
}

impl ClockPair {
    /// Both clocks start at the same value.
    pub fn new(seconds: u32) -> Self {
        Self {
            player1: seconds,
            player2: seconds,
        }
    }

    /// Remaining seconds for a role.
    pub fn remaining(&self, role: Role) -> u32 {
        match role {
            Role::Player1 => self.player1,
            Role::Player2 => self.player2,
        }
    }

    /// Runs the active clock down by one second. The other clock stays frozen.
    ///
    /// A clock already at zero reports `Expired` again; the caller freezes the
    /// match on the first one.
    #[instrument(skip(self))]
    pub fn tick(&mut self, active: Role) -> ClockTick {
        let slot = match active {
            Role::Player1 => &mut self.player1,
            Role::Player2 => &mut self.player2,
        };
        *slot = slot.saturating_sub(1);
        if *slot == 0 {
            debug!(role = %active, "Clock expired");
            ClockTick::Expired(active)
        } else {
            ClockTick::Running(*slot)
        }
    }

    /// Keeps the lower reading for each side.
    ///
    /// Used for peer move broadcasts, which must not wind a clock back up.
    pub fn merge_min(&mut self, other: &ClockPair) {
        self.player1 = self.player1.min(other.player1);
        self.player2 = self.player2.min(other.player2);
    }
}

/// Formats seconds as `m:ss`.
pub fn format_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_active_clock_runs() {
        let mut clocks = ClockPair::new(10);
        assert_eq!(clocks.tick(Role::Player1), ClockTick::Running(9));
        assert_eq!(clocks.remaining(Role::Player2), 10);
    }

    #[test]
    fn test_expiry_at_zero() {
        let mut clocks = ClockPair::new(1);
        assert_eq!(clocks.tick(Role::Player2), ClockTick::Expired(Role::Player2));
        assert_eq!(clocks.remaining(Role::Player2), 0);
    }

    #[test]
    fn test_clock_starting_at_zero_expires() {
        let mut clocks = ClockPair {
            player1: 0,
            player2: 300,
        };
        assert_eq!(clocks.tick(Role::Player1), ClockTick::Expired(Role::Player1));
        assert_eq!(clocks.tick(Role::Player1), ClockTick::Expired(Role::Player1));
        assert_eq!(clocks.remaining(Role::Player1), 0);
        assert_eq!(clocks.remaining(Role::Player2), 300);
    }

    #[test]
    fn test_merge_min_never_adds_time() {
        let mut clocks = ClockPair {
            player1: 30,
            player2: 50,
        };
        clocks.merge_min(&ClockPair {
            player1: 40,
            player2: 20,
        });
        assert_eq!(clocks, ClockPair { player1: 30, player2: 20 });
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(605), "10:05");
        assert_eq!(format_clock(9), "0:09");
    }
}
