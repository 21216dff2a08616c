//! Transaction lifecycle states.
//!
//! The lifecycle is a one-way graph: no edge ever returns to a state that
//! was already visited, and `SETTLED` / `CANCELLED` are terminal.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    /// Created, no escrow yet.
    Initiated,
    /// Provider has quoted.
    Quoted,
    /// Funds locked in escrow.
    Committed,
    /// Provider is working.
    InProgress,
    /// Provider has delivered; dispute window running.
    Delivered,
    /// Funds disbursed. Terminal.
    Settled,
    /// Requester contested the delivery.
    Disputed,
    /// Transaction abandoned. Terminal.
    Cancelled,
}

impl TransactionState {
    /// All states, in lifecycle order.
    pub const ALL: [Self; 8] = [
        Self::Initiated,
        Self::Quoted,
        Self::Committed,
        Self::InProgress,
        Self::Delivered,
        Self::Settled,
        Self::Disputed,
        Self::Cancelled,
    ];

    /// States directly reachable from this one.
    #[must_use]
    pub const fn valid_targets(&self) -> &'static [Self] {
        use TransactionState::{
            Cancelled, Committed, Delivered, Disputed, InProgress, Initiated, Quoted, Settled,
        };

        match self {
            Initiated => &[Quoted, Committed, Cancelled],
            Quoted => &[Committed, Cancelled],
            Committed => &[InProgress, Cancelled],
            InProgress => &[Delivered, Cancelled],
            Delivered => &[Settled, Disputed],
            Disputed => &[Settled, Cancelled],
            Settled | Cancelled => &[],
        }
    }

    /// Checks if a transition to the target state is in the table.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        self.valid_targets().contains(&target)
    }

    /// Returns true for `SETTLED` and `CANCELLED`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Cancelled)
    }

    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "INITIATED",
            Self::Quoted => "QUOTED",
            Self::Committed => "COMMITTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Delivered => "DELIVERED",
            Self::Settled => "SETTLED",
            Self::Disputed => "DISPUTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use test_case::test_case;
    use TransactionState::*;

    #[test_case(Initiated, Quoted ; "initiated to quoted")]
    #[test_case(Initiated, Committed ; "initiated to committed")]
    #[test_case(Initiated, Cancelled ; "initiated to cancelled")]
    #[test_case(Quoted, Committed ; "quoted to committed")]
    #[test_case(Quoted, Cancelled ; "quoted to cancelled")]
    #[test_case(Committed, InProgress ; "committed to in progress")]
    #[test_case(Committed, Cancelled ; "committed to cancelled")]
    #[test_case(InProgress, Delivered ; "in progress to delivered")]
    #[test_case(InProgress, Cancelled ; "in progress to cancelled")]
    #[test_case(Delivered, Settled ; "delivered to settled")]
    #[test_case(Delivered, Disputed ; "delivered to disputed")]
    #[test_case(Disputed, Settled ; "disputed to settled")]
    #[test_case(Disputed, Cancelled ; "disputed to cancelled")]
    fn allowed_edges(from: TransactionState, to: TransactionState) {
        assert!(from.can_transition_to(to));
    }

    #[test_case(Delivered, Cancelled ; "delivered cannot cancel")]
    #[test_case(Quoted, Initiated ; "no going back")]
    #[test_case(InProgress, Committed ; "no rewind to committed")]
    #[test_case(Initiated, InProgress ; "must fund first")]
    #[test_case(Committed, Delivered ; "must start work first")]
    fn rejected_edges(from: TransactionState, to: TransactionState) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn terminal_states_have_no_targets() {
        for state in TransactionState::ALL {
            assert_eq!(state.is_terminal(), state.valid_targets().is_empty());
        }
    }

    #[test]
    fn no_self_loops() {
        for state in TransactionState::ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn graph_is_acyclic() {
        fn visit(state: TransactionState, path: &mut Vec<TransactionState>) {
            for next in state.valid_targets() {
                assert!(!path.contains(next), "cycle through {next}");
                path.push(*next);
                visit(*next, path);
                path.pop();
            }
        }

        visit(Initiated, &mut vec![Initiated]);
    }

    #[test]
    fn every_state_reachable_from_initiated() {
        let mut seen = HashSet::from([Initiated]);
        let mut frontier = vec![Initiated];
        while let Some(state) = frontier.pop() {
            for next in state.valid_targets() {
                if seen.insert(*next) {
                    frontier.push(*next);
                }
            }
        }
        assert_eq!(seen.len(), TransactionState::ALL.len());
    }

    #[test]
    fn serde_uses_screaming_case() {
        let json = serde_json::to_string(&InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        assert_eq!(InProgress.to_string(), "IN_PROGRESS");
    }
}
