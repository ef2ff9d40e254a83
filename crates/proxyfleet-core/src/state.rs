//! Provisioning state machine types

use std::fmt;

use kameo_macros::Reply;

/// States of a `HostActor` provisioning pipeline
///
/// `Pending → Connecting → CleaningUp → Installing → Configuring → Extracting
/// → Succeeded`, with `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reply)]
pub enum NodeState {
    Pending,
    Connecting,
    CleaningUp,
    Installing,
    Configuring,
    Extracting,
    Succeeded,
    Failed,
}

impl NodeState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Succeeded | NodeState::Failed)
    }

    /// Next state on the success path
    fn next(self) -> Option<NodeState> {
        match self {
            NodeState::Pending => Some(NodeState::Connecting),
            NodeState::Connecting => Some(NodeState::CleaningUp),
            NodeState::CleaningUp => Some(NodeState::Installing),
            NodeState::Installing => Some(NodeState::Configuring),
            NodeState::Configuring => Some(NodeState::Extracting),
            NodeState::Extracting => Some(NodeState::Succeeded),
            NodeState::Succeeded | NodeState::Failed => None,
        }
    }

    /// Check if a transition is valid
    #[must_use]
    pub fn can_transition_to(self, target: NodeState) -> bool {
        if self.is_terminal() {
            return false;
        }
        target == NodeState::Failed || self.next() == Some(target)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NodeState::Pending => "pending",
            NodeState::Connecting => "connecting",
            NodeState::CleaningUp => "cleaning_up",
            NodeState::Installing => "installing",
            NodeState::Configuring => "configuring",
            NodeState::Extracting => "extracting",
            NodeState::Succeeded => "succeeded",
            NodeState::Failed => "failed",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_path() {
        let mut state = NodeState::Pending;
        let mut visited = vec![state];
        while let Some(next) = state.next() {
            assert!(state.can_transition_to(next));
            state = next;
            visited.push(state);
        }
        assert_eq!(visited.len(), 7);
        assert_eq!(state, NodeState::Succeeded);
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!NodeState::Pending.can_transition_to(NodeState::Installing));
        assert!(!NodeState::Configuring.can_transition_to(NodeState::CleaningUp));
        assert!(!NodeState::Succeeded.can_transition_to(NodeState::Failed));
        assert!(!NodeState::Failed.can_transition_to(NodeState::Pending));
        assert!(NodeState::Installing.can_transition_to(NodeState::Failed));
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeState::CleaningUp.to_string(), "cleaning_up");
    }
}
