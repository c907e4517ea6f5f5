/// Phases a gateway connection moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticating,
    Active,
    Closing,
    Closed,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("illegal connection transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl ConnectionState {
    pub fn can_transition(self, to: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, to),
            (Connecting, Authenticating)
                | (Connecting, Closed)
                | (Authenticating, Active)
                | (Authenticating, Closed)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }
}

/// Tracks one connection's state and rejects out-of-order moves.
#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn advance(&mut self, to: ConnectionState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition(to) {
            return Err(IllegalTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(from = ?self.state, to = ?to, "connection state");
        self.state = to;
        Ok(())
    }
}
