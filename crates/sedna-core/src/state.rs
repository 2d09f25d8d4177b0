use crate::protocol::SessionSnapshot;
use crate::session::SessionState;
use tokio::sync::RwLock;

/// Shared, read-mostly view of the session.  The event loop is the only
/// writer; socket and HTTP readers clone the latest snapshot.
pub struct StateManager {
    state: RwLock<SessionSnapshot>,
}

impl StateManager {
    pub fn new(session: &SessionState) -> Self {
        Self {
            state: RwLock::new(session.snapshot(1)),
        }
    }

    pub async fn get_state(&self) -> SessionSnapshot {
        self.state.read().await.clone()
    }

    /// Store a fresh snapshot of `session` under the next revision.
    pub async fn publish(&self, session: &SessionState) -> SessionSnapshot {
        let mut state = self.state.write().await;
        let next = session.snapshot(state.rev + 1);
        *state = next.clone();
        next
    }
}
