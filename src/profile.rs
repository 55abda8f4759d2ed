use crate::{
    authority::{
        AuthorityClient,
        AuthorityError,
    },
    types::ProfileSnapshot,
};
use tracing::warn;

/// Holds the most recent ledger snapshot. Each successful refresh replaces
/// it wholesale; a failed refresh keeps the previous snapshot on display and
/// records a non-fatal error.
#[derive(Default)]
pub struct ProfileSync {
    snapshot: Option<ProfileSnapshot>,
    last_error: Option<String>,
}

impl ProfileSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sync that already holds a snapshot, for fixtures.
    pub fn with_snapshot(snapshot: ProfileSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            last_error: None,
        }
    }

    pub fn snapshot(&self) -> Option<&ProfileSnapshot> {
        self.snapshot.as_ref()
    }

    /// Last balance reported by the authority, used to gate bets locally.
    pub fn balance(&self) -> Option<u64> {
        self.snapshot.as_ref().map(|snapshot| snapshot.balance)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub async fn refresh(
        &mut self,
        authority: &AuthorityClient,
    ) -> Result<(), AuthorityError> {
        match authority.profile().await {
            Ok(snapshot) => {
                self.snapshot = Some(snapshot);
                self.last_error = None;
                Ok(())
            }
            Err(err) => {
                warn!(%err, "profile refresh failed; keeping previous snapshot");
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Forget the snapshot along with the session it belonged to.
    pub fn clear(&mut self) {
        self.snapshot = None;
        self.last_error = None;
    }
}
