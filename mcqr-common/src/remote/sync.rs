//! Remote Synchronizer
//!
//! Stateless adapter between a local snapshot and one remote resource. No
//! retries and no merging happen here: a refused or failed push is reported
//! to the caller, which decides whether to re-read and try again.

use super::{RemoteRepository, VersionToken};
use crate::snapshot::DatasetSnapshot;
use crate::store::RecordStore;
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Version token obtained by [`RemoteSynchronizer::prepare`]
///
/// Consumed by exactly one [`RemoteSynchronizer::commit`].
#[derive(Debug)]
pub struct PushTicket {
    token: VersionToken,
}

impl PushTicket {
    pub fn token(&self) -> &VersionToken {
        &self.token
    }
}

#[derive(Clone)]
pub struct RemoteSynchronizer {
    remote: Arc<dyn RemoteRepository>,
}

impl RemoteSynchronizer {
    pub fn new(remote: Arc<dyn RemoteRepository>) -> Self {
        Self { remote }
    }

    pub fn describe(&self) -> String {
        self.remote.describe()
    }

    /// Step 1 of the handshake: read the remote's current version token
    pub async fn prepare(&self) -> Result<PushTicket> {
        let current = self.remote.fetch().await?;
        Ok(PushTicket {
            token: current.token,
        })
    }

    /// Steps 2-4: encode `snapshot` and write it conditionally on the ticket
    pub async fn commit(
        &self,
        ticket: PushTicket,
        snapshot: &DatasetSnapshot,
        message: &str,
    ) -> Result<()> {
        let bytes = snapshot.to_csv()?;

        match self.remote.put_conditional(bytes, ticket.token, message).await {
            Ok(()) => {
                info!(
                    "Pushed {} records to {}: {}",
                    snapshot.len(),
                    self.remote.describe(),
                    message
                );
                Ok(())
            }
            Err(e) => {
                warn!("Push to {} failed: {}", self.remote.describe(), e);
                Err(e)
            }
        }
    }

    /// Full push attempt of the store's current content
    ///
    /// The snapshot is read after the token is fetched, so a write accepted
    /// under that token always carries every local change committed before
    /// it. Returns the snapshot that was pushed.
    pub async fn publish(&self, store: &dyn RecordStore, message: &str) -> Result<DatasetSnapshot> {
        let ticket = self.prepare().await?;
        let snapshot = store.read_all().await?;
        self.commit(ticket, &snapshot, message).await?;
        Ok(snapshot)
    }

    /// Decode the remote copy, used to re-read after a conflict
    pub async fn pull(&self) -> Result<DatasetSnapshot> {
        let current = self.remote.fetch().await?;
        DatasetSnapshot::from_csv(&current.bytes)
    }

    /// Whether the remote already holds exactly `snapshot`
    ///
    /// The read-verify step before retrying a push whose outcome was lost.
    pub async fn verify(&self, snapshot: &DatasetSnapshot) -> Result<bool> {
        let current = self.remote.fetch().await?;
        Ok(current.bytes == snapshot.to_csv()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Field, Record};
    use crate::remote::MemoryRemote;
    use crate::Error;

    fn snapshot(category: &str) -> DatasetSnapshot {
        DatasetSnapshot::with_catalogue_columns(vec![
            Record::new("10", "Amit").with(Field::Category, category)
        ])
    }

    #[tokio::test]
    async fn test_commit_then_verify() {
        let remote = Arc::new(MemoryRemote::new("temp.csv", snapshot("").to_csv().unwrap()));
        let sync = RemoteSynchronizer::new(remote.clone());

        let local = snapshot("history");
        assert!(!sync.verify(&local).await.unwrap());

        let ticket = sync.prepare().await.unwrap();
        sync.commit(ticket, &local, "edit").await.unwrap();

        assert!(sync.verify(&local).await.unwrap());
        assert_eq!(sync.pull().await.unwrap(), local);
        assert_eq!(remote.revision(), 1);
    }

    #[tokio::test]
    async fn test_stale_ticket_is_refused() {
        let remote = Arc::new(MemoryRemote::new("temp.csv", snapshot("").to_csv().unwrap()));
        let sync = RemoteSynchronizer::new(remote.clone());

        let stale = sync.prepare().await.unwrap();
        let fresh = sync.prepare().await.unwrap();
        sync.commit(fresh, &snapshot("geography"), "other writer").await.unwrap();

        let err = sync
            .commit(stale, &snapshot("history"), "late writer")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VersionConflict(_)));
        assert_eq!(sync.pull().await.unwrap(), snapshot("geography"));
    }

    #[tokio::test]
    async fn test_missing_resource_is_terminal() {
        let sync = RemoteSynchronizer::new(Arc::new(MemoryRemote::missing("gone.csv")));
        let err = sync.prepare().await.unwrap_err();
        assert!(matches!(err, Error::RemoteResourceMissing(_)));
    }
}
