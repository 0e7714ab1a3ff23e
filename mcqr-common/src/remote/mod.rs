//! Remote copy of the dataset and optimistic-concurrency synchronization
//!
//! A push fetches the remote's current version token, then submits a
//! conditional write naming that token. The remote refuses the write with
//! `VersionConflict` when its content moved in between, so a concurrent
//! writer's change is never overwritten silently.

mod contents_api;
mod memory;
mod sync;

pub use contents_api::ContentsApiRemote;
pub use memory::MemoryRemote;
pub use sync::{PushTicket, RemoteSynchronizer};

use crate::Result;
use async_trait::async_trait;
use std::fmt;

/// Opaque marker of the remote content a read observed
///
/// Deliberately not `Clone`: a token is consumed by exactly one conditional
/// write.
#[derive(PartialEq, Eq)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionToken({})", self.0)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote content together with the token identifying it
#[derive(Debug)]
pub struct RemoteContent {
    pub bytes: Vec<u8>,
    pub token: VersionToken,
}

/// One remote resource supporting read and conditional write
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// Human readable address, used in logs and messages
    fn describe(&self) -> String;

    /// Current content and version token
    ///
    /// Fails with `RemoteUnreachable`, `RemoteTimeout`, `RemoteAuthFailure`
    /// or `RemoteResourceMissing`.
    async fn fetch(&self) -> Result<RemoteContent>;

    /// Replace the content only if the remote is still at `expected`
    ///
    /// Fails with `VersionConflict` when it is not. `PushUnconfirmed` means
    /// the write may or may not have been applied.
    async fn put_conditional(
        &self,
        bytes: Vec<u8>,
        expected: VersionToken,
        message: &str,
    ) -> Result<()>;
}
