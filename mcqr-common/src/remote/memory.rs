//! In-process remote with conditional-write semantics

use super::{RemoteContent, RemoteRepository, VersionToken};
use crate::snapshot::digest_hex;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug)]
struct Stored {
    bytes: Vec<u8>,
    revision: u64,
    last_message: String,
}

impl Stored {
    /// Token covers the revision so rewriting identical bytes still moves it
    fn token(&self) -> String {
        let mut material = self.revision.to_be_bytes().to_vec();
        material.extend_from_slice(&self.bytes);
        digest_hex(&material)
    }
}

/// Remote copy held in memory
///
/// Used to run the service without a hosted repository and to exercise the
/// concurrency handshake in tests.
pub struct MemoryRemote {
    name: String,
    stored: Mutex<Option<Stored>>,
}

impl MemoryRemote {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            stored: Mutex::new(Some(Stored {
                bytes,
                revision: 0,
                last_message: String::new(),
            })),
        }
    }

    /// Remote whose resource does not exist yet
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stored: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Stored>> {
        self.stored.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current content, `None` when the resource is missing
    pub fn content(&self) -> Option<Vec<u8>> {
        self.lock().as_ref().map(|s| s.bytes.clone())
    }

    /// Number of accepted writes
    pub fn revision(&self) -> u64 {
        self.lock().as_ref().map(|s| s.revision).unwrap_or(0)
    }

    /// Message of the last accepted write
    pub fn last_message(&self) -> Option<String> {
        self.lock().as_ref().map(|s| s.last_message.clone())
    }

    /// Unconditional write, as another writer outside the handshake would do
    pub fn overwrite(&self, bytes: Vec<u8>, message: &str) {
        let mut stored = self.lock();
        let revision = stored.as_ref().map(|s| s.revision + 1).unwrap_or(0);
        *stored = Some(Stored {
            bytes,
            revision,
            last_message: message.to_string(),
        });
    }
}

#[async_trait]
impl RemoteRepository for MemoryRemote {
    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }

    async fn fetch(&self) -> Result<RemoteContent> {
        let stored = self.lock();
        let current = stored
            .as_ref()
            .ok_or_else(|| Error::RemoteResourceMissing(self.describe()))?;

        Ok(RemoteContent {
            bytes: current.bytes.clone(),
            token: VersionToken::new(current.token()),
        })
    }

    async fn put_conditional(
        &self,
        bytes: Vec<u8>,
        expected: VersionToken,
        message: &str,
    ) -> Result<()> {
        let mut stored = self.lock();
        let current = stored
            .as_mut()
            .ok_or_else(|| Error::RemoteResourceMissing(self.name.clone()))?;

        let actual = current.token();
        if actual != expected.as_str() {
            return Err(Error::VersionConflict(format!(
                "{} is at {} but the write expected {}",
                self.name, actual, expected
            )));
        }

        current.bytes = bytes;
        current.revision += 1;
        current.last_message = message.to_string();
        debug!("{} accepted revision {}", self.name, current.revision);
        Ok(())
    }
}
