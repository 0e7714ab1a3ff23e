//! Annotator registry
//!
//! Maps each configured annotator to a ready [`SessionCoordinator`]: its
//! backing store, assignment filter, progress tracker, image lookup and,
//! when enabled, remote synchronizer. Resolved once at startup.

use crate::config::{resolve_under, DatasetKind, TomlConfig};
use crate::images::ImageLookup;
use crate::progress::{ProgressTracker, SqliteProgressTracker};
use crate::remote::{ContentsApiRemote, RemoteRepository, RemoteSynchronizer};
use crate::session::{AssignmentFilter, SessionCoordinator};
use crate::store::{CsvRecordStore, RecordStore, SqliteRecordStore};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
pub struct AnnotatorRegistry {
    order: Vec<String>,
    sessions: BTreeMap<String, Arc<SessionCoordinator>>,
}

impl AnnotatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a coordinator under its annotator name
    pub fn insert(&mut self, coordinator: SessionCoordinator) -> Result<()> {
        let name = coordinator.annotator().to_string();
        if self.sessions.contains_key(&name) {
            return Err(Error::Configuration(format!(
                "annotator {} configured twice",
                name
            )));
        }
        self.order.push(name.clone());
        self.sessions.insert(name, Arc::new(coordinator));
        Ok(())
    }

    pub fn get(&self, annotator: &str) -> Option<&Arc<SessionCoordinator>> {
        self.sessions.get(annotator)
    }

    /// Annotator names in configuration order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Build every coordinator described by `config` under `root`
    ///
    /// The remote credential is checked here, before any remote call.
    pub async fn from_config(config: &TomlConfig, root: &Path) -> Result<Self> {
        if config.annotators.is_empty() {
            return Err(Error::Configuration("no annotators configured".to_string()));
        }
        for name in &config.annotators {
            validate_annotator_name(name)?;
        }

        let remote_credential = if config.remote.enabled {
            config.remote.validate()?;
            // Member databases hold disjoint records, so a shared remote file
            // would be replaced by whichever member pushed last
            if config.dataset.kind == DatasetKind::Sqlite
                && !config.remote.path.contains("{annotator}")
            {
                return Err(Error::Configuration(format!(
                    "remote.path `{}` must contain {{annotator}} when dataset.kind = \"sqlite\"",
                    config.remote.path
                )));
            }
            Some(config.remote.load_credential()?)
        } else {
            None
        };

        let progress: Arc<dyn ProgressTracker> = Arc::new(
            SqliteProgressTracker::open(&resolve_under(root, &config.dataset.progress_database))
                .await?,
        );
        let images = ImageLookup::new(
            resolve_under(root, &config.images.folder),
            &config.images.extension,
        );

        // Annotators mirroring the same resource share one synchronizer
        let mut remotes: HashMap<String, RemoteSynchronizer> = HashMap::new();
        let shared_csv: Option<Arc<dyn RecordStore>> = match config.dataset.kind {
            DatasetKind::Csv => Some(Arc::new(CsvRecordStore::new(resolve_under(
                root,
                &config.dataset.csv_file,
            )))),
            DatasetKind::Sqlite => None,
        };

        let mut registry = Self::new();
        for name in &config.annotators {
            let (store, filter): (Arc<dyn RecordStore>, AssignmentFilter) = match &shared_csv {
                Some(store) => (store.clone(), AssignmentFilter::Annotator(name.clone())),
                None => {
                    let path = resolve_under(root, &config.dataset.member_folder)
                        .join(format!("{}.db", name));
                    let store: Arc<dyn RecordStore> =
                        Arc::new(SqliteRecordStore::open(&path).await?);
                    (store, AssignmentFilter::Everything)
                }
            };

            let mut coordinator = SessionCoordinator::new(
                name.clone(),
                filter,
                store.clone(),
                progress.clone(),
                images.clone(),
            );

            if let Some(credential) = &remote_credential {
                let resource = config.remote.resource_path(name);
                let sync = match remotes.get(&resource) {
                    Some(existing) => existing.clone(),
                    None => {
                        let remote: Arc<dyn RemoteRepository> = Arc::new(ContentsApiRemote::new(
                            &config.remote,
                            &resource,
                            credential.clone(),
                        )?);
                        let sync = RemoteSynchronizer::new(remote);
                        remotes.insert(resource.clone(), sync.clone());
                        sync
                    }
                };
                coordinator = coordinator.with_synchronizer(sync);
            }

            info!(
                "Annotator {} → {}{}",
                name,
                store.describe(),
                coordinator
                    .synchronizer()
                    .map(|s| format!(" (mirrored to {})", s.describe()))
                    .unwrap_or_default()
            );
            registry.insert(coordinator)?;
        }

        Ok(registry)
    }
}

/// Names double as file names in the per-annotator layout
fn validate_annotator_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed != name
        || name.contains(['/', '\\'])
        || name == "."
        || name == ".."
    {
        return Err(Error::Configuration(format!(
            "invalid annotator name: {:?}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotator_names_must_be_plain() {
        assert!(validate_annotator_name("Amit").is_ok());
        assert!(validate_annotator_name("Junda Li").is_ok());
        assert!(validate_annotator_name("").is_err());
        assert!(validate_annotator_name(" Amit").is_err());
        assert!(validate_annotator_name("../etc").is_err());
        assert!(validate_annotator_name("..").is_err());
    }
}
