//! mcqr-rv library - Review service
//!
//! HTTP front for the per-annotator review sessions. Every request for an
//! annotator holds that annotator's gate for the whole action, so two
//! browser tabs of one annotator cannot interleave a read-modify-write.

use axum::Router;
use mcqr_common::registry::AnnotatorRegistry;
use mcqr_common::session::SessionCoordinator;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;

use api::ReviewError;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    registry: Arc<AnnotatorRegistry>,
    gates: Arc<BTreeMap<String, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(registry: AnnotatorRegistry) -> Self {
        let gates = registry
            .names()
            .iter()
            .map(|name| (name.clone(), Arc::new(Mutex::new(()))))
            .collect();
        Self {
            registry: Arc::new(registry),
            gates: Arc::new(gates),
        }
    }

    pub fn annotators(&self) -> &[String] {
        self.registry.names()
    }

    /// Coordinator for `annotator`, exclusively held until the guard drops
    pub async fn acquire(
        &self,
        annotator: &str,
    ) -> Result<(Arc<SessionCoordinator>, OwnedMutexGuard<()>), ReviewError> {
        let (Some(coordinator), Some(gate)) =
            (self.registry.get(annotator), self.gates.get(annotator))
        else {
            return Err(ReviewError::UnknownAnnotator(annotator.to_string()));
        };
        let guard = gate.clone().lock_owned().await;
        Ok((coordinator.clone(), guard))
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let review = Router::new()
        .route("/api/annotators", get(api::list_annotators))
        .route("/api/review/:annotator", get(api::current_view))
        .route("/api/review/:annotator/previous", post(api::previous))
        .route("/api/review/:annotator/next", post(api::next))
        .route("/api/review/:annotator/save", post(api::save))
        .route("/api/review/:annotator/delete", post(api::delete))
        .route("/api/review/:annotator/sync", post(api::resync))
        .route("/api/review/:annotator/categories", get(api::categories))
        .route("/api/review/:annotator/image", get(api::image));

    Router::new()
        .merge(review)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
