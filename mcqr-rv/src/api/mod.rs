//! HTTP API handlers for mcqr-rv

pub mod health;
pub mod review;

pub use health::health_routes;
pub use review::{
    categories, current_view, delete, image, list_annotators, next, previous, resync, save,
    ReviewError,
};
