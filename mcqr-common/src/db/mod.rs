//! Database initialization shared by the record store and progress tracker

pub mod init;

pub use init::*;
