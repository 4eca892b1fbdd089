//! Online course marketplace: catalog, enrollments, progress tracking,
//! ratings, discussions, certificates and badges behind an axum HTTP API.

pub mod core;
pub mod learn;
pub mod main_module;
