pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod template;
pub mod validation;

pub use error::{ErrorDetail, ErrorReport, SyncError};
