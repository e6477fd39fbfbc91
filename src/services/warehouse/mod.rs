// Warehouse abstraction layer
pub mod adapter;
pub mod snowflake;
pub mod statements;

pub use adapter::{Statement, StatementKind, StatementResult, WarehouseSession};
pub use snowflake::SnowflakeSession;
pub use statements::StatementBuilder;

use crate::config::WarehouseConfig;
use crate::error::SyncError;

/// Warehouse type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarehouseType {
    Snowflake,
}

impl WarehouseType {
    pub fn from_str(s: &str) -> Result<Self, SyncError> {
        match s.to_lowercase().as_str() {
            "snowflake" => Ok(WarehouseType::Snowflake),
            _ => Err(SyncError::Config(format!("Unsupported warehouse type: {}", s))),
        }
    }
}

/// Open the single session used for a whole run.
///
/// A failure here is fatal for the run and is never retried.
pub async fn connect(config: &WarehouseConfig) -> Result<Box<dyn WarehouseSession>, SyncError> {
    match WarehouseType::from_str(&config.kind)? {
        WarehouseType::Snowflake => Ok(Box::new(SnowflakeSession::connect(config).await?)),
    }
}
