pub mod naming;
pub mod sql_validator;

pub use naming::normalize;
pub use sql_validator::*;
