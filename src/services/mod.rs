pub mod cloud;
pub mod function_registrar;
pub mod integration;
pub mod reconciliation;
pub mod teardown;
pub mod trust_policy;
pub mod warehouse; // Warehouse sessions and statement building

#[cfg(test)]
pub mod testing;

pub use cloud::*;
pub use function_registrar::*;
pub use integration::*;
pub use reconciliation::*;
pub use teardown::*;
pub use trust_policy::*;
