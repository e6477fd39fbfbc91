pub mod function;
pub mod integration;
pub mod policy;
pub mod report;
pub mod stack;
pub mod state;

pub use function::*;
pub use integration::*;
pub use policy::*;
pub use report::*;
pub use stack::*;
pub use state::*;
