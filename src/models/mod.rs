//! Data models

pub mod audit;
pub mod drift;
pub mod fairness;
pub mod policy;
pub mod prediction;
pub mod registry;
pub mod risk;

pub use audit::*;
pub use drift::*;
pub use fairness::*;
pub use policy::*;
pub use prediction::*;
pub use registry::*;
pub use risk::*;
