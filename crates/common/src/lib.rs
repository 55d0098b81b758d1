//! Shared types for the vault and loan engine
//! Fixed-point arithmetic, token amounts, identifiers and the error taxonomy

pub mod amount;
pub mod error;
pub mod fixed;
pub mod math;
pub mod types;

// Re-export commonly used types
pub use amount::*;
pub use error::*;
pub use fixed::*;
pub use math::Rounding;
pub use types::*;
