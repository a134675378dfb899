//! Core domain types for order submission records.

pub mod amount;
pub mod price;
pub mod transaction;

pub use amount::*;
pub use price::*;
pub use transaction::*;
