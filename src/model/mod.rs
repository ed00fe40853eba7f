//! Model artifact, scoring function, and the store that hot-swaps them.

pub mod artifact;
pub mod forest;
pub mod store;

// Re-export commonly used types
pub use artifact::Model;
pub use forest::{ForestParams, IsolationForest};
pub use store::{ModelStore, StoreError};
