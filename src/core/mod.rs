//! Core data types for the streaming scoring path.
//!
//! This module contains:
//! - Sample and feature schema types shared across the pipeline
//! - The rolling feature window that derives model input from samples

pub mod sample;
pub mod window;

// Re-export commonly used types
pub use sample::{FeatureSchema, FeatureVector, Sample, SchemaMismatch};
pub use window::FeatureWindow;
