//! Data preparation and centralized training for the WISDM v1.1
//! human-activity-recognition dataset.
//!
//! The pipeline turns raw per-client accelerometer logs into windowed,
//! stratified, per-fold-normalized JSON partitions, which the loader
//! reconstructs into batched tensors for the MLP trainer.

pub mod common;
pub mod config;
pub mod dataset;
pub mod error;
pub mod folds;
pub mod merge;
pub mod model;
pub mod partition;
pub mod trainer;
