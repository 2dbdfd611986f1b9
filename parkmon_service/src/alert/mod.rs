//! Threshold classification and alert deduplication.
//!
//! Submodules:
//! - `thresholds` — pure occupancy / sensor-band classification.
//! - `debounce` — in-memory alert store with a suppression window.

pub mod debounce;
pub mod thresholds;
