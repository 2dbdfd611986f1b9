//! Park monitoring service: threshold classification for area occupancy and
//! environmental sensor readings, with debounced alerting.

pub mod alert;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod registry;
