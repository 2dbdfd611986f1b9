/// Ingestion call sites that combine classification with alerting.
///
/// Submodules:
/// - `flow` — area occupancy status sweep.
/// - `environment` — sensor reading upload, recalculation, device status.

pub mod environment;
pub mod flow;
