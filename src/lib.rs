// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod cycle;
pub mod driver;
pub mod extract;
pub mod listing;
pub mod notify;
pub mod scheduler;
pub mod sheets;
pub mod store;
pub mod telemetry;
pub mod translate;

// ---- Re-exports for stable public API ----
pub use crate::cycle::{run_cycle, CycleContext, CycleReport, FatalError, Sinks};
pub use crate::listing::{ExportRow, Listing, SeenRecord};
pub use crate::store::SeenStore;
