//! Terminal UI for watching a validation run live

pub mod checker;

pub use checker::ProbeMonitorApp;
