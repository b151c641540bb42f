pub mod audit;
pub mod config;
pub mod errors;
pub mod logging;
pub mod orchestrator;
pub mod phase;
pub mod ui;
