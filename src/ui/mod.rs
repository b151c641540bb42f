pub mod icons;
pub mod progress;

pub use progress::{ProgressReporter, StatusSnapshot, format_hms, format_mmss};
