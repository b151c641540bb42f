pub mod lock;
pub mod pause;
pub mod runner;
pub mod scheduler;
pub mod stall;
pub mod state;
pub mod target;

pub use lock::RunLock;
pub use pause::PauseController;
pub use runner::AgentRunner;
pub use scheduler::{RunOutcome, Scheduler};
pub use stall::StallDetector;
pub use state::StateManager;
pub use target::TargetPolicy;
