//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `run`    | `Run`            |
//! | `status` | `Status`         |
//! | `reset`  | `Reset`          |

pub mod reset;
pub mod run;
pub mod status;

pub use reset::cmd_reset;
pub use run::cmd_run;
pub use status::cmd_status;
