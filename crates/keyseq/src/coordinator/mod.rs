mod config;
mod mutex;
mod state;
mod submission;
mod wait;
mod write_coordinator;

pub use config::*;
pub use state::QueueSnapshot;
pub use submission::*;
pub use wait::WaitUntil;
pub use write_coordinator::*;
