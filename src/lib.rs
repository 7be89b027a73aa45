pub mod daemon;

pub use daemon::config::Config;
pub use daemon::errors::{Result, SyncError};
pub use daemon::manager::Manager;
pub use daemon::trigger::{handle_trigger, TriggerRequest, TriggerResponse};
