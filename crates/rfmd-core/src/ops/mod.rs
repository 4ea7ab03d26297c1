//! File and process operations behind the command vocabulary

pub mod files;
pub mod mode;
pub mod process;

pub use mode::{ModeChange, Who};
pub use process::{ProcFs, ProcessTable};
