pub mod config;
pub mod dispatch;
pub mod error;
pub mod ipc;
pub mod jail;
pub mod ops;

pub use config::AppConfig;
pub use dispatch::{CommandKind, Dispatcher, Flow};
pub use error::{Error, Result};
pub use ipc::{DaemonClient, DaemonServer, Frame};
pub use jail::{PathResolver, Session, VirtualRoot};
