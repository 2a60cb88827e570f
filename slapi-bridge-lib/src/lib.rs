#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod jsonpath;
pub mod session;
pub mod transport;
pub mod wifi;

pub use config::{load_from_path, Config};
pub use error::{BridgeError, Result};
pub use session::Session;
pub use transport::Transport;
