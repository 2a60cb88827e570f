use thiserror::Error;

/// Errors that can occur in the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("local transport disconnected")]
    Disconnected,

    #[error("{0}")]
    Protocol(String),

    #[error("{0}")]
    Network(String),

    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[error("UART error: {0}")]
    Uart(#[from] rppal::uart::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
