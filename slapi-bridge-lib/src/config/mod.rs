mod loader;
mod types;

pub use loader::{load_from_path, parse};
pub use types::{
    BusWidth, Config, GpioConfig, Parity, SerialSettings, TransportConfig, UartConfig, WifiConfig,
};
