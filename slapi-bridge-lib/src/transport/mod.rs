mod gpio;
mod uart;

pub use gpio::GpioTransport;
pub use uart::UartTransport;

use crate::config::{SerialSettings, TransportConfig};
use crate::error::Result;

/// Byte-stream transport between the bridge and the tethered host.
///
/// `read` and `write` may transfer fewer bytes than offered (including
/// zero); callers loop. The mode-switch pair only matters for half-duplex
/// transports; the default implementations are no-ops.
pub trait Transport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Non-blocking probe for a pending byte, used by the flow-control
    /// scanner while the session is emitting a response. Half-duplex
    /// transports report `None`: the peer cannot drive the bus while the
    /// bridge holds the write direction.
    fn poll_byte(&mut self) -> Result<Option<u8>> {
        Ok(None)
    }

    fn set_read_mode(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_write_mode(&mut self) -> Result<()> {
        Ok(())
    }

    /// Applies new line settings at runtime (SERIAL command). Transports
    /// without a configurable line ignore this.
    fn reconfigure(&mut self, settings: &SerialSettings) -> Result<()> {
        let _ = settings;
        Ok(())
    }
}

/// Builds the transport selected by the configuration.
pub fn build(config: &TransportConfig) -> Result<Box<dyn Transport>> {
    match config {
        TransportConfig::Uart(cfg) => Ok(Box::new(UartTransport::open(cfg)?)),
        TransportConfig::Gpio(cfg) => Ok(Box::new(GpioTransport::open(cfg)?)),
    }
}
