use std::time::Duration;

use rppal::uart::{Queue, Uart};
use tracing::{debug, info};

use crate::config::{Parity, SerialSettings, UartConfig};
use crate::error::Result;
use crate::transport::Transport;

/// Poll budget for idle reads; keeps `read` returning 0 periodically so the
/// session's line reader stays responsive without spinning on the tty.
const READ_POLL: Duration = Duration::from_millis(100);

/// Full-duplex transport over a hardware UART.
pub struct UartTransport {
    uart: Uart,
}

impl UartTransport {
    pub fn open(cfg: &UartConfig) -> Result<UartTransport> {
        let mut uart = Uart::with_path(
            &cfg.port,
            cfg.serial.baud,
            map_parity(cfg.serial.parity),
            cfg.serial.data_bits,
            cfg.serial.stop_bits,
        )?;

        // RTS/CTS is wired only when the config names the pins.
        uart.set_hardware_flow_control(cfg.rts_pin != 0 || cfg.cts_pin != 0)?;
        uart.set_read_mode(0, READ_POLL)?;
        uart.set_write_mode(true)?;

        info!(
            port = %cfg.port,
            baud = cfg.serial.baud,
            bits = cfg.serial.data_bits,
            parity = ?cfg.serial.parity,
            stop = cfg.serial.stop_bits,
            tx = cfg.tx_pin,
            rx = cfg.rx_pin,
            rts = cfg.rts_pin,
            cts = cfg.cts_pin,
            rxbuf = cfg.rx_buffer,
            txbuf = cfg.tx_buffer,
            "uart transport ready"
        );

        Ok(UartTransport { uart })
    }
}

impl Transport for UartTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.uart.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.uart.write(buf)?)
    }

    fn poll_byte(&mut self) -> Result<Option<u8>> {
        self.uart.set_read_mode(0, Duration::ZERO)?;
        let mut byte = [0u8; 1];
        let n = self.uart.read(&mut byte);
        self.uart.set_read_mode(0, READ_POLL)?;
        Ok((n? == 1).then_some(byte[0]))
    }

    fn reconfigure(&mut self, settings: &SerialSettings) -> Result<()> {
        self.uart.flush(Queue::Both)?;
        self.uart.set_baud_rate(settings.baud)?;
        self.uart.set_data_bits(settings.data_bits)?;
        self.uart.set_parity(map_parity(settings.parity))?;
        self.uart.set_stop_bits(settings.stop_bits)?;
        debug!(
            baud = settings.baud,
            bits = settings.data_bits,
            parity = ?settings.parity,
            stop = settings.stop_bits,
            "uart reconfigured"
        );
        Ok(())
    }
}

fn map_parity(parity: Parity) -> rppal::uart::Parity {
    match parity {
        Parity::None => rppal::uart::Parity::None,
        Parity::Even => rppal::uart::Parity::Even,
        Parity::Odd => rppal::uart::Parity::Odd,
    }
}
