use std::thread;
use std::time::{Duration, Instant};

use rppal::gpio::{Gpio, InputPin, Level, OutputPin};
use tracing::{info, trace};

use crate::config::{BusWidth, GpioConfig};
use crate::error::{BridgeError, Result};
use crate::transport::Transport;

/// Transfer direction of the half-duplex parallel link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy)]
enum Line {
    Valid,
    Ack,
}

/// Raw access to the link's lines, so the handshake engine can run against
/// real pins or an in-memory wire.
///
/// In write direction the data lines and VALID are driven and ACK is
/// sampled; in read direction the data lines and VALID are sampled and ACK
/// is driven.
trait ParallelPort {
    fn set_direction(&mut self, dir: Direction) -> Result<()>;
    fn drive_data(&mut self, bits: u8);
    fn sample_data(&self) -> u8;
    fn set_valid(&mut self, high: bool);
    fn valid(&self) -> bool;
    fn set_ack(&mut self, high: bool);
    fn ack(&self) -> bool;
}

enum PortPins {
    Reading {
        data: Vec<InputPin>,
        valid: InputPin,
        ack: OutputPin,
    },
    Writing {
        data: Vec<OutputPin>,
        valid: OutputPin,
        ack: InputPin,
    },
}

/// `ParallelPort` over the BCM GPIO pins.
struct GpioPort {
    gpio: Gpio,
    data_ids: Vec<u8>,
    valid_id: u8,
    ack_id: u8,
    pins: Option<PortPins>,
}

impl GpioPort {
    fn open(cfg: &GpioConfig) -> Result<GpioPort> {
        Ok(GpioPort {
            gpio: Gpio::new()?,
            data_ids: cfg.data_pins.clone(),
            valid_id: cfg.valid_pin,
            ack_id: cfg.ack_pin,
            pins: None,
        })
    }

    fn input(&self, id: u8) -> Result<InputPin> {
        let mut pin = self.gpio.get(id)?.into_input_pullup();
        pin.set_reset_on_drop(false);
        Ok(pin)
    }

    fn output_low(&self, id: u8) -> Result<OutputPin> {
        let mut pin = self.gpio.get(id)?.into_output_low();
        pin.set_reset_on_drop(false);
        Ok(pin)
    }
}

impl ParallelPort for GpioPort {
    fn set_direction(&mut self, dir: Direction) -> Result<()> {
        // Release the current pins first; the GPIO driver refuses to hand
        // out a pin that is still taken.
        self.pins = None;
        self.pins = Some(match dir {
            Direction::Write => PortPins::Writing {
                data: self
                    .data_ids
                    .iter()
                    .map(|&id| self.output_low(id))
                    .collect::<Result<_>>()?,
                valid: self.output_low(self.valid_id)?,
                ack: self.input(self.ack_id)?,
            },
            Direction::Read => PortPins::Reading {
                data: self
                    .data_ids
                    .iter()
                    .map(|&id| self.input(id))
                    .collect::<Result<_>>()?,
                valid: self.input(self.valid_id)?,
                ack: self.output_low(self.ack_id)?,
            },
        });
        Ok(())
    }

    fn drive_data(&mut self, bits: u8) {
        if let Some(PortPins::Writing { data, .. }) = &mut self.pins {
            for (i, pin) in data.iter_mut().enumerate() {
                pin.write(if (bits >> i) & 1 == 1 {
                    Level::High
                } else {
                    Level::Low
                });
            }
        }
    }

    fn sample_data(&self) -> u8 {
        match &self.pins {
            Some(PortPins::Reading { data, .. }) => data
                .iter()
                .enumerate()
                .fold(0, |byte, (i, pin)| byte | (u8::from(pin.is_high()) << i)),
            _ => 0,
        }
    }

    fn set_valid(&mut self, high: bool) {
        if let Some(PortPins::Writing { valid, .. }) = &mut self.pins {
            valid.write(if high { Level::High } else { Level::Low });
        }
    }

    fn valid(&self) -> bool {
        matches!(&self.pins, Some(PortPins::Reading { valid, .. }) if valid.is_high())
    }

    fn set_ack(&mut self, high: bool) {
        if let Some(PortPins::Reading { ack, .. }) = &mut self.pins {
            ack.write(if high { Level::High } else { Level::Low });
        }
    }

    fn ack(&self) -> bool {
        matches!(&self.pins, Some(PortPins::Writing { ack, .. }) if ack.is_high())
    }
}

/// Byte transport over 4 or 8 data lines plus VALID/ACK strobes.
///
/// Each byte is transferred through a strictly alternating handshake: the
/// writer drives the data lines and raises VALID, the reader samples and
/// answers with ACK, and the writer may not start the next transfer until
/// ACK has been released. In 4-bit mode a byte is two independent
/// handshakes, high nibble first.
pub struct GpioTransport {
    port: Box<dyn ParallelPort + Send>,
    width: BusWidth,
    /// None = wait forever (TIMEOUT_MS 0)
    timeout: Option<Duration>,
    min_hold: Duration,
    direction: Direction,
}

impl std::fmt::Debug for GpioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpioTransport")
            .field("width", &self.width)
            .field("timeout", &self.timeout)
            .field("min_hold", &self.min_hold)
            .field("direction", &self.direction)
            .finish()
    }
}

impl GpioTransport {
    pub fn open(cfg: &GpioConfig) -> Result<GpioTransport> {
        let port = GpioPort::open(cfg)?;
        let transport = Self::with_port(Box::new(port), cfg)?;
        info!(
            width = cfg.width.data_lines(),
            data = ?cfg.data_pins,
            valid = cfg.valid_pin,
            ack = cfg.ack_pin,
            timeout_ms = cfg.timeout_ms,
            hold_ms = cfg.min_hold_time_ms,
            "gpio transport ready"
        );
        Ok(transport)
    }

    fn with_port(port: Box<dyn ParallelPort + Send>, cfg: &GpioConfig) -> Result<GpioTransport> {
        if cfg.data_pins.len() != cfg.width.data_lines() {
            return Err(BridgeError::Config(format!(
                "{}-bit bus requires {} data pins (got {})",
                cfg.width.data_lines(),
                cfg.width.data_lines(),
                cfg.data_pins.len()
            )));
        }

        let mut transport = GpioTransport {
            port,
            width: cfg.width,
            timeout: (cfg.timeout_ms > 0).then(|| Duration::from_millis(cfg.timeout_ms)),
            min_hold: Duration::from_millis(cfg.min_hold_time_ms),
            direction: Direction::Read,
        };
        transport.port.set_direction(Direction::Read)?;
        Ok(transport)
    }

    fn enter(&mut self, dir: Direction) -> Result<()> {
        if self.direction != dir {
            self.port.set_direction(dir)?;
            self.direction = dir;
        }
        Ok(())
    }

    fn wait_for(&mut self, line: Line, high: bool) -> Result<()> {
        let start = Instant::now();
        loop {
            let level = match line {
                Line::Valid => self.port.valid(),
                Line::Ack => self.port.ack(),
            };
            if level == high {
                return Ok(());
            }
            if let Some(budget) = self.timeout {
                if start.elapsed() > budget {
                    return Err(BridgeError::Transport(format!(
                        "timeout waiting for {} to go {}",
                        match line {
                            Line::Valid => "VALID",
                            Line::Ack => "ACK",
                        },
                        if high { "high" } else { "low" }
                    )));
                }
            }
            thread::yield_now();
        }
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        match self.width {
            BusWidth::Eight => self.write_wide(byte),
            BusWidth::Four => {
                self.write_nibble(byte >> 4)?;
                self.write_nibble(byte & 0x0f)
            }
        }
    }

    fn read_byte(&mut self) -> Result<u8> {
        match self.width {
            BusWidth::Eight => self.read_wide(),
            BusWidth::Four => {
                let high = self.read_nibble()?;
                let low = self.read_nibble()?;
                Ok((high << 4) | low)
            }
        }
    }

    fn write_wide(&mut self, byte: u8) -> Result<()> {
        self.enter(Direction::Write)?;
        self.port.drive_data(byte);
        self.port.set_valid(true);
        self.wait_for(Line::Ack, true)?;
        self.port.set_valid(false);
        self.wait_for(Line::Ack, false)
    }

    fn read_wide(&mut self) -> Result<u8> {
        self.enter(Direction::Read)?;
        self.wait_for(Line::Valid, true)?;
        let byte = self.port.sample_data();
        self.port.set_ack(true);
        self.wait_for(Line::Valid, false)?;
        self.port.set_ack(false);
        Ok(byte)
    }

    fn write_nibble(&mut self, nibble: u8) -> Result<()> {
        self.enter(Direction::Write)?;
        self.wait_for(Line::Ack, false)?;
        self.port.drive_data(nibble & 0x0f);
        self.port.set_valid(true);
        self.wait_for(Line::Ack, true)?;
        self.port.set_valid(false);
        // Hold VALID low long enough for a slow reader to see the falling
        // edge before the next nibble's strobe.
        thread::sleep(self.min_hold);
        Ok(())
    }

    fn read_nibble(&mut self) -> Result<u8> {
        self.enter(Direction::Read)?;
        // Resync: a strobe still lingering from the previous transfer must
        // fall before it can count as a new one.
        self.wait_for(Line::Valid, false)?;
        self.wait_for(Line::Valid, true)?;
        let nibble = self.port.sample_data() & 0x0f;
        self.port.set_ack(true);
        thread::sleep(self.min_hold);
        self.wait_for(Line::Valid, false)?;
        self.port.set_ack(false);
        thread::sleep(self.min_hold);
        Ok(nibble)
    }
}

impl Transport for GpioTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read_byte() {
                Ok(byte) => {
                    buf[filled] = byte;
                    filled += 1;
                }
                Err(e) if filled > 0 => {
                    trace!(%e, "short read");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        for &byte in buf {
            self.write_byte(byte)?;
        }
        Ok(buf.len())
    }

    fn set_read_mode(&mut self) -> Result<()> {
        self.enter(Direction::Read)
    }

    fn set_write_mode(&mut self) -> Result<()> {
        self.enter(Direction::Write)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    #[derive(Default)]
    struct Wire {
        data: u8,
        valid: bool,
        ack: bool,
    }

    /// Both endpoints of a test link share one `Wire`; the handshake keeps
    /// them from driving the same line at the same time.
    struct WirePort {
        wire: Arc<Mutex<Wire>>,
    }

    impl ParallelPort for WirePort {
        fn set_direction(&mut self, _dir: Direction) -> Result<()> {
            Ok(())
        }

        fn drive_data(&mut self, bits: u8) {
            self.wire.lock().unwrap().data = bits;
        }

        fn sample_data(&self) -> u8 {
            self.wire.lock().unwrap().data
        }

        fn set_valid(&mut self, high: bool) {
            self.wire.lock().unwrap().valid = high;
        }

        fn valid(&self) -> bool {
            self.wire.lock().unwrap().valid
        }

        fn set_ack(&mut self, high: bool) {
            self.wire.lock().unwrap().ack = high;
        }

        fn ack(&self) -> bool {
            self.wire.lock().unwrap().ack
        }
    }

    fn test_config(width: BusWidth, timeout_ms: u64, hold_ms: u64) -> GpioConfig {
        GpioConfig {
            width,
            data_pins: (0..width.data_lines() as u8).collect(),
            valid_pin: 20,
            ack_pin: 21,
            timeout_ms,
            min_hold_time_ms: hold_ms,
        }
    }

    fn endpoint(wire: &Arc<Mutex<Wire>>, cfg: &GpioConfig) -> GpioTransport {
        GpioTransport::with_port(Box::new(WirePort { wire: wire.clone() }), cfg).unwrap()
    }

    fn eight_bit_pair() -> (GpioTransport, GpioTransport, Arc<Mutex<Wire>>) {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let cfg = test_config(BusWidth::Eight, 2_000, 1);
        (endpoint(&wire, &cfg), endpoint(&wire, &cfg), wire)
    }

    /// The nibble protocol requires the writer's hold to exceed the
    /// reader's post-release holds, so the next strobe only rises once the
    /// reader is back at its resync wait.
    fn four_bit_pair() -> (GpioTransport, GpioTransport, Arc<Mutex<Wire>>) {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let writer = endpoint(&wire, &test_config(BusWidth::Four, 2_000, 50));
        let reader = endpoint(&wire, &test_config(BusWidth::Four, 2_000, 1));
        (writer, reader, wire)
    }

    fn read_exact(reader: &mut GpioTransport, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            filled += reader.read(&mut buf[filled..]).unwrap();
        }
        buf
    }

    #[test]
    fn eight_bit_round_trip() {
        let (mut writer, mut reader, wire) = eight_bit_pair();
        let payload = b"parallel bus \x00\xff\xaa\x55".to_vec();
        let expected = payload.clone();

        let tx = thread::spawn(move || {
            writer.write(&payload).unwrap();
        });
        let got = read_exact(&mut reader, expected.len());
        tx.join().unwrap();

        assert_eq!(got, expected);
        let wire = wire.lock().unwrap();
        assert!(!wire.valid, "VALID must be released after the last byte");
        assert!(!wire.ack, "ACK must be released after the last byte");
    }

    #[test]
    fn four_bit_round_trip() {
        let (mut writer, mut reader, wire) = four_bit_pair();
        let payload = vec![0xab, 0x00, 0xff, 0x5a];
        let expected = payload.clone();

        let tx = thread::spawn(move || {
            // Let the reader reach its first resync wait.
            thread::sleep(Duration::from_millis(20));
            writer.write(&payload).unwrap();
        });
        let got = read_exact(&mut reader, expected.len());
        tx.join().unwrap();

        assert_eq!(got, expected);
        let wire = wire.lock().unwrap();
        assert!(!wire.valid);
        assert!(!wire.ack);
    }

    #[test]
    fn four_bit_sends_high_nibble_first() {
        let (mut writer, mut reader, _wire) = four_bit_pair();

        let tx = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.write(&[0xab]).unwrap();
        });
        let high = reader.read_nibble().unwrap();
        let low = reader.read_nibble().unwrap();
        tx.join().unwrap();

        assert_eq!(high, 0xa);
        assert_eq!(low, 0xb);
    }

    #[test]
    fn write_times_out_without_peer() {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let cfg = test_config(BusWidth::Eight, 50, 1);
        let mut writer = endpoint(&wire, &cfg);

        let start = Instant::now();
        let err = writer.write(&[0x42]).unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn read_times_out_without_peer() {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let cfg = test_config(BusWidth::Four, 50, 1);
        let mut reader = endpoint(&wire, &cfg);

        let mut buf = [0u8; 1];
        let err = reader.read(&mut buf).unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let cfg = GpioConfig {
            data_pins: vec![0, 1, 2, 3],
            ..test_config(BusWidth::Eight, 0, 1)
        };
        let err =
            GpioTransport::with_port(Box::new(WirePort { wire }), &cfg).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
