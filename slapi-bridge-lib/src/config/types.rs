/// Local transport selection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportConfig {
    Uart(UartConfig),
    Gpio(GpioConfig),
}

/// Parity setting for the serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl Parity {
    /// Parses the single-letter form used by the SERIAL command (N/E/O).
    pub fn from_flag(s: &str) -> Option<Parity> {
        match s {
            "N" => Some(Parity::None),
            "E" => Some(Parity::Even),
            "O" => Some(Parity::Odd),
            _ => None,
        }
    }
}

/// Line settings shared by the UART config and the SERIAL command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

/// UART transport configuration
#[derive(Debug, Clone, PartialEq)]
pub struct UartConfig {
    /// Serial device path (e.g. "/dev/serial0")
    pub port: String,
    pub serial: SerialSettings,
    /// TX/RX wiring, recorded for the startup log; pin muxing is owned by
    /// the device tree overlay
    pub tx_pin: u8,
    pub rx_pin: u8,
    /// RTS/CTS pin IDs; 0 = disabled. Hardware flow control is enabled when
    /// either is non-zero.
    pub rts_pin: u8,
    pub cts_pin: u8,
    /// Driver buffer sizing hints, recorded for the startup log
    pub rx_buffer: usize,
    pub tx_buffer: usize,
}

/// Data bus width of the parallel GPIO link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusWidth {
    Four,
    Eight,
}

impl BusWidth {
    pub fn data_lines(self) -> usize {
        match self {
            BusWidth::Four => 4,
            BusWidth::Eight => 8,
        }
    }
}

/// Parallel GPIO transport configuration
#[derive(Debug, Clone, PartialEq)]
pub struct GpioConfig {
    pub width: BusWidth,
    /// BCM pin IDs, data line 0 first (least-significant bit)
    pub data_pins: Vec<u8>,
    pub valid_pin: u8,
    pub ack_pin: u8,
    /// Per-edge wait budget in milliseconds; 0 = wait forever
    pub timeout_ms: u64,
    /// Strobe hold time so a slow peer still observes edges
    pub min_hold_time_ms: u64,
}

/// Wireless bring-up configuration
#[derive(Debug, Clone, PartialEq)]
pub struct WifiConfig {
    pub ssid: Option<String>,
    pub password: Option<String>,
    /// Station interface polled for association state
    pub interface: String,
    /// Overall wait budget in seconds; 0 = wait forever
    pub wait_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub transport: TransportConfig,
    pub wifi: WifiConfig,
}
