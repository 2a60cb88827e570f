use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::config::{
    BusWidth, Config, GpioConfig, Parity, SerialSettings, TransportConfig, UartConfig, WifiConfig,
};
use crate::error::{BridgeError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(&p)
        .map_err(|e| BridgeError::Config(format!("failed to read config file: {e}")))?;
    parse(&txt)
}

/// Parses the KEY=VALUE config format: one entry per line, `#` comments and
/// blank lines ignored.
pub fn parse(txt: &str) -> Result<Config> {
    let mut env: HashMap<&str, &str> = HashMap::new();
    for line in txt.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| BridgeError::Config(format!("invalid config line: {line}")))?;
        env.insert(key.trim(), value.trim());
    }

    let transport = match env.get("MODE").copied().unwrap_or("uart") {
        "uart" => TransportConfig::Uart(parse_uart(&env)?),
        "gpio-4bit" => TransportConfig::Gpio(parse_gpio(&env, BusWidth::Four)?),
        "gpio-8bit" => TransportConfig::Gpio(parse_gpio(&env, BusWidth::Eight)?),
        other => {
            return Err(BridgeError::Config(format!("unknown MODE '{other}'")));
        }
    };

    Ok(Config {
        transport,
        wifi: parse_wifi(&env)?,
    })
}

fn parse_uart(env: &HashMap<&str, &str>) -> Result<UartConfig> {
    let parity = match env.get("PARITY").copied().unwrap_or("None") {
        "None" => Parity::None,
        "E" => Parity::Even,
        "O" => Parity::Odd,
        other => {
            return Err(BridgeError::Config(format!(
                "PARITY must be one of None, E, O (got '{other}')"
            )));
        }
    };

    Ok(UartConfig {
        port: env.get("PORT").copied().unwrap_or("/dev/serial0").to_string(),
        serial: SerialSettings {
            baud: get_num(env, "BAUD", 9600)?,
            data_bits: get_num(env, "BITS", 8)?,
            parity,
            stop_bits: get_num(env, "STOP", 1)?,
        },
        tx_pin: get_num(env, "TX_PIN", 0)?,
        rx_pin: get_num(env, "RX_PIN", 1)?,
        rts_pin: get_num(env, "RTS_PIN", 0)?,
        cts_pin: get_num(env, "CTS_PIN", 0)?,
        rx_buffer: get_num(env, "RXBUF", 512)?,
        tx_buffer: get_num(env, "TXBUF", 512)?,
    })
}

fn parse_gpio(env: &HashMap<&str, &str>, width: BusWidth) -> Result<GpioConfig> {
    let raw = env.get("DATA_PINS").copied().unwrap_or("");
    let data_pins = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u8>()
                .map_err(|_| BridgeError::Config(format!("invalid DATA_PINS entry '{s}'")))
        })
        .collect::<Result<Vec<u8>>>()?;

    if data_pins.len() != width.data_lines() {
        return Err(BridgeError::Config(format!(
            "gpio-{}bit mode requires {} DATA_PINS (got {})",
            width.data_lines(),
            width.data_lines(),
            data_pins.len()
        )));
    }

    Ok(GpioConfig {
        width,
        data_pins,
        valid_pin: get_num(env, "VALID_PIN", 0)?,
        ack_pin: get_num(env, "ACK_PIN", 0)?,
        timeout_ms: get_num(env, "TIMEOUT_MS", 0)?,
        min_hold_time_ms: get_num(env, "MIN_HOLD_TIME_MS", 10)?,
    })
}

fn parse_wifi(env: &HashMap<&str, &str>) -> Result<WifiConfig> {
    Ok(WifiConfig {
        ssid: env.get("SSID").map(|s| s.to_string()),
        password: env.get("PASSWORD").map(|s| s.to_string()),
        interface: env.get("WIFI_IFACE").copied().unwrap_or("wlan0").to_string(),
        wait_secs: get_num(env, "WIFI_WAIT_SECS", 0)?,
    })
}

fn get_num<T: FromStr>(env: &HashMap<&str, &str>, key: &str, default: T) -> Result<T> {
    match env.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| BridgeError::Config(format!("invalid {key} value '{raw}'"))),
    }
}
