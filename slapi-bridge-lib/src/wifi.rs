use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::WifiConfig;
use crate::error::{BridgeError, Result};

/// Blocks until the wireless station interface reports operational.
///
/// Association itself belongs to the system supplicant; this only gates
/// startup on the link being usable. A wait budget of 0 waits forever.
pub fn wait_for_network(cfg: &WifiConfig) -> Result<()> {
    if let Some(ssid) = &cfg.ssid {
        info!(
            %ssid,
            password = %cfg.password.as_deref().map(mask).unwrap_or_default(),
            iface = %cfg.interface,
            "waiting for wireless association"
        );
    }

    let operstate = format!("/sys/class/net/{}/operstate", cfg.interface);
    let start = Instant::now();
    loop {
        match fs::read_to_string(&operstate) {
            Ok(state) if state.trim() == "up" => {
                info!(iface = %cfg.interface, "network is up");
                return Ok(());
            }
            Ok(state) => {
                debug!(iface = %cfg.interface, state = %state.trim(), "waiting for network")
            }
            Err(e) => debug!(iface = %cfg.interface, %e, "interface not available yet"),
        }

        if cfg.wait_secs != 0 && start.elapsed() >= Duration::from_secs(cfg.wait_secs) {
            return Err(BridgeError::Network(format!(
                "interface {} did not come up within {}s",
                cfg.interface, cfg.wait_secs
            )));
        }
        thread::sleep(Duration::from_secs(1));
    }
}

fn mask(password: &str) -> String {
    let visible: String = password.chars().take(2).collect();
    let hidden = password.chars().count().saturating_sub(2);
    format!("{visible}{}", "*".repeat(hidden))
}
