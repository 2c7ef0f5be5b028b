use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::config::NetworkConfig;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("could not request connection: {0}")]
    Request(String),
    #[error("link still down after {attempts} attempts")]
    Timeout { attempts: u32 },
}

pub trait WirelessLink {
    fn is_connected(&mut self) -> bool;

    /// Asks the interface to join the network. Does not wait for it.
    fn connect(&mut self) -> Result<(), LinkError>;
}

/// Station-mode interface managed through NetworkManager.
pub struct WifiStation {
    interface: String,
    ssid: String,
    password: String,
    sysfs_root: PathBuf,
}

impl WifiStation {
    pub fn new(config: &NetworkConfig) -> Self {
        WifiStation {
            interface: config.interface.clone(),
            ssid: config.ssid.clone(),
            password: config.password.clone(),
            sysfs_root: PathBuf::from("/sys/class/net"),
        }
    }

    #[cfg(test)]
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl WirelessLink for WifiStation {
    fn is_connected(&mut self) -> bool {
        let operstate = self.sysfs_root.join(&self.interface).join("operstate");
        match fs::read_to_string(&operstate) {
            Ok(state) => state.trim() == "up",
            Err(e) => {
                log::debug!("Cannot read {}: {}", operstate.display(), e);
                false
            }
        }
    }

    fn connect(&mut self) -> Result<(), LinkError> {
        if self.ssid.is_empty() {
            log::info!("No SSID configured, waiting for {} to come up", self.interface);
            return Ok(());
        }

        log::info!("Connecting {} to '{}'", self.interface, self.ssid);
        let output = Command::new("nmcli")
            .args(["device", "wifi", "connect", self.ssid.as_str()])
            .args(["password", self.password.as_str()])
            .args(["ifname", self.interface.as_str()])
            .output()
            .map_err(|e| LinkError::Request(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(LinkError::Request(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }
}

/// Blocks until the link is up, polling every `poll`.
/// A failed connection request is repeated on the next poll.
/// With `max_attempts` set, gives up after that many polls.
pub fn acquire_link<L: WirelessLink>(link: &mut L, poll: Duration, max_attempts: Option<u32>) -> Result<(), LinkError> {
    if link.is_connected() {
        log::info!("Wi-Fi already connected");
        return Ok(());
    }

    log::info!("Connecting to Wi-Fi...");
    let mut requested = request_connection(link);

    let mut attempts = 0u32;
    while !link.is_connected() {
        if max_attempts.is_some_and(|max| attempts >= max) {
            return Err(LinkError::Timeout { attempts });
        }
        thread::sleep(poll);
        attempts += 1;
        log::info!("Waiting for Wi-Fi, attempt {}", attempts);
        if !requested {
            requested = request_connection(link);
        }
    }

    log::info!("Wi-Fi connected!");
    Ok(())
}

fn request_connection<L: WirelessLink>(link: &mut L) -> bool {
    match link.connect() {
        Ok(()) => true,
        Err(e) => {
            log::warn!("{}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedLink {
        up_after: Option<u32>,
        polls: u32,
        connect_calls: u32,
        failed_connects: u32,   // Requests rejected before one goes through
        requested: bool,
    }

    impl ScriptedLink {
        fn new(up_after: Option<u32>) -> Self {
            ScriptedLink { up_after, polls: 0, connect_calls: 0, failed_connects: 0, requested: true }
        }

        fn failing_first(mut self, failed_connects: u32) -> Self {
            self.failed_connects = failed_connects;
            self.requested = false;
            self
        }
    }

    impl WirelessLink for ScriptedLink {
        fn is_connected(&mut self) -> bool {
            self.polls += 1;
            self.requested && self.up_after.is_some_and(|n| self.polls > n)
        }

        fn connect(&mut self) -> Result<(), LinkError> {
            self.connect_calls += 1;
            if self.connect_calls <= self.failed_connects {
                return Err(LinkError::Request(String::from("No network with SSID found")));
            }
            self.requested = true;
            Ok(())
        }
    }

    #[test]
    fn connected_link_skips_connect() {
        let mut link = ScriptedLink::new(Some(0));
        acquire_link(&mut link, Duration::ZERO, Some(3)).unwrap();
        assert_eq!(link.connect_calls, 0);
    }

    #[test]
    fn waits_until_link_comes_up() {
        let mut link = ScriptedLink::new(Some(4));
        acquire_link(&mut link, Duration::ZERO, None).unwrap();
        assert_eq!(link.connect_calls, 1);
        assert_eq!(link.polls, 5);
    }

    #[test]
    fn failed_request_is_retried() {
        let mut link = ScriptedLink::new(Some(0)).failing_first(1);
        acquire_link(&mut link, Duration::ZERO, Some(50)).unwrap();
        assert!(link.connect_calls >= 2);
    }

    #[test]
    fn successful_request_is_not_repeated() {
        let mut link = ScriptedLink::new(Some(10)).failing_first(3);
        acquire_link(&mut link, Duration::ZERO, Some(50)).unwrap();
        assert_eq!(link.connect_calls, 4);
    }

    #[test]
    fn bounded_attempts_time_out() {
        let mut link = ScriptedLink::new(None);
        let err = acquire_link(&mut link, Duration::ZERO, Some(3)).unwrap_err();
        assert!(matches!(err, LinkError::Timeout { attempts: 3 }));
    }

    #[test]
    fn operstate_drives_connectivity() {
        let root = std::env::temp_dir().join(format!("rc-remote-sysfs-{}", std::process::id()));
        let iface = root.join("wlan0");
        fs::create_dir_all(&iface).unwrap();

        let mut station = WifiStation::new(&NetworkConfig::default()).with_sysfs_root(&root);
        fs::write(iface.join("operstate"), "down\n").unwrap();
        assert!(!station.is_connected());

        fs::write(iface.join("operstate"), "up\n").unwrap();
        assert!(station.is_connected());

        fs::remove_dir_all(&root).unwrap();
        assert!(!station.is_connected());
    }

    #[test]
    fn empty_ssid_does_not_spawn_nmcli() {
        let mut station = WifiStation::new(&NetworkConfig::default());
        assert!(station.connect().is_ok());
    }
}
