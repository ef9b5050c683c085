/// Stable per-device identifier derived from the network MAC address.
use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("no usable network interface with a MAC address")]
    NoMacAddress,

    #[error("interface enumeration failed: {0}")]
    Enumerate(String),
}

impl KeyError {
    pub fn domain(&self) -> &'static str {
        "system"
    }
}

/// MD5 (lowercase hex) of the MAC address string `aa:bb:cc:dd:ee:ff`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HardwareKey(String);

impl HardwareKey {
    /// Derive the key from this machine's first non-loopback MAC address.
    /// Returns the key together with that address.
    pub fn generate() -> Result<(Self, String), KeyError> {
        let mac = mac_address()?;
        let key = Self::from_mac_address(&mac);
        info!("Hardware key {} derived from interface MAC", key);
        Ok((key, mac))
    }

    pub fn from_mac_address(mac: &str) -> Self {
        Self(format!("{:x}", md5::compute(mac.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HardwareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn format_mac(bytes: [u8; 6]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// First non-loopback interface with a non-zero link-layer address.
#[cfg(unix)]
pub fn mac_address() -> Result<String, KeyError> {
    use nix::ifaddrs::getifaddrs;
    use nix::net::if_::InterfaceFlags;

    let addrs = getifaddrs().map_err(|e| KeyError::Enumerate(e.to_string()))?;

    let mut candidates: Vec<(String, [u8; 6])> = addrs
        .filter(|ifa| !ifa.flags.contains(InterfaceFlags::IFF_LOOPBACK))
        .filter_map(|ifa| {
            let mac = ifa.address.as_ref()?.as_link_addr()?.addr()?;
            (mac != [0u8; 6]).then(|| (ifa.interface_name.clone(), mac))
        })
        .collect();

    // Interface order from the kernel is not stable across boots
    candidates.sort();
    let (name, mac) = candidates.into_iter().next().ok_or(KeyError::NoMacAddress)?;
    debug!("Using MAC address of interface {}", name);
    Ok(format_mac(mac))
}

#[cfg(not(unix))]
pub fn mac_address() -> Result<String, KeyError> {
    Err(KeyError::NoMacAddress)
}
