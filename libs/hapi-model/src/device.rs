//! Remote terminal units and pin configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Pseudo-address of the RTU attached over the local serial link
pub const USB_ADDRESS: &str = "usb";

/// Transport used to reach an RTU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RtuProtocol {
    /// Plain TCP request/response on the device port
    Tcp,
    /// Directly attached serial device
    Serial,
}

impl RtuProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            RtuProtocol::Tcp => "tcp",
            RtuProtocol::Serial => "serial",
        }
    }

    /// Protocol implied by an address: `usb` is serial, everything else TCP
    pub fn for_address(address: &str) -> Self {
        if address.eq_ignore_ascii_case(USB_ADDRESS) {
            RtuProtocol::Serial
        } else {
            RtuProtocol::Tcp
        }
    }
}

impl fmt::Display for RtuProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configured role and default value of one RTU pin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinMode {
    pub pin: String,
    pub mode: String,
    pub default_value: String,
    /// Canonical position used when comparing against the device
    pub pos: i64,
}

/// A discovered remote terminal unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rtu {
    pub rtuid: String,
    pub protocol: RtuProtocol,
    /// IPv4 address, or [`USB_ADDRESS`] for the serial device
    pub address: String,
    pub version: String,
    pub online: bool,
    pub pin_modes: BTreeMap<String, PinMode>,
}

impl Rtu {
    /// Build an online RTU from an identify reply
    pub fn identified(
        rtuid: impl Into<String>,
        address: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let address = address.into();
        Self {
            rtuid: rtuid.into(),
            protocol: RtuProtocol::for_address(&address),
            address,
            version: version.into(),
            online: true,
            pin_modes: BTreeMap::new(),
        }
    }

    /// Replace the pin configuration
    pub fn with_pin_modes(mut self, modes: impl IntoIterator<Item = PinMode>) -> Self {
        self.pin_modes = modes.into_iter().map(|m| (m.pin.clone(), m)).collect();
        self
    }

    /// Concatenation of `pin` + `mode` for every pin, ordered by position
    ///
    /// This is the string a correctly configured device reports for `gpm`.
    pub fn configured_mode_string(&self) -> String {
        let mut modes: Vec<&PinMode> = self.pin_modes.values().collect();
        modes.sort_by_key(|m| m.pos);
        modes.iter().fold(String::new(), |mut acc, m| {
            acc.push_str(&m.pin);
            acc.push_str(&m.mode);
            acc
        })
    }
}

/// Parse an identify (`sta`) reply of the form `id\r\nversion`
///
/// Returns `None` when the id field is empty.
pub fn parse_identify(reply: &str) -> Option<(String, String)> {
    let mut fields = reply.split("\r\n");
    let id = fields.next()?.trim();
    if id.is_empty() {
        return None;
    }
    let version = fields.next().unwrap_or_default().trim();
    Some((id.to_string(), version.to_string()))
}

/// Live portion of a `gpm` reply: everything before the first `{`
pub fn live_mode_string(reply: &str) -> &str {
    match reply.find('{') {
        Some(idx) => &reply[..idx],
        None => reply,
    }
}

/// Compare live and configured mode strings position by position
///
/// Only positions present in both strings are compared, so a device that
/// reports fewer or more pins than configured is still congruent when the
/// overlapping prefix agrees.
pub fn pin_modes_congruent(live: &str, configured: &str) -> bool {
    live.chars().zip(configured.chars()).all(|(l, c)| l == c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(pin: &str, mode: &str, pos: i64) -> PinMode {
        PinMode {
            pin: pin.into(),
            mode: mode.into(),
            default_value: "0".into(),
            pos,
        }
    }

    #[test]
    fn test_configured_mode_string_follows_position() {
        let rtu = Rtu::identified("RTU1", "10.0.0.5", "3.0").with_pin_modes(vec![
            pin("A0", "2", 2),
            pin("D3", "1", 0),
            pin("D4", "0", 1),
        ]);
        assert_eq!(rtu.configured_mode_string(), "D31D40A02");
        assert_eq!(rtu.protocol, RtuProtocol::Tcp);
    }

    #[test]
    fn test_usb_address_is_serial() {
        let rtu = Rtu::identified("RTU9", "usb", "1.1");
        assert_eq!(rtu.protocol, RtuProtocol::Serial);
    }

    #[test]
    fn test_parse_identify() {
        assert_eq!(
            parse_identify("HAPI-RTU-7\r\n3.1.4\r\n"),
            Some(("HAPI-RTU-7".to_string(), "3.1.4".to_string()))
        );
        assert_eq!(
            parse_identify("lonely"),
            Some(("lonely".to_string(), String::new()))
        );
        assert_eq!(parse_identify("\r\n3.0"), None);
    }

    #[test]
    fn test_live_mode_string_strips_json_tail() {
        assert_eq!(live_mode_string("D31D40{\"name\":\"x\"}"), "D31D40");
        assert_eq!(live_mode_string("D31"), "D31");
    }

    #[test]
    fn test_congruence_only_checks_common_prefix() {
        assert!(pin_modes_congruent("D31D40", "D31D40"));
        assert!(pin_modes_congruent("D31", "D31D40A02"));
        assert!(pin_modes_congruent("D31D40A02", "D31"));
        assert!(pin_modes_congruent("", "D31"));
        assert!(!pin_modes_congruent("D30D40", "D31D40"));
        assert!(!pin_modes_congruent("D31D41", "D31D40A02"));
    }
}
