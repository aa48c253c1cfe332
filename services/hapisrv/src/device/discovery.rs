//! Subnet scanning for RTU candidates

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use errors::{HapiError, HapiResult};
use tokio::process::Command;
use tracing::debug;

/// Source of candidate device addresses
#[async_trait]
pub trait SubnetScanner: Send + Sync {
    /// Addresses on `iface` whose hardware address carries the device signature
    async fn scan(&self, iface: &str) -> HapiResult<Vec<String>>;
}

/// Scanner backed by the `arp-scan` tool
pub struct ArpScanner {
    signature: String,
    timeout: Duration,
}

impl ArpScanner {
    pub fn new(signature: impl Into<String>, timeout: Duration) -> Self {
        Self {
            signature: signature.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SubnetScanner for ArpScanner {
    async fn scan(&self, iface: &str) -> HapiResult<Vec<String>> {
        let mut command = Command::new("arp-scan");
        command
            .arg(format!("--interface={}", iface))
            .arg("--localnet")
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(HapiError::discovery(iface, e)),
            Err(_) => {
                return Err(HapiError::discovery(
                    iface,
                    format!("arp-scan timed out after {:?}", self.timeout),
                ))
            },
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HapiError::discovery(iface, stderr.trim()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let found = parse_arp_scan(&stdout, &self.signature);
        debug!("arp-scan on {} found {} candidates", iface, found.len());
        Ok(found)
    }
}

/// Extract candidate addresses from `arp-scan` output
///
/// Lines look like `10.0.0.7\tde:ad:be:ef:00:01\tVendor`. Header and summary
/// lines fail the address parse and are dropped.
pub fn parse_arp_scan(output: &str, signature: &str) -> Vec<String> {
    let signature = signature.to_ascii_lowercase();
    let mut found: Vec<String> = Vec::new();

    for line in output.lines() {
        if !line.to_ascii_lowercase().contains(&signature) {
            continue;
        }
        let Some(first) = line.split_whitespace().next() else {
            continue;
        };
        if first.parse::<Ipv4Addr>().is_ok() && !found.iter().any(|a| a == first) {
            found.push(first.to_string());
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCAN: &str = "Interface: eth0, type: EN10MB, MAC: b8:27:eb:00:00:01, IPv4: 10.0.0.2\n\
Starting arp-scan 1.9.7 with 256 hosts\n\
10.0.0.1\t00:11:22:33:44:55\tRouter Inc.\n\
10.0.0.7\tDE:AD:BE:EF:00:01\t(Unknown)\n\
10.0.0.9\tde:ad:be:ef:00:02\t(Unknown)\n\
10.0.0.9\tde:ad:be:ef:00:02\t(Unknown) (DUP: 2)\n\
\n\
3 packets received by filter, 0 packets dropped by kernel\n";

    #[test]
    fn test_parse_matches_signature_case_insensitively() {
        let found = parse_arp_scan(SCAN, "de:ad:be:ef");
        assert_eq!(found, vec!["10.0.0.7", "10.0.0.9"]);
    }

    #[test]
    fn test_parse_ignores_non_address_lines() {
        let found = parse_arp_scan("Interface: de:ad:be:ef\n", "de:ad:be:ef");
        assert!(found.is_empty());
    }
}
