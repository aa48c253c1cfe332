//! Facility profile

use serde::{Deserialize, Serialize};

/// The facility this node controls. One per process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub site_id: String,
    pub name: String,
    pub operator: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    /// Network interface used for discovery scans
    pub net_iface: String,
}

impl Site {
    /// Greeting shown to console sessions
    pub fn welcome_banner(&self) -> String {
        if self.name.is_empty() {
            return "No site data found.\r\n".to_string();
        }
        format!(
            "\r\nWelcome to HAPI facility {}\r\nOperator: {}\r\nPhone: {}\r\nEmail: {}\r\nLocation: {}\r\n\r\nType \"help\" for a list of valid commands.\r\n",
            self.name, self.operator, self.phone, self.email, self.location
        )
    }
}
