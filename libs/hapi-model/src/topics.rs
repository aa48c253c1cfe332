//! Pub/sub topic names

pub const COMMAND_PREFIX: &str = "COMMAND/";
pub const ASSET_QUERY: &str = "ASSET/QUERY";
pub const ASSET_RESPONSE: &str = "ASSET/RESPONSE";
pub const STATUS_QUERY: &str = "STATUS/QUERY";
pub const STATUS_RESPONSE: &str = "STATUS/RESPONSE";
pub const SCHEDULER_QUERY: &str = "SCHEDULER/QUERY";
pub const SCHEDULER_RESPONSE: &str = "SCHEDULER/RESPONSE";
pub const SYNC_VERSION: &str = "SYNCHRONIZE/VERSION";
pub const SYNC_RESPONSE: &str = "SYNCHRONIZE/RESPONSE";
pub const SYNC_GET: &str = "SYNCHRONIZE/GET";
pub const SYNC_DATA: &str = "SYNCHRONIZE/DATA";
pub const BROKER_CLIENTS: &str = "$SYS/broker/clients/total";

/// Subscriptions renewed on every (re)connect
pub const SUBSCRIPTIONS: [&str; 11] = [
    "COMMAND/#",
    "ASSET/QUERY/#",
    "ASSET/RESPONSE/#",
    STATUS_QUERY,
    STATUS_RESPONSE,
    SCHEDULER_RESPONSE,
    SCHEDULER_QUERY,
    SYNC_VERSION,
    SYNC_GET,
    "SYNCHRONIZE/DATA/#",
    BROKER_CLIENTS,
];

/// `ASSET/RESPONSE/<asset id>`
pub fn asset_response(asset_id: i64) -> String {
    format!("{}/{}", ASSET_RESPONSE, asset_id)
}

/// `SYNCHRONIZE/DATA/<node>`
pub fn sync_data(node: &str) -> String {
    format!("{}/{}", SYNC_DATA, node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_builders() {
        assert_eq!(asset_response(12), "ASSET/RESPONSE/12");
        assert_eq!(sync_data("greenhouse-2"), "SYNCHRONIZE/DATA/greenhouse-2");
    }
}
