//! Outbound message seam

use errors::{HapiError, HapiResult};
use hapi_model::SyncEnvelope;
use rumqttc::{AsyncClient, QoS};
use tracing::debug;

/// Non-blocking publish
///
/// Called from the delivery task, so implementations must never wait on the
/// broker; a full queue is an error, not a stall.
pub trait Publisher: Send + Sync {
    fn publish(&self, message: SyncEnvelope) -> HapiResult<()>;
}

pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, message: SyncEnvelope) -> HapiResult<()> {
        debug!("Publishing {} bytes on {}", message.payload.len(), message.topic);
        self.client
            .try_publish(message.topic, QoS::AtLeastOnce, false, message.payload)
            .map_err(|e| HapiError::Mqtt(e.to_string()))
    }
}
