//! MQTT connection and delivery loop

use std::sync::Arc;
use std::time::Duration;

use hapi_model::topics::SUBSCRIPTIONS;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::router::Router;

pub fn mqtt_options(config: &MqttConfig, host: &str, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, host, config.broker_port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    options.set_clean_session(true);
    options.set_max_packet_size(config.max_packet_bytes, config.max_packet_bytes);
    options
}

/// Client and event loop for the primary broker
pub fn connect(config: &MqttConfig, client_id: &str) -> (AsyncClient, EventLoop) {
    let options = mqtt_options(config, &config.broker_host, client_id);
    AsyncClient::new(options, config.channel_capacity)
}

/// Poll the connection until cancelled, dispatching every inbound publish
///
/// rumqttc reconnects on the next poll after an error; this loop only adds
/// the fixed delay and the switch to the fallback broker.
pub async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    router: Arc<Router>,
    config: MqttConfig,
    client_id: String,
    cancel: CancellationToken,
) {
    let mut failures: u32 = 0;
    let mut on_fallback = false;
    info!(
        "MQTT connecting to {}:{} as {}",
        config.broker_host, config.broker_port, client_id
    );

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                failures = 0;
                info!("MQTT connected");
                subscribe_all(&client);
                if config.publish_core_on_connect {
                    if let Err(e) = router.publish_core_db().await {
                        warn!("Initial core publish failed: {}", e);
                    }
                }
            },
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let payload = String::from_utf8_lossy(&publish.payload);
                router.dispatch(&publish.topic, &payload).await;
            },
            Ok(other) => debug!("MQTT event: {:?}", other),
            Err(e) => {
                failures += 1;
                warn!("MQTT connection error ({} in a row): {}", failures, e);

                if !on_fallback && failures >= config.fallback_after_failures {
                    if let Some(fallback) = config.fallback_host.as_deref() {
                        info!("Switching to fallback broker {}", fallback);
                        eventloop.mqtt_options = mqtt_options(&config, fallback, &client_id);
                        on_fallback = true;
                        failures = 0;
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.reconnect_delay()) => {},
                }
            },
        }
    }

    if let Err(e) = client.try_disconnect() {
        debug!("MQTT disconnect: {}", e);
    }
    info!("MQTT loop stopped");
}

/// Subscriptions are renewed on every connect; the broker treats repeats as no-ops
fn subscribe_all(client: &AsyncClient) {
    for topic in SUBSCRIPTIONS {
        if let Err(e) = client.try_subscribe(topic, QoS::AtLeastOnce) {
            warn!("Subscribe to {} failed: {}", topic, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_carry_configured_packet_limit() {
        let mut config = MqttConfig::default();
        let options = mqtt_options(&config, "broker", "node-a");
        assert_eq!(options.max_packet_size(), 1024 * 1024);
        assert_eq!(options.keep_alive(), Duration::from_secs(60));

        config.max_packet_bytes = 64 * 1024;
        let options = mqtt_options(&config, "fallback", "node-a");
        assert_eq!(options.max_packet_size(), 64 * 1024);
        assert_eq!(options.broker_address(), ("fallback".to_string(), 1883));
    }
}
