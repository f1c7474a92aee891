use std::time::Duration;

use anyhow::Context;
use rumqttc::{AsyncClient, Event, Incoming, LastWill, MqttOptions, QoS};
use tokio::sync::mpsc;
use tracing::{info, warn};

use lampi_common::{
    broker_bridge_connection_topic, client_state_topic, device_association_topic,
    device_notification_topic, types::parse_json, BrokerConfig, PayloadError, StateSnapshot,
    DEVICE_TYPE_LAMP, TOPIC_LAMP_CHANGED, TOPIC_SET_LAMP_CONFIG,
};

use crate::engine::RemoteEvent;

pub struct SessionConfig {
    pub client_id: String,
    pub device_id: String,
    pub broker: BrokerConfig,
}

/// One connection to the broker. Inbound messages are parsed on the
/// transport task and handed to the scheduler through the event channel;
/// nothing else crosses that boundary.
pub struct Session {
    client: AsyncClient,
}

struct SubscribedTopics {
    changed: String,
    bridge: String,
    associated: String,
    notification: String,
}

pub fn start(config: SessionConfig, events: mpsc::Sender<RemoteEvent>) -> anyhow::Result<Session> {
    let mut options = MqttOptions::new(
        config.client_id.clone(),
        config.broker.host.clone(),
        config.broker.port,
    );
    options.set_keep_alive(Duration::from_secs(config.broker.keep_alive_secs));
    options.set_last_will(LastWill::new(
        client_state_topic(&config.client_id),
        "0",
        QoS::ExactlyOnce,
        true,
    ));
    if !config.broker.username.is_empty() {
        options.set_credentials(
            config.broker.username.clone(),
            config.broker.password.clone(),
        );
    }

    let (client, mut eventloop) = AsyncClient::new(options, 64);

    let topics = SubscribedTopics {
        changed: TOPIC_LAMP_CHANGED.to_string(),
        bridge: broker_bridge_connection_topic(&config.device_id),
        associated: device_association_topic(&config.device_id, DEVICE_TYPE_LAMP),
        notification: device_notification_topic(&config.device_id, DEVICE_TYPE_LAMP),
    };
    let liveness_topic = client_state_topic(&config.client_id);

    let loop_client = client.clone();
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    if let Err(err) = on_connect(&loop_client, &liveness_topic, &topics).await {
                        warn!("mqtt connect setup failed: {err:#}");
                        continue;
                    }
                    if events.send(RemoteEvent::Connected).await.is_err() {
                        return;
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    match parse_remote_event(&message.topic, &message.payload, &topics) {
                        Ok(Some(event)) => {
                            if events.send(event).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!("dropping malformed payload on {}: {err}", message.topic);
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    Ok(Session { client })
}

/// Runs on every (re)connect: retained liveness "1", then the full
/// subscription set. rumqttc does not replay subscriptions across
/// reconnects, so this must happen per ConnAck.
async fn on_connect(
    client: &AsyncClient,
    liveness_topic: &str,
    topics: &SubscribedTopics,
) -> anyhow::Result<()> {
    client
        .publish(liveness_topic, QoS::ExactlyOnce, true, "1")
        .await
        .context("liveness publish failed")?;

    client.subscribe(&topics.changed, QoS::AtLeastOnce).await?;
    client.subscribe(&topics.bridge, QoS::AtLeastOnce).await?;
    client
        .subscribe(&topics.associated, QoS::ExactlyOnce)
        .await?;
    client
        .subscribe(&topics.notification, QoS::ExactlyOnce)
        .await?;
    Ok(())
}

fn parse_remote_event(
    topic: &str,
    payload: &[u8],
    topics: &SubscribedTopics,
) -> Result<Option<RemoteEvent>, PayloadError> {
    if topic == topics.changed {
        return Ok(Some(RemoteEvent::Snapshot(parse_json(payload)?)));
    }
    if topic == topics.associated {
        return Ok(Some(RemoteEvent::Association(parse_json(payload)?)));
    }
    if topic == topics.notification {
        return Ok(Some(RemoteEvent::Notification(parse_json(payload)?)));
    }
    if topic == topics.bridge {
        return Ok(Some(RemoteEvent::BridgeStatus(payload == b"1")));
    }
    Ok(None)
}

impl Session {
    /// Fire-and-forget: a failed publish is not retried here, QoS redelivery
    /// is the transport's job.
    pub async fn publish_state(&self, snapshot: &StateSnapshot) {
        match serde_json::to_vec(snapshot) {
            Ok(body) => {
                if let Err(err) = self
                    .client
                    .publish(TOPIC_SET_LAMP_CONFIG, QoS::AtLeastOnce, false, body)
                    .await
                {
                    warn!("state publish failed: {err}");
                }
            }
            Err(err) => warn!("state serialization failed: {err}"),
        }
    }
}
