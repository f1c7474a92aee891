use std::time::Duration;

use rumqttc::{AsyncClient, Event, Incoming, LastWill, MqttOptions, QoS};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use lampi_common::{
    client_state_topic, types::parse_json, BrokerConfig, StateSnapshot, CLIENT_SERVICE,
    TOPIC_LAMP_CHANGED, TOPIC_SET_LAMP_CONFIG,
};

use crate::driver::{Broadcast, LampDriver};

/// RGB sink for the lamp hardware.
pub trait LedOutput {
    fn apply(&mut self, rgb: (u8, u8, u8));
}

// Hardware integration point:
// replace with the LED strip driver on the device.
struct LogLeds {
    last: Option<(u8, u8, u8)>,
}

impl LedOutput for LogLeds {
    fn apply(&mut self, rgb: (u8, u8, u8)) {
        if self.last != Some(rgb) {
            debug!("leds {:02x}{:02x}{:02x}", rgb.0, rgb.1, rgb.2);
            self.last = Some(rgb);
        }
    }
}

enum ServiceEvent {
    Connected,
    Command(StateSnapshot),
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let broker = BrokerConfig::from_env();
    let mut options = MqttOptions::new(CLIENT_SERVICE, broker.host.clone(), broker.port);
    options.set_keep_alive(Duration::from_secs(broker.keep_alive_secs));
    options.set_last_will(LastWill::new(
        client_state_topic(CLIENT_SERVICE),
        "0",
        QoS::ExactlyOnce,
        true,
    ));
    if !broker.username.is_empty() {
        options.set_credentials(broker.username.clone(), broker.password.clone());
    }

    let (client, mut eventloop) = AsyncClient::new(options, 32);
    let (event_tx, mut event_rx) = mpsc::channel(32);

    let loop_client = client.clone();
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    if let Err(err) = loop_client
                        .publish(
                            client_state_topic(CLIENT_SERVICE),
                            QoS::ExactlyOnce,
                            true,
                            "1",
                        )
                        .await
                    {
                        warn!("liveness publish failed: {err}");
                    }
                    if let Err(err) = loop_client
                        .subscribe(TOPIC_SET_LAMP_CONFIG, QoS::AtLeastOnce)
                        .await
                    {
                        warn!("subscribe failed: {err}");
                    }
                    if event_tx.send(ServiceEvent::Connected).await.is_err() {
                        return;
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    match parse_json::<StateSnapshot>(&message.payload) {
                        Ok(command) => {
                            if event_tx.send(ServiceEvent::Command(command)).await.is_err() {
                                return;
                            }
                        }
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

    let mut driver = LampDriver::new();
    let mut leds = LogLeds { last: None };

    info!("lamp service started");

    while let Some(event) = event_rx.recv().await {
        match event {
            ServiceEvent::Connected => {
                leds.apply(driver.rgb());
                publish_changed(&client, &driver.startup_broadcast(CLIENT_SERVICE)).await;
            }
            ServiceEvent::Command(command) => {
                let broadcast = driver.apply_command(&command);
                leds.apply(driver.rgb());
                publish_changed(&client, &broadcast).await;
            }
        }
    }

    Ok(())
}

async fn publish_changed(client: &AsyncClient, broadcast: &Broadcast) {
    match serde_json::to_vec(&broadcast.to_snapshot()) {
        Ok(body) => {
            if let Err(err) = client
                .publish(TOPIC_LAMP_CHANGED, QoS::AtLeastOnce, false, body)
                .await
            {
                warn!("state broadcast failed: {err}");
            }
        }
        Err(err) => warn!("state serialization failed: {err}"),
    }
}
