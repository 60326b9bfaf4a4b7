//! Telemetry publishing
//!
//! Snapshots go to an MQTT broker. Publishing never blocks the control loop:
//! requests are queued with `try_publish` and the network side runs on the
//! client's own I/O thread, which also takes care of reconnecting.

use std::thread;
use std::time::Duration;

use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use sf_core::constants::{telemetry, timing};
use sf_core::{Result, SocfanError, TelemetryConfig};
use sf_protocol::TelemetrySnapshot;
use tracing::{debug, info, trace, warn};

/// Destination for per-cycle snapshots
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySink {
    fn publish(&mut self, snapshot: &TelemetrySnapshot) -> Result<()>;
}

/// Drops every snapshot; used when telemetry is disabled
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn publish(&mut self, snapshot: &TelemetrySnapshot) -> Result<()> {
        trace!(?snapshot, "Telemetry disabled, snapshot dropped");
        Ok(())
    }
}

/// MQTT publisher with a background connection thread
pub struct MqttPublisher {
    client: Client,
    topic: String,
}

impl MqttPublisher {
    pub fn connect(config: &TelemetryConfig) -> Result<Self> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if !config.username.is_empty() {
            options.set_credentials(&config.username, &config.password);
        }

        let (client, connection) = Client::new(options, telemetry::REQUEST_CAPACITY);
        let endpoint = format!("{}:{}", config.host, config.port);
        thread::Builder::new()
            .name("mqtt-io".to_string())
            .spawn(move || drive_connection(connection, endpoint))
            .map_err(|e| SocfanError::telemetry(format!("Failed to start MQTT thread: {}", e)))?;

        info!(
            host = %config.host,
            port = config.port,
            topic = %config.topic,
            "MQTT publisher started"
        );
        Ok(Self {
            client,
            topic: config.topic.clone(),
        })
    }
}

/// Poll the connection forever; each error is followed by a reconnect attempt
fn drive_connection(mut connection: Connection, endpoint: String) {
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!("Connected to broker {} ({:?})", endpoint, ack.code);
            }
            Ok(event) => trace!(?event, "MQTT event"),
            Err(e) => {
                warn!(
                    "Broker {} connection error: {} - retrying in {:?}",
                    endpoint,
                    e,
                    timing::RECONNECT_BACKOFF
                );
                thread::sleep(timing::RECONNECT_BACKOFF);
            }
        }
    }
    debug!("MQTT connection loop ended");
}

impl TelemetrySink for MqttPublisher {
    fn publish(&mut self, snapshot: &TelemetrySnapshot) -> Result<()> {
        let payload = snapshot.to_json().map_err(SocfanError::telemetry)?;
        debug!("Json pack: {}", payload);
        self.client
            .try_publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload)
            .map_err(|e| SocfanError::telemetry(e.to_string()))
    }
}
