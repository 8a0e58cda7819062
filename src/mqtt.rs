use crate::error::AppError;
use std::time::Duration;
use tracing::warn;

// Use the MQTT v5 API surface only
use rumqttc::v5 as mqtt5;
use rumqttc::Transport;

pub type MqttOptions = mqtt5::MqttOptions;
pub type AsyncClient = mqtt5::AsyncClient;
pub type EventLoop = mqtt5::EventLoop;
pub type QoS = mqtt5::mqttbytes::QoS;

pub fn build_options(
    host: &str,
    port: u16,
    client_id: &str,
    username: &Option<String>,
    password: &Option<String>,
    keep_alive_secs: u64,
) -> MqttOptions {
    let mut opts = MqttOptions::new(client_id, host, port);
    opts.set_keep_alive(Duration::from_secs(keep_alive_secs));
    if let (Some(u), Some(p)) = (username, password) {
        opts.set_credentials(u.clone(), p.clone());
    }
    if port == 8883 {
        opts.set_transport(Transport::tls_with_default_config());
    }
    opts
}

pub fn new(options: MqttOptions) -> (AsyncClient, EventLoop) {
    mqtt5::AsyncClient::new(options, 10)
}

pub fn qos(v: u8) -> QoS {
    match v {
        2 => QoS::ExactlyOnce,
        0 => QoS::AtMostOnce,
        _ => QoS::AtLeastOnce,
    }
}

/// Keeps the connection serviced; the rest of the code only publishes.
pub async fn drive(mut eventloop: EventLoop) {
    loop {
        if let Err(e) = eventloop.poll().await {
            warn!("mqtt error: {e}; reconnecting after short delay");
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
}

pub async fn publish(
    client: &AsyncClient,
    topic: &str,
    qos: QoS,
    payload: Vec<u8>,
) -> Result<(), AppError> {
    client
        .publish(topic, qos, false, payload)
        .await
        .map_err(|e| AppError::Mqtt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_qos_levels() {
        assert_eq!(qos(0), QoS::AtMostOnce);
        assert_eq!(qos(1), QoS::AtLeastOnce);
        assert_eq!(qos(2), QoS::ExactlyOnce);
        assert_eq!(qos(7), QoS::AtLeastOnce);
    }
}
