/*!
Mock du côté publication MQTT pour développer sans broker

Enregistre toutes les commandes publiées par le kernel et permet de simuler
un broker qui refuse les publications.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use sensorhub_kernel::gate::{CommandPublisher, PublishError};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockMessage {
    pub topic: String,
    pub payload: String,
}

/// Publisher simulé, branché à la place de `MqttPublisher`
#[derive(Clone, Default)]
pub struct MockPublisher {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    failing: Arc<AtomicBool>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Les publications suivantes échouent (broker qui refuse)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.published_messages.lock().len()
    }

    /// Trouve les messages publiés sur un topic donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.published_messages.lock().clear();
    }
}

#[async_trait]
impl CommandPublisher for MockPublisher {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            log::info!("📤 [MOCK] Refused publish to {}", topic);
            return Err(PublishError::Client("mock broker refused".into()));
        }
        log::info!("📤 [MOCK] Published to {}: {}", topic, payload);
        self.published_messages.lock().push(MockMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}

/// Helper pour créer des payloads au format du firmware
pub struct SensorMessageBuilder;

impl SensorMessageBuilder {
    /// Télémétrie `{temperature, humidity, light}`
    pub fn telemetry(temperature: f64, humidity: f64, light: i64) -> Value {
        serde_json::json!({
            "temperature": temperature,
            "humidity": humidity,
            "light": light
        })
    }

    /// Télémétrie horodatée par le device
    pub fn telemetry_at(temperature: f64, humidity: f64, light: i64, at: chrono::DateTime<chrono::Utc>) -> Value {
        let mut msg = Self::telemetry(temperature, humidity, light);
        msg["timestamp"] = Value::String(at.to_rfc3339());
        msg
    }

    /// Statut JSON `{channel, status}`
    pub fn status_json(channel: &str, on: bool) -> Value {
        serde_json::json!({
            "channel": channel,
            "status": if on { "on" } else { "off" }
        })
    }

    /// Statut compact `ch1:1,ch2:0`
    pub fn status_compact(pairs: &[(&str, bool)]) -> String {
        pairs
            .iter()
            .map(|(ch, on)| format!("{}:{}", ch, if *on { 1 } else { 0 }))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_publisher_records() {
        let publisher = MockPublisher::new();
        publisher.publish("sensorhub/command", "ch1on".into()).await.unwrap();

        let messages = publisher.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload, "ch1on");
        assert_eq!(publisher.find_messages_by_topic("other").len(), 0);
    }

    #[tokio::test]
    async fn test_mock_publisher_failing() {
        let publisher = MockPublisher::new();
        publisher.set_failing(true);
        assert!(publisher.publish("t", "x".into()).await.is_err());
        assert_eq!(publisher.publish_count(), 0);
    }

    #[test]
    fn test_message_builders() {
        let t = SensorMessageBuilder::telemetry(25.5, 60.0, 400);
        assert_eq!(t["temperature"], 25.5);
        assert_eq!(t["light"], 400);

        let s = SensorMessageBuilder::status_json("ch2", false);
        assert_eq!(s["status"], "off");

        assert_eq!(
            SensorMessageBuilder::status_compact(&[("ch1", true), ("ch2", false)]),
            "ch1:1,ch2:0"
        );
    }
}
