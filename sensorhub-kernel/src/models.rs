use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Identifiant opaque d'un canal actionneur (ex: "ch1")
pub type ChannelId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReading {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
}

/// Valeur d'un canal telle que confirmée par le device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchValue {
    On,
    Off,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActuatorState {
    pub channel: ChannelId,
    pub value: SwitchValue,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl ActuatorState {
    pub fn unknown(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            value: SwitchValue::Unknown,
            updated_at: None,
        }
    }
}

pub type DeviceSnapshot = BTreeMap<ChannelId, ActuatorState>;

/// Action demandée sur un canal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    On,
    Off,
}

impl Action {
    /// "on" / "off", insensible à la casse
    pub fn parse(word: &str) -> Option<Self> {
        match word.trim().to_ascii_lowercase().as_str() {
            "on" => Some(Action::On),
            "off" => Some(Action::Off),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::On => "on",
            Action::Off => "off",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandOutcome {
    Sent,
    RejectedDeviceOffline,
    RejectedInvalid,
    PublishFailed,
}

/// Trace d'une demande de commande, terminale dès sa création
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandIntent {
    pub id: Uuid,
    pub channel: String,
    pub action: Option<Action>,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
    pub outcome: CommandOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Vue exposée par GET /connection-status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub device_alive: bool,
    pub broker_up: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_data_at: Option<OffsetDateTime>,
}

/// Vue d'un canal avec son libellé humain (frontière API uniquement)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub channel: ChannelId,
    pub label: String,
    pub value: SwitchValue,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse() {
        assert_eq!(Action::parse("on"), Some(Action::On));
        assert_eq!(Action::parse(" OFF "), Some(Action::Off));
        assert_eq!(Action::parse("toggle"), None);
        assert_eq!(Action::parse(""), None);
    }

    #[test]
    fn test_outcome_wire_names() {
        let json = serde_json::to_string(&CommandOutcome::RejectedDeviceOffline).unwrap();
        assert_eq!(json, "\"REJECTED_DEVICE_OFFLINE\"");
    }

    #[test]
    fn test_reading_serializes_missing_fields_as_null() {
        let reading = TelemetryReading {
            temperature: Some(21.0),
            humidity: None,
            light: Some(300),
            captured_at: time::macros::datetime!(2024-05-01 12:00 UTC),
        };
        let v = serde_json::to_value(&reading).unwrap();
        assert_eq!(v["humidity"], serde_json::Value::Null);
        assert_eq!(v["capturedAt"], "2024-05-01T12:00:00Z");
    }
}
