//! Décodage des payloads broker vers des messages typés.
//!
//! Deux topics entrants :
//! - télémétrie : JSON `{temperature, humidity, light[, timestamp]}`, décodage tolérant
//!   champ par champ
//! - statut : JSON `{channel, status}` puis repli sur le format compact `ch1:1,ch2:0`
//!
//! Le décodage est pur : l'heure de réception est passée en paramètre.

use crate::models::{ChannelId, SwitchValue, TelemetryReading};
use serde_json::{Map, Value};
use std::collections::HashSet;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Au-delà, un timestamp numérique est en millisecondes
const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    Telemetry(TelemetryReading),
    Status(Vec<(ChannelId, SwitchValue)>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeErrorKind {
    #[error("unknown topic")]
    UnknownTopic,
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("expected a JSON object")]
    NotAnObject,
    #[error("no measurement field in telemetry")]
    MissingFields,
    #[error("unexpected status shape")]
    UnexpectedShape,
    #[error("invalid status word '{0}'")]
    InvalidStatus(String),
    #[error("no usable channel in status")]
    EmptyStatus,
}

/// Erreur de décodage : garde le payload brut pour les logs
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("decode failed on '{topic}': {kind} (payload: {raw})")]
pub struct DecodeError {
    pub topic: String,
    pub raw: String,
    pub kind: DecodeErrorKind,
}

#[derive(Debug, Clone)]
pub struct WireDecoder {
    telemetry_topic: String,
    status_topic: String,
    channels: HashSet<ChannelId>,
}

impl WireDecoder {
    pub fn new(
        telemetry_topic: impl Into<String>,
        status_topic: impl Into<String>,
        channels: impl IntoIterator<Item = ChannelId>,
    ) -> Self {
        Self {
            telemetry_topic: telemetry_topic.into(),
            status_topic: status_topic.into(),
            channels: channels.into_iter().collect(),
        }
    }

    pub fn from_config(cfg: &crate::config::KernelConfig) -> Self {
        Self::new(&cfg.topics.telemetry, &cfg.topics.status, cfg.channel_ids())
    }

    pub fn decode(
        &self,
        topic: &str,
        payload: &[u8],
        received_at: OffsetDateTime,
    ) -> Result<DecodedMessage, DecodeError> {
        let fail = |kind| DecodeError {
            topic: topic.to_string(),
            raw: String::from_utf8_lossy(payload).into_owned(),
            kind,
        };

        let text = std::str::from_utf8(payload).map_err(|_| fail(DecodeErrorKind::InvalidUtf8))?;

        if topic == self.telemetry_topic {
            decode_telemetry(text, received_at).map_err(fail)
        } else if topic == self.status_topic {
            self.decode_status(text).map_err(fail)
        } else {
            Err(fail(DecodeErrorKind::UnknownTopic))
        }
    }

    fn decode_status(&self, text: &str) -> Result<DecodedMessage, DecodeErrorKind> {
        let pairs = match serde_json::from_str::<Value>(text) {
            Ok(value) => self.status_from_json(&value)?,
            Err(_) => self.status_from_compact(text),
        };
        if pairs.is_empty() {
            return Err(DecodeErrorKind::EmptyStatus);
        }
        Ok(DecodedMessage::Status(pairs))
    }

    fn status_from_json(&self, value: &Value) -> Result<Vec<(ChannelId, SwitchValue)>, DecodeErrorKind> {
        let obj = value.as_object().ok_or(DecodeErrorKind::UnexpectedShape)?;
        let channel = obj
            .get("channel")
            .and_then(Value::as_str)
            .ok_or(DecodeErrorKind::UnexpectedShape)?;
        let status = obj
            .get("status")
            .and_then(Value::as_str)
            .ok_or(DecodeErrorKind::UnexpectedShape)?;

        let switch = match status.trim().to_ascii_lowercase().as_str() {
            "on" => SwitchValue::On,
            "off" => SwitchValue::Off,
            other => return Err(DecodeErrorKind::InvalidStatus(other.to_string())),
        };

        let channel = channel.trim();
        if !self.channels.contains(channel) {
            return Ok(Vec::new());
        }
        Ok(vec![(channel.to_string(), switch)])
    }

    /// `ch1:1,ch2:0` ; paires sans ':' ignorées une à une, clés inconnues ignorées
    fn status_from_compact(&self, text: &str) -> Vec<(ChannelId, SwitchValue)> {
        text.split(',')
            .filter_map(|pair| pair.split_once(':'))
            .map(|(key, value)| (key.trim(), value.trim()))
            .filter(|(key, _)| self.channels.contains(*key))
            .map(|(key, value)| {
                let switch = if value == "1" { SwitchValue::On } else { SwitchValue::Off };
                (key.to_string(), switch)
            })
            .collect()
    }
}

fn decode_telemetry(text: &str, received_at: OffsetDateTime) -> Result<DecodedMessage, DecodeErrorKind> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeErrorKind::InvalidJson(e.to_string()))?;
    let obj = value.as_object().ok_or(DecodeErrorKind::NotAnObject)?;

    if !["temperature", "humidity", "light"].iter().any(|k| obj.contains_key(*k)) {
        return Err(DecodeErrorKind::MissingFields);
    }

    Ok(DecodedMessage::Telemetry(TelemetryReading {
        temperature: number(obj, "temperature"),
        humidity: number(obj, "humidity"),
        light: integer(obj, "light"),
        captured_at: timestamp(obj).unwrap_or(received_at),
    }))
}

fn number(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    obj.get(key).and_then(Value::as_f64).filter(|v| v.is_finite())
}

fn integer(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    let value = obj.get(key)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64))
}

fn timestamp(obj: &Map<String, Value>) -> Option<OffsetDateTime> {
    match obj.get("timestamp")? {
        Value::String(s) => OffsetDateTime::parse(s, &Rfc3339).ok(),
        Value::Number(n) => {
            let raw = n.as_f64()?;
            let nanos = if raw.abs() > EPOCH_MILLIS_THRESHOLD {
                raw * 1e6
            } else {
                raw * 1e9
            };
            OffsetDateTime::from_unix_timestamp_nanos(nanos as i128).ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-06-01 10:00 UTC);

    fn decoder() -> WireDecoder {
        WireDecoder::new(
            "sensorhub/telemetry",
            "sensorhub/status",
            ["ch1", "ch2", "ch3"].map(String::from),
        )
    }

    fn telemetry(payload: &str) -> Result<DecodedMessage, DecodeError> {
        decoder().decode("sensorhub/telemetry", payload.as_bytes(), NOW)
    }

    fn status(payload: &str) -> Result<DecodedMessage, DecodeError> {
        decoder().decode("sensorhub/status", payload.as_bytes(), NOW)
    }

    #[test]
    fn test_full_telemetry() {
        let msg = telemetry(r#"{"temperature":25.5,"humidity":60,"light":400}"#).unwrap();
        assert_eq!(
            msg,
            DecodedMessage::Telemetry(TelemetryReading {
                temperature: Some(25.5),
                humidity: Some(60.0),
                light: Some(400),
                captured_at: NOW,
            })
        );
    }

    #[test]
    fn test_partial_telemetry_is_lenient() {
        let Ok(DecodedMessage::Telemetry(r)) = telemetry(r#"{"temperature":"hot","light":12.6}"#) else {
            panic!("expected telemetry");
        };
        assert_eq!(r.temperature, None);
        assert_eq!(r.humidity, None);
        assert_eq!(r.light, Some(13));
    }

    #[test]
    fn test_telemetry_timestamp() {
        let Ok(DecodedMessage::Telemetry(r)) =
            telemetry(r#"{"temperature":1,"timestamp":"2024-05-01T08:30:00Z"}"#)
        else {
            panic!("expected telemetry");
        };
        assert_eq!(r.captured_at, datetime!(2024-05-01 08:30 UTC));

        let Ok(DecodedMessage::Telemetry(r)) = telemetry(r#"{"light":1,"timestamp":1714552200000}"#) else {
            panic!("expected telemetry");
        };
        assert_eq!(r.captured_at, datetime!(2024-05-01 08:30 UTC));

        let Ok(DecodedMessage::Telemetry(r)) = telemetry(r#"{"light":1,"timestamp":"yesterday"}"#) else {
            panic!("expected telemetry");
        };
        assert_eq!(r.captured_at, NOW);
    }

    #[test]
    fn test_malformed_telemetry() {
        for (payload, kind) in [
            ("not json", "json"),
            ("[1,2,3]", "object"),
            (r#"{"pressure":1013}"#, "missing"),
            ("", "json"),
        ] {
            let err = telemetry(payload).unwrap_err();
            assert_eq!(err.raw, payload);
            match kind {
                "json" => assert!(matches!(err.kind, DecodeErrorKind::InvalidJson(_))),
                "object" => assert_eq!(err.kind, DecodeErrorKind::NotAnObject),
                _ => assert_eq!(err.kind, DecodeErrorKind::MissingFields),
            }
        }
    }

    #[test]
    fn test_invalid_utf8() {
        let err = decoder()
            .decode("sensorhub/telemetry", &[0xff, 0xfe, b'{'], NOW)
            .unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::InvalidUtf8);
    }

    #[test]
    fn test_unknown_topic() {
        let err = decoder().decode("other/topic", b"{}", NOW).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnknownTopic);
    }

    #[test]
    fn test_status_json_and_compact_are_equivalent() {
        assert_eq!(
            status(r#"{"channel":"ch1","status":"on"}"#).unwrap(),
            status("ch1:1").unwrap()
        );
        assert_eq!(
            status(r#"{"channel":"ch2","status":"OFF"}"#).unwrap(),
            status("ch2:0").unwrap()
        );
    }

    #[test]
    fn test_compact_status() {
        assert_eq!(
            status("ch1:1,ch2:0").unwrap(),
            DecodedMessage::Status(vec![
                ("ch1".into(), SwitchValue::On),
                ("ch2".into(), SwitchValue::Off),
            ])
        );
        // paire mal formée et clé inconnue ignorées, le reste passe
        assert_eq!(
            status("garbage, ch9:1 ,ch3: 1,ch2:yes").unwrap(),
            DecodedMessage::Status(vec![
                ("ch3".into(), SwitchValue::On),
                ("ch2".into(), SwitchValue::Off),
            ])
        );
    }

    #[test]
    fn test_status_errors() {
        assert_eq!(status("nothing here").unwrap_err().kind, DecodeErrorKind::EmptyStatus);
        assert_eq!(status("ch9:1").unwrap_err().kind, DecodeErrorKind::EmptyStatus);
        assert_eq!(
            status(r#"{"channel":"ch1"}"#).unwrap_err().kind,
            DecodeErrorKind::UnexpectedShape
        );
        assert_eq!(status("42").unwrap_err().kind, DecodeErrorKind::UnexpectedShape);
        assert_eq!(
            status(r#"{"channel":"ch1","status":"blink"}"#).unwrap_err().kind,
            DecodeErrorKind::InvalidStatus("blink".into())
        );
    }
}
