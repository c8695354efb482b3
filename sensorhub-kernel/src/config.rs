use crate::models::Action;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config invalide: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("channel table invalide: {0}")]
    Channels(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub mqtt: MqttConf,
    pub topics: TopicsConf,
    pub liveness: LivenessConf,
    pub http: HttpConf,
    pub data_dir: PathBuf,
    pub publish_timeout_ms: u64,
    pub sink_timeout_ms: u64,
    pub viewer_queue: usize,
    pub channels: Vec<ChannelConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TopicsConf {
    pub telemetry: String,
    pub status: String,
    pub command: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LivenessConf {
    pub check_interval_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

/// Un canal actionneur + sa table de symboles côté firmware
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChannelConf {
    pub id: String,
    pub label: Option<String>,
    pub on_payload: Option<String>,
    pub off_payload: Option<String>,
}

impl ChannelConf {
    fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.into(),
            label: Some(label.into()),
            on_payload: None,
            off_payload: None,
        }
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    /// Payload publié tel quel ; par défaut "<canal><action>" (ex: "ch1on")
    pub fn payload_for(&self, action: Action) -> String {
        let configured = match action {
            Action::On => self.on_payload.as_ref(),
            Action::Off => self.off_payload.as_ref(),
        };
        configured
            .cloned()
            .unwrap_or_else(|| format!("{}{}", self.id, action.as_str()))
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf::default(),
            topics: TopicsConf::default(),
            liveness: LivenessConf::default(),
            http: HttpConf::default(),
            data_dir: PathBuf::from("./data"),
            publish_timeout_ms: 2000,
            sink_timeout_ms: 2000,
            viewer_queue: 64,
            channels: vec![
                ChannelConf::new("ch1", "Channel 1"),
                ChannelConf::new("ch2", "Channel 2"),
                ChannelConf::new("ch3", "Channel 3"),
            ],
        }
    }
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "sensorhub-kernel".into(),
            keep_alive_secs: 15,
        }
    }
}

impl Default for TopicsConf {
    fn default() -> Self {
        Self {
            telemetry: "sensorhub/telemetry".into(),
            status: "sensorhub/status".into(),
            command: "sensorhub/command".into(),
        }
    }
}

impl Default for LivenessConf {
    fn default() -> Self {
        Self { check_interval_secs: 5, timeout_secs: 10 }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

impl LivenessConf {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl KernelConfig {
    pub fn channel(&self, id: &str) -> Option<&ChannelConf> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn channel_ids(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.id.clone()).collect()
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    /// Borne d'une écriture vers le sink ; au-delà l'écriture est abandonnée
    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms.max(1))
    }

    /// Le set de canaux est figé au démarrage : il doit être non vide et sans doublon
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::Channels("no channel configured".into()));
        }
        let mut seen = HashSet::new();
        for ch in &self.channels {
            if ch.id.trim().is_empty() || ch.id.contains([':', ',']) {
                return Err(ConfigError::Channels(format!("bad channel id '{}'", ch.id)));
            }
            if !seen.insert(ch.id.as_str()) {
                return Err(ConfigError::Channels(format!("duplicate channel '{}'", ch.id)));
            }
        }
        Ok(())
    }

    /// Surcharges par variables d'environnement (après .env)
    fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("SENSORHUB_MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = std::env::var("SENSORHUB_MQTT_PORT").ok().and_then(|p| p.parse().ok()) {
            self.mqtt.port = port;
        }
        if let Ok(bind) = std::env::var("SENSORHUB_HTTP_ADDR") {
            self.http.bind = bind;
        }
        if let Ok(dir) = std::env::var("SENSORHUB_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig, ConfigError> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    let cfg: KernelConfig = serde_yaml::from_str(txt)?;
    cfg.validate()?;
    Ok(cfg)
}

pub async fn load_config() -> Result<KernelConfig, ConfigError> {
    let path = std::env::var("SENSORHUB_CONFIG").unwrap_or_else(|_| "sensorhub.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await?;
        parse_config(&txt)?
    } else {
        tracing::warn!("no {path}, using default config");
        KernelConfig::default()
    };
    cfg.apply_env();
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let cfg = parse_config("  \n").unwrap();
        assert_eq!(cfg.channel_ids(), vec!["ch1", "ch2", "ch3"]);
        assert_eq!(cfg.liveness.timeout(), Duration::from_secs(10));
        assert_eq!(cfg.liveness.check_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = parse_config(
            "mqtt:\n  host: broker.lan\nchannels:\n  - id: pump\n    on_payload: P1\n",
        )
        .unwrap();
        assert_eq!(cfg.mqtt.host, "broker.lan");
        assert_eq!(cfg.mqtt.port, 1883);
        assert_eq!(cfg.topics.command, "sensorhub/command");
        let pump = cfg.channel("pump").unwrap();
        assert_eq!(pump.payload_for(Action::On), "P1");
        assert_eq!(pump.payload_for(Action::Off), "pumpoff");
        assert_eq!(pump.label(), "pump");
    }

    #[test]
    fn test_duplicate_channels_rejected() {
        let err = parse_config("channels:\n  - id: ch1\n  - id: ch1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Channels(_)));
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        assert!(matches!(parse_config("mqtt: [oops"), Err(ConfigError::Yaml(_))));
    }
}
