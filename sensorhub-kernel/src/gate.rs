//! Garde des commandes actionneurs.
//!
//! Règle de sûreté : aucune commande n'est publiée vers un device qui n'a pas
//! prouvé par ses données qu'il est vivant, quel que soit l'état du broker.

use crate::config::KernelConfig;
use crate::liveness::LivenessTracker;
use crate::models::{Action, CommandIntent, CommandOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("broker not connected")]
    NotConnected,
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
    #[error("broker client error: {0}")]
    Client(String),
}

/// Côté sortant du client broker
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), PublishError>;
}

#[derive(Debug, Clone)]
struct ChannelPayloads {
    on: String,
    off: String,
}

pub struct CommandGate {
    liveness: Arc<LivenessTracker>,
    publisher: Arc<dyn CommandPublisher>,
    command_topic: String,
    channels: HashMap<String, ChannelPayloads>,
    publish_timeout: Duration,
}

impl CommandGate {
    pub fn new(
        cfg: &KernelConfig,
        liveness: Arc<LivenessTracker>,
        publisher: Arc<dyn CommandPublisher>,
    ) -> Self {
        let channels = cfg
            .channels
            .iter()
            .map(|ch| {
                let payloads = ChannelPayloads {
                    on: ch.payload_for(Action::On),
                    off: ch.payload_for(Action::Off),
                };
                (ch.id.clone(), payloads)
            })
            .collect();

        Self {
            liveness,
            publisher,
            command_topic: cfg.topics.command.clone(),
            channels,
            publish_timeout: cfg.publish_timeout(),
        }
    }

    pub async fn submit(&self, channel: &str, action: &str) -> CommandIntent {
        let parsed = Action::parse(action);
        let intent = |outcome, detail: Option<String>| CommandIntent {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            action: parsed,
            requested_at: OffsetDateTime::now_utc(),
            outcome,
            detail,
        };

        let Some(payloads) = self.channels.get(channel) else {
            return intent(
                CommandOutcome::RejectedInvalid,
                Some(format!("unknown channel '{channel}'")),
            );
        };
        let Some(action) = parsed else {
            return intent(
                CommandOutcome::RejectedInvalid,
                Some(format!("invalid action '{action}'")),
            );
        };

        if !self.liveness.is_device_alive() {
            tracing::warn!("command {channel}/{action} rejected: device offline");
            return intent(CommandOutcome::RejectedDeviceOffline, None);
        }
        if !self.liveness.is_broker_up() {
            tracing::warn!("command {channel}/{action} not sent: broker down");
            return intent(
                CommandOutcome::PublishFailed,
                Some(PublishError::NotConnected.to_string()),
            );
        }

        let payload = match action {
            Action::On => payloads.on.clone(),
            Action::Off => payloads.off.clone(),
        };

        let published = tokio::time::timeout(
            self.publish_timeout,
            self.publisher.publish(&self.command_topic, payload.clone()),
        )
        .await
        .unwrap_or(Err(PublishError::Timeout(self.publish_timeout)));

        match published {
            Ok(()) => {
                tracing::info!("command {channel}/{action} sent ({payload})");
                intent(CommandOutcome::Sent, None)
            }
            Err(e) => {
                tracing::error!("command {channel}/{action} publish failed: {e}");
                intent(CommandOutcome::PublishFailed, Some(e.to_string()))
            }
        }
    }
}
