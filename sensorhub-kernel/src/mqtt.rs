//! Glue MQTT (rumqttc) : abonnements, boucle d'événements, publication des commandes.

use crate::config::KernelConfig;
use crate::gate::{CommandPublisher, PublishError};
use crate::liveness::BrokerEvent;
use crate::orchestrator::InboundEvent;
use async_trait::async_trait;
use crate::error::KernelError;
use rumqttc::{
    AsyncClient, ClientError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, SubscribeReasonCode,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Connexion MQTT : client partagé + event loop à faire tourner dans une task
pub struct MqttLink {
    client: AsyncClient,
    eventloop: EventLoop,
    topics: Vec<String>,
}

impl MqttLink {
    /// Prépare le client et demande les abonnements initiaux (échec = fatal au démarrage)
    pub async fn connect(cfg: &KernelConfig) -> Result<Self, ClientError> {
        let mut opts = MqttOptions::new(&cfg.mqtt.client_id, &cfg.mqtt.host, cfg.mqtt.port);
        opts.set_keep_alive(Duration::from_secs(cfg.mqtt.keep_alive_secs.max(5)));

        let (client, eventloop) = AsyncClient::new(opts, 32);
        let topics = vec![cfg.topics.telemetry.clone(), cfg.topics.status.clone()];
        for topic in &topics {
            client.subscribe(topic, QoS::AtLeastOnce).await?;
        }
        tracing::info!(
            "mqtt client for {}:{} (topics: {})",
            cfg.mqtt.host,
            cfg.mqtt.port,
            topics.join(", ")
        );

        Ok(Self { client, eventloop, topics })
    }

    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher { client: self.client.clone() }
    }

    /// Traduit les événements rumqttc en `InboundEvent` typés jusqu'à l'annulation.
    /// Un refus des abonnements initiaux par le broker arrête le kernel (jeton annulé).
    pub async fn run(
        mut self,
        tx: mpsc::Sender<InboundEvent>,
        cancel: CancellationToken,
    ) -> Result<(), KernelError> {
        let mut connected_once = false;
        let mut subscriptions = SubscriptionCheck::new(self.topics.len());
        let mut outcome = Ok(());

        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.eventloop.poll() => polled,
            };

            let inbound = match polled {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    if connected_once {
                        self.resubscribe();
                    }
                    connected_once = true;
                    Some(InboundEvent::Broker(BrokerEvent::Connected))
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if let Err(e) = subscriptions.on_suback(&ack.return_codes) {
                        tracing::error!("{e}");
                        cancel.cancel();
                        outcome = Err(e);
                        break;
                    }
                    None
                }
                Ok(Event::Incoming(Packet::Publish(p))) => Some(InboundEvent::Message {
                    topic: p.topic,
                    payload: p.payload.to_vec(),
                }),
                Ok(Event::Incoming(Packet::Disconnect)) | Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    Some(InboundEvent::Broker(BrokerEvent::Closed))
                }
                Ok(_) => None,
                Err(e) => {
                    tracing::error!("mqtt error: {e:?}");
                    if tx.send(InboundEvent::Broker(BrokerEvent::Error)).await.is_err() {
                        break;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                    }
                    Some(InboundEvent::Broker(BrokerEvent::Reconnecting))
                }
            };

            if let Some(event) = inbound {
                if tx.send(event).await.is_err() {
                    tracing::warn!("inbound queue closed, stopping mqtt loop");
                    break;
                }
            }
        }

        if let Err(e) = self.client.disconnect().await {
            tracing::debug!("mqtt disconnect on shutdown: {e}");
        }
        tracing::info!("mqtt loop stopped");
        outcome
    }

    /// Session non persistante : les abonnements sont perdus à la reconnexion.
    /// `try_subscribe` : cette task est la seule à vider la file de requêtes du client.
    fn resubscribe(&self) {
        for topic in &self.topics {
            if let Err(e) = self.client.try_subscribe(topic, QoS::AtLeastOnce) {
                tracing::error!("re-subscribe {topic} failed: {e}");
            }
        }
    }
}

/// Suivi des SUBACK : un refus avant que tous les abonnements initiaux soient
/// acquittés est fatal, un refus après une reconnexion est seulement journalisé.
#[derive(Debug)]
struct SubscriptionCheck {
    startup_pending: usize,
}

impl SubscriptionCheck {
    fn new(topics: usize) -> Self {
        Self { startup_pending: topics }
    }

    fn on_suback(&mut self, codes: &[SubscribeReasonCode]) -> Result<(), KernelError> {
        let refused = codes
            .iter()
            .filter(|c| matches!(c, SubscribeReasonCode::Failure))
            .count();

        if refused == 0 {
            self.startup_pending = self.startup_pending.saturating_sub(codes.len());
            return Ok(());
        }
        if self.startup_pending > 0 {
            return Err(KernelError::SubscriptionRefused(refused));
        }
        tracing::error!("broker refused {refused} subscription(s) after reconnect");
        Ok(())
    }
}

#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

#[async_trait]
impl CommandPublisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), PublishError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| PublishError::Client(e.to_string()))
    }
}
