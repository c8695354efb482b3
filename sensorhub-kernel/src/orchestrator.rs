/**
 * ORCHESTRATOR - Boucle centrale du kernel SensorHub
 *
 * RÔLE :
 * Relie décodeur, suivi de santé, état actionneurs, fan-out, garde de commandes
 * et sink de persistance. Les callbacks broker arrivent comme `InboundEvent`
 * typés dans une file unique consommée par `run` : l'ordre d'arrivée est
 * préservé jusqu'aux viewers.
 *
 * Les écritures sink sont bornées par `sink_timeout` : un stockage bloqué ne
 * doit jamais affamer le balayage de liveness.
 *
 * FLUX :
 * - télémétrie : decode → sink.insert_telemetry → record_data → SENSOR_DATA
 * - statut     : decode → apply_status → DEVICE_STATUS
 * - broker     : on_broker_event → BROKER_STATUS (sur front)
 * - tick       : sweep → DATA_STATUS{false} (sur front)
 * - commande   : gate.submit → sink.insert_command_audit → intent
 */

use crate::config::KernelConfig;
use crate::decoder::{DecodedMessage, WireDecoder};
use crate::fanout::{FanoutHub, HubEvent, SnapshotSource};
use crate::gate::{CommandGate, CommandPublisher};
use crate::liveness::{BrokerEvent, HealthState, LivenessTracker};
use crate::models::{ChannelView, CommandIntent, ConnectionStatus, TelemetryReading};
use crate::ports::{PersistenceSink, SinkError};
use crate::state::DeviceStateStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Événements entrants, produits par la glue broker
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Message { topic: String, payload: Vec<u8> },
    Broker(BrokerEvent),
}

/// État courant envoyé aux viewers qui arrivent
struct StatusBoard {
    liveness: Arc<LivenessTracker>,
    devices: Arc<DeviceStateStore>,
}

impl SnapshotSource for StatusBoard {
    fn snapshot_events(&self) -> Vec<HubEvent> {
        vec![
            HubEvent::BrokerStatus(self.liveness.is_broker_up()),
            HubEvent::DataStatus(self.liveness.is_device_alive()),
            HubEvent::DeviceStatus(self.devices.snapshot()),
        ]
    }
}

pub struct Orchestrator {
    decoder: WireDecoder,
    liveness: Arc<LivenessTracker>,
    devices: Arc<DeviceStateStore>,
    hub: Arc<FanoutHub>,
    gate: CommandGate,
    sink: Arc<dyn PersistenceSink>,
    labels: HashMap<String, String>,
    check_interval: Duration,
    sink_timeout: Duration,
    started_at: Instant,
}

impl Orchestrator {
    pub fn new(
        cfg: &KernelConfig,
        publisher: Arc<dyn CommandPublisher>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        let liveness = Arc::new(LivenessTracker::new(cfg.liveness.timeout()));
        let devices = Arc::new(DeviceStateStore::new(cfg.channel_ids()));
        let hub = Arc::new(FanoutHub::new(Arc::new(StatusBoard {
            liveness: liveness.clone(),
            devices: devices.clone(),
        })));
        let gate = CommandGate::new(cfg, liveness.clone(), publisher);
        let labels = cfg
            .channels
            .iter()
            .map(|ch| (ch.id.clone(), ch.label().to_string()))
            .collect();

        Self {
            decoder: WireDecoder::from_config(cfg),
            liveness,
            devices,
            hub,
            gate,
            sink,
            labels,
            check_interval: cfg.liveness.check_interval(),
            sink_timeout: cfg.sink_timeout(),
            started_at: Instant::now(),
        }
    }

    pub fn hub(&self) -> &Arc<FanoutHub> {
        &self.hub
    }

    pub fn liveness(&self) -> &LivenessTracker {
        &self.liveness
    }

    pub fn devices(&self) -> &DeviceStateStore {
        &self.devices
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Boucle principale : file entrante + tick de liveness, jusqu'à l'annulation
    pub async fn run(&self, mut inbound: mpsc::Receiver<InboundEvent>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            "orchestrator running (liveness check every {:?}, timeout {:?})",
            self.check_interval,
            self.liveness.timeout()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.check_liveness(Instant::now()),
                event = inbound.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        tracing::warn!("inbound queue closed");
                        break;
                    }
                },
            }
        }
        tracing::info!("orchestrator stopped");
    }

    pub async fn handle_event(&self, event: InboundEvent) {
        match event {
            InboundEvent::Message { topic, payload } => self.handle_message(&topic, &payload).await,
            InboundEvent::Broker(ev) => self.handle_broker_event(ev),
        }
    }

    pub async fn handle_message(&self, topic: &str, payload: &[u8]) {
        match self.decoder.decode(topic, payload, OffsetDateTime::now_utc()) {
            Ok(DecodedMessage::Telemetry(reading)) => self.ingest_telemetry(reading).await,
            Ok(DecodedMessage::Status(pairs)) => {
                for (channel, value) in &pairs {
                    if let Some(previous) = self.devices.apply_status(channel, *value) {
                        tracing::debug!("{channel}: {previous:?} -> {value:?}");
                    }
                }
                self.hub.broadcast(HubEvent::DeviceStatus(self.devices.snapshot()));
            }
            Err(e) => tracing::warn!("{e}"),
        }
    }

    async fn ingest_telemetry(&self, reading: TelemetryReading) {
        let stored = tokio::time::timeout(self.sink_timeout, self.sink.insert_telemetry(&reading))
            .await
            .unwrap_or(Err(SinkError::Timeout(self.sink_timeout)));
        if let Err(e) = stored {
            tracing::error!("telemetry not persisted: {e}");
        }

        if self.liveness.record_data(Instant::now()) == Some(HealthState::Up) {
            tracing::info!("device is alive (data received)");
            self.hub.broadcast(HubEvent::DataStatus(true));
        }
        let delivered = self.hub.broadcast(HubEvent::SensorData(reading));
        tracing::debug!("telemetry fanned out to {delivered} viewers");
    }

    pub fn handle_broker_event(&self, event: BrokerEvent) {
        if let Some(state) = self.liveness.on_broker_event(event, Instant::now()) {
            tracing::info!("broker link {state:?} ({event:?})");
            self.hub.broadcast(HubEvent::BrokerStatus(state == HealthState::Up));
        }
    }

    /// Balayage de liveness ; exposé pour piloter le temps dans les tests
    pub fn check_liveness(&self, now: Instant) {
        if self.liveness.sweep(now) == Some(HealthState::Down) {
            tracing::warn!(
                "device silent for more than {:?}, marking offline",
                self.liveness.timeout()
            );
            self.hub.broadcast(HubEvent::DataStatus(false));
        }
    }

    /// Point d'entrée des commandes : résultat immédiat de la garde, rien n'est diffusé
    pub async fn handle_control_request(&self, channel: &str, action: &str) -> CommandIntent {
        let intent = self.gate.submit(channel, action).await;
        let audited = tokio::time::timeout(self.sink_timeout, self.sink.insert_command_audit(&intent))
            .await
            .unwrap_or(Err(SinkError::Timeout(self.sink_timeout)));
        if let Err(e) = audited {
            tracing::error!("command audit {} not persisted: {e}", intent.id);
        }
        intent
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus {
            device_alive: self.liveness.is_device_alive(),
            broker_up: self.liveness.is_broker_up(),
            last_data_at: self.liveness.last_data_at(),
        }
    }

    pub fn status_snapshot(&self) -> Vec<ChannelView> {
        self.devices
            .snapshot()
            .into_values()
            .map(|state| ChannelView {
                label: self
                    .labels
                    .get(&state.channel)
                    .cloned()
                    .unwrap_or_else(|| state.channel.clone()),
                channel: state.channel,
                value: state.value,
                updated_at: state.updated_at,
            })
            .collect()
    }
}
