/*!
Test Harness pour le kernel SensorHub

Monte un `Orchestrator` complet sur des doubles (publisher et sink en mémoire)
et fournit :
- l'injection de messages broker (télémétrie, statut, événements de lien)
- des viewers branchés directement sur le hub de fan-out
- le pilotage du temps de liveness sans attendre le vrai timeout
*/

use crate::mqtt_stub::{MockPublisher, SensorMessageBuilder};
use crate::sink_stub::MemorySink;
use sensorhub_kernel::config::KernelConfig;
use sensorhub_kernel::fanout::{HubEvent, ViewerId};
use sensorhub_kernel::liveness::BrokerEvent;
use sensorhub_kernel::models::CommandIntent;
use sensorhub_kernel::Orchestrator;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Viewer de test : une file bornée enregistrée auprès du hub
pub struct TestViewer {
    pub id: ViewerId,
    rx: mpsc::Receiver<HubEvent>,
}

impl TestViewer {
    /// Vide tout ce qui est déjà en file, sans attendre
    pub fn drain(&mut self) -> Vec<HubEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn next_event(&mut self) -> Option<HubEvent> {
        self.rx.try_recv().ok()
    }
}

pub struct TestHarness {
    pub config: KernelConfig,
    pub publisher: MockPublisher,
    pub sink: MemorySink,
    pub kernel: Arc<Orchestrator>,
}

impl TestHarness {
    /// Harness sur la configuration par défaut (ch1..ch3, timeout 10 s)
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        let publisher = MockPublisher::new();
        let sink = MemorySink::new();
        let kernel = Arc::new(Orchestrator::new(
            &config,
            Arc::new(publisher.clone()),
            Arc::new(sink.clone()),
        ));
        Self {
            config,
            publisher,
            sink,
            kernel,
        }
    }

    /// Connecte un viewer ; la file contient déjà le snapshot initial
    pub fn attach_viewer(&self, capacity: usize) -> TestViewer {
        let (tx, rx) = mpsc::channel(capacity);
        let id = self.kernel.hub().register(tx);
        log::info!("👀 Attached test viewer {}", id);
        TestViewer { id, rx }
    }

    /// Connecte un viewer et jette son snapshot initial
    pub fn attach_quiet_viewer(&self) -> TestViewer {
        let mut viewer = self.attach_viewer(64);
        viewer.drain();
        viewer
    }

    pub fn broker_event(&self, event: BrokerEvent) {
        self.kernel.handle_broker_event(event);
    }

    pub fn connect_broker(&self) {
        self.broker_event(BrokerEvent::Connected);
    }

    /// Message brut sur un topic quelconque
    pub async fn send_raw(&self, topic: &str, payload: &[u8]) {
        self.kernel.handle_message(topic, payload).await;
    }

    pub async fn send_telemetry(&self, temperature: f64, humidity: f64, light: i64) {
        let payload = SensorMessageBuilder::telemetry(temperature, humidity, light);
        let topic = self.config.topics.telemetry.clone();
        self.send_raw(&topic, payload.to_string().as_bytes()).await;
        log::info!("🌡️ Sent telemetry {}", payload);
    }

    pub async fn send_status(&self, channel: &str, on: bool) {
        let payload = SensorMessageBuilder::status_json(channel, on);
        let topic = self.config.topics.status.clone();
        self.send_raw(&topic, payload.to_string().as_bytes()).await;
    }

    pub async fn send_status_compact(&self, pairs: &[(&str, bool)]) {
        let payload = SensorMessageBuilder::status_compact(pairs);
        let topic = self.config.topics.status.clone();
        self.send_raw(&topic, payload.as_bytes()).await;
    }

    pub async fn control(&self, channel: &str, action: &str) -> CommandIntent {
        self.kernel.handle_control_request(channel, action).await
    }

    /// Balaye la liveness comme si `elapsed` s'était écoulé depuis maintenant
    pub fn advance_liveness(&self, elapsed: Duration) {
        self.kernel.check_liveness(Instant::now() + elapsed);
    }

    /// Dépasse le timeout configuré d'une seconde
    pub fn expire_device(&self) {
        self.advance_liveness(self.config.liveness.timeout() + Duration::from_secs(1));
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_basic_functionality() {
        let harness = TestHarness::new();
        let mut viewer = harness.attach_viewer(16);

        // snapshot : broker, données, canaux
        let snapshot = viewer.drain();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0], HubEvent::BrokerStatus(false));
        assert_eq!(snapshot[1], HubEvent::DataStatus(false));

        harness.send_telemetry(22.0, 40.0, 120).await;
        assert_eq!(harness.sink.telemetry().len(), 1);
        assert!(matches!(viewer.next_event(), Some(HubEvent::DataStatus(true))));
        assert!(matches!(viewer.next_event(), Some(HubEvent::SensorData(_))));
    }
}
