/*!
Sink de persistance en mémoire

Remplace `JsonlSink` dans les tests : garde les lectures et les audits de
commande dans l'ordre d'écriture, et peut simuler un stockage en erreur ou bloqué.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use sensorhub_kernel::models::{CommandIntent, TelemetryReading};
use sensorhub_kernel::ports::{PersistenceSink, SinkError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct MemorySink {
    telemetry: Arc<Mutex<Vec<TelemetryReading>>>,
    commands: Arc<Mutex<Vec<CommandIntent>>>,
    failing: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Les écritures suivantes échouent (stockage indisponible)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Les écritures suivantes ne rendent jamais la main (stockage bloqué)
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn telemetry(&self) -> Vec<TelemetryReading> {
        self.telemetry.lock().clone()
    }

    pub fn commands(&self) -> Vec<CommandIntent> {
        self.commands.lock().clone()
    }

    async fn check(&self) -> Result<(), SinkError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("memory sink set to fail".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn insert_telemetry(&self, reading: &TelemetryReading) -> Result<String, SinkError> {
        self.check().await?;
        let mut rows = self.telemetry.lock();
        rows.push(reading.clone());
        Ok(format!("telemetry-{}", rows.len()))
    }

    async fn insert_command_audit(&self, intent: &CommandIntent) -> Result<String, SinkError> {
        self.check().await?;
        self.commands.lock().push(intent.clone());
        Ok(intent.id.to_string())
    }
}
