/**
 * PERSISTENCE PORTS - Interface de persistance consommée par le kernel
 *
 * RÔLE :
 * Le cœur ne connaît pas le schéma de stockage : il pousse chaque lecture
 * télémétrie et chaque demande de commande (audit) vers un sink abstrait.
 *
 * FONCTIONNEMENT :
 * - PersistenceSink trait = insert_telemetry / insert_command_audit → id
 * - SinkError = erreurs typées (IO, sérialisation, indisponible)
 * - JsonlSink = implémentation fichier (une ligne JSON par enregistrement)
 *
 * CONTRAT :
 * Aucun retry ici : un échec est loggé par l'appelant et le cycle continue.
 */

pub mod jsonl;

use crate::models::{CommandIntent, TelemetryReading};
use async_trait::async_trait;

pub use jsonl::JsonlSink;

/// Erreurs possibles lors d'une écriture vers le sink
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
    #[error("Sink write timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Interface que tout backend de stockage doit implémenter
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Écrit une lecture télémétrie, retourne l'id généré
    async fn insert_telemetry(&self, reading: &TelemetryReading) -> Result<String, SinkError>;

    /// Trace une demande de commande, quel que soit son résultat
    async fn insert_command_audit(&self, intent: &CommandIntent) -> Result<String, SinkError>;
}
