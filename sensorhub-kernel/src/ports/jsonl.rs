/**
 * PORT JSONL - Stockage append-only des lectures et de l'audit commandes
 *
 * FONCTIONNEMENT :
 * - telemetry.jsonl : une lecture par ligne
 * - commands.jsonl  : une demande de commande par ligne
 * - chaque ligne = { id (UUID v4), stored_at, record }
 * - écritures sérialisées par fichier (mutex async) pour ne jamais entrelacer deux lignes
 */

use super::{PersistenceSink, SinkError};
use crate::models::{CommandIntent, TelemetryReading};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

const TELEMETRY_FILE: &str = "telemetry.jsonl";
const COMMANDS_FILE: &str = "commands.jsonl";

#[derive(Serialize)]
struct StoredRecord<'a, T> {
    id: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    stored_at: OffsetDateTime,
    record: &'a T,
}

pub struct JsonlSink {
    telemetry_path: PathBuf,
    commands_path: PathBuf,
    telemetry_lock: Mutex<()>,
    commands_lock: Mutex<()>,
}

impl JsonlSink {
    /// Ouvre (et crée si besoin) le répertoire de données
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, SinkError> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir).await?;
        tracing::info!("jsonl sink ready in {}", dir.display());
        Ok(Self {
            telemetry_path: dir.join(TELEMETRY_FILE),
            commands_path: dir.join(COMMANDS_FILE),
            telemetry_lock: Mutex::new(()),
            commands_lock: Mutex::new(()),
        })
    }

    async fn append<T: Serialize>(path: &Path, lock: &Mutex<()>, record: &T) -> Result<String, SinkError> {
        let id = Uuid::new_v4().to_string();
        let mut line = serde_json::to_vec(&StoredRecord {
            id: &id,
            stored_at: OffsetDateTime::now_utc(),
            record,
        })?;
        line.push(b'\n');

        let _guard = lock.lock().await;
        let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(id)
    }
}

#[async_trait]
impl PersistenceSink for JsonlSink {
    async fn insert_telemetry(&self, reading: &TelemetryReading) -> Result<String, SinkError> {
        Self::append(&self.telemetry_path, &self.telemetry_lock, reading).await
    }

    async fn insert_command_audit(&self, intent: &CommandIntent) -> Result<String, SinkError> {
        Self::append(&self.commands_path, &self.commands_lock, intent).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, CommandOutcome};

    fn reading(t: f64) -> TelemetryReading {
        TelemetryReading {
            temperature: Some(t),
            humidity: Some(50.0),
            light: None,
            captured_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn test_telemetry_lines_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::open(dir.path().join("nested")).await.unwrap();

        let id1 = sink.insert_telemetry(&reading(20.0)).await.unwrap();
        let id2 = sink.insert_telemetry(&reading(21.5)).await.unwrap();
        assert_ne!(id1, id2);

        let txt = std::fs::read_to_string(dir.path().join("nested").join(TELEMETRY_FILE)).unwrap();
        let lines: Vec<serde_json::Value> =
            txt.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], id1.as_str());
        assert_eq!(lines[1]["record"]["temperature"], 21.5);
        assert_eq!(lines[1]["record"]["light"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_command_audit_written_separately() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::open(dir.path()).await.unwrap();
        let intent = CommandIntent {
            id: Uuid::new_v4(),
            channel: "ch1".into(),
            action: Some(Action::On),
            requested_at: OffsetDateTime::now_utc(),
            outcome: CommandOutcome::RejectedDeviceOffline,
            detail: None,
        };
        sink.insert_command_audit(&intent).await.unwrap();

        assert!(!dir.path().join(TELEMETRY_FILE).exists());
        let txt = std::fs::read_to_string(dir.path().join(COMMANDS_FILE)).unwrap();
        let line: serde_json::Value = serde_json::from_str(txt.trim()).unwrap();
        assert_eq!(line["record"]["outcome"], "REJECTED_DEVICE_OFFLINE");
        assert_eq!(line["record"]["action"], "on");
    }
}
