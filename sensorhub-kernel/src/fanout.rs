//! Fan-out temps réel vers les viewers connectés.
//!
//! Chaque viewer possède une file bornée ordonnée (mpsc) vidée par sa tâche
//! d'écriture côté transport. `broadcast` ne fait que des `try_send` : un viewer
//! lent ou mort ne bloque jamais la diffusion, il est retiré du registre.

use crate::models::{DeviceSnapshot, TelemetryReading};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

pub type ViewerId = Uuid;

/// Événements poussés aux viewers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HubEvent {
    SensorData(TelemetryReading),
    DeviceStatus(DeviceSnapshot),
    BrokerStatus(bool),
    DataStatus(bool),
}

/// Fournit l'état courant envoyé à un viewer dès son arrivée
pub trait SnapshotSource: Send + Sync {
    fn snapshot_events(&self) -> Vec<HubEvent>;
}

pub struct FanoutHub {
    viewers: Mutex<HashMap<ViewerId, mpsc::Sender<HubEvent>>>,
    snapshot: Arc<dyn SnapshotSource>,
}

impl FanoutHub {
    pub fn new(snapshot: Arc<dyn SnapshotSource>) -> Self {
        Self {
            viewers: Mutex::new(HashMap::new()),
            snapshot,
        }
    }

    /// Enregistre un viewer et lui pousse l'état courant avant toute diffusion suivante
    pub fn register(&self, tx: mpsc::Sender<HubEvent>) -> ViewerId {
        let id = Uuid::new_v4();
        let mut viewers = self.viewers.lock();

        for event in self.snapshot.snapshot_events() {
            if let Err(e) = tx.try_send(event) {
                tracing::warn!("viewer {id}: initial snapshot not delivered ({e}), not registering");
                return id;
            }
        }

        viewers.insert(id, tx);
        tracing::info!("viewer {id} connected ({} live)", viewers.len());
        id
    }

    /// Idempotent : retourne `false` si le viewer était déjà parti
    pub fn unregister(&self, id: ViewerId) -> bool {
        let removed = self.viewers.lock().remove(&id).is_some();
        if removed {
            tracing::info!("viewer {id} disconnected");
        }
        removed
    }

    /// Diffuse à tous les viewers vivants ; retourne le nombre de livraisons.
    ///
    /// Le verrou du registre est tenu pendant la boucle (envois non bloquants) :
    /// les appels concurrents sont sérialisés, chaque viewer voit le même ordre.
    pub fn broadcast(&self, event: HubEvent) -> usize {
        let mut viewers = self.viewers.lock();
        let mut dead = Vec::new();
        let mut delivered = 0;

        for (id, tx) in viewers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("viewer {id} gone, pruning");
                    dead.push(*id);
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("viewer {id} too slow (queue full), dropping it");
                    dead.push(*id);
                }
            }
        }

        for id in dead {
            viewers.remove(&id);
        }
        delivered
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.lock().len()
    }

    pub fn is_registered(&self, id: ViewerId) -> bool {
        self.viewers.lock().contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<HubEvent>);

    impl SnapshotSource for Fixed {
        fn snapshot_events(&self) -> Vec<HubEvent> {
            self.0.clone()
        }
    }

    fn hub_with(snapshot: Vec<HubEvent>) -> FanoutHub {
        FanoutHub::new(Arc::new(Fixed(snapshot)))
    }

    fn drain(rx: &mut mpsc::Receiver<HubEvent>) -> Vec<HubEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn test_register_sends_snapshot_first() {
        let hub = hub_with(vec![HubEvent::BrokerStatus(true), HubEvent::DataStatus(false)]);
        let (tx, mut rx) = mpsc::channel(8);
        hub.register(tx);
        hub.broadcast(HubEvent::DataStatus(true));
        assert_eq!(
            drain(&mut rx),
            vec![
                HubEvent::BrokerStatus(true),
                HubEvent::DataStatus(false),
                HubEvent::DataStatus(true),
            ]
        );
    }

    #[test]
    fn test_per_viewer_order_is_call_order() {
        let hub = hub_with(vec![]);
        let (tx_a, mut rx_a) = mpsc::channel(16);
        let (tx_b, mut rx_b) = mpsc::channel(16);
        hub.register(tx_a);
        hub.register(tx_b);

        let events: Vec<_> = (0..5).map(|i| HubEvent::DataStatus(i % 2 == 0)).collect();
        for ev in &events {
            assert_eq!(hub.broadcast(ev.clone()), 2);
        }
        assert_eq!(drain(&mut rx_a), events);
        assert_eq!(drain(&mut rx_b), events);
    }

    #[test]
    fn test_closed_viewer_is_pruned() {
        let hub = hub_with(vec![]);
        let (tx_live, mut rx_live) = mpsc::channel(8);
        let (tx_dead, rx_dead) = mpsc::channel(8);
        hub.register(tx_live);
        let dead = hub.register(tx_dead);
        drop(rx_dead);

        assert_eq!(hub.broadcast(HubEvent::BrokerStatus(true)), 1);
        assert!(!hub.is_registered(dead));
        assert_eq!(hub.viewer_count(), 1);
        assert_eq!(hub.broadcast(HubEvent::BrokerStatus(false)), 1);
        assert_eq!(drain(&mut rx_live).len(), 2);
    }

    #[test]
    fn test_slow_viewer_is_dropped() {
        let hub = hub_with(vec![]);
        let (tx, _rx) = mpsc::channel(1);
        let id = hub.register(tx);
        assert_eq!(hub.broadcast(HubEvent::DataStatus(true)), 1);
        assert_eq!(hub.broadcast(HubEvent::DataStatus(false)), 0);
        assert!(!hub.is_registered(id));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let hub = hub_with(vec![]);
        let (tx, _rx) = mpsc::channel(4);
        let id = hub.register(tx);
        assert!(hub.unregister(id));
        assert!(!hub.unregister(id));
        assert_eq!(hub.broadcast(HubEvent::DataStatus(true)), 0);
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(HubEvent::DataStatus(false)).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "DATA_STATUS", "data": false }));
    }
}
