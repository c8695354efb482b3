//! Suivi de santé : deux signaux indépendants.
//!
//! - lien broker : piloté par les événements du client MQTT
//! - device vivant : piloté par les données (réception de télémétrie) et par un
//!   balayage périodique qui ne peut que le faire tomber
//!
//! Chaque transition est un unique read-modify-write sous le mutex du signal ; les
//! méthodes retournent `Some(état)` uniquement sur un front (changement d'état).

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown,
    Up,
    Down,
}

/// Événements de cycle de vie du client broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerEvent {
    Connected,
    Closed,
    Error,
    Reconnecting,
}

#[derive(Debug)]
struct BrokerHealth {
    state: HealthState,
    changed_at: Option<Instant>,
}

#[derive(Debug)]
struct DeviceHealth {
    state: HealthState,
    last_data: Option<Instant>,
    last_data_at: Option<OffsetDateTime>,
}

#[derive(Debug)]
pub struct LivenessTracker {
    timeout: Duration,
    broker: Mutex<BrokerHealth>,
    device: Mutex<DeviceHealth>,
    broker_reconnects: AtomicU32,
}

impl LivenessTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            broker: Mutex::new(BrokerHealth { state: HealthState::Unknown, changed_at: None }),
            device: Mutex::new(DeviceHealth {
                state: HealthState::Unknown,
                last_data: None,
                last_data_at: None,
            }),
            broker_reconnects: AtomicU32::new(0),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn on_broker_event(&self, event: BrokerEvent, now: Instant) -> Option<HealthState> {
        let next = match event {
            BrokerEvent::Connected => HealthState::Up,
            BrokerEvent::Closed | BrokerEvent::Error | BrokerEvent::Reconnecting => HealthState::Down,
        };
        if event == BrokerEvent::Reconnecting {
            self.broker_reconnects.fetch_add(1, Ordering::Relaxed);
        }

        let mut broker = self.broker.lock();
        if broker.state == next {
            return None;
        }
        broker.state = next;
        broker.changed_at = Some(now);
        Some(next)
    }

    /// Télémétrie décodée avec succès : seul chemin vers Up
    pub fn record_data(&self, now: Instant) -> Option<HealthState> {
        let mut device = self.device.lock();
        device.last_data = Some(now);
        device.last_data_at = Some(OffsetDateTime::now_utc());
        if device.state == HealthState::Up {
            return None;
        }
        device.state = HealthState::Up;
        Some(HealthState::Up)
    }

    /// Balayage périodique : Up -> Down si `now - last_data > timeout`
    pub fn sweep(&self, now: Instant) -> Option<HealthState> {
        let mut device = self.device.lock();
        if device.state != HealthState::Up {
            return None;
        }
        let last = device.last_data?;
        if now.saturating_duration_since(last) > self.timeout {
            device.state = HealthState::Down;
            return Some(HealthState::Down);
        }
        None
    }

    pub fn is_device_alive(&self) -> bool {
        self.device.lock().state == HealthState::Up
    }

    pub fn is_broker_up(&self) -> bool {
        self.broker.lock().state == HealthState::Up
    }

    pub fn device_state(&self) -> HealthState {
        self.device.lock().state
    }

    pub fn broker_state(&self) -> HealthState {
        self.broker.lock().state
    }

    pub fn last_data_at(&self) -> Option<OffsetDateTime> {
        self.device.lock().last_data_at
    }

    pub fn broker_changed_at(&self) -> Option<Instant> {
        self.broker.lock().changed_at
    }

    pub fn broker_reconnects(&self) -> u32 {
        self.broker_reconnects.load(Ordering::Relaxed)
    }
}
