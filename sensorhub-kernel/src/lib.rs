//! SensorHub kernel : liveness device + fan-out temps réel.
//!
//! Ingestion MQTT (télémétrie + statut actionneurs), double suivi de santé
//! (lien broker / device vivant), diffusion ordonnée vers les viewers WebSocket
//! et commandes actionneurs bloquées tant que le device n'a pas prouvé qu'il vit.

pub mod config;
pub mod decoder;
pub mod error;
pub mod fanout;
pub mod gate;
pub mod http;
pub mod liveness;
pub mod models;
pub mod mqtt;
pub mod orchestrator;
pub mod ports;
pub mod state;
pub mod ws;

pub use error::{KernelError, Result};
pub use orchestrator::{InboundEvent, Orchestrator};
