/*!
# SensorHub DevKit - Doubles et utilitaires de test

Bibliothèque facilitant les tests du kernel SensorHub avec:
- Mock du publisher MQTT (commandes enregistrées, échecs simulés)
- Sink de persistance en mémoire
- Builders de payloads au format du firmware
- Harness montant un orchestrateur complet
*/

pub mod mqtt_stub;
pub mod sink_stub;
pub mod test_utils;

pub use mqtt_stub::{MockPublisher, SensorMessageBuilder};
pub use sink_stub::MemorySink;
pub use test_utils::{TestHarness, TestViewer};
