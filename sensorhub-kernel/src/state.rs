use crate::models::{ActuatorState, DeviceSnapshot, SwitchValue};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Dernier état connu de chaque canal actionneur.
///
/// Le set de canaux est figé à la construction ; tous démarrent en `Unknown`.
/// Seuls les messages de statut décodés le modifient, dernier traité gagnant.
#[derive(Debug)]
pub struct DeviceStateStore {
    channels: Mutex<DeviceSnapshot>,
}

impl DeviceStateStore {
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let map: BTreeMap<_, _> = channels
            .into_iter()
            .map(|ch| (ch.as_ref().to_string(), ActuatorState::unknown(ch.as_ref())))
            .collect();
        Self { channels: Mutex::new(map) }
    }

    /// Retourne la valeur précédente, ou `None` si le canal n'existe pas (rien n'est écrit)
    pub fn apply_status(&self, channel: &str, value: SwitchValue) -> Option<SwitchValue> {
        let mut channels = self.channels.lock();
        let entry = channels.get_mut(channel)?;
        let previous = entry.value;
        entry.value = value;
        entry.updated_at = Some(OffsetDateTime::now_utc());
        Some(previous)
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.channels.lock().clone()
    }

    pub fn get(&self, channel: &str) -> Option<ActuatorState> {
        self.channels.lock().get(channel).cloned()
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.lock().contains_key(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DeviceStateStore {
        DeviceStateStore::new(["ch1", "ch2", "ch3"])
    }

    #[test]
    fn test_all_channels_start_unknown() {
        let snap = store().snapshot();
        assert_eq!(snap.len(), 3);
        assert!(snap.values().all(|s| s.value == SwitchValue::Unknown && s.updated_at.is_none()));
    }

    #[test]
    fn test_apply_then_overwrite() {
        let s = store();
        assert_eq!(s.apply_status("ch1", SwitchValue::On), Some(SwitchValue::Unknown));
        assert_eq!(s.snapshot()["ch1"].value, SwitchValue::On);
        assert_eq!(s.apply_status("ch1", SwitchValue::Off), Some(SwitchValue::On));
        let snap = s.snapshot();
        assert_eq!(snap["ch1"].value, SwitchValue::Off);
        assert!(snap["ch1"].updated_at.is_some());
        assert_eq!(snap["ch2"].value, SwitchValue::Unknown);
    }

    #[test]
    fn test_unknown_channel_ignored() {
        let s = store();
        assert_eq!(s.apply_status("ch9", SwitchValue::On), None);
        assert!(s.get("ch9").is_none());
        assert_eq!(s.snapshot().len(), 3);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let s = store();
        let before = s.snapshot();
        s.apply_status("ch2", SwitchValue::On);
        assert_eq!(before["ch2"].value, SwitchValue::Unknown);
        assert_eq!(s.get("ch2").unwrap().value, SwitchValue::On);
    }
}
