use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{error::PersistenceError, schedule::ScheduleConfig};

/// Every device's schedule at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub outlets: Vec<ScheduleConfig>,
    pub door: ScheduleConfig,
}

pub trait PersistenceStore {
    /// `Ok(None)` when nothing has been persisted yet.
    fn load_snapshot(&self) -> Result<Option<SettingsSnapshot>, PersistenceError>;

    fn save_snapshot(&mut self, snapshot: &SettingsSnapshot) -> Result<(), PersistenceError>;
}

/// Writes settings through to a [`PersistenceStore`] only when they drift
/// from the last persisted snapshot.
#[derive(Debug)]
pub struct SettingsStore<P> {
    persistence: P,
    snapshot: SettingsSnapshot,
}

impl<P: PersistenceStore> SettingsStore<P> {
    /// Loads the persisted snapshot, if any.
    ///
    /// Returns the store together with the loaded snapshot so the caller can
    /// apply it to its devices. Without a persisted snapshot the store is
    /// seeded from `current` and nothing is written.
    pub fn open(
        persistence: P,
        current: SettingsSnapshot,
    ) -> Result<(Self, Option<SettingsSnapshot>), PersistenceError> {
        let loaded = persistence.load_snapshot()?;
        let snapshot = match &loaded {
            Some(snapshot) => {
                info!(outlets = snapshot.outlets.len(), "loaded persisted settings");
                snapshot.clone()
            }
            None => {
                info!("no persisted settings, starting from defaults");
                current
            }
        };
        Ok((Self::seeded(persistence, snapshot), loaded))
    }

    /// Starts from `snapshot` without reading `persistence`, for when the
    /// persisted settings could not be loaded.
    pub fn seeded(persistence: P, snapshot: SettingsSnapshot) -> Self {
        Self {
            persistence,
            snapshot,
        }
    }

    pub fn snapshot(&self) -> &SettingsSnapshot {
        &self.snapshot
    }

    pub fn has_drift(&self, current: &SettingsSnapshot) -> bool {
        self.snapshot != *current
    }

    /// Persists `current` if it differs from the last snapshot.
    ///
    /// The snapshot is only replaced after a successful write, so a failed
    /// write is seen again as drift on the next check.
    pub fn check_for_change(&mut self, current: &SettingsSnapshot) -> Result<bool, PersistenceError> {
        if !self.has_drift(current) {
            return Ok(false);
        }

        self.persistence.save_snapshot(current)?;
        self.snapshot = current.clone();
        debug!("settings changed and persisted");
        Ok(true)
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::trigger::TriggerKind;

    #[derive(Default)]
    struct MemoryStore {
        saved: Option<SettingsSnapshot>,
        writes: usize,
        fail: bool,
    }

    impl PersistenceStore for MemoryStore {
        fn load_snapshot(&self) -> Result<Option<SettingsSnapshot>, PersistenceError> {
            Ok(self.saved.clone())
        }

        fn save_snapshot(&mut self, snapshot: &SettingsSnapshot) -> Result<(), PersistenceError> {
            if self.fail {
                return Err(std::io::Error::other("disk full").into());
            }
            self.saved = Some(snapshot.clone());
            self.writes += 1;
            Ok(())
        }
    }

    fn defaults() -> SettingsSnapshot {
        SettingsSnapshot {
            outlets: vec![ScheduleConfig::new(TriggerKind::Temperature); 4],
            door: ScheduleConfig::new(TriggerKind::Light),
        }
    }

    #[test]
    fn first_run_seeds_without_writing() {
        let (mut store, loaded) = SettingsStore::open(MemoryStore::default(), defaults()).unwrap();

        assert!(loaded.is_none());
        assert_eq!(store.snapshot(), &defaults());
        assert_eq!(store.check_for_change(&defaults()).unwrap(), false);
        assert_eq!(store.persistence().writes, 0);
    }

    #[test]
    fn drift_is_persisted_once() {
        let (mut store, _) = SettingsStore::open(MemoryStore::default(), defaults()).unwrap();

        let mut current = defaults();
        current.outlets[2].on_time = 18.0;

        assert!(store.has_drift(&current));
        assert_eq!(store.check_for_change(&current).unwrap(), true);
        assert_eq!(store.check_for_change(&current).unwrap(), false);
        assert_eq!(store.persistence().writes, 1);
        assert_eq!(store.persistence().saved.as_ref(), Some(&current));
    }

    #[test]
    fn any_single_field_counts_as_drift() {
        let (store, _) = SettingsStore::open(MemoryStore::default(), defaults()).unwrap();

        let mutations: [fn(&mut SettingsSnapshot); 6] = [
            |s: &mut SettingsSnapshot| s.outlets[0].enabled = true,
            |s: &mut SettingsSnapshot| s.outlets[1].off_time = 6.0,
            |s: &mut SettingsSnapshot| s.outlets[3].combine_with_and = true,
            |s: &mut SettingsSnapshot| s.outlets[0].trigger_threshold = 40.0,
            |s: &mut SettingsSnapshot| s.door.trigger_direction = crate::TriggerDirection::ActivateAbove,
            |s: &mut SettingsSnapshot| s.door.on_time = 6.5,
        ];

        for mutate in mutations {
            let mut current = defaults();
            mutate(&mut current);
            assert!(store.has_drift(&current));
        }
        assert!(!store.has_drift(&defaults()));
    }

    #[test]
    fn failed_write_keeps_reporting_drift() {
        let (mut store, _) = SettingsStore::open(
            MemoryStore {
                fail: true,
                ..MemoryStore::default()
            },
            defaults(),
        )
        .unwrap();

        let mut current = defaults();
        current.door.enabled = true;

        assert!(store.check_for_change(&current).is_err());
        assert!(store.has_drift(&current));

        store.persistence.fail = false;
        assert_eq!(store.check_for_change(&current).unwrap(), true);
        assert!(!store.has_drift(&current));
    }

    #[test]
    fn loads_existing_snapshot() {
        let mut saved = defaults();
        saved.outlets[0].enabled = true;

        let (store, loaded) = SettingsStore::open(
            MemoryStore {
                saved: Some(saved.clone()),
                ..MemoryStore::default()
            },
            defaults(),
        )
        .unwrap();

        assert_eq!(loaded, Some(saved.clone()));
        assert_eq!(store.snapshot(), &saved);
    }
}
