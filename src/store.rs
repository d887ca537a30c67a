//! ==============================================================================
//! store.rs - reading registry, subscriptions and synchronous dispatch
//! ==============================================================================
//!
//! purpose:
//!     the authoritative in-memory table of latest readings, plus the set of
//!     parties interested in writes to it (globally or for one sensor).
//!
//! concurrency:
//!     one parking_lot RwLock guards both tables so `clear` and `delete` are
//!     atomic across them. writers hold the lock only for the map update and
//!     for cloning the list of subscribers to call; callbacks run after the
//!     lock is released, so a subscriber may read the store again.
//!
//! ```text
//!     ┌──────────────┐  set / modify   ┌──────────────────────┐
//!     │  producers   │ ──────────────> │ readings (BTreeMap)  │
//!     └──────────────┘                 └──────────┬───────────┘
//!                                                 │ after commit
//!                                      ┌──────────┴───────────┐
//!                                      │ scoped subs, global  │
//!                                      └──────────────────────┘
//! ```
//!
//! relationships:
//!     - used by: hub.rs, simulator.rs, stream.rs, api.rs
//!     - one store per process; tests build their own
//!
//! ==============================================================================

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::Reading;
use crate::error::HubError;

/// sensors with data younger than this count as recent in `store_stats`
const RECENT_THRESHOLD_MINUTES: f64 = 10.0;

/// something that wants to hear about writes
///
/// called synchronously on the writer's thread, so implementations should
/// return quickly. errors and panics are caught and logged by the store.
///
/// delivery happens after the write lock is released. two writers racing on
/// the same sensor may therefore notify in the opposite order to their
/// commits; a subscriber that needs the committed latest value should read
/// it back with `SensorStore::get` rather than trust arrival order.
pub trait Subscriber: Send + Sync {
    fn notify(&self, reading: &Reading) -> anyhow::Result<()>;
}

impl<F> Subscriber for F
where
    F: Fn(&Reading) -> anyhow::Result<()> + Send + Sync,
{
    fn notify(&self, reading: &Reading) -> anyhow::Result<()> {
        self(reading)
    }
}

/// handle returned by `subscribe`, unique for the life of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

#[derive(Clone)]
struct Registration {
    id: SubscriberId,
    subscriber: Arc<dyn Subscriber>,
}

#[derive(Default)]
struct Subscriptions {
    scoped: HashMap<String, Vec<Registration>>,
    global: Vec<Registration>,
}

impl Subscriptions {
    /// who to call for a write to `sensor_id`: scoped first, then global
    fn targets(&self, sensor_id: &str) -> Vec<Registration> {
        self.scoped
            .get(sensor_id)
            .into_iter()
            .flatten()
            .chain(self.global.iter())
            .cloned()
            .collect()
    }

    fn remove_scoped(&mut self, sensor_id: &str, id: SubscriberId) -> bool {
        let Some(regs) = self.scoped.get_mut(sensor_id) else {
            return false;
        };
        let before = regs.len();
        regs.retain(|r| r.id != id);
        let removed = regs.len() != before;
        if regs.is_empty() {
            self.scoped.remove(sensor_id);
        }
        removed
    }
}

#[derive(Default)]
struct State {
    readings: BTreeMap<String, Reading>,
    subscriptions: Subscriptions,
}

struct Inner {
    state: RwLock<State>,
    next_id: AtomicU64,
}

/// diagnostic view of the subscription table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionStats {
    pub total_subscribers: usize,
    pub sensor_specific_subscriptions: BTreeMap<String, usize>,
    pub global_subscriptions: usize,
}

/// health view of the reading table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_sensors: usize,
    pub sensors_with_recent_data: usize,
    pub oldest_data_age_minutes: f64,
    pub newest_data_age_minutes: f64,
}

/// clone-able handle to the shared reading table and subscribers
#[derive(Clone)]
pub struct SensorStore {
    inner: Arc<Inner>,
}

impl Default for SensorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    // ==========================================================================
    // reading registry
    // ==========================================================================

    /// upsert the reading under its own `sensor_id` and notify subscribers.
    ///
    /// returns true when this created a new entry.
    pub fn set(&self, reading: Reading) -> bool {
        let (created, targets) = {
            let mut state = self.inner.state.write();
            let created = state
                .readings
                .insert(reading.sensor_id.clone(), reading.clone())
                .is_none();
            (created, state.subscriptions.targets(&reading.sensor_id))
        };
        dispatch(&reading, &targets);
        created
    }

    /// upsert that refuses to move an existing sensor's timestamp backwards.
    ///
    /// a first write is stored as given. a write older than the stored
    /// reading is rejected with `Validation` and nothing is dispatched.
    /// comparison and insert happen under one lock hold.
    pub fn set_if_not_older(&self, reading: Reading) -> Result<bool, HubError> {
        let (created, targets) = {
            let mut state = self.inner.state.write();
            if let Some(stored) = state.readings.get(&reading.sensor_id) {
                if reading.timestamp < stored.timestamp {
                    return Err(HubError::Validation(format!(
                        "timestamp {} is older than stored reading for {} ({})",
                        reading.timestamp.to_rfc3339(),
                        reading.sensor_id,
                        stored.timestamp.to_rfc3339()
                    )));
                }
            }
            let created = state
                .readings
                .insert(reading.sensor_id.clone(), reading.clone())
                .is_none();
            (created, state.subscriptions.targets(&reading.sensor_id))
        };
        dispatch(&reading, &targets);
        Ok(created)
    }

    /// read-modify-write of one existing sensor under a single lock hold.
    ///
    /// `f` edits a copy; on success the copy is stamped with a fresh
    /// timestamp, committed and dispatched. on error nothing changes.
    /// `f` runs under the write lock and must not call back into the store.
    pub fn modify<F>(&self, sensor_id: &str, f: F) -> Result<Reading, HubError>
    where
        F: FnOnce(&mut Reading) -> Result<(), HubError>,
    {
        let (reading, targets) = {
            let mut state = self.inner.state.write();
            let current = state
                .readings
                .get(sensor_id)
                .ok_or_else(|| HubError::NotFound(sensor_id.to_string()))?;

            let mut next = current.clone();
            f(&mut next)?;
            next.sensor_id = current.sensor_id.clone();
            next.touch();

            state.readings.insert(sensor_id.to_string(), next.clone());
            (next, state.subscriptions.targets(sensor_id))
        };
        dispatch(&reading, &targets);
        Ok(reading)
    }

    pub fn get(&self, sensor_id: &str) -> Option<Reading> {
        self.inner.state.read().readings.get(sensor_id).cloned()
    }

    pub fn has(&self, sensor_id: &str) -> bool {
        self.inner.state.read().readings.contains_key(sensor_id)
    }

    /// drop the reading and every subscription scoped to it
    pub fn delete(&self, sensor_id: &str) -> bool {
        let mut state = self.inner.state.write();
        state.subscriptions.scoped.remove(sensor_id);
        state.readings.remove(sensor_id).is_some()
    }

    /// copy of every reading, ordered by sensor id
    pub fn list(&self) -> Vec<Reading> {
        self.inner.state.read().readings.values().cloned().collect()
    }

    pub fn sensor_ids(&self) -> Vec<String> {
        self.inner.state.read().readings.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// empty the readings and all subscriptions in one step
    pub fn clear(&self) {
        let mut state = self.inner.state.write();
        state.readings.clear();
        state.subscriptions = Subscriptions::default();
    }

    // ==========================================================================
    // subscription registry
    // ==========================================================================

    /// register `subscriber` for one sensor, or for every sensor when
    /// `sensor_id` is None
    pub fn subscribe(
        &self,
        subscriber: impl Subscriber + 'static,
        sensor_id: Option<&str>,
    ) -> SubscriberId {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let registration = Registration {
            id,
            subscriber: Arc::new(subscriber),
        };

        let mut state = self.inner.state.write();
        match sensor_id {
            Some(sensor_id) => state
                .subscriptions
                .scoped
                .entry(sensor_id.to_string())
                .or_default()
                .push(registration),
            None => state.subscriptions.global.push(registration),
        }
        id
    }

    /// remove a subscriber. with a scope only that sensor's set is searched;
    /// without one the global set and then every scoped set are.
    pub fn unsubscribe(&self, id: SubscriberId, sensor_id: Option<&str>) -> bool {
        let mut state = self.inner.state.write();
        let subs = &mut state.subscriptions;

        if let Some(sensor_id) = sensor_id {
            return subs.remove_scoped(sensor_id, id);
        }

        let before = subs.global.len();
        subs.global.retain(|r| r.id != id);
        if subs.global.len() != before {
            return true;
        }

        let scope = subs
            .scoped
            .iter()
            .find(|(_, regs)| regs.iter().any(|r| r.id == id))
            .map(|(sensor_id, _)| sensor_id.clone());
        match scope {
            Some(sensor_id) => subs.remove_scoped(&sensor_id, id),
            None => false,
        }
    }

    pub fn subscription_stats(&self) -> SubscriptionStats {
        let state = self.inner.state.read();
        let subs = &state.subscriptions;

        let sensor_specific_subscriptions: BTreeMap<String, usize> = subs
            .scoped
            .iter()
            .map(|(sensor_id, regs)| (sensor_id.clone(), regs.len()))
            .collect();
        let scoped_total: usize = sensor_specific_subscriptions.values().sum();

        SubscriptionStats {
            total_subscribers: scoped_total + subs.global.len(),
            sensor_specific_subscriptions,
            global_subscriptions: subs.global.len(),
        }
    }

    pub fn store_stats(&self) -> StoreStats {
        let now = Utc::now();
        let ages: Vec<f64> = {
            let state = self.inner.state.read();
            state
                .readings
                .values()
                .map(|r| (now - r.timestamp).num_milliseconds() as f64 / 60_000.0)
                .collect()
        };

        if ages.is_empty() {
            return StoreStats {
                total_sensors: 0,
                sensors_with_recent_data: 0,
                oldest_data_age_minutes: 0.0,
                newest_data_age_minutes: 0.0,
            };
        }

        StoreStats {
            total_sensors: ages.len(),
            sensors_with_recent_data: ages
                .iter()
                .filter(|age| **age <= RECENT_THRESHOLD_MINUTES)
                .count(),
            oldest_data_age_minutes: ages.iter().copied().fold(f64::MIN, f64::max),
            newest_data_age_minutes: ages.iter().copied().fold(f64::MAX, f64::min),
        }
    }
}

// ==============================================================================
// dispatch
// ==============================================================================

/// call every target in turn. a failing or panicking subscriber is logged
/// and skipped; it never stops the others or reaches the writer.
fn dispatch(reading: &Reading, targets: &[Registration]) {
    for reg in targets {
        let outcome = catch_unwind(AssertUnwindSafe(|| reg.subscriber.notify(reading)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    subscriber = %reg.id,
                    sensor_id = %reading.sensor_id,
                    "subscriber failed: {:#}",
                    e
                );
            }
            Err(_) => {
                tracing::warn!(
                    subscriber = %reg.id,
                    sensor_id = %reading.sensor_id,
                    "subscriber panicked"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Metric;
    use std::sync::Mutex;

    fn reading(id: &str, temp: f64) -> Reading {
        Reading::new(id).with(Metric::Temperature, temp)
    }

    fn noop(_: &Reading) -> anyhow::Result<()> {
        Ok(())
    }

    /// subscriber that records every reading it sees
    fn recorder() -> (Arc<Mutex<Vec<Reading>>>, impl Subscriber) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = move |r: &Reading| -> anyhow::Result<()> {
            sink.lock().unwrap().push(r.clone());
            Ok(())
        };
        (seen, sub)
    }

    #[test]
    fn get_returns_exactly_what_was_set() {
        let store = SensorStore::new();
        let r = reading("s1", 21.5).with(Metric::Co2, 400.0);

        assert!(store.set(r.clone()));
        assert_eq!(store.get("s1"), Some(r));
        assert!(store.has("s1"));
        assert!(!store.has("s2"));
        assert_eq!(store.get("s2"), None);
    }

    #[test]
    fn set_reports_creation_only_once() {
        let store = SensorStore::new();
        assert!(store.set(reading("s1", 20.0)));
        assert!(!store.set(reading("s1", 21.0)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn scoped_subscriber_only_sees_its_sensor() {
        let store = SensorStore::new();
        let (seen, sub) = recorder();
        store.subscribe(sub, Some("x"));

        store.set(reading("y", 1.0));
        assert!(seen.lock().unwrap().is_empty());

        store.set(reading("x", 2.0));
        store.set(reading("x", 3.0));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].temperature, Some(3.0));
    }

    #[test]
    fn global_subscriber_sees_every_write() {
        let store = SensorStore::new();
        let (seen, sub) = recorder();
        store.subscribe(sub, None);

        let r1 = reading("s1", 20.0);
        let r2 = reading("s2", 30.0);
        store.set(r1.clone());
        store.set(r2.clone());

        assert_eq!(*seen.lock().unwrap(), vec![r1, r2]);
    }

    #[test]
    fn failing_subscribers_do_not_block_others() {
        let store = SensorStore::new();
        store.subscribe(
            |_: &Reading| -> anyhow::Result<()> { anyhow::bail!("boom") },
            Some("s1"),
        );
        store.subscribe(|_: &Reading| -> anyhow::Result<()> { panic!("kaboom") }, None);
        let (seen, sub) = recorder();
        store.subscribe(sub, None);

        store.set(reading("s1", 20.0));

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(store.get("s1").unwrap().temperature, Some(20.0));
    }

    #[test]
    fn subscriber_may_read_the_store() {
        let store = SensorStore::new();
        let inner = store.clone();
        let (seen, sub) = recorder();
        store.subscribe(
            move |r: &Reading| {
                assert!(inner.has(&r.sensor_id));
                sub.notify(r)
            },
            None,
        );

        store.set(reading("s1", 20.0));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let store = SensorStore::new();
        let id = store.subscribe(noop, None);

        assert!(store.unsubscribe(id, None));
        assert!(!store.unsubscribe(id, None));
    }

    #[test]
    fn unsubscribe_without_scope_finds_scoped_subscriber() {
        let store = SensorStore::new();
        let (seen, sub) = recorder();
        let id = store.subscribe(sub, Some("s1"));

        assert!(!store.unsubscribe(id, Some("s2")));
        assert!(store.unsubscribe(id, None));

        store.set(reading("s1", 20.0));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(store.subscription_stats().total_subscribers, 0);
    }

    #[test]
    fn handles_are_unique_across_clear() {
        let store = SensorStore::new();
        let a = store.subscribe(noop, None);
        store.clear();
        let b = store.subscribe(noop, None);
        assert_ne!(a, b);
        assert!(!store.unsubscribe(a, None));
    }

    #[test]
    fn delete_drops_reading_and_scoped_subscriptions() {
        let store = SensorStore::new();
        store.set(reading("s1", 20.0));
        store.subscribe(noop, Some("s1"));
        store.subscribe(noop, Some("s2"));

        assert!(store.delete("s1"));
        assert!(!store.delete("s1"));
        assert!(!store.has("s1"));

        let stats = store.subscription_stats();
        assert_eq!(stats.total_subscribers, 1);
        assert!(!stats.sensor_specific_subscriptions.contains_key("s1"));
    }

    #[test]
    fn clear_resets_readings_and_subscriptions() {
        let store = SensorStore::new();
        let (seen, sub) = recorder();
        store.subscribe(sub, None);
        store.set(reading("s1", 20.0));

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.subscription_stats().total_subscribers, 0);

        store.set(reading("s2", 20.0));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn stats_count_scoped_and_global() {
        let store = SensorStore::new();
        store.subscribe(noop, Some("a"));
        store.subscribe(noop, Some("a"));
        store.subscribe(noop, Some("b"));
        store.subscribe(noop, None);

        let stats = store.subscription_stats();
        assert_eq!(stats.total_subscribers, 4);
        assert_eq!(stats.global_subscriptions, 1);
        assert_eq!(stats.sensor_specific_subscriptions["a"], 2);
        assert_eq!(stats.sensor_specific_subscriptions["b"], 1);
    }

    #[test]
    fn list_is_a_snapshot() {
        let store = SensorStore::new();
        store.set(reading("b", 1.0));
        store.set(reading("a", 2.0));

        let snapshot = store.list();
        store.set(reading("c", 3.0));

        let ids: Vec<_> = snapshot.iter().map(|r| r.sensor_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.sensor_ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn set_if_not_older_rejects_stale_writes() {
        let store = SensorStore::new();
        let (seen, sub) = recorder();
        store.subscribe(sub, None);

        let newer = reading("s1", 20.0);
        let mut stale = reading("s1", 5.0);
        stale.timestamp = newer.timestamp - chrono::Duration::hours(1);

        assert_eq!(store.set_if_not_older(newer.clone()), Ok(true));
        assert!(matches!(
            store.set_if_not_older(stale),
            Err(HubError::Validation(_))
        ));
        assert_eq!(store.get("s1"), Some(newer.clone()));
        assert_eq!(seen.lock().unwrap().len(), 1);

        // same instant is not older
        assert_eq!(store.set_if_not_older(newer), Ok(false));
    }

    #[test]
    fn racing_writers_settle_on_newest_timestamp() {
        let store = SensorStore::new();
        let base = Utc::now();

        let handles: Vec<_> = (0..8i64)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for step in 0..50i64 {
                        // workers walk the same range in different orders
                        let offset = if worker % 2 == 0 { step } else { 49 - step };
                        let mut r = reading("s1", offset as f64);
                        r.timestamp = base + chrono::Duration::seconds(offset);
                        let _ = store.set_if_not_older(r);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = store.get("s1").unwrap();
        assert_eq!(stored.timestamp, base + chrono::Duration::seconds(49));
        assert_eq!(stored.temperature, Some(49.0));
    }

    #[test]
    fn modify_unknown_sensor_is_not_found() {
        let store = SensorStore::new();
        let err = store.modify("ghost", |_| Ok(())).unwrap_err();
        assert_eq!(err, HubError::NotFound("ghost".into()));
    }

    #[test]
    fn modify_error_leaves_state_and_subscribers_untouched() {
        let store = SensorStore::new();
        let original = reading("s1", 20.0);
        store.set(original.clone());
        let (seen, sub) = recorder();
        store.subscribe(sub, None);

        let result = store.modify("s1", |r| {
            r.set(Metric::Temperature, 99.0);
            Err(HubError::Validation("nope".into()))
        });

        assert!(result.is_err());
        assert_eq!(store.get("s1"), Some(original));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn concurrent_modifies_lose_no_updates() {
        let store = SensorStore::new();
        store.set(reading("s1", 0.0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store
                            .modify("s1", |r| {
                                let t = r.temperature.unwrap_or_default();
                                r.set(Metric::Temperature, t + 1.0);
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.get("s1").unwrap().temperature, Some(800.0));
    }

    #[test]
    fn store_stats_on_empty_and_fresh_data() {
        let store = SensorStore::new();
        assert_eq!(store.store_stats().total_sensors, 0);

        store.set(reading("s1", 20.0));
        let mut stale = reading("s2", 20.0);
        stale.timestamp = Utc::now() - chrono::Duration::minutes(30);
        store.set(stale);

        let stats = store.store_stats();
        assert_eq!(stats.total_sensors, 2);
        assert_eq!(stats.sensors_with_recent_data, 1);
        assert!(stats.oldest_data_age_minutes >= 29.9);
        assert!(stats.newest_data_age_minutes < 1.0);
    }
}
