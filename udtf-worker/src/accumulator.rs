//! Side-channel counters reported back by workers.
//!
//! A worker may report counter deltas after it answers. Each delta is a JSON
//! object of `name -> i64`. Merging sums per name, so it is associative and
//! commutative and the order of workers does not matter.

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use udtf_protocol::SerializationError;

/// A counter shared between the caller and any number of calls.
pub type SharedCounter = Arc<Mutex<SideChannelCounter>>;

/// Named additive counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideChannelCounter {
    values: BTreeMap<String, i64>,
}

impl SideChannelCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a fresh counter for sharing.
    pub fn shared() -> SharedCounter {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn get(&self, name: &str) -> i64 {
        self.values.get(name).copied().unwrap_or(0)
    }

    pub fn add(&mut self, name: impl Into<String>, delta: i64) {
        let slot = self.values.entry(name.into()).or_insert(0);
        *slot = slot.saturating_add(delta);
    }

    pub fn values(&self) -> &BTreeMap<String, i64> {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns an empty counter of the same kind.
    pub fn copy_and_reset(&self) -> Self {
        Self::default()
    }

    /// Applies one serialized delta.
    pub fn add_update(&mut self, update: &[u8]) -> Result<(), SerializationError> {
        let delta: BTreeMap<String, i64> = serde_json::from_slice(update)
            .map_err(|e| SerializationError::MalformedUpdate(e.to_string()))?;
        for (name, value) in delta {
            self.add(name, value);
        }
        Ok(())
    }

    /// Combines `other` into `self`.
    pub fn merge(&mut self, other: &SideChannelCounter) {
        for (name, value) in &other.values {
            self.add(name.clone(), *value);
        }
    }
}

/// Folds worker `updates` into `snapshot` and installs the result into the
/// live `counter`.
///
/// Updates are decoded before the live counter is touched, so a malformed
/// update leaves it unchanged.
pub fn merge_updates(
    counter: &Mutex<SideChannelCounter>,
    mut snapshot: SideChannelCounter,
    updates: &[Bytes],
) -> Result<(), SerializationError> {
    for update in updates {
        snapshot.add_update(update)?;
    }
    counter.lock().merge(&snapshot);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn counter(pairs: &[(&str, i64)]) -> SideChannelCounter {
        let mut c = SideChannelCounter::new();
        for (name, v) in pairs {
            c.add(*name, *v);
        }
        c
    }

    #[test]
    fn test_add_update() {
        let mut c = SideChannelCounter::new();
        c.add_update(br#"{"rows": 3, "bytes": 10}"#).unwrap();
        c.add_update(br#"{"rows": 2}"#).unwrap();
        assert_eq!(c.get("rows"), 5);
        assert_eq!(c.get("bytes"), 10);
        assert_eq!(c.get("missing"), 0);
    }

    #[test]
    fn test_malformed_update() {
        let mut c = SideChannelCounter::new();
        assert!(matches!(
            c.add_update(b"[1,2]"),
            Err(SerializationError::MalformedUpdate(_))
        ));
    }

    #[test]
    fn test_copy_and_reset_is_empty() {
        let c = counter(&[("rows", 9)]);
        assert!(c.copy_and_reset().is_empty());
        assert_eq!(c.get("rows"), 9);
    }

    #[test]
    fn test_merge_updates_all_or_nothing() {
        let live = Mutex::new(counter(&[("rows", 10)]));
        let updates = vec![
            Bytes::from_static(br#"{"rows": 1}"#),
            Bytes::from_static(b"not json"),
        ];
        let snapshot = live.lock().copy_and_reset();
        assert!(merge_updates(&live, snapshot, &updates).is_err());
        assert_eq!(live.lock().get("rows"), 10);

        let updates = vec![Bytes::from_static(br#"{"rows": 1}"#)];
        let snapshot = live.lock().copy_and_reset();
        merge_updates(&live, snapshot, &updates).unwrap();
        assert_eq!(live.lock().get("rows"), 11);
    }

    #[test]
    fn test_saturating() {
        let mut c = counter(&[("n", i64::MAX)]);
        c.add("n", 1);
        assert_eq!(c.get("n"), i64::MAX);
    }

    fn arb_counter() -> impl Strategy<Value = SideChannelCounter> {
        proptest::collection::btree_map("[a-c]", -1000i64..1000, 0..4)
            .prop_map(|values| SideChannelCounter { values })
    }

    proptest! {
        #[test]
        fn prop_merge_commutative(a in arb_counter(), b in arb_counter()) {
            let mut ab = a.clone();
            ab.merge(&b);
            let mut ba = b.clone();
            ba.merge(&a);
            prop_assert_eq!(ab, ba);
        }

        #[test]
        fn prop_merge_associative(a in arb_counter(), b in arb_counter(), c in arb_counter()) {
            let mut left = a.clone();
            left.merge(&b);
            left.merge(&c);

            let mut bc = b.clone();
            bc.merge(&c);
            let mut right = a.clone();
            right.merge(&bc);

            prop_assert_eq!(left, right);
        }
    }
}
