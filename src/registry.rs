//! State shared by every context in a sharing group: the keyed resource
//! registry and its two release queues.
//!
//! Nothing here calls [`GlResource::release`](crate::GlResource::release).
//! Operations hand back whatever must be released and the owning
//! [`GlContext`](crate::GlContext) releases it after the shared state is no
//! longer borrowed, so a resource may touch the registry from inside its own
//! release.

use std::collections::VecDeque;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::RegistryError;
use crate::types::SharedResource;

/// Frame advances a deferred resource survives. It is released on the first
/// advance that pushes its counter past this value.
pub const DEFERRED_GRACE_FRAMES: u32 = 2;

/// A deferred entry that could not be released when its grace period ran out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Anomaly {
    /// The key was unbound before the grace period ended, typically because
    /// it was also released immediately.
    Missing(String),
    /// Someone acquired the resource again during the grace period.
    Reacquired {
        key: String,
        holders: usize,
    },
}

/// Result of one pass over the deferred queue.
#[derive(Default)]
pub(crate) struct Sweep {
    /// Unbound resources whose grace period expired, in no particular order.
    pub released: Vec<(String, SharedResource)>,
    /// Entries dropped without releasing anything.
    pub anomalies: Vec<Anomaly>,
}

#[derive(Default)]
pub(crate) struct SharedResources {
    registry: FxHashMap<String, SharedResource>,
    /// Key to number of advances since the deferred release was requested.
    deferred: FxHashMap<String, u32>,
    immediate: VecDeque<SharedResource>,
}

impl SharedResources {
    pub fn get(&self, key: &str) -> Option<SharedResource> {
        self.registry.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.registry.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn deferred_age(&self, key: &str) -> Option<u32> {
        self.deferred.get(key).copied()
    }

    pub fn immediate_len(&self) -> usize {
        self.immediate.len()
    }

    /// Insert-only bind.
    pub fn bind(&mut self, key: &str, resource: SharedResource) -> Result<(), RegistryError> {
        if key.is_empty() {
            return Err(RegistryError::EmptyKey);
        }
        if self.registry.contains_key(key) {
            return Err(RegistryError::AlreadyBound(key.to_owned()));
        }
        self.registry.insert(key.to_owned(), resource);
        Ok(())
    }

    /// Returns the unbound resource when it must be released right away.
    pub fn release(&mut self, key: &str, deferred: bool) -> Option<SharedResource> {
        let resource = self.registry.get(key)?;
        if Rc::strong_count(resource) > 1 {
            return None;
        }
        if deferred {
            self.deferred.entry(key.to_owned()).or_insert(0);
            return None;
        }
        self.registry.remove(key)
    }

    pub fn push_immediate(&mut self, resource: SharedResource) {
        self.immediate.push_back(resource);
    }

    pub fn pop_immediate(&mut self) -> Option<SharedResource> {
        self.immediate.pop_front()
    }

    /// Age every deferred entry by one advance and retire the expired ones.
    pub fn sweep_deferred(&mut self) -> Sweep {
        let mut expired = Vec::new();
        for (key, age) in &mut self.deferred {
            *age += 1;
            if *age > DEFERRED_GRACE_FRAMES {
                expired.push(key.clone());
            }
        }

        let mut sweep = Sweep::default();
        for key in expired {
            self.deferred.remove(&key);
            let holders = match self.registry.get(&key) {
                None => {
                    sweep.anomalies.push(Anomaly::Missing(key));
                    continue;
                }
                Some(resource) => Rc::strong_count(resource),
            };
            if holders > 1 {
                sweep.anomalies.push(Anomaly::Reacquired { key, holders });
                continue;
            }
            if let Some(resource) = self.registry.remove(&key) {
                sweep.released.push((key, resource));
            }
        }
        sweep
    }

    /// Unbind everything and forget pending deferrals.
    pub fn take_all(&mut self) -> Vec<(String, SharedResource)> {
        self.deferred.clear();
        self.registry.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CountingResource;

    fn resource() -> SharedResource {
        CountingResource::new().0
    }

    #[test]
    fn bind_rejects_empty_and_duplicate_keys() {
        let mut shared = SharedResources::default();
        assert_eq!(shared.bind("", resource()), Err(RegistryError::EmptyKey));
        let first = resource();
        assert!(shared.bind("tex", Rc::clone(&first)).is_ok());
        assert_eq!(
            shared.bind("tex", resource()),
            Err(RegistryError::AlreadyBound("tex".to_owned()))
        );
        assert!(shared
            .get("tex")
            .is_some_and(|bound| Rc::ptr_eq(&bound, &first)));
        assert_eq!(shared.len(), 1);
    }

    #[test]
    fn release_unbound_key_is_noop() {
        let mut shared = SharedResources::default();
        assert!(shared.release("nothing", false).is_none());
        assert!(shared.release("nothing", true).is_none());
        assert_eq!(shared.deferred_age("nothing"), None);
    }

    #[test]
    fn release_with_outside_holder_is_noop() {
        let mut shared = SharedResources::default();
        shared.bind("buf", resource()).ok();
        let held = shared.get("buf");
        assert!(shared.release("buf", false).is_none());
        assert!(shared.release("buf", true).is_none());
        assert!(shared.contains("buf"));
        assert_eq!(shared.deferred_age("buf"), None);
        drop(held);
        assert!(shared.release("buf", false).is_some());
        assert!(!shared.contains("buf"));
    }

    #[test]
    fn deferring_twice_keeps_existing_entry() {
        let mut shared = SharedResources::default();
        shared.bind("prog", resource()).ok();
        shared.release("prog", true);
        let sweep = shared.sweep_deferred();
        assert!(sweep.released.is_empty());
        shared.release("prog", true);
        assert_eq!(shared.deferred_age("prog"), Some(1));
    }

    #[test]
    fn deferred_entry_expires_on_third_sweep() {
        let mut shared = SharedResources::default();
        shared.bind("prog", resource()).ok();
        shared.release("prog", true);
        assert_eq!(shared.deferred_age("prog"), Some(0));
        for _ in 0..DEFERRED_GRACE_FRAMES {
            assert!(shared.sweep_deferred().released.is_empty());
            assert!(shared.contains("prog"));
        }
        let sweep = shared.sweep_deferred();
        assert_eq!(sweep.released.len(), 1);
        assert_eq!(sweep.released[0].0, "prog");
        assert!(!shared.contains("prog"));
        assert_eq!(shared.deferred_age("prog"), None);
    }

    #[test]
    fn expired_entry_with_missing_key_is_dropped() {
        let mut shared = SharedResources::default();
        shared.bind("k", resource()).ok();
        shared.release("k", true);
        assert!(shared.release("k", false).is_some());
        shared.sweep_deferred();
        shared.sweep_deferred();
        let sweep = shared.sweep_deferred();
        assert!(sweep.released.is_empty());
        assert_eq!(sweep.anomalies, vec![Anomaly::Missing("k".to_owned())]);
        assert_eq!(shared.deferred_age("k"), None);
    }

    #[test]
    fn expired_entry_that_was_reacquired_is_dropped() {
        let mut shared = SharedResources::default();
        shared.bind("k", resource()).ok();
        shared.release("k", true);
        let held = shared.get("k");
        for _ in 0..DEFERRED_GRACE_FRAMES {
            shared.sweep_deferred();
        }
        let sweep = shared.sweep_deferred();
        assert!(sweep.released.is_empty());
        assert_eq!(
            sweep.anomalies,
            vec![Anomaly::Reacquired {
                key: "k".to_owned(),
                holders: 2
            }]
        );
        assert!(shared.contains("k"));
        assert_eq!(shared.deferred_age("k"), None);
        drop(held);
    }

    #[test]
    fn immediate_queue_is_fifo() {
        let mut shared = SharedResources::default();
        let a = resource();
        let b = resource();
        shared.push_immediate(Rc::clone(&a));
        shared.push_immediate(Rc::clone(&b));
        assert_eq!(shared.immediate_len(), 2);
        assert!(shared.pop_immediate().is_some_and(|r| Rc::ptr_eq(&r, &a)));
        assert!(shared.pop_immediate().is_some_and(|r| Rc::ptr_eq(&r, &b)));
        assert!(shared.pop_immediate().is_none());
    }

    #[test]
    fn take_all_clears_everything() {
        let mut shared = SharedResources::default();
        shared.bind("a", resource()).ok();
        shared.bind("b", resource()).ok();
        shared.release("a", true);
        assert_eq!(shared.take_all().len(), 2);
        assert_eq!(shared.len(), 0);
        assert_eq!(shared.deferred_age("a"), None);
    }
}
