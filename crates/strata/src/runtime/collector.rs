//! Cycle sweep for reference-counted instances.
//!
//! Reference counting reclaims everything except cycles. Instances that can
//! hold references (types with handle slots or an auxiliary store) are
//! tracked weakly at construction. [`Runtime::collect`] finds tracked
//! instances that are only kept alive by other tracked instances, using
//! trial deletion:
//!
//! 1. Start each tracked instance at its strong count.
//! 2. Subtract one for every reference held by another tracked instance.
//! 3. Anything left with a positive count is referenced from outside and is
//!    a root; everything reachable from a root survives.
//! 4. The rest is garbage: each member is finalized once, then its
//!    references are cleared, which breaks the cycles and lets reference
//!    counting free the memory.
//!
//! Instances whose storage is borrowed during the sweep are treated as
//! roots.

use crate::runtime::Runtime;
use crate::runtime::object::{Object, ObjectInner};
use crate::runtime::value::Value;
use fxhash::FxHashMap;
use std::rc::{Rc, Weak};
use strata_log::debug;

/// Weak list of instances that may participate in cycles.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    tracked: Vec<Weak<ObjectInner>>,
    // Length of `tracked` right after the last prune.
    pruned_len: usize,
    since_sweep: usize,
    sweeps: usize,
}

/// Smallest list length at which dead entries are pruned between sweeps.
const PRUNE_FLOOR: usize = 64;

impl Heap {
    fn push(&mut self, weak: Weak<ObjectInner>) {
        self.tracked.push(weak);
        if self.tracked.len() >= PRUNE_FLOOR.max(self.pruned_len * 2) {
            self.prune();
        }
    }

    fn prune(&mut self) {
        self.tracked.retain(|w| w.strong_count() > 0);
        self.pruned_len = self.tracked.len();
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepStats {
    /// Live tracked instances examined.
    pub examined: usize,
    /// Instances found unreachable.
    pub unreachable: usize,
    /// Unreachable instances whose finalizers ran during this sweep.
    pub finalized: usize,
}

fn object_refs(values: impl Iterator<Item = Value>) -> impl Iterator<Item = *const ObjectInner> {
    values.filter_map(|v| match v {
        Value::Object(obj) => Some(Rc::as_ptr(&obj.0)),
        _ => None,
    })
}

impl Runtime {
    pub(crate) fn track(&self, obj: &Object) {
        let needs_tracking = obj.ty().layout.handle_count() > 0 || obj.ty().has_dict;

        let due = {
            let mut heap = self.heap.borrow_mut();
            if needs_tracking {
                heap.push(Rc::downgrade(&obj.0));
            }
            heap.since_sweep += 1;
            let threshold = self.config.sweep_threshold;
            threshold > 0 && heap.since_sweep >= threshold
        };

        if due {
            self.collect();
        }
    }

    /// Number of live tracked instances.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.heap
            .borrow()
            .tracked
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Number of sweeps run so far, automatic ones included.
    #[must_use]
    pub fn sweep_count(&self) -> usize {
        self.heap.borrow().sweeps
    }

    /// Reclaims unreachable reference cycles among tracked instances.
    pub fn collect(&self) -> SweepStats {
        let live: Vec<Rc<ObjectInner>> = {
            let mut heap = self.heap.borrow_mut();
            heap.prune();
            heap.since_sweep = 0;
            heap.sweeps += 1;
            heap.tracked.iter().filter_map(Weak::upgrade).collect()
        };

        let index: FxHashMap<*const ObjectInner, usize> = live
            .iter()
            .enumerate()
            .map(|(i, inner)| (Rc::as_ptr(inner), i))
            .collect();

        // `live` itself holds one reference to each instance.
        let mut external: Vec<isize> = live
            .iter()
            .map(|inner| isize::try_from(Rc::strong_count(inner)).unwrap_or(isize::MAX) - 1)
            .collect();
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); live.len()];

        for (i, inner) in live.iter().enumerate() {
            let Ok(storage) = inner.storage.try_borrow() else {
                external[i] = isize::MAX;
                continue;
            };
            let held = storage
                .record()
                .referenced_values()
                .cloned()
                .chain(storage.dict().into_iter().flat_map(|d| d.values().cloned()));
            for ptr in object_refs(held) {
                if let Some(&j) = index.get(&ptr) {
                    external[j] -= 1;
                    edges[i].push(j);
                }
            }
        }

        let mut reachable = vec![false; live.len()];
        let mut stack: Vec<usize> = (0..live.len()).filter(|&i| external[i] > 0).collect();
        while let Some(i) = stack.pop() {
            if std::mem::replace(&mut reachable[i], true) {
                continue;
            }
            stack.extend(edges[i].iter().copied().filter(|&j| !reachable[j]));
        }

        let mut stats = SweepStats {
            examined: live.len(),
            ..SweepStats::default()
        };
        let mut garbage: Vec<Value> = Vec::new();

        let unreachable: Vec<&Rc<ObjectInner>> = live
            .iter()
            .zip(&reachable)
            .filter(|(_, r)| !**r)
            .map(|(inner, _)| inner)
            .collect();
        stats.unreachable = unreachable.len();

        for inner in &unreachable {
            if let Ok(mut storage) = inner.storage.try_borrow_mut() {
                if inner.finalize(&mut storage) {
                    stats.finalized += 1;
                }
            }
        }
        for inner in &unreachable {
            if let Ok(mut storage) = inner.storage.try_borrow_mut() {
                garbage.extend(storage.record_mut().clear_references());
                if let Some(dict) = storage.dict_mut() {
                    garbage.extend(dict.drain().map(|(_, v)| v));
                }
            }
        }

        drop(unreachable);
        drop(live);
        drop(garbage);

        debug!(
            "sweep: examined {}, unreachable {}, finalized {}",
            stats.examined, stats.unreachable, stats.finalized
        );
        stats
    }
}
