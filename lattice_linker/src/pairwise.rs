//! Scope-aware pairwise memoization.
//!
//! [`PairwiseCache`] memoizes values computed from ordered pairs of types.
//! Each type owns two independent append-only maps: a **forward** map for
//! pairs where it is the first element and a **reverse** map for pairs where
//! it is the second. Which of the two types retains the entry is decided by
//! the reachability of their defining scopes, so a long-lived scope never
//! ends up holding references into a short-lived one it cannot even see:
//!
//! - second's scope reachable from first's → first's forward map
//! - first's scope reachable from second's → second's reverse map
//! - unrelated scopes → not cached at all; recomputed every call
//!
//! Publication is lock-free: snapshots are immutable and swapped with a
//! CAS-retry; when two writers race, the loser adopts the winner's value.

use arc_swap::ArcSwap;
use lattice_core::{TypeId, TypeRegistry};
use std::sync::Arc;

/// Result of a compute callback.
pub enum Computed<V> {
    /// Cache per the retention rules and return.
    Publish(V),
    /// Return without caching (e.g. a context-sensitive value).
    Transient(V),
    /// Nothing was computed; absent values are never cached.
    Absent,
}

type Snapshot<V> = Arc<Vec<(TypeId, V)>>;

struct PairCell<V> {
    forward: ArcSwap<Vec<(TypeId, V)>>,
    reverse: ArcSwap<Vec<(TypeId, V)>>,
}

impl<V> Default for PairCell<V> {
    fn default() -> Self {
        Self {
            forward: ArcSwap::from_pointee(Vec::new()),
            reverse: ArcSwap::from_pointee(Vec::new()),
        }
    }
}

/// Generic two-key lazy cache with scope-aware retention.
pub struct PairwiseCache<V> {
    registry: Arc<TypeRegistry>,
    cells: ArcSwap<Vec<Arc<PairCell<V>>>>,
}

impl<V: Clone> PairwiseCache<V> {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            cells: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Look up the ordered pair `(a, b)`, computing on miss.
    ///
    /// Lookup probes `a`'s forward map, then `b`'s reverse map. O(1) after
    /// first computation for scope-related pairs; unrelated pairs recompute
    /// every call. Propagates nothing of its own: the compute callback's
    /// behavior is the only failure source.
    pub fn get(
        &self,
        a: TypeId,
        b: TypeId,
        compute: impl FnOnce(TypeId, TypeId) -> Computed<V>,
    ) -> Option<V> {
        let cell_a = self.cell(a);
        if let Some(hit) = Self::lookup(&cell_a.forward, b) {
            return Some(hit);
        }
        let cell_b = self.cell(b);
        if let Some(hit) = Self::lookup(&cell_b.reverse, a) {
            return Some(hit);
        }

        let value = match compute(a, b) {
            Computed::Publish(value) => value,
            Computed::Transient(value) => return Some(value),
            Computed::Absent => return None,
        };

        let scopes = self.registry.scopes();
        let scope_a = self.registry.scope_of(a);
        let scope_b = self.registry.scope_of(b);
        if scopes.reachable(scope_a, scope_b) {
            Some(Self::publish(&cell_a.forward, b, value))
        } else if scopes.reachable(scope_b, scope_a) {
            Some(Self::publish(&cell_b.reverse, a, value))
        } else {
            Some(value)
        }
    }

    /// True if the ordered pair is currently cached (test/introspection aid).
    pub fn contains(&self, a: TypeId, b: TypeId) -> bool {
        let cells = self.cells.load();
        let forward_hit = cells
            .get(a.index())
            .is_some_and(|cell| cell.forward.load().iter().any(|(k, _)| *k == b));
        forward_hit
            || cells
                .get(b.index())
                .is_some_and(|cell| cell.reverse.load().iter().any(|(k, _)| *k == a))
    }

    fn cell(&self, ty: TypeId) -> Arc<PairCell<V>> {
        let idx = ty.index();
        {
            let cells = self.cells.load();
            if let Some(cell) = cells.get(idx) {
                return Arc::clone(cell);
            }
        }
        // Grow the arena; a racing grower's larger arena wins harmlessly.
        self.cells.rcu(|cells| {
            if cells.len() > idx {
                Arc::clone(cells)
            } else {
                let mut grown = cells.as_ref().clone();
                grown.resize_with(idx + 1, || Arc::new(PairCell::default()));
                Arc::new(grown)
            }
        });
        Arc::clone(&self.cells.load()[idx])
    }

    fn lookup(map: &ArcSwap<Vec<(TypeId, V)>>, key: TypeId) -> Option<V> {
        map.load()
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
    }

    fn publish(map: &ArcSwap<Vec<(TypeId, V)>>, key: TypeId, value: V) -> V {
        map.rcu(|snapshot: &Snapshot<V>| {
            if snapshot.iter().any(|(k, _)| *k == key) {
                Arc::clone(snapshot)
            } else {
                let mut next = snapshot.as_ref().clone();
                next.push((key, value.clone()));
                Arc::new(next)
            }
        });
        Self::lookup(map, key).unwrap_or(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::{ScopeGraph, ScopeId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        registry: Arc<TypeRegistry>,
        ancestor_ty: TypeId,
        descendant_ty: TypeId,
        left_ty: TypeId,
        right_ty: TypeId,
    }

    fn fixture() -> Fixture {
        let scopes = Arc::new(ScopeGraph::new());
        let app = scopes.child(ScopeId::ROOT, "app");
        let plugin = scopes.child(app, "plugin");
        let left = scopes.child(ScopeId::ROOT, "left");
        let right = scopes.child(ScopeId::ROOT, "right");
        let registry = Arc::new(TypeRegistry::new(scopes));
        Fixture {
            ancestor_ty: registry.register("host", app),
            descendant_ty: registry.register("guest", plugin),
            left_ty: registry.register("l", left),
            right_ty: registry.register("r", right),
            registry,
        }
    }

    #[test]
    fn test_related_pair_computed_once() {
        let fx = fixture();
        let cache: PairwiseCache<String> = PairwiseCache::new(Arc::clone(&fx.registry));
        let calls = AtomicUsize::new(0);
        let compute = |a: TypeId, b: TypeId| {
            calls.fetch_add(1, Ordering::SeqCst);
            Computed::Publish(format!("{}-{}", a.index(), b.index()))
        };

        let first = cache.get(fx.ancestor_ty, fx.descendant_ty, compute).unwrap();
        let second = cache.get(fx.ancestor_ty, fx.descendant_ty, compute).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains(fx.ancestor_ty, fx.descendant_ty));
    }

    #[test]
    fn test_forward_retention_on_ancestor() {
        let fx = fixture();
        let cache: PairwiseCache<u32> = PairwiseCache::new(Arc::clone(&fx.registry));

        // descendant's scope is reachable from ancestor's: stored in the
        // ancestor's forward map.
        cache
            .get(fx.ancestor_ty, fx.descendant_ty, |_, _| Computed::Publish(7))
            .unwrap();
        let cells = cache.cells.load();
        let fwd = cells[fx.ancestor_ty.index()].forward.load();
        assert_eq!(fwd.len(), 1);
        assert_eq!(fwd[0], (fx.descendant_ty, 7));
        assert!(cells[fx.descendant_ty.index()].reverse.load().is_empty());
    }

    #[test]
    fn test_reverse_retention_on_flipped_pair() {
        let fx = fixture();
        let cache: PairwiseCache<u32> = PairwiseCache::new(Arc::clone(&fx.registry));
        let calls = AtomicUsize::new(0);
        let compute = |_: TypeId, _: TypeId| {
            calls.fetch_add(1, Ordering::SeqCst);
            Computed::Publish(9)
        };

        // first's scope is reachable from second's: stored in the ancestor's
        // reverse map, keyed by the descendant.
        cache.get(fx.descendant_ty, fx.ancestor_ty, compute).unwrap();
        cache.get(fx.descendant_ty, fx.ancestor_ty, compute).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let cells = cache.cells.load();
        let rev = cells[fx.ancestor_ty.index()].reverse.load();
        assert_eq!(rev.len(), 1);
        assert_eq!(rev[0], (fx.descendant_ty, 9));
    }

    #[test]
    fn test_ordered_pairs_are_distinct() {
        let fx = fixture();
        let cache: PairwiseCache<String> = PairwiseCache::new(Arc::clone(&fx.registry));
        let pair = |a: TypeId, b: TypeId| Computed::Publish(format!("{}>{}", a.index(), b.index()));

        let forward = cache.get(fx.ancestor_ty, fx.descendant_ty, pair).unwrap();
        let reverse = cache.get(fx.descendant_ty, fx.ancestor_ty, pair).unwrap();
        assert_ne!(forward, reverse);
        assert!(cache.contains(fx.ancestor_ty, fx.descendant_ty));
        assert!(cache.contains(fx.descendant_ty, fx.ancestor_ty));
    }

    #[test]
    fn test_unrelated_scopes_never_cached() {
        let fx = fixture();
        let cache: PairwiseCache<u32> = PairwiseCache::new(Arc::clone(&fx.registry));
        let calls = AtomicUsize::new(0);
        let compute = |_: TypeId, _: TypeId| {
            calls.fetch_add(1, Ordering::SeqCst);
            Computed::Publish(1)
        };

        for _ in 0..3 {
            assert_eq!(cache.get(fx.left_ty, fx.right_ty, compute), Some(1));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!cache.contains(fx.left_ty, fx.right_ty));
        assert!(!cache.contains(fx.right_ty, fx.left_ty));
    }

    #[test]
    fn test_transient_not_cached() {
        let fx = fixture();
        let cache: PairwiseCache<u32> = PairwiseCache::new(Arc::clone(&fx.registry));
        let calls = AtomicUsize::new(0);
        let compute = |_: TypeId, _: TypeId| {
            calls.fetch_add(1, Ordering::SeqCst);
            Computed::Transient(5)
        };

        assert_eq!(cache.get(fx.ancestor_ty, fx.descendant_ty, compute), Some(5));
        assert_eq!(cache.get(fx.ancestor_ty, fx.descendant_ty, compute), Some(5));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.contains(fx.ancestor_ty, fx.descendant_ty));
    }

    #[test]
    fn test_absent_never_cached() {
        let fx = fixture();
        let cache: PairwiseCache<u32> = PairwiseCache::new(Arc::clone(&fx.registry));

        assert_eq!(
            cache.get(fx.ancestor_ty, fx.descendant_ty, |_, _| Computed::Absent),
            None
        );
        assert!(!cache.contains(fx.ancestor_ty, fx.descendant_ty));
        // A later successful compute still publishes.
        assert_eq!(
            cache.get(fx.ancestor_ty, fx.descendant_ty, |_, _| Computed::Publish(3)),
            Some(3)
        );
        assert!(cache.contains(fx.ancestor_ty, fx.descendant_ty));
    }

    #[test]
    fn test_concurrent_publish_single_winner() {
        let fx = fixture();
        let cache: Arc<PairwiseCache<u64>> =
            Arc::new(PairwiseCache::new(Arc::clone(&fx.registry)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for thread_id in 0..8u64 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let (a, b) = (fx.ancestor_ty, fx.descendant_ty);
            handles.push(std::thread::spawn(move || {
                cache
                    .get(a, b, |_, _| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Computed::Publish(thread_id)
                    })
                    .unwrap()
            }));
        }
        let results: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Racing computes are allowed, but exactly one value wins and every
        // thread observes it.
        let winner = cache.get(fx.ancestor_ty, fx.descendant_ty, |_, _| Computed::Absent);
        let winner = winner.unwrap();
        assert!(results.iter().all(|r| *r == winner));
        let computes = calls.load(Ordering::SeqCst);
        assert!((1..=8).contains(&computes));
    }
}
