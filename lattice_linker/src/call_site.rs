//! Relinkable call sites.
//!
//! A [`DispatchCallSite`] is the mutable piece of the engine: one per
//! dispatch point in the running program. It starts unlinked, gets a chain
//! of guarded invocations installed by its linker, and walks that chain on
//! every invocation, falling back to the orchestrator when no link applies.
//! Chain mutation is reserved to the orchestrator's relink protocol.

use crate::invocation::GuardedInvocation;
use crate::linker::DynamicLinker;
use arc_swap::ArcSwap;
use lattice_core::{DispatchDescriptor, LinkError, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

/// One dynamic call site.
///
/// Safe to invoke concurrently: the link chain is an immutable snapshot
/// swapped atomically, so a racing relink only costs a redundant resolution,
/// never a wrong result.
pub struct DispatchCallSite {
    descriptor: DispatchDescriptor,
    /// Oldest link first; empty while unlinked.
    links: ArcSwap<Vec<Arc<GuardedInvocation>>>,
    relink_count: AtomicU32,
    owner: OnceLock<u64>,
}

impl DispatchCallSite {
    pub fn new(descriptor: DispatchDescriptor) -> Self {
        Self {
            descriptor,
            links: ArcSwap::from_pointee(Vec::new()),
            relink_count: AtomicU32::new(0),
            owner: OnceLock::new(),
        }
    }

    pub fn descriptor(&self) -> &DispatchDescriptor {
        &self.descriptor
    }

    /// False only before the first successful resolution.
    pub fn is_linked(&self) -> bool {
        !self.links.load().is_empty()
    }

    /// Number of cached invocations currently chained.
    pub fn chain_length(&self) -> usize {
        self.links.load().len()
    }

    /// Relinks performed so far (saturated past the instability threshold).
    pub fn relink_count(&self) -> u32 {
        self.relink_count.load(Ordering::Relaxed)
    }

    /// Invoke through the cached chain, relinking on a miss.
    ///
    /// The first applicable link runs its target; with none applicable (or
    /// while unlinked) control returns to the orchestrator, which resolves,
    /// installs, and invokes.
    pub fn invoke(&self, linker: &DynamicLinker, args: &[Value]) -> Result<Value, LinkError> {
        debug_assert_eq!(
            self.owner.get().copied(),
            Some(linker.id()),
            "call site invoked through a linker that did not link it"
        );
        {
            let links = self.links.load();
            for link in links.iter() {
                if let Some(result) = link.try_invoke(args) {
                    return result;
                }
            }
        }
        linker.relink_and_invoke(self, args)
    }

    pub(crate) fn bind_owner(&self, linker_id: u64) {
        let bound = *self.owner.get_or_init(|| linker_id);
        assert_eq!(
            bound, linker_id,
            "call site is already linked by another linker"
        );
    }

    pub(crate) fn relink_count_value(&self) -> u32 {
        self.relink_count.load(Ordering::Relaxed)
    }

    pub(crate) fn store_relink_count(&self, count: u32) {
        self.relink_count.store(count, Ordering::Relaxed);
    }

    /// Append a new invocation, pruning invalidated links and evicting the
    /// oldest one when the chain is at capacity.
    pub(crate) fn install_relink(&self, invocation: GuardedInvocation, max_chain: usize) {
        let invocation = Arc::new(invocation);
        self.links.rcu(|links| {
            let mut next: Vec<Arc<GuardedInvocation>> = links
                .iter()
                .filter(|link| !link.has_been_invalidated())
                .cloned()
                .collect();
            if max_chain > 0 && next.len() >= max_chain {
                next.remove(0);
            }
            next.push(Arc::clone(&invocation));
            next
        });
    }

    /// Replace the whole chain: the monomorphic reset.
    pub(crate) fn install_reset(&self, invocation: GuardedInvocation) {
        self.links.store(Arc::new(vec![Arc::new(invocation)]));
    }

    /// Re-store the current chain, forcing a fresh publication.
    pub(crate) fn republish(&self) {
        self.links.store(self.links.load_full());
    }
}

impl std::fmt::Debug for DispatchCallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchCallSite")
            .field("descriptor", &self.descriptor.to_string())
            .field("chain_length", &self.chain_length())
            .field("relink_count", &self.relink_count())
            .finish()
    }
}
