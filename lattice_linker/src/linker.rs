//! The dynamic linker: relink orchestration and the stability heuristic.
//!
//! The linker turns a call site's first invocation and subsequent guard
//! failures into resolved, cached dispatch targets. Linking is lazy: `link`
//! only stamps the site; resolution happens inside the fallback path when an
//! invocation finds no applicable cached link.

use crate::call_site::DispatchCallSite;
use crate::composite::CompositeResolver;
use crate::convert::TypeConverterCache;
use crate::factory::PreInstallFn;
use crate::resolver::{DiscoveryDiagnostic, LinkRequest, LinkerServices};
use lattice_core::{CallerContext, LinkError, ScopeId, TypeRegistry, Value};
use log::{debug, trace};
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_LINKER_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub(crate) struct LinkerConfig {
    /// Relinks before a call site is flagged unstable; 0 disables.
    pub unstable_threshold: u32,
    /// Republish + full fence after each relink.
    pub sync_on_relink: bool,
    /// Cached invocations kept per call site.
    pub max_chain_length: usize,
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Default)]
struct LinkerStats {
    initial_links: AtomicU64,
    relinks: AtomicU64,
    resets: AtomicU64,
    failed_resolutions: AtomicU64,
}

/// Point-in-time view of the linker's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkerStatsSnapshot {
    pub initial_links: u64,
    pub relinks: u64,
    pub resets: u64,
    pub failed_resolutions: u64,
}

// =============================================================================
// Dynamic linker
// =============================================================================

/// The relink orchestrator. Build one via
/// [`LinkerBuilder`](crate::factory::LinkerBuilder).
pub struct DynamicLinker {
    id: u64,
    registry: Arc<TypeRegistry>,
    composite: CompositeResolver,
    conversions: Arc<TypeConverterCache>,
    config: LinkerConfig,
    pre_install: PreInstallFn,
    authority: CallerContext,
    diagnostics: Vec<DiscoveryDiagnostic>,
    stats: LinkerStats,
}

impl DynamicLinker {
    pub(crate) fn new(
        registry: Arc<TypeRegistry>,
        composite: CompositeResolver,
        conversions: Arc<TypeConverterCache>,
        config: LinkerConfig,
        pre_install: PreInstallFn,
        diagnostics: Vec<DiscoveryDiagnostic>,
    ) -> Self {
        let id = NEXT_LINKER_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            registry,
            composite,
            conversions,
            config,
            pre_install,
            authority: CallerContext::privileged(u64::MAX - id, ScopeId::ROOT),
            diagnostics,
            stats: LinkerStats::default(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn conversions(&self) -> &TypeConverterCache {
        &self.conversions
    }

    /// Resolver component kinds in priority order.
    pub fn resolver_kinds(&self) -> Vec<&'static str> {
        self.composite.component_kinds()
    }

    /// Non-fatal errors collected while auto-discovering resolvers.
    pub fn discovery_diagnostics(&self) -> &[DiscoveryDiagnostic] {
        &self.diagnostics
    }

    pub fn stats(&self) -> LinkerStatsSnapshot {
        LinkerStatsSnapshot {
            initial_links: self.stats.initial_links.load(Ordering::Relaxed),
            relinks: self.stats.relinks.load(Ordering::Relaxed),
            resets: self.stats.resets.load(Ordering::Relaxed),
            failed_resolutions: self.stats.failed_resolutions.load(Ordering::Relaxed),
        }
    }

    /// Take ownership of a call site. Lazy: no resolution happens here.
    ///
    /// Linking a site to two different linkers is a contract violation and
    /// panics.
    pub fn link(&self, site: Arc<DispatchCallSite>) -> Arc<DispatchCallSite> {
        site.bind_owner(self.id);
        site
    }

    /// The fallback path: resolve, install, invoke.
    pub(crate) fn relink_and_invoke(
        &self,
        site: &DispatchCallSite,
        args: &[Value],
    ) -> Result<Value, LinkError> {
        let threshold = self.config.unstable_threshold;
        let was_linked = site.is_linked();
        let count = site.relink_count_value();
        // The initial link of an unlinked site is not a relink; the
        // heuristic only watches guard-failure-driven resolutions.
        let detection = threshold > 0 && was_linked;
        let unstable = detection && count >= threshold;

        let request = LinkRequest::new(site.descriptor(), unstable, args);
        let services = LinkerServices::new(&self.conversions, &self.registry, &self.authority);

        // Resolution errors propagate verbatim and leave the site untouched;
        // it is retried on its next invocation.
        let Some(found) = self.composite.try_link(&request, &services)? else {
            self.stats.failed_resolutions.fetch_add(1, Ordering::Relaxed);
            debug!("no applicable target for {}", site.descriptor());
            return Err(LinkError::no_applicable_target(
                site.descriptor().operation().to_string(),
            ));
        };
        let invocation = (self.pre_install)(found, &request, &services);
        let target = Arc::clone(invocation.target());

        if detection && count <= threshold {
            // Saturates at threshold + 1 so the unstable transition below
            // fires exactly once per call site.
            site.store_relink_count(count + 1);
        }

        if detection && count == threshold {
            debug!(
                "call site {} crossed the instability threshold; resetting",
                site.descriptor()
            );
            site.install_reset(invocation);
            self.stats.resets.fetch_add(1, Ordering::Relaxed);
        } else if was_linked {
            trace!("relinking call site {}", site.descriptor());
            site.install_relink(invocation, self.config.max_chain_length);
            self.stats.relinks.fetch_add(1, Ordering::Relaxed);
        } else {
            trace!("installing initial link for {}", site.descriptor());
            site.install_relink(invocation, self.config.max_chain_length);
            self.stats.initial_links.fetch_add(1, Ordering::Relaxed);
        }

        if self.config.sync_on_relink {
            site.republish();
            fence(Ordering::SeqCst);
        }

        target(args)
    }
}
