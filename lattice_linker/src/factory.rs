//! Linker construction: explicit resolvers, auto-discovery, and knobs.

use crate::composite::CompositeResolver;
use crate::convert::{AutoConversionFn, TypeConverterCache};
use crate::invocation::GuardedInvocation;
use crate::linker::{DynamicLinker, LinkerConfig};
use crate::resolver::{
    DiscoveryDiagnostic, DispatchResolver, LinkRequest, LinkerServices, ResolverRegistration,
};
use lattice_core::{CallerContext, TypeRegistry};
use log::warn;
use std::sync::Arc;

/// Rewrites every resolved invocation before it is installed.
pub type PreInstallFn = Box<
    dyn Fn(GuardedInvocation, &LinkRequest<'_>, &LinkerServices<'_>) -> GuardedInvocation
        + Send
        + Sync,
>;

/// Builds a [`DynamicLinker`].
///
/// Component priority order is: explicitly prioritized resolvers, then
/// auto-discovered ones (excluding duplicates of component kinds already
/// configured), then fallback resolvers. Discovery failures are collected as
/// diagnostics, never raised.
pub struct LinkerBuilder {
    registry: Arc<TypeRegistry>,
    prioritized: Vec<Arc<dyn DispatchResolver>>,
    fallbacks: Vec<Arc<dyn DispatchResolver>>,
    discovery: bool,
    unstable_threshold: u32,
    sync_on_relink: bool,
    max_chain_length: usize,
    pre_install: Option<PreInstallFn>,
    auto_strategy: Option<AutoConversionFn>,
}

impl LinkerBuilder {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            prioritized: Vec::new(),
            fallbacks: Vec::new(),
            discovery: true,
            unstable_threshold: 8,
            sync_on_relink: false,
            max_chain_length: 8,
            pre_install: None,
            auto_strategy: None,
        }
    }

    /// Add a resolver ahead of anything auto-discovered.
    pub fn with_resolver(mut self, resolver: Arc<dyn DispatchResolver>) -> Self {
        self.prioritized.push(resolver);
        self
    }

    /// Add a resolver consulted after everything else.
    pub fn with_fallback_resolver(mut self, resolver: Arc<dyn DispatchResolver>) -> Self {
        self.fallbacks.push(resolver);
        self
    }

    /// Enable or disable static auto-discovery (on by default).
    pub fn with_discovery(mut self, discovery: bool) -> Self {
        self.discovery = discovery;
        self
    }

    /// Relinks before a call site is flagged unstable. Default 8; 0 disables
    /// the heuristic.
    pub fn with_unstable_threshold(mut self, threshold: u32) -> Self {
        self.unstable_threshold = threshold;
        self
    }

    /// Force cross-thread publication after each relink. Default off.
    pub fn with_sync_on_relink(mut self, sync: bool) -> Self {
        self.sync_on_relink = sync;
        self
    }

    /// Cached invocations kept per call site before the oldest is evicted.
    pub fn with_max_chain_length(mut self, max: usize) -> Self {
        self.max_chain_length = max;
        self
    }

    /// Replace the pre-install transformer. The default adapts each resolved
    /// invocation to the call site's declared signature.
    pub fn with_pre_install_transform(mut self, transform: PreInstallFn) -> Self {
        self.pre_install = Some(transform);
        self
    }

    /// Install an auto-conversion strategy consulted during adaptation.
    pub fn with_auto_conversion_strategy(mut self, strategy: AutoConversionFn) -> Self {
        self.auto_strategy = Some(strategy);
        self
    }

    pub fn build(self) -> DynamicLinker {
        let Self {
            registry,
            prioritized,
            fallbacks,
            discovery,
            unstable_threshold,
            sync_on_relink,
            max_chain_length,
            pre_install,
            auto_strategy,
        } = self;

        let mut components = prioritized;
        let mut diagnostics: Vec<DiscoveryDiagnostic> = Vec::new();
        if discovery {
            for registration in inventory::iter::<ResolverRegistration> {
                if kind_configured(&components, &fallbacks, registration.kind) {
                    continue;
                }
                match (registration.construct)() {
                    Ok(resolver) => {
                        if !kind_configured(&components, &fallbacks, resolver.name()) {
                            components.push(resolver);
                        }
                    }
                    Err(error) => {
                        warn!(
                            "skipping discovered resolver `{}`: {}",
                            registration.kind, error
                        );
                        diagnostics.push(DiscoveryDiagnostic {
                            kind: registration.kind,
                            error,
                        });
                    }
                }
            }
        }
        components.extend(fallbacks);

        let conversions = Arc::new(TypeConverterCache::new(
            Arc::clone(&registry),
            &components,
            auto_strategy,
        ));
        let composite = CompositeResolver::new(components);
        let pre_install = pre_install.unwrap_or_else(default_pre_install);
        DynamicLinker::new(
            registry,
            composite,
            conversions,
            LinkerConfig {
                unstable_threshold,
                sync_on_relink,
                max_chain_length,
            },
            pre_install,
            diagnostics,
        )
    }
}

fn kind_configured(
    components: &[Arc<dyn DispatchResolver>],
    fallbacks: &[Arc<dyn DispatchResolver>],
    kind: &str,
) -> bool {
    components
        .iter()
        .chain(fallbacks.iter())
        .any(|component| component.name() == kind)
}

/// Default pre-install transform: adapt the invocation's parameter and
/// return types to the call site's declared signature, on behalf of the
/// site's own caller context.
fn default_pre_install() -> PreInstallFn {
    Box::new(|invocation, request, services| {
        let caller = request
            .descriptor()
            .context(services.authority())
            .cloned()
            .unwrap_or_else(|_| CallerContext::public());
        services.adapt(invocation, request.descriptor().signature(), &caller)
    })
}
