//! The pluggable resolver protocol.
//!
//! A resolver is offered a [`LinkRequest`] and may produce a
//! [`GuardedInvocation`] or decline. Optional capabilities (supplying type
//! converters, ranking conversions, declaring the receiver types it can
//! handle) are probed through `Option<&dyn …>` accessors rather than runtime
//! type inspection. Resolvers must be stateless with respect to the
//! registry; any caching they need is private.

use crate::convert::{ConversionContext, TypeConverterCache};
use crate::invocation::{ConverterFn, GuardedInvocation};
use lattice_core::{
    CallerContext, DispatchDescriptor, LinkError, Signature, TypeId, TypeRegistry, Value,
};
use std::sync::Arc;

// =============================================================================
// Link request
// =============================================================================

/// One resolution attempt: the site's descriptor, its stability flag, and
/// the actual arguments of the invocation that missed.
pub struct LinkRequest<'a> {
    descriptor: &'a DispatchDescriptor,
    unstable: bool,
    arguments: &'a [Value],
}

impl<'a> LinkRequest<'a> {
    pub fn new(descriptor: &'a DispatchDescriptor, unstable: bool, arguments: &'a [Value]) -> Self {
        Self {
            descriptor,
            unstable,
            arguments,
        }
    }

    pub fn descriptor(&self) -> &'a DispatchDescriptor {
        self.descriptor
    }

    /// True once the call site has relinked past the instability threshold;
    /// resolvers should prefer more general, less type-specific guards.
    pub fn is_unstable(&self) -> bool {
        self.unstable
    }

    pub fn arguments(&self) -> &'a [Value] {
        self.arguments
    }

    /// The receiver, by convention the first argument.
    pub fn receiver(&self) -> Option<&'a Value> {
        self.arguments.first()
    }
}

// =============================================================================
// Linker services
// =============================================================================

/// Engine facilities handed to every resolver: type conversion, signature
/// adaptation, and cross-resolver conversion ranking.
pub struct LinkerServices<'a> {
    conversions: &'a TypeConverterCache,
    registry: &'a TypeRegistry,
    authority: &'a CallerContext,
}

impl<'a> LinkerServices<'a> {
    pub(crate) fn new(
        conversions: &'a TypeConverterCache,
        registry: &'a TypeRegistry,
        authority: &'a CallerContext,
    ) -> Self {
        Self {
            conversions,
            registry,
            authority,
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        self.registry
    }

    pub fn conversions(&self) -> &TypeConverterCache {
        self.conversions
    }

    /// The engine's own privileged context, able to unwrap any descriptor's
    /// caller context.
    pub(crate) fn authority(&self) -> &CallerContext {
        self.authority
    }

    /// Adapt an invocation's parameter/return types to `desired`.
    pub fn adapt(
        &self,
        invocation: GuardedInvocation,
        desired: &Signature,
        caller: &CallerContext,
    ) -> GuardedInvocation {
        self.conversions.adapt(invocation, desired, caller)
    }

    /// A total converter between two types (see [`TypeConverterCache::convert`]).
    pub fn converter(&self, from: TypeId, to: TypeId, caller: &CallerContext) -> ConverterFn {
        self.conversions.convert(from, to, caller)
    }

    pub fn can_convert(&self, from: TypeId, to: TypeId) -> bool {
        self.conversions.can_convert(from, to)
    }

    pub fn compare_conversion(
        &self,
        from: TypeId,
        to_first: TypeId,
        to_second: TypeId,
    ) -> ConversionRank {
        self.conversions.compare_conversion(from, to_first, to_second)
    }
}

// =============================================================================
// Resolver traits
// =============================================================================

/// A pluggable dispatch resolver component.
pub trait DispatchResolver: Send + Sync {
    /// Component kind, used to exclude duplicates during auto-discovery.
    fn name(&self) -> &'static str;

    /// Produce a guarded invocation for the request, or decline with
    /// `Ok(None)`. Errors are configuration/programmer failures and are
    /// propagated verbatim to the caller of the invocation.
    fn try_link(
        &self,
        request: &LinkRequest<'_>,
        services: &LinkerServices<'_>,
    ) -> Result<Option<GuardedInvocation>, LinkError>;

    /// Capability probe: this resolver can supply custom type converters.
    fn as_type_converter(&self) -> Option<&dyn TypeConverterResolver> {
        None
    }

    /// Capability probe: this resolver can rank competing conversions.
    fn as_conversion_comparator(&self) -> Option<&dyn ConversionComparator> {
        None
    }

    /// Capability probe: this resolver only handles certain receiver types.
    fn as_type_selective(&self) -> Option<&dyn TypeSelective> {
        None
    }
}

/// Supplies guarded one-argument converter invocations between type pairs.
pub trait TypeConverterResolver: Send + Sync {
    /// A converter from `from` to `to`, or `Ok(None)` if this resolver has
    /// none. Reading the caller out of `cx` marks the construction
    /// context-sensitive, which prevents the result from being cached.
    fn convert_to_type(
        &self,
        from: TypeId,
        to: TypeId,
        cx: &ConversionContext,
    ) -> Result<Option<GuardedInvocation>, LinkError>;
}

/// Ranks which of two target types is the preferable conversion for a
/// source type.
pub trait ConversionComparator: Send + Sync {
    fn compare_conversion(&self, from: TypeId, to_first: TypeId, to_second: TypeId)
        -> ConversionRank;
}

/// Declares the receiver types a resolver handles, letting the composite
/// skip it for everything else.
pub trait TypeSelective: Send + Sync {
    fn can_link_type(&self, ty: TypeId) -> bool;
}

/// Outcome of a conversion comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionRank {
    Indeterminate,
    PreferFirst,
    PreferSecond,
}

// =============================================================================
// Auto-discovery
// =============================================================================

/// Static registration of an auto-discoverable resolver component.
///
/// Registered with `inventory::submit!`; collected by
/// [`LinkerBuilder`](crate::factory::LinkerBuilder) unless discovery is
/// disabled or the component kind is already configured explicitly.
pub struct ResolverRegistration {
    /// Component kind; must match the constructed resolver's `name()`.
    pub kind: &'static str,
    pub construct: fn() -> Result<Arc<dyn DispatchResolver>, LinkError>,
}

inventory::collect!(ResolverRegistration);

/// A discovery-time failure: the offending component was skipped, registry
/// construction proceeded.
#[derive(Debug, Clone)]
pub struct DiscoveryDiagnostic {
    pub kind: &'static str,
    pub error: LinkError,
}
