//! Dynamic dispatch linking and caching engine.
//!
//! A call site whose target is unknown until first invocation presents a
//! [`DispatchDescriptor`](lattice_core::DispatchDescriptor) to a
//! [`DynamicLinker`](linker::DynamicLinker); pluggable resolvers produce a
//! validity-guarded target which the call site caches, polymorphically, until
//! a guard fails and the orchestrator relinks it. Cross-type conversions are
//! built once and memoized in a scope-aware, lock-free pairwise cache.
#![deny(unsafe_op_in_unsafe_fn)]

pub mod call_site;
pub mod composite;
pub mod convert;
pub mod factory;
pub mod invocation;
pub mod linker;
pub mod pairwise;
pub mod resolver;

pub use call_site::DispatchCallSite;
pub use composite::CompositeResolver;
pub use convert::{coerce_value, AutoConversionFn, ConversionContext, TypeConverterCache};
pub use factory::{LinkerBuilder, PreInstallFn};
pub use invocation::{ConverterFn, GuardFn, GuardedInvocation, InvalidationToken, TargetFn};
pub use linker::{DynamicLinker, LinkerStatsSnapshot};
pub use pairwise::{Computed, PairwiseCache};
pub use resolver::{
    ConversionComparator, ConversionRank, DiscoveryDiagnostic, DispatchResolver, LinkRequest,
    LinkerServices, ResolverRegistration, TypeConverterResolver, TypeSelective,
};
