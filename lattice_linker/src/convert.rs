//! Type conversion: built-in widening plus resolver-supplied converters,
//! memoized pairwise.
//!
//! The cache sits below signature adaptation: the cheap built-in answer
//! first, a memoized custom converter second, a best-effort fallback last.
//! Custom
//! converter construction threads an explicit [`ConversionContext`]; a
//! resolver that reads the caller out of it makes the product
//! context-sensitive, which keeps it out of the cache.

use crate::invocation::{ConverterFn, GuardedInvocation, TargetFn};
use crate::pairwise::{Computed, PairwiseCache};
use crate::resolver::{ConversionRank, DispatchResolver};
use lattice_core::{CallerContext, LinkError, Signature, TypeId, TypeRegistry, Value};
use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Rewrites a fully adapted invocation as a last resort, e.g. to permit
/// conversions the built-in rules forbid.
pub type AutoConversionFn =
    Box<dyn Fn(GuardedInvocation, &Signature) -> GuardedInvocation + Send + Sync>;

// =============================================================================
// Conversion context
// =============================================================================

/// Explicit construction context for custom converters.
///
/// Replaces an ambient thread-local: the caller is passed in, and reading it
/// flips the consumed flag so the cache knows the result is
/// context-sensitive and must not be published.
pub struct ConversionContext {
    caller: CallerContext,
    consumed: AtomicBool,
}

impl ConversionContext {
    pub fn new(caller: CallerContext) -> Self {
        Self {
            caller,
            consumed: AtomicBool::new(false),
        }
    }

    /// The caller on whose behalf the converter is being built. Reading it
    /// marks the construction context-sensitive.
    pub fn caller(&self) -> &CallerContext {
        self.consumed.store(true, Ordering::Relaxed);
        &self.caller
    }

    pub fn was_consumed(&self) -> bool {
        self.consumed.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Cached entries
// =============================================================================

#[derive(Clone)]
enum ConversionEntry {
    Converter(ConverterFn),
    /// Cached negative answer: no resolver supplies this conversion.
    NoConversion,
}

// =============================================================================
// The cache
// =============================================================================

/// Builds and memoizes converter callables between type pairs.
pub struct TypeConverterCache {
    registry: Arc<TypeRegistry>,
    converters: Vec<Arc<dyn DispatchResolver>>,
    comparators: Vec<Arc<dyn DispatchResolver>>,
    cache: PairwiseCache<ConversionEntry>,
    auto_strategy: Option<AutoConversionFn>,
}

impl TypeConverterCache {
    pub(crate) fn new(
        registry: Arc<TypeRegistry>,
        components: &[Arc<dyn DispatchResolver>],
        auto_strategy: Option<AutoConversionFn>,
    ) -> Self {
        let converters = components
            .iter()
            .filter(|c| c.as_type_converter().is_some())
            .cloned()
            .collect();
        let comparators = components
            .iter()
            .filter(|c| c.as_conversion_comparator().is_some())
            .cloned()
            .collect();
        Self {
            cache: PairwiseCache::new(Arc::clone(&registry)),
            registry,
            converters,
            comparators,
            auto_strategy,
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// True when a value of `from` can reach `to`: built-in widening applies
    /// or a custom converter exists. Never falsely negative; optimistic for
    /// generic targets like `ANY`.
    pub fn can_convert(&self, from: TypeId, to: TypeId) -> bool {
        self.registry.is_assignable(to, from)
            || self
                .custom_converter(from, to, &CallerContext::public())
                .is_some()
    }

    /// A converter from `from` to `to`. Total: falls back to a best-effort
    /// coercion that can only fail at invocation time, for the concrete
    /// values that genuinely do not fit.
    pub fn convert(&self, from: TypeId, to: TypeId, caller: &CallerContext) -> ConverterFn {
        if self.registry.is_assignable(to, from) {
            return self.widening_converter(to);
        }
        if let Some(converter) = self.custom_converter(from, to, caller) {
            return converter;
        }
        self.widening_converter(to)
    }

    fn widening_converter(&self, to: TypeId) -> ConverterFn {
        let registry = Arc::clone(&self.registry);
        Arc::new(move |value| coerce_value(value, to, &registry))
    }

    fn custom_converter(
        &self,
        from: TypeId,
        to: TypeId,
        caller: &CallerContext,
    ) -> Option<ConverterFn> {
        match self.converter_entry(from, to, caller) {
            ConversionEntry::Converter(converter) => Some(converter),
            ConversionEntry::NoConversion => None,
        }
    }

    fn converter_entry(&self, from: TypeId, to: TypeId, caller: &CallerContext) -> ConversionEntry {
        self.cache
            .get(from, to, |a, b| {
                let cx = ConversionContext::new(caller.clone());
                match self.build_chain(a, b, &cx) {
                    Ok(None) => Computed::Publish(ConversionEntry::NoConversion),
                    Ok(Some(chain)) => {
                        let entry = ConversionEntry::Converter(self.chain_converter(chain, b));
                        if cx.was_consumed() {
                            Computed::Transient(entry)
                        } else {
                            Computed::Publish(entry)
                        }
                    }
                    Err(error) => {
                        warn!(
                            "building converter #{} -> #{} failed: {}",
                            a.index(),
                            b.index(),
                            error
                        );
                        let failing: ConverterFn = Arc::new(move |_| Err(error.clone()));
                        Computed::Transient(ConversionEntry::Converter(failing))
                    }
                }
            })
            .unwrap_or(ConversionEntry::NoConversion)
    }

    /// Fold converter-capable resolvers in registration order; the
    /// later-registered resolver's converter wraps around earlier ones.
    fn build_chain(
        &self,
        from: TypeId,
        to: TypeId,
        cx: &ConversionContext,
    ) -> Result<Option<GuardedInvocation>, LinkError> {
        let mut chain: Option<GuardedInvocation> = None;
        for component in &self.converters {
            if let Some(resolver) = component.as_type_converter() {
                if let Some(conversion) = resolver.convert_to_type(from, to, cx)? {
                    chain = Some(match chain {
                        Some(inner) => conversion.compose(inner),
                        None => conversion,
                    });
                }
            }
        }
        Ok(chain)
    }

    fn chain_converter(&self, chain: GuardedInvocation, to: TypeId) -> ConverterFn {
        let registry = Arc::clone(&self.registry);
        Arc::new(move |value| {
            let args = [value.clone()];
            match chain.try_invoke(&args) {
                Some(result) => result,
                // Innermost step: built-in coercion.
                None => coerce_value(value, to, &registry),
            }
        })
    }

    /// First comparator-capable resolver with an opinion wins; the built-in
    /// tiebreak prefers the target reachable by widening.
    pub fn compare_conversion(
        &self,
        from: TypeId,
        to_first: TypeId,
        to_second: TypeId,
    ) -> ConversionRank {
        for component in &self.comparators {
            if let Some(comparator) = component.as_conversion_comparator() {
                let rank = comparator.compare_conversion(from, to_first, to_second);
                if rank != ConversionRank::Indeterminate {
                    return rank;
                }
            }
        }
        match (
            self.registry.is_assignable(to_first, from),
            self.registry.is_assignable(to_second, from),
        ) {
            (true, false) => ConversionRank::PreferFirst,
            (false, true) => ConversionRank::PreferSecond,
            _ => ConversionRank::Indeterminate,
        }
    }

    // =========================================================================
    // Signature adaptation
    // =========================================================================

    /// Adapt an invocation's parameter and return types to `desired`.
    ///
    /// Per position: widening defers to the structural pass; otherwise a
    /// custom converter wraps the position if one exists. The return type is
    /// handled symmetrically and independently. The auto-conversion strategy
    /// then gets a final chance to rewrite the invocation, and a best-effort
    /// structural pass absorbs any remaining differences (failing, if at
    /// all, only at invocation time).
    pub fn adapt(
        &self,
        invocation: GuardedInvocation,
        desired: &Signature,
        caller: &CallerContext,
    ) -> GuardedInvocation {
        let mut adapted = self.apply_custom_conversions(invocation, desired, caller);
        if let Some(strategy) = &self.auto_strategy {
            adapted = strategy(adapted, desired);
        }
        self.structural_adapt(adapted, desired)
    }

    fn apply_custom_conversions(
        &self,
        invocation: GuardedInvocation,
        desired: &Signature,
        caller: &CallerContext,
    ) -> GuardedInvocation {
        let inner_sig = invocation.signature().clone();
        let arity = desired.arity().min(inner_sig.arity());

        let mut arg_converters: Vec<Option<ConverterFn>> = vec![None; arity];
        for (i, slot) in arg_converters.iter_mut().enumerate() {
            let from = desired.params()[i];
            let to = inner_sig.params()[i];
            if self.registry.is_assignable(to, from) {
                continue;
            }
            *slot = self.custom_converter(from, to, caller);
        }
        let ret_converter = if self.registry.is_assignable(desired.ret(), inner_sig.ret()) {
            None
        } else {
            self.custom_converter(inner_sig.ret(), desired.ret(), caller)
        };

        if ret_converter.is_none() && arg_converters.iter().all(Option::is_none) {
            return invocation;
        }

        // The effective signature reflects the positions now accepting the
        // call site's types.
        let mut params: Vec<TypeId> = inner_sig.params().to_vec();
        for (i, conv) in arg_converters.iter().enumerate() {
            if conv.is_some() {
                params[i] = desired.params()[i];
            }
        }
        let ret = if ret_converter.is_some() {
            desired.ret()
        } else {
            inner_sig.ret()
        };
        let effective = Signature::new(&params, ret);

        let inner = Arc::clone(invocation.target());
        let target: TargetFn = Arc::new(move |args| {
            let mut call_args: Vec<Value> = Vec::with_capacity(args.len());
            for (i, arg) in args.iter().enumerate() {
                match arg_converters.get(i).and_then(Option::as_ref) {
                    Some(converter) => call_args.push(converter(arg)?),
                    None => call_args.push(arg.clone()),
                }
            }
            let out = inner(&call_args)?;
            match &ret_converter {
                Some(converter) => converter(&out),
                None => Ok(out),
            }
        });
        invocation.replace_target(target).with_signature(effective)
    }

    fn structural_adapt(
        &self,
        invocation: GuardedInvocation,
        desired: &Signature,
    ) -> GuardedInvocation {
        if invocation.signature() == desired {
            return invocation;
        }
        let inner_sig = invocation.signature().clone();
        let registry = Arc::clone(&self.registry);
        let desired_sig = desired.clone();
        let inner = Arc::clone(invocation.target());
        let target: TargetFn = Arc::new(move |args| {
            if args.len() != desired_sig.arity() {
                return Err(LinkError::arity(desired_sig.arity(), args.len()));
            }
            let mut call_args: Vec<Value> = Vec::with_capacity(args.len());
            for (i, arg) in args.iter().enumerate() {
                let want = inner_sig.params().get(i).copied().unwrap_or(TypeId::ANY);
                call_args.push(coerce_value(arg, want, &registry)?);
            }
            let out = inner(&call_args)?;
            coerce_value(&out, desired_sig.ret(), &registry)
        });
        invocation
            .replace_target(target)
            .with_signature(desired.clone())
    }
}

/// Built-in value coercion under the widening rules.
///
/// Identity for assignable values (with `INT → FLOAT` representation
/// change); `TypeMismatch` otherwise.
pub fn coerce_value(value: &Value, to: TypeId, registry: &TypeRegistry) -> Result<Value, LinkError> {
    let from = value.type_id();
    if to == TypeId::ANY || from == to {
        return Ok(value.clone());
    }
    if from == TypeId::INT && to == TypeId::FLOAT {
        if let Value::Int(i) = value {
            return Ok(Value::Float(*i as f64));
        }
    }
    if registry.is_assignable(to, from) {
        return Ok(value.clone());
    }
    Err(LinkError::type_mismatch(
        registry.name_of(to).to_string(),
        registry.name_of(from).to_string(),
    ))
}
