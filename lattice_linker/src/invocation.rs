//! Guarded invocations: a cached dispatch decision.
//!
//! A [`GuardedInvocation`] pairs a callable target with an optional validity
//! guard and an optional external invalidation token, and chains to a
//! fallback built by [`compose`](GuardedInvocation::compose). A link with no
//! guard and no invalidation is *universal*: it always applies, and nothing
//! composed behind it is ever consulted.

use lattice_core::{LinkError, Signature, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A callable dispatch target.
pub type TargetFn = Arc<dyn Fn(&[Value]) -> Result<Value, LinkError> + Send + Sync>;

/// A validity predicate over the same arguments as the target.
pub type GuardFn = Arc<dyn Fn(&[Value]) -> bool + Send + Sync>;

/// A single-value conversion callable.
pub type ConverterFn = Arc<dyn Fn(&Value) -> Result<Value, LinkError> + Send + Sync>;

/// One-shot external "still valid" flag.
///
/// Shared between the party that may invalidate a linked target (a class
/// redefinition, a reloaded module) and the call sites caching it. Tripping
/// it makes every invocation carrying the token inapplicable, forcing a
/// relink on next use.
#[derive(Debug, Clone)]
pub struct InvalidationToken {
    valid: Arc<AtomicBool>,
}

impl InvalidationToken {
    pub fn new() -> Self {
        Self {
            valid: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Trip the flag. Irreversible.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

impl Default for InvalidationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A callable target, its validity guard, and its fallback chain.
///
/// Created fresh by a resolver per link attempt; owned by the call site that
/// installs it; discarded on relink.
#[derive(Clone)]
pub struct GuardedInvocation {
    target: TargetFn,
    guard: Option<GuardFn>,
    invalidation: Option<InvalidationToken>,
    signature: Signature,
    fallback: Option<Box<GuardedInvocation>>,
}

impl GuardedInvocation {
    /// An invocation that applies unconditionally.
    pub fn unconditional(target: TargetFn, signature: Signature) -> Self {
        Self {
            target,
            guard: None,
            invalidation: None,
            signature,
            fallback: None,
        }
    }

    /// An invocation valid only while `guard` passes.
    pub fn guarded(target: TargetFn, guard: GuardFn, signature: Signature) -> Self {
        Self {
            target,
            guard: Some(guard),
            invalidation: None,
            signature,
            fallback: None,
        }
    }

    /// Attach an external invalidation token.
    pub fn with_invalidation(mut self, token: InvalidationToken) -> Self {
        self.invalidation = Some(token);
        self
    }

    pub fn target(&self) -> &TargetFn {
        &self.target
    }

    pub fn guard(&self) -> Option<&GuardFn> {
        self.guard.as_ref()
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// No guard, no invalidation: applies to every invocation, forever.
    pub fn is_universal(&self) -> bool {
        self.guard.is_none() && self.invalidation.is_none()
    }

    /// True once the attached invalidation token has tripped.
    pub fn has_been_invalidated(&self) -> bool {
        self.invalidation
            .as_ref()
            .is_some_and(|token| !token.is_valid())
    }

    /// Whether this link (not its fallbacks) is valid for `args`.
    #[inline]
    pub fn applies(&self, args: &[Value]) -> bool {
        if self.has_been_invalidated() {
            return false;
        }
        match &self.guard {
            Some(guard) => guard(args),
            None => true,
        }
    }

    /// Run the first applicable link in the chain; `None` if none applies.
    pub fn try_invoke(&self, args: &[Value]) -> Option<Result<Value, LinkError>> {
        let mut link = self;
        loop {
            if link.applies(args) {
                return Some((link.target)(args));
            }
            match &link.fallback {
                Some(next) => link = next,
                None => return None,
            }
        }
    }

    /// Sequential composition: try `self`, fall back to `next`.
    ///
    /// A universal receiver supersedes `next` entirely; no fallback is ever
    /// consulted through it.
    pub fn compose(mut self, next: GuardedInvocation) -> Self {
        self.append(next);
        self
    }

    fn append(&mut self, next: GuardedInvocation) {
        if self.is_universal() {
            return;
        }
        match &mut self.fallback {
            Some(fallback) => fallback.append(next),
            None => self.fallback = Some(Box::new(next)),
        }
    }

    /// Links in this chain, including `self`.
    pub fn chain_length(&self) -> usize {
        let mut len = 1;
        let mut link = self;
        while let Some(next) = &link.fallback {
            len += 1;
            link = next;
        }
        len
    }

    /// Same guard, invalidation, and signature; different target.
    pub fn replace_target(self, target: TargetFn) -> Self {
        Self { target, ..self }
    }

    /// Same target and guard; re-declared signature.
    pub fn with_signature(self, signature: Signature) -> Self {
        Self { signature, ..self }
    }

    /// Wrap the target's return value with a converter.
    pub fn filter_return(self, converter: ConverterFn) -> Self {
        let inner = Arc::clone(&self.target);
        let target: TargetFn = Arc::new(move |args| converter(&inner(args)?));
        Self { target, ..self }
    }
}

impl std::fmt::Debug for GuardedInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedInvocation")
            .field("guarded", &self.guard.is_some())
            .field("invalidation", &self.invalidation.is_some())
            .field("signature", &self.signature)
            .field("chain_length", &self.chain_length())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::TypeId;

    fn sig() -> Signature {
        Signature::new(&[TypeId::ANY], TypeId::ANY)
    }

    fn constant(n: i64) -> TargetFn {
        Arc::new(move |_| Ok(Value::Int(n)))
    }

    fn int_guard() -> GuardFn {
        Arc::new(|args| matches!(args.first(), Some(Value::Int(_))))
    }

    #[test]
    fn test_guard_controls_applicability() {
        let inv = GuardedInvocation::guarded(constant(1), int_guard(), sig());
        assert!(inv.applies(&[Value::Int(9)]));
        assert!(!inv.applies(&[Value::str("x")]));
    }

    #[test]
    fn test_compose_falls_back_on_guard_miss() {
        let chain = GuardedInvocation::guarded(constant(1), int_guard(), sig())
            .compose(GuardedInvocation::unconditional(constant(2), sig()));

        assert_eq!(chain.chain_length(), 2);
        assert_eq!(chain.try_invoke(&[Value::Int(0)]).unwrap().unwrap(), Value::Int(1));
        assert_eq!(
            chain.try_invoke(&[Value::str("x")]).unwrap().unwrap(),
            Value::Int(2)
        );
    }

    #[test]
    fn test_universal_head_discards_composition() {
        let chain = GuardedInvocation::unconditional(constant(1), sig())
            .compose(GuardedInvocation::unconditional(constant(2), sig()));

        // A universal invocation is final; the tail was never attached.
        assert_eq!(chain.chain_length(), 1);
        assert_eq!(chain.try_invoke(&[Value::Unit]).unwrap().unwrap(), Value::Int(1));
    }

    #[test]
    fn test_invalidation_disables_link() {
        let token = InvalidationToken::new();
        let chain = GuardedInvocation::unconditional(constant(1), sig())
            .with_invalidation(token.clone())
            .compose(GuardedInvocation::unconditional(constant(2), sig()));

        // With a token attached the head is not universal, so the tail exists.
        assert_eq!(chain.chain_length(), 2);
        assert_eq!(chain.try_invoke(&[Value::Unit]).unwrap().unwrap(), Value::Int(1));

        token.invalidate();
        assert!(chain.has_been_invalidated());
        assert_eq!(chain.try_invoke(&[Value::Unit]).unwrap().unwrap(), Value::Int(2));
    }

    #[test]
    fn test_no_applicable_link() {
        let inv = GuardedInvocation::guarded(constant(1), int_guard(), sig());
        assert!(inv.try_invoke(&[Value::str("x")]).is_none());
    }

    #[test]
    fn test_filter_return() {
        let double: ConverterFn = Arc::new(|v| match v {
            Value::Int(i) => Ok(Value::Int(i * 2)),
            other => Ok(other.clone()),
        });
        let inv = GuardedInvocation::unconditional(constant(21), sig()).filter_return(double);
        assert_eq!(inv.try_invoke(&[Value::Unit]).unwrap().unwrap(), Value::Int(42));
    }
}
