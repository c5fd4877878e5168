//! Call-site descriptors, signatures, and caller-context tokens.
//!
//! A [`DispatchDescriptor`] is the immutable triple a call site presents to
//! the linker: who is asking (an opaque caller-context token), what the
//! site wants to do (an [`Operation`]), and the declared parameter/return
//! types. Derivation is controlled: `with_operation`/`with_signature`
//! return a new descriptor with exactly that one field changed, which the
//! type system guarantees by construction.

use crate::error::LinkError;
use crate::operation::Operation;
use crate::scope::ScopeId;
use crate::types::TypeId;
use smallvec::SmallVec;
use std::fmt;

// =============================================================================
// Signature
// =============================================================================

/// Declared parameter and return types of a call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    params: SmallVec<[TypeId; 4]>,
    ret: TypeId,
}

impl Signature {
    pub fn new(params: &[TypeId], ret: TypeId) -> Self {
        Self {
            params: SmallVec::from_slice(params),
            ret,
        }
    }

    pub fn params(&self) -> &[TypeId] {
        &self.params
    }

    pub fn ret(&self) -> TypeId {
        self.ret
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "#{}", p.index())?;
        }
        write!(f, ") -> #{}", self.ret.index())
    }
}

// =============================================================================
// Caller context
// =============================================================================

/// Opaque caller capability token.
///
/// Compared by identity class (`id`) plus visibility scope. The well-known
/// [`CallerContext::public`] sentinel carries no restriction; obtaining any
/// other context from a descriptor requires authorization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerContext {
    id: u64,
    scope: ScopeId,
    privileged: bool,
}

impl CallerContext {
    /// The "public, no-restriction" sentinel.
    pub fn public() -> Self {
        Self {
            id: 0,
            scope: ScopeId::ROOT,
            privileged: false,
        }
    }

    pub fn new(id: u64, scope: ScopeId) -> Self {
        Self {
            id,
            scope,
            privileged: false,
        }
    }

    /// A context holding the capability to inspect other contexts.
    pub fn privileged(id: u64, scope: ScopeId) -> Self {
        Self {
            id,
            scope,
            privileged: true,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn is_public(&self) -> bool {
        self.id == 0 && !self.privileged
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }
}

// =============================================================================
// Dispatch descriptor
// =============================================================================

/// Immutable descriptor of one dynamic call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchDescriptor {
    context: CallerContext,
    operation: Operation,
    signature: Signature,
}

impl DispatchDescriptor {
    pub fn new(context: CallerContext, operation: Operation, signature: Signature) -> Self {
        Self {
            context,
            operation,
            signature,
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Obtain the caller context, subject to authorization.
    ///
    /// Granted when the stored context is the public sentinel, when the
    /// requestor is privileged, or when the requestor is the stored context
    /// itself. Denial is immediate and never retried.
    pub fn context(&self, requestor: &CallerContext) -> Result<&CallerContext, LinkError> {
        if self.context.is_public() || requestor.is_privileged() || *requestor == self.context {
            Ok(&self.context)
        } else {
            Err(LinkError::authorization(format!(
                "context #{} may not be inspected by context #{}",
                self.context.id, requestor.id
            )))
        }
    }

    /// New descriptor, identical except for the operation.
    pub fn with_operation(&self, operation: Operation) -> Self {
        Self {
            context: self.context.clone(),
            operation,
            signature: self.signature.clone(),
        }
    }

    /// New descriptor, identical except for the signature.
    pub fn with_signature(&self, signature: Signature) -> Self {
        Self {
            context: self.context.clone(),
            operation: self.operation.clone(),
            signature,
        }
    }
}

impl fmt::Display for DispatchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} @ctx{}",
            self.operation, self.signature, self.context.id
        )
    }
}
