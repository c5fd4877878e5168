//! Type identifiers and the registry boundary.
//!
//! The linking engine never inspects a type's representation; it only needs
//! equality/hash of [`TypeId`] plus a handful of boundary predicates:
//! primitive-likeness, assignability under the built-in widening rules, and
//! the type's defining scope. [`TypeRegistry`] is the stand-in for the
//! descriptor/encoding layer that owns those answers.

use crate::scope::{ScopeGraph, ScopeId};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Identifier of a registered type. Cheap to copy, stable forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    /// Top type; every value is assignable to it.
    pub const ANY: TypeId = TypeId(0);
    /// The unit/none type.
    pub const UNIT: TypeId = TypeId(1);
    pub const BOOL: TypeId = TypeId(2);
    pub const INT: TypeId = TypeId(3);
    pub const FLOAT: TypeId = TypeId(4);
    pub const STR: TypeId = TypeId(5);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

struct TypeInfo {
    name: Arc<str>,
    scope: ScopeId,
    supertype: Option<TypeId>,
    primitive: bool,
}

/// Registry of all types known to one engine instance.
///
/// The well-known types (`ANY`, `UNIT`, `BOOL`, `INT`, `FLOAT`, `STR`) are
/// pre-registered in the root scope; user types are added at runtime with an
/// explicit defining scope. Append-only.
pub struct TypeRegistry {
    scopes: Arc<ScopeGraph>,
    types: RwLock<Vec<TypeInfo>>,
    by_name: RwLock<FxHashMap<Arc<str>, TypeId>>,
}

impl TypeRegistry {
    pub fn new(scopes: Arc<ScopeGraph>) -> Self {
        let registry = Self {
            scopes,
            types: RwLock::new(Vec::with_capacity(16)),
            by_name: RwLock::new(FxHashMap::default()),
        };
        // Order must match the TypeId constants.
        registry.push("any", ScopeId::ROOT, None, false);
        registry.push("unit", ScopeId::ROOT, Some(TypeId::ANY), true);
        registry.push("bool", ScopeId::ROOT, Some(TypeId::ANY), true);
        registry.push("int", ScopeId::ROOT, Some(TypeId::ANY), true);
        registry.push("float", ScopeId::ROOT, Some(TypeId::ANY), true);
        registry.push("str", ScopeId::ROOT, Some(TypeId::ANY), false);
        registry
    }

    fn push(
        &self,
        name: &str,
        scope: ScopeId,
        supertype: Option<TypeId>,
        primitive: bool,
    ) -> TypeId {
        let mut types = self.types.write();
        let id = TypeId(types.len() as u32);
        let name: Arc<str> = Arc::from(name);
        types.push(TypeInfo {
            name: Arc::clone(&name),
            scope,
            supertype,
            primitive,
        });
        self.by_name.write().insert(name, id);
        id
    }

    /// Register a user type in `scope`, subtype of `ANY`.
    pub fn register(&self, name: &str, scope: ScopeId) -> TypeId {
        self.push(name, scope, Some(TypeId::ANY), false)
    }

    /// Register a user type with an explicit declared supertype.
    ///
    /// Panics if `supertype` is unknown to this registry.
    pub fn register_subtype(&self, name: &str, scope: ScopeId, supertype: TypeId) -> TypeId {
        assert!(
            supertype.index() < self.types.read().len(),
            "supertype {:?} not registered",
            supertype
        );
        self.push(name, scope, Some(supertype), false)
    }

    pub fn scopes(&self) -> &Arc<ScopeGraph> {
        &self.scopes
    }

    pub fn name_of(&self, ty: TypeId) -> Arc<str> {
        Arc::clone(&self.types.read()[ty.index()].name)
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.read().get(name).copied()
    }

    /// Defining scope of `ty`.
    pub fn scope_of(&self, ty: TypeId) -> ScopeId {
        self.types.read()[ty.index()].scope
    }

    /// Primitive-like types are eligible for built-in numeric widening.
    pub fn is_primitive(&self, ty: TypeId) -> bool {
        self.types.read()[ty.index()].primitive
    }

    /// Built-in "safe" assignability: identity, the declared supertype
    /// chain, everything-to-`ANY`, and the numeric widening `INT → FLOAT`.
    pub fn is_assignable(&self, to: TypeId, from: TypeId) -> bool {
        if to == from || to == TypeId::ANY {
            return true;
        }
        if from == TypeId::INT && to == TypeId::FLOAT {
            return true;
        }
        let types = self.types.read();
        let mut cursor = types[from.index()].supertype;
        while let Some(super_ty) = cursor {
            if super_ty == to {
                return true;
            }
            cursor = types[super_ty.index()].supertype;
        }
        false
    }

    /// Number of registered types (never zero; builtins are always present).
    pub fn type_count(&self) -> usize {
        self.types.read().len()
    }
}
