//! Defining scopes and their reachability relation.
//!
//! Every type is owned by a defining scope (a module or namespace boundary).
//! Scopes form a tree rooted at [`ScopeId::ROOT`]; `reachable(from, to)`
//! answers whether `to` can be used from `from` without cross-scope
//! indirection, which is the retention-direction oracle for the pairwise
//! memoization cache in `lattice_linker`.

use parking_lot::RwLock;
use std::sync::Arc;

/// Index of a scope in its [`ScopeGraph`]. Stable for the graph's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    /// The root scope every graph starts with.
    pub const ROOT: ScopeId = ScopeId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

struct ScopeInfo {
    name: Arc<str>,
    parent: Option<ScopeId>,
}

/// Tree of defining scopes.
///
/// Scopes are append-only; a `ScopeId` handed out once is valid forever.
pub struct ScopeGraph {
    scopes: RwLock<Vec<ScopeInfo>>,
}

impl ScopeGraph {
    /// Create a graph containing only the root scope.
    pub fn new() -> Self {
        Self {
            scopes: RwLock::new(vec![ScopeInfo {
                name: Arc::from("root"),
                parent: None,
            }]),
        }
    }

    /// Create a new scope under `parent`.
    ///
    /// Panics if `parent` does not belong to this graph.
    pub fn child(&self, parent: ScopeId, name: &str) -> ScopeId {
        let mut scopes = self.scopes.write();
        assert!(
            parent.index() < scopes.len(),
            "parent scope {:?} not registered in this graph",
            parent
        );
        let id = ScopeId(scopes.len() as u32);
        scopes.push(ScopeInfo {
            name: Arc::from(name),
            parent: Some(parent),
        });
        id
    }

    /// Scope name, as given at creation.
    pub fn name(&self, scope: ScopeId) -> Arc<str> {
        Arc::clone(&self.scopes.read()[scope.index()].name)
    }

    /// Parent scope, `None` for the root.
    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.read()[scope.index()].parent
    }

    /// True iff `to` is `from` itself or a descendant of `from`.
    pub fn reachable(&self, from: ScopeId, to: ScopeId) -> bool {
        let scopes = self.scopes.read();
        let mut cursor = Some(to);
        while let Some(scope) = cursor {
            if scope == from {
                return true;
            }
            cursor = scopes[scope.index()].parent;
        }
        false
    }

    /// True when the scopes are related in either direction.
    pub fn related(&self, a: ScopeId, b: ScopeId) -> bool {
        self.reachable(a, b) || self.reachable(b, a)
    }
}

impl Default for ScopeGraph {
    fn default() -> Self {
        Self::new()
    }
}
