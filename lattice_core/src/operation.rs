//! Operation descriptors: what a call site wants to do.
//!
//! An operation is an immutable, composable description built from a simple
//! kind (`GET`, `SET`, `REMOVE`, `CALL`, `NEW`), optionally decorated with a
//! target namespace list and/or a fixed name. Decorator nesting is exactly
//! one level each: a namespaced operation wraps a simple one, a named
//! operation wraps a simple or namespaced one. Operations are created once
//! per call-site shape and shared across invocations.

use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// The five base operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Get,
    Set,
    Remove,
    Call,
    New,
}

impl OpKind {
    fn as_str(self) -> &'static str {
        match self {
            OpKind::Get => "GET",
            OpKind::Set => "SET",
            OpKind::Remove => "REMOVE",
            OpKind::Call => "CALL",
            OpKind::New => "NEW",
        }
    }
}

/// Namespaces a `GET`/`SET`/`REMOVE` can target, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Property,
    Element,
    Method,
}

impl Namespace {
    fn as_str(self) -> &'static str {
        match self {
            Namespace::Property => "PROPERTY",
            Namespace::Element => "ELEMENT",
            Namespace::Method => "METHOD",
        }
    }
}

/// An immutable operation descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    Simple(OpKind),
    Namespaced {
        base: Box<Operation>,
        namespaces: SmallVec<[Namespace; 2]>,
    },
    Named {
        base: Box<Operation>,
        name: Arc<str>,
    },
}

impl Operation {
    pub fn get() -> Self {
        Operation::Simple(OpKind::Get)
    }

    pub fn set() -> Self {
        Operation::Simple(OpKind::Set)
    }

    pub fn remove() -> Self {
        Operation::Simple(OpKind::Remove)
    }

    pub fn call() -> Self {
        Operation::Simple(OpKind::Call)
    }

    pub fn new_instance() -> Self {
        Operation::Simple(OpKind::New)
    }

    /// Decorate with an ordered, non-empty namespace list.
    ///
    /// Panics if the base is already namespaced or named, or if the list is
    /// empty: decorator nesting is exactly one level.
    pub fn namespaced(self, namespaces: &[Namespace]) -> Self {
        assert!(
            matches!(self, Operation::Simple(_)),
            "namespace decorator requires a simple base operation"
        );
        assert!(!namespaces.is_empty(), "namespace list must be non-empty");
        Operation::Namespaced {
            base: Box::new(self),
            namespaces: SmallVec::from_slice(namespaces),
        }
    }

    /// Decorate with a fixed name.
    ///
    /// Panics if the base is already named: decorator nesting is exactly one
    /// level.
    pub fn named(self, name: &str) -> Self {
        assert!(
            !matches!(self, Operation::Named { .. }),
            "operation is already named"
        );
        Operation::Named {
            base: Box::new(self),
            name: Arc::from(name),
        }
    }

    /// The base operation one decorator level down, or `self` if simple.
    pub fn base(&self) -> &Operation {
        match self {
            Operation::Simple(_) => self,
            Operation::Namespaced { base, .. } | Operation::Named { base, .. } => base,
        }
    }

    /// The underlying simple kind, through any decorators.
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Simple(kind) => *kind,
            Operation::Namespaced { base, .. } | Operation::Named { base, .. } => base.kind(),
        }
    }

    /// Fixed name, if this operation carries one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Operation::Named { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Namespace list, through a name decorator if present.
    pub fn namespaces(&self) -> &[Namespace] {
        match self {
            Operation::Namespaced { namespaces, .. } => namespaces,
            Operation::Named { base, .. } => base.namespaces(),
            Operation::Simple(_) => &[],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Simple(kind) => f.write_str(kind.as_str()),
            Operation::Namespaced { base, namespaces } => {
                write!(f, "{}:", base)?;
                for (i, ns) in namespaces.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    f.write_str(ns.as_str())?;
                }
                Ok(())
            }
            Operation::Named { base, name } => write!(f, "{}:{}", base, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_accessors() {
        let base = Operation::get().namespaced(&[Namespace::Property]);
        let named = base.clone().named("color");
        assert_eq!(named.base(), &base);
        assert_eq!(named.name(), Some("color"));
        assert_eq!(named.kind(), OpKind::Get);
        assert_eq!(named.namespaces(), &[Namespace::Property]);
    }

    #[test]
    #[should_panic(expected = "already named")]
    fn test_double_named_rejected() {
        let once = Operation::get().named("a");
        let _ = once.named("b");
    }

    #[test]
    #[should_panic(expected = "simple base")]
    fn test_namespace_on_named_rejected() {
        let named = Operation::get().named("a");
        let _ = named.namespaced(&[Namespace::Property]);
    }

    #[test]
    #[should_panic(expected = "non-empty")]
    fn test_empty_namespace_list_rejected() {
        let _ = Operation::get().namespaced(&[]);
    }

    #[test]
    fn test_structural_equality() {
        let a = Operation::get()
            .namespaced(&[Namespace::Property, Namespace::Element])
            .named("color");
        let b = Operation::get()
            .namespaced(&[Namespace::Property, Namespace::Element])
            .named("color");
        let c = Operation::get()
            .namespaced(&[Namespace::Element, Namespace::Property])
            .named("color");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_display_form() {
        let op = Operation::get()
            .namespaced(&[Namespace::Property, Namespace::Element])
            .named("color");
        assert_eq!(op.to_string(), "GET:PROPERTY|ELEMENT:color");
        assert_eq!(Operation::call().to_string(), "CALL");
    }
}
