//! Core data model for the Lattice dynamic dispatch engine.
//!
//! This crate holds the immutable vocabulary the linker operates on:
//! operations, call-site descriptors, caller-context tokens, dynamic values,
//! and the type/scope boundary the engine treats as opaque. The engine
//! itself lives in `lattice_linker`.
#![deny(unsafe_op_in_unsafe_fn)]

pub mod descriptor;
pub mod error;
pub mod operation;
pub mod scope;
pub mod types;
pub mod value;

pub use descriptor::{CallerContext, DispatchDescriptor, Signature};
pub use error::LinkError;
pub use operation::{Namespace, OpKind, Operation};
pub use scope::{ScopeGraph, ScopeId};
pub use types::{TypeId, TypeRegistry};
pub use value::{ObjectValue, Value};
