//! disir: an in-memory schema/config core.
//!
//! A [`Mold`](context::Variant::Mold) describes the shape of configuration data - its
//! sections, keyvals, versioned defaults and restrictions. A [`Config`](context::Variant::Config)
//! is an instance built against a Mold, carrying concrete values. Both are represented by the
//! same polymorphic [`context::Context`] handle over a shared node tree.
//!
//! This crate has no opinion on serialization, filesystem layout or plugin loading - those are
//! external collaborators that talk to this engine purely through the operations re-exported
//! here.

pub mod context;
pub mod diff;
pub mod element_storage;
pub mod error;
pub mod resolver;
pub mod restriction;
pub mod validator;
pub mod value;
pub mod version;

pub use context::{Context, Variant};
pub use diff::{compare, ChangeKind, Conflict};
pub use error::{Error, Result};
pub use restriction::{Cardinality, Restriction, RestrictionKind};
pub use validator::validate;
pub use value::{Value, ValueType};
pub use version::Version;
