//! The conversion pipeline: converter contracts, the factory chain and the
//! decorating links that make up the engine.
//!
//! A caller never builds converters directly — it asks the engine
//! ([`JsonBind::provide_converter`](crate::engine::JsonBind::provide_converter))
//! for one, and the engine drives the chain assembled by the builder:
//!
//! ```text
//! cycle breaking → null policy → class metadata → runtime type
//!     → custom links → bean view → resolution
//! ```
//!
//! Each link may decorate the converter produced by the links after it; the
//! terminal resolution link consults explicit registrations, the ordered
//! factory list and finally the structural bean fallback.

// -----------------------------------------------------------------------------
// Modules

pub(crate) mod basic;
pub(crate) mod bean_view;
mod chain;
pub(crate) mod circular;
pub(crate) mod class_metadata;
pub mod defaults;
pub(crate) mod null;
pub(crate) mod runtime_type;

pub use chain::{ChainLink, ChainedFactory, Downstream};

use std::sync::Arc;

use crate::engine::JsonBind;
use crate::error::Result;
use crate::stream::{ObjectReader, ObjectWriter};
use crate::token::TypeToken;
use crate::value::{Dynamic, DynamicValue};

// -----------------------------------------------------------------------------
// Markers

/// The concerns a converter can declare it already manages itself.
///
/// Chain links consult these before decorating: a converter that handles
/// nulls is not wrapped by the null-policy link, one that manages class
/// metadata is not wrapped by the metadata link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concern {
    Null,
    ClassMetadata,
    BeanView,
}

/// Declarative capability markers.
///
/// Decorators answer with the union of their own markers and their inner
/// converter's, so a stack of decorators still reports everything the
/// pipeline handles.
pub trait Markers {
    fn handles(&self, _concern: Concern) -> bool {
        false
    }
}

// -----------------------------------------------------------------------------
// Serializer / Deserializer / Converter

/// The write half of a converter.
pub trait Serializer: Markers + Send + Sync {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        ctx: &mut Context<'_>,
    ) -> Result<()>;
}

/// The read half of a converter.
pub trait Deserializer: Markers + Send + Sync {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        ctx: &mut Context<'_>,
    ) -> Result<DynamicValue>;
}

/// Paired serialize/deserialize behavior for exactly one type.
///
/// Blanket-implemented: anything that is both a [`Serializer`] and a
/// [`Deserializer`] is a converter.
pub trait Converter: Serializer + Deserializer {}

impl<T: Serializer + Deserializer + ?Sized> Converter for T {}

// -----------------------------------------------------------------------------
// Factory

/// The output capability a factory declares up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryKind {
    Serializer,
    Deserializer,
    Converter,
}

impl FactoryKind {
    pub(crate) fn can_serialize(self) -> bool {
        matches!(self, Self::Serializer | Self::Converter)
    }

    pub(crate) fn can_deserialize(self) -> bool {
        matches!(self, Self::Deserializer | Self::Converter)
    }
}

/// What a factory produced.
pub enum Produced {
    Serializer(Arc<dyn Serializer>),
    Deserializer(Arc<dyn Deserializer>),
    Converter(Arc<dyn Converter>),
}

/// Produces converters for the types it accepts; the extension seam of the
/// engine.
///
/// Factories are consulted in registration order and pre-checked twice
/// before being invoked: their [`kind`](Factory::kind) must be compatible
/// with the side being resolved, and [`accepts`](Factory::accepts) must
/// match the requested token. The first factory passing both checks that
/// also returns a value wins; later factories are not tried.
pub trait Factory: Send + Sync {
    fn kind(&self) -> FactoryKind;

    /// Structural pre-check against the requested token.
    fn accepts(&self, token: &TypeToken) -> bool;

    /// Builds a converter for `token`, or declines with `Ok(None)`.
    ///
    /// Implementations resolve converters for nested types through `engine`,
    /// which is what lets the cycle-breaking link observe recursion.
    fn create(&self, token: &TypeToken, engine: &JsonBind) -> Result<Option<Produced>>;
}

// -----------------------------------------------------------------------------
// Context

/// Per-call-tree scratch state.
///
/// One context lives for a single top-level serialize or deserialize
/// invocation and everything it triggers transitively; it carries the active
/// view names and the identity set used for value-level cycle detection
/// during runtime-type redirection. Never shared across threads.
pub struct Context<'a> {
    engine: &'a JsonBind,
    views: Vec<String>,
    seen: std::collections::HashSet<usize>,
}

impl<'a> Context<'a> {
    pub fn new(engine: &'a JsonBind) -> Self {
        Self {
            engine,
            views: Vec::new(),
            seen: std::collections::HashSet::new(),
        }
    }

    pub fn with_views(engine: &'a JsonBind, views: Vec<String>) -> Self {
        Self {
            engine,
            views,
            seen: std::collections::HashSet::new(),
        }
    }

    #[inline]
    pub fn engine(&self) -> &'a JsonBind {
        self.engine
    }

    /// The active serialization view names, in selection order.
    #[inline]
    pub fn views(&self) -> &[String] {
        &self.views
    }

    /// Records a value instance as in-flight; `false` means it already is,
    /// i.e. the object graph loops back on itself.
    pub(crate) fn enter_value(&mut self, identity: usize) -> bool {
        self.seen.insert(identity)
    }

    pub(crate) fn leave_value(&mut self, identity: usize) {
        self.seen.remove(&identity);
    }
}

/// The identity of a value instance, used for cycle detection.
#[inline]
pub(crate) fn value_identity(value: &dyn Dynamic) -> usize {
    std::ptr::from_ref(value.as_any()).cast::<()>() as usize
}
