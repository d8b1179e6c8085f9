//! The dynamic value model the engine operates on.
//!
//! Converters receive and produce values through the [`Dynamic`] trait
//! object: a value that knows its runtime [`TypeToken`] and can classify
//! itself once into a closed [`DynamicRef`] shape. This replaces per-call
//! `instanceof`-style probing — the classification happens in one place and
//! the rest of the engine matches on the result.
//!
//! Serialization starts from concrete Rust values (`Vec<i32>`,
//! `HashMap<String, f64>`, user types implementing [`Dynamic`] by hand).
//! Deserialization produces *generic* dynamic containers
//! ([`DynamicSequence`], [`DynamicMapping`], [`DynamicObject`], …) which are
//! concretized at the typed boundary with [`FromDynamic`].

// -----------------------------------------------------------------------------
// Modules

mod big_num;
mod containers;
mod from_dynamic;
mod impls;

pub use big_num::{BigDecimal, BigInteger};
pub use containers::{DynamicMapping, DynamicObject, DynamicSequence, DynamicVariant};
pub use from_dynamic::FromDynamic;

use core::any::Any;
use core::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::token::TypeToken;

// -----------------------------------------------------------------------------
// Dynamic

/// A value the conversion engine can inspect at runtime.
///
/// Every dynamic value carries its runtime [`TypeToken`] — for a field
/// declared as a supertype (or [`TypeToken::Any`]) this is how the engine
/// discovers that the *actual* value needs a different converter than the
/// statically resolved one.
pub trait Dynamic: Any + fmt::Debug + Send + Sync {
    /// The runtime type descriptor of this value.
    fn token(&self) -> TypeToken;

    /// Upcast for converter-side downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Classify this value into one of the closed [`DynamicRef`] shapes.
    fn dynamic_ref(&self) -> DynamicRef<'_>;

    /// Whether this value is the null value.
    #[inline]
    fn is_null(&self) -> bool {
        false
    }
}

/// An owned dynamic value.
pub type DynamicValue = Box<dyn Dynamic>;

/// Shorthand for boxing a concrete value into a [`DynamicValue`].
#[inline]
pub fn boxed<T: Dynamic>(value: T) -> DynamicValue {
    Box::new(value)
}

// -----------------------------------------------------------------------------
// DynamicRef

/// The closed classification of a dynamic value, evaluated once per value.
pub enum DynamicRef<'a> {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Short(i16),
    Byte(i8),
    Double(f64),
    Float(f32),
    Char(char),
    Str(&'a str),
    Uuid(&'a Uuid),
    Date(&'a DateTime<Utc>),
    BigInteger(&'a BigInteger),
    BigDecimal(&'a BigDecimal),
    Bytes(&'a [u8]),
    /// An ordered sequence of dynamic elements (lists, sets, arrays).
    Sequence(&'a dyn Sequence),
    /// A keyed collection of dynamic entries.
    Mapping(&'a dyn Mapping),
    Optional(Option<&'a dyn Dynamic>),
    /// An enumeration value, identified by its symbolic name.
    Variant(&'a str),
    /// An opaque user-defined object; its structure is described by a
    /// registered bean descriptor, not by the value itself.
    Object,
    /// A raw JSON document, passed through verbatim.
    Json(&'a serde_json::Value),
}

impl DynamicRef<'_> {
    /// Whether the value is of a primitive-equivalent or string shape.
    ///
    /// Such values cannot participate in reference cycles and bypass the
    /// cycle check of runtime-type redirection.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Bool(_)
                | Self::Int(_)
                | Self::Long(_)
                | Self::Short(_)
                | Self::Byte(_)
                | Self::Double(_)
                | Self::Float(_)
                | Self::Char(_)
                | Self::Str(_)
        )
    }

    /// Whether the value is a structurally handled container.
    ///
    /// Containers are serialized element-wise and are never redirected to a
    /// runtime-type converter — which also means a cycle reachable *only*
    /// through containers is not detected by the engine (a documented gap).
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Sequence(_) | Self::Mapping(_) | Self::Bytes(_))
    }
}

// -----------------------------------------------------------------------------
// Sequence / Mapping

/// Element-wise access to a sequence-shaped dynamic value.
pub trait Sequence: Send + Sync {
    fn len(&self) -> usize;

    fn iter_dyn(&self) -> Box<dyn Iterator<Item = &dyn Dynamic> + '_>;
}

/// Entry-wise access to a map-shaped dynamic value.
pub trait Mapping: Send + Sync {
    fn len(&self) -> usize;

    fn iter_dyn(&self) -> Box<dyn Iterator<Item = (&dyn Dynamic, &dyn Dynamic)> + '_>;
}

// -----------------------------------------------------------------------------
// Tokenized

/// Rust types with a statically known [`TypeToken`].
///
/// This is the compile-time side of the descriptor: `Vec<i32>` maps to
/// `list<int>`, `HashMap<String, f64>` to `map<string,double>`, and so on.
/// User types implement it alongside [`Dynamic`] to name their class token.
pub trait Tokenized {
    fn static_token() -> TypeToken;
}

// -----------------------------------------------------------------------------
// Null / Bytes

/// The null value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Null;

impl Dynamic for Null {
    #[inline]
    fn token(&self) -> TypeToken {
        TypeToken::Null
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn dynamic_ref(&self) -> DynamicRef<'_> {
        DynamicRef::Null
    }

    #[inline]
    fn is_null(&self) -> bool {
        true
    }
}

impl Tokenized for Null {
    #[inline]
    fn static_token() -> TypeToken {
        TypeToken::Null
    }
}

/// An opaque byte buffer.
///
/// Distinct from `Vec<i8>` (`list<byte>`): bytes serialize as a single
/// base64 token by default, or as an array of small integers when the engine
/// is configured with `use_bytes_as_int_array(true)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bytes(pub Vec<u8>);

impl Dynamic for Bytes {
    #[inline]
    fn token(&self) -> TypeToken {
        TypeToken::Bytes
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn dynamic_ref(&self) -> DynamicRef<'_> {
        DynamicRef::Bytes(&self.0)
    }
}

impl Tokenized for Bytes {
    #[inline]
    fn static_token() -> TypeToken {
        TypeToken::Bytes
    }
}

impl From<Vec<u8>> for Bytes {
    #[inline]
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}
