use core::fmt;

// -----------------------------------------------------------------------------
// TypeToken

/// A structural descriptor of a (possibly parameterized) type.
///
/// Tokens are the cache and dispatch key of the whole engine: two tokens are
/// equal iff they denote the same concrete instantiation, so `list of int`
/// and `list of long` resolve to distinct converter pipelines while every
/// request for `list of int` shares one.
///
/// User-defined classes and enums are identified by name
/// ([`Class`](TypeToken::Class) / [`Enum`](TypeToken::Enum)); everything the
/// engine knows about their structure comes from registered descriptors, not
/// from the token itself.
///
/// # Example
///
/// ```
/// use jsonbind::TypeToken;
///
/// let a = TypeToken::list(TypeToken::Int);
/// let b = TypeToken::list(TypeToken::Int);
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "list<int>");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeToken {
    Bool,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    Short,
    Byte,
    Double,
    Float,
    Char,
    String,
    Uuid,
    /// A point in time, serialized as epoch milliseconds or a formatted
    /// string depending on engine configuration.
    Date,
    /// Arbitrary-precision integer, canonical string form.
    BigInteger,
    /// Arbitrary-precision decimal, canonical string form.
    BigDecimal,
    /// An opaque byte buffer (`byte[]`-like), distinct from `list<byte>`.
    Bytes,
    List(Box<TypeToken>),
    Set(Box<TypeToken>),
    /// Fixed-size sequence.
    Array(Box<TypeToken>),
    Map(Box<TypeToken>, Box<TypeToken>),
    Optional(Box<TypeToken>),
    /// A named, registered enumeration.
    Enum(String),
    /// A named user-defined class.
    Class(String),
    /// Raw JSON passthrough.
    Json,
    /// The untyped catch-all: dispatched by runtime type on serialize, by
    /// JSON token kind on deserialize.
    Any,
    /// The type of the null value.
    Null,
}

impl TypeToken {
    #[inline]
    pub fn list(elem: TypeToken) -> Self {
        Self::List(Box::new(elem))
    }

    #[inline]
    pub fn set(elem: TypeToken) -> Self {
        Self::Set(Box::new(elem))
    }

    #[inline]
    pub fn array(elem: TypeToken) -> Self {
        Self::Array(Box::new(elem))
    }

    #[inline]
    pub fn map(key: TypeToken, value: TypeToken) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    #[inline]
    pub fn optional(inner: TypeToken) -> Self {
        Self::Optional(Box::new(inner))
    }

    #[inline]
    pub fn class(name: impl Into<String>) -> Self {
        Self::Class(name.into())
    }

    #[inline]
    pub fn enumeration(name: impl Into<String>) -> Self {
        Self::Enum(name.into())
    }

    /// Whether the token denotes a primitive-equivalent type.
    ///
    /// These are the types subject to the "fail on null primitive" policy,
    /// and the ones that receive a zero/false default when a null token is
    /// read in the default null mode.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Int
                | Self::Long
                | Self::Short
                | Self::Byte
                | Self::Double
                | Self::Float
                | Self::Char
        )
    }

    /// Whether the token denotes a structurally handled container kind.
    ///
    /// Container values are serialized element-wise and are exempt from
    /// runtime-type redirection.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Self::List(_) | Self::Set(_) | Self::Array(_) | Self::Map(_, _) | Self::Bytes
        )
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Long => f.write_str("long"),
            Self::Short => f.write_str("short"),
            Self::Byte => f.write_str("byte"),
            Self::Double => f.write_str("double"),
            Self::Float => f.write_str("float"),
            Self::Char => f.write_str("char"),
            Self::String => f.write_str("string"),
            Self::Uuid => f.write_str("uuid"),
            Self::Date => f.write_str("date"),
            Self::BigInteger => f.write_str("biginteger"),
            Self::BigDecimal => f.write_str("bigdecimal"),
            Self::Bytes => f.write_str("bytes"),
            Self::List(e) => write!(f, "list<{e}>"),
            Self::Set(e) => write!(f, "set<{e}>"),
            Self::Array(e) => write!(f, "array<{e}>"),
            Self::Map(k, v) => write!(f, "map<{k},{v}>"),
            Self::Optional(e) => write!(f, "optional<{e}>"),
            Self::Enum(name) => write!(f, "enum {name}"),
            Self::Class(name) => f.write_str(name),
            Self::Json => f.write_str("json"),
            Self::Any => f.write_str("any"),
            Self::Null => f.write_str("null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality() {
        assert_eq!(
            TypeToken::map(TypeToken::String, TypeToken::list(TypeToken::Int)),
            TypeToken::map(TypeToken::String, TypeToken::list(TypeToken::Int)),
        );
        assert_ne!(
            TypeToken::list(TypeToken::Int),
            TypeToken::list(TypeToken::Long)
        );
        assert_ne!(TypeToken::list(TypeToken::Byte), TypeToken::Bytes);
    }

    #[test]
    fn display_forms() {
        assert_eq!(
            TypeToken::map(TypeToken::Long, TypeToken::Any).to_string(),
            "map<long,any>"
        );
        assert_eq!(TypeToken::class("Person").to_string(), "Person");
        assert_eq!(TypeToken::enumeration("Color").to_string(), "enum Color");
    }

    #[test]
    fn primitive_classification() {
        assert!(TypeToken::Int.is_primitive());
        assert!(TypeToken::Char.is_primitive());
        assert!(!TypeToken::String.is_primitive());
        assert!(!TypeToken::BigInteger.is_primitive());
        assert!(TypeToken::Bytes.is_container());
        assert!(!TypeToken::Json.is_container());
    }
}
