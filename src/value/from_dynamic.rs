//! The typed boundary: concretizing dynamic values back into Rust types.

use core::hash::Hash;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::value::{BigDecimal, BigInteger, Bytes, Dynamic, DynamicRef};

// -----------------------------------------------------------------------------
// FromDynamic

/// Conversion from a dynamic value into a concrete Rust type.
///
/// Deserialization produces generic dynamic containers; this trait walks
/// them back into typed values at the API boundary. Numeric widening is
/// permitted (`i64` accepts an `int`-shaped value, `f64` accepts any numeric
/// shape) but narrowing is not — a `long` does not concretize into an `i32`.
///
/// # Example
///
/// ```
/// use jsonbind::value::{boxed, FromDynamic};
///
/// let value = boxed(vec![1i32, 2, 3]);
/// let back: Vec<i64> = FromDynamic::from_dynamic(value.as_ref()).unwrap();
/// assert_eq!(back, vec![1, 2, 3]);
/// ```
pub trait FromDynamic: Sized {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self>;
}

fn mismatch(expected: &str, value: &dyn Dynamic) -> Error {
    Error::value(format!(
        "expected a {expected} value, found one of type `{}`",
        value.token()
    ))
}

// -----------------------------------------------------------------------------
// Scalars

macro_rules! impl_exact_scalar {
    ($(($ty:ty, $variant:ident, $expected:literal)),* $(,)?) => {
        $(
            impl FromDynamic for $ty {
                fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
                    match value.dynamic_ref() {
                        DynamicRef::$variant(v) => Ok(v),
                        _ => Err(mismatch($expected, value)),
                    }
                }
            }
        )*
    };
}

impl_exact_scalar! {
    (bool, Bool, "bool"),
    (i32, Int, "int"),
    (i16, Short, "short"),
    (i8, Byte, "byte"),
    (f32, Float, "float"),
    (char, Char, "char"),
}

impl FromDynamic for i64 {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::Long(v) => Ok(v),
            DynamicRef::Int(v) => Ok(i64::from(v)),
            DynamicRef::Short(v) => Ok(i64::from(v)),
            DynamicRef::Byte(v) => Ok(i64::from(v)),
            _ => Err(mismatch("long", value)),
        }
    }
}

impl FromDynamic for f64 {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::Double(v) => Ok(v),
            DynamicRef::Float(v) => Ok(f64::from(v)),
            DynamicRef::Long(v) => Ok(v as f64),
            DynamicRef::Int(v) => Ok(f64::from(v)),
            DynamicRef::Short(v) => Ok(f64::from(v)),
            DynamicRef::Byte(v) => Ok(f64::from(v)),
            _ => Err(mismatch("double", value)),
        }
    }
}

impl FromDynamic for String {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::Str(v) => Ok(v.to_owned()),
            DynamicRef::Variant(name) => Ok(name.to_owned()),
            _ => Err(mismatch("string", value)),
        }
    }
}

impl FromDynamic for Uuid {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::Uuid(v) => Ok(*v),
            _ => Err(mismatch("uuid", value)),
        }
    }
}

impl FromDynamic for DateTime<Utc> {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::Date(v) => Ok(*v),
            _ => Err(mismatch("date", value)),
        }
    }
}

impl FromDynamic for BigInteger {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::BigInteger(v) => Ok(v.clone()),
            _ => Err(mismatch("big integer", value)),
        }
    }
}

impl FromDynamic for BigDecimal {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::BigDecimal(v) => Ok(v.clone()),
            _ => Err(mismatch("big decimal", value)),
        }
    }
}

impl FromDynamic for Bytes {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::Bytes(v) => Ok(Bytes(v.to_vec())),
            _ => Err(mismatch("bytes", value)),
        }
    }
}

impl FromDynamic for serde_json::Value {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::Json(v) => Ok(v.clone()),
            _ => Err(mismatch("json", value)),
        }
    }
}

// -----------------------------------------------------------------------------
// Containers

impl<T: FromDynamic> FromDynamic for Vec<T> {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::Sequence(seq) => seq.iter_dyn().map(T::from_dynamic).collect(),
            _ => Err(mismatch("sequence", value)),
        }
    }
}

impl<T: FromDynamic> FromDynamic for VecDeque<T> {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::Sequence(seq) => seq.iter_dyn().map(T::from_dynamic).collect(),
            _ => Err(mismatch("sequence", value)),
        }
    }
}

impl<T: FromDynamic + Eq + Hash> FromDynamic for HashSet<T> {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::Sequence(seq) => seq.iter_dyn().map(T::from_dynamic).collect(),
            _ => Err(mismatch("sequence", value)),
        }
    }
}

impl<T: FromDynamic + Ord> FromDynamic for BTreeSet<T> {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::Sequence(seq) => seq.iter_dyn().map(T::from_dynamic).collect(),
            _ => Err(mismatch("sequence", value)),
        }
    }
}

impl<T: FromDynamic, const N: usize> FromDynamic for [T; N] {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        let items: Vec<T> = Vec::from_dynamic(value)?;
        let len = items.len();
        items.try_into().map_err(|_| {
            Error::value(format!("expected a sequence of length {N}, found {len}"))
        })
    }
}

impl<K: FromDynamic + Eq + Hash, V: FromDynamic> FromDynamic for HashMap<K, V> {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::Mapping(map) => map
                .iter_dyn()
                .map(|(k, v)| Ok((K::from_dynamic(k)?, V::from_dynamic(v)?)))
                .collect(),
            _ => Err(mismatch("mapping", value)),
        }
    }
}

impl<K: FromDynamic + Ord, V: FromDynamic> FromDynamic for BTreeMap<K, V> {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::Mapping(map) => map
                .iter_dyn()
                .map(|(k, v)| Ok((K::from_dynamic(k)?, V::from_dynamic(v)?)))
                .collect(),
            _ => Err(mismatch("mapping", value)),
        }
    }
}

impl<K: FromDynamic + Eq + Hash, V: FromDynamic> FromDynamic for IndexMap<K, V> {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::Mapping(map) => map
                .iter_dyn()
                .map(|(k, v)| Ok((K::from_dynamic(k)?, V::from_dynamic(v)?)))
                .collect(),
            _ => Err(mismatch("mapping", value)),
        }
    }
}

impl<T: FromDynamic> FromDynamic for Option<T> {
    fn from_dynamic(value: &dyn Dynamic) -> Result<Self> {
        match value.dynamic_ref() {
            DynamicRef::Null => Ok(None),
            DynamicRef::Optional(None) => Ok(None),
            DynamicRef::Optional(Some(inner)) => T::from_dynamic(inner).map(Some),
            _ => T::from_dynamic(value).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TypeToken;
    use crate::value::{boxed, DynamicMapping, DynamicSequence, Null};

    #[test]
    fn widening_is_permitted_narrowing_is_not() {
        let int = boxed(7i32);
        assert_eq!(i64::from_dynamic(int.as_ref()).unwrap(), 7);
        assert_eq!(f64::from_dynamic(int.as_ref()).unwrap(), 7.0);

        let long = boxed(7i64);
        assert!(i32::from_dynamic(long.as_ref()).is_err());
    }

    #[test]
    fn dynamic_sequence_concretizes() {
        let seq = DynamicSequence::new(
            TypeToken::list(TypeToken::Int),
            vec![boxed(1i32), boxed(2i32), boxed(3i32)],
        );
        let items: Vec<i32> = FromDynamic::from_dynamic(&seq).unwrap();
        assert_eq!(items, vec![1, 2, 3]);

        let fixed: [i32; 3] = FromDynamic::from_dynamic(&seq).unwrap();
        assert_eq!(fixed, [1, 2, 3]);
        assert!(<[i32; 2]>::from_dynamic(&seq).is_err());
    }

    #[test]
    fn dynamic_mapping_concretizes() {
        let map = DynamicMapping::new(
            TypeToken::map(TypeToken::String, TypeToken::Long),
            vec![(boxed("a".to_owned()), boxed(1i64))],
        );
        let typed: HashMap<String, i64> = FromDynamic::from_dynamic(&map).unwrap();
        assert_eq!(typed.get("a"), Some(&1));
    }

    #[test]
    fn null_concretizes_to_none_only() {
        assert_eq!(Option::<i32>::from_dynamic(&Null).unwrap(), None);
        assert!(i32::from_dynamic(&Null).is_err());
        assert_eq!(Option::<i32>::from_dynamic(&5i32).unwrap(), Some(5));
    }
}
