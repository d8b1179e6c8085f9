//! [`Dynamic`] and [`Tokenized`] implementations for the standard types the
//! engine supports out of the box.

use core::any::Any;
use core::hash::Hash;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

use crate::token::TypeToken;
use crate::value::{BigDecimal, BigInteger, Dynamic, DynamicRef, Mapping, Sequence, Tokenized};

// -----------------------------------------------------------------------------
// Scalars

macro_rules! impl_scalar {
    ($(($ty:ty, $token:ident, $variant:ident, $by:tt)),* $(,)?) => {
        $(
            impl Dynamic for $ty {
                #[inline]
                fn token(&self) -> TypeToken {
                    TypeToken::$token
                }

                #[inline]
                fn as_any(&self) -> &dyn Any {
                    self
                }

                #[inline]
                fn dynamic_ref(&self) -> DynamicRef<'_> {
                    impl_scalar!(@ref self, $variant, $by)
                }
            }

            impl Tokenized for $ty {
                #[inline]
                fn static_token() -> TypeToken {
                    TypeToken::$token
                }
            }
        )*
    };
    (@ref $self:ident, $variant:ident, value) => { DynamicRef::$variant(*$self) };
    (@ref $self:ident, $variant:ident, reference) => { DynamicRef::$variant($self) };
}

impl_scalar! {
    (bool, Bool, Bool, value),
    (i32, Int, Int, value),
    (i64, Long, Long, value),
    (i16, Short, Short, value),
    (i8, Byte, Byte, value),
    (f64, Double, Double, value),
    (f32, Float, Float, value),
    (char, Char, Char, value),
    (Uuid, Uuid, Uuid, reference),
    (BigInteger, BigInteger, BigInteger, reference),
    (BigDecimal, BigDecimal, BigDecimal, reference),
}

impl Dynamic for String {
    #[inline]
    fn token(&self) -> TypeToken {
        TypeToken::String
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn dynamic_ref(&self) -> DynamicRef<'_> {
        DynamicRef::Str(self)
    }
}

impl Tokenized for String {
    #[inline]
    fn static_token() -> TypeToken {
        TypeToken::String
    }
}

impl Dynamic for DateTime<Utc> {
    #[inline]
    fn token(&self) -> TypeToken {
        TypeToken::Date
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn dynamic_ref(&self) -> DynamicRef<'_> {
        DynamicRef::Date(self)
    }
}

impl Tokenized for DateTime<Utc> {
    #[inline]
    fn static_token() -> TypeToken {
        TypeToken::Date
    }
}

impl Dynamic for serde_json::Value {
    #[inline]
    fn token(&self) -> TypeToken {
        TypeToken::Json
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn dynamic_ref(&self) -> DynamicRef<'_> {
        DynamicRef::Json(self)
    }
}

impl Tokenized for serde_json::Value {
    #[inline]
    fn static_token() -> TypeToken {
        TypeToken::Json
    }
}

// -----------------------------------------------------------------------------
// Sequences

macro_rules! impl_sequence {
    ($(($ty:ty, $token:ident $(, $extra:path)*)),* $(,)?) => {
        $(
            impl<T: Dynamic + Tokenized $(+ $extra)*> Sequence for $ty {
                #[inline]
                fn len(&self) -> usize {
                    <$ty>::len(self)
                }

                fn iter_dyn(&self) -> Box<dyn Iterator<Item = &dyn Dynamic> + '_> {
                    Box::new(self.iter().map(|item| item as &dyn Dynamic))
                }
            }

            impl<T: Dynamic + Tokenized $(+ $extra)*> Dynamic for $ty {
                #[inline]
                fn token(&self) -> TypeToken {
                    TypeToken::$token(Box::new(T::static_token()))
                }

                #[inline]
                fn as_any(&self) -> &dyn Any {
                    self
                }

                #[inline]
                fn dynamic_ref(&self) -> DynamicRef<'_> {
                    DynamicRef::Sequence(self)
                }
            }

            impl<T: Tokenized> Tokenized for $ty {
                #[inline]
                fn static_token() -> TypeToken {
                    TypeToken::$token(Box::new(T::static_token()))
                }
            }
        )*
    };
}

impl_sequence! {
    (Vec<T>, List),
    (VecDeque<T>, List),
    (HashSet<T>, Set, Eq, Hash),
    (BTreeSet<T>, Set, Ord),
}

impl<T: Dynamic + Tokenized, const N: usize> Sequence for [T; N] {
    #[inline]
    fn len(&self) -> usize {
        N
    }

    fn iter_dyn(&self) -> Box<dyn Iterator<Item = &dyn Dynamic> + '_> {
        Box::new(self.iter().map(|item| item as &dyn Dynamic))
    }
}

impl<T: Dynamic + Tokenized, const N: usize> Dynamic for [T; N] {
    #[inline]
    fn token(&self) -> TypeToken {
        TypeToken::array(T::static_token())
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn dynamic_ref(&self) -> DynamicRef<'_> {
        DynamicRef::Sequence(self)
    }
}

impl<T: Tokenized, const N: usize> Tokenized for [T; N] {
    #[inline]
    fn static_token() -> TypeToken {
        TypeToken::array(T::static_token())
    }
}

// -----------------------------------------------------------------------------
// Mappings

macro_rules! impl_mapping {
    ($(($ty:ty, $($key_bound:path),*)),* $(,)?) => {
        $(
            impl<K, V> Mapping for $ty
            where
                K: Dynamic + Tokenized $(+ $key_bound)*,
                V: Dynamic + Tokenized,
            {
                #[inline]
                fn len(&self) -> usize {
                    <$ty>::len(self)
                }

                fn iter_dyn(&self) -> Box<dyn Iterator<Item = (&dyn Dynamic, &dyn Dynamic)> + '_> {
                    Box::new(self.iter().map(|(k, v)| (k as &dyn Dynamic, v as &dyn Dynamic)))
                }
            }

            impl<K, V> Dynamic for $ty
            where
                K: Dynamic + Tokenized $(+ $key_bound)*,
                V: Dynamic + Tokenized,
            {
                #[inline]
                fn token(&self) -> TypeToken {
                    TypeToken::map(K::static_token(), V::static_token())
                }

                #[inline]
                fn as_any(&self) -> &dyn Any {
                    self
                }

                #[inline]
                fn dynamic_ref(&self) -> DynamicRef<'_> {
                    DynamicRef::Mapping(self)
                }
            }

            impl<K: Tokenized, V: Tokenized> Tokenized for $ty {
                #[inline]
                fn static_token() -> TypeToken {
                    TypeToken::map(K::static_token(), V::static_token())
                }
            }
        )*
    };
}

impl_mapping! {
    (HashMap<K, V>, Eq, Hash),
    (BTreeMap<K, V>, Ord),
    (IndexMap<K, V>, Eq, Hash),
}

// -----------------------------------------------------------------------------
// Shared values

// Delegates to the pointee, so a shared instance keeps one identity no
// matter how many handles reach it — which is what value-level cycle
// detection keys on.
impl<T: Dynamic + Tokenized> Dynamic for std::sync::Arc<T> {
    #[inline]
    fn token(&self) -> TypeToken {
        (**self).token()
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        (**self).as_any()
    }

    #[inline]
    fn dynamic_ref(&self) -> DynamicRef<'_> {
        (**self).dynamic_ref()
    }

    #[inline]
    fn is_null(&self) -> bool {
        (**self).is_null()
    }
}

impl<T: Tokenized> Tokenized for std::sync::Arc<T> {
    #[inline]
    fn static_token() -> TypeToken {
        T::static_token()
    }
}

// -----------------------------------------------------------------------------
// Optionals

impl<T: Dynamic + Tokenized> Dynamic for Option<T> {
    #[inline]
    fn token(&self) -> TypeToken {
        TypeToken::optional(T::static_token())
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn dynamic_ref(&self) -> DynamicRef<'_> {
        DynamicRef::Optional(self.as_ref().map(|value| value as &dyn Dynamic))
    }
}

impl<T: Tokenized> Tokenized for Option<T> {
    #[inline]
    fn static_token() -> TypeToken {
        TypeToken::optional(T::static_token())
    }
}
