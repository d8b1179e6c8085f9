//! Generic dynamic containers produced by deserialization.
//!
//! Reading JSON back yields these shape-preserving containers rather than
//! concrete Rust collections; the typed boundary concretizes them with
//! [`FromDynamic`](crate::value::FromDynamic).

use core::any::Any;

use crate::token::TypeToken;
use crate::value::{Dynamic, DynamicRef, DynamicValue, Mapping, Sequence};

// -----------------------------------------------------------------------------
// DynamicSequence

/// A deserialized sequence (list, set or array) of dynamic elements.
#[derive(Debug)]
pub struct DynamicSequence {
    token: TypeToken,
    items: Vec<DynamicValue>,
}

impl DynamicSequence {
    pub fn new(token: TypeToken, items: Vec<DynamicValue>) -> Self {
        Self { token, items }
    }

    pub fn items(&self) -> &[DynamicValue] {
        &self.items
    }

    pub fn into_items(self) -> Vec<DynamicValue> {
        self.items
    }
}

impl Sequence for DynamicSequence {
    #[inline]
    fn len(&self) -> usize {
        self.items.len()
    }

    fn iter_dyn(&self) -> Box<dyn Iterator<Item = &dyn Dynamic> + '_> {
        Box::new(self.items.iter().map(|item| item.as_ref() as &dyn Dynamic))
    }
}

impl Dynamic for DynamicSequence {
    #[inline]
    fn token(&self) -> TypeToken {
        self.token.clone()
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

// -----------------------------------------------------------------------------
// DynamicMapping

/// A deserialized map of dynamic key/value entries, in document order.
#[derive(Debug)]
pub struct DynamicMapping {
    token: TypeToken,
    entries: Vec<(DynamicValue, DynamicValue)>,
}

impl DynamicMapping {
    pub fn new(token: TypeToken, entries: Vec<(DynamicValue, DynamicValue)>) -> Self {
        Self { token, entries }
    }

    pub fn entries(&self) -> &[(DynamicValue, DynamicValue)] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<(DynamicValue, DynamicValue)> {
        self.entries
    }
}

impl Mapping for DynamicMapping {
    #[inline]
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn iter_dyn(&self) -> Box<dyn Iterator<Item = (&dyn Dynamic, &dyn Dynamic)> + '_> {
        Box::new(
            self.entries
                .iter()
                .map(|(k, v)| (k.as_ref() as &dyn Dynamic, v.as_ref() as &dyn Dynamic)),
        )
    }
}

impl Dynamic for DynamicMapping {
    #[inline]
    fn token(&self) -> TypeToken {
        self.token.clone()
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

// -----------------------------------------------------------------------------
// DynamicObject

/// A deserialized user-defined object: a class name plus named fields in
/// document order.
#[derive(Debug)]
pub struct DynamicObject {
    class_name: String,
    fields: Vec<(String, DynamicValue)>,
}

impl DynamicObject {
    pub fn new(class_name: impl Into<String>, fields: Vec<(String, DynamicValue)>) -> Self {
        Self {
            class_name: class_name.into(),
            fields,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn fields(&self) -> &[(String, DynamicValue)] {
        &self.fields
    }

    /// Looks up a field by name.
    pub fn get(&self, name: &str) -> Option<&dyn Dynamic> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_ref() as &dyn Dynamic)
    }
}

impl Dynamic for DynamicObject {
    #[inline]
    fn token(&self) -> TypeToken {
        TypeToken::class(&self.class_name)
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn dynamic_ref(&self) -> DynamicRef<'_> {
        DynamicRef::Object
    }
}

// -----------------------------------------------------------------------------
// DynamicVariant

/// A deserialized enumeration value, identified by its symbolic name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicVariant {
    enum_name: String,
    name: String,
}

impl DynamicVariant {
    pub fn new(enum_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            enum_name: enum_name.into(),
            name: name.into(),
        }
    }

    pub fn enum_name(&self) -> &str {
        &self.enum_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Dynamic for DynamicVariant {
    #[inline]
    fn token(&self) -> TypeToken {
        TypeToken::enumeration(&self.enum_name)
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn dynamic_ref(&self) -> DynamicRef<'_> {
        DynamicRef::Variant(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::boxed;

    #[test]
    fn object_field_lookup() {
        let obj = DynamicObject::new(
            "Person",
            vec![
                ("name".to_owned(), boxed("ada".to_owned())),
                ("age".to_owned(), boxed(36i32)),
            ],
        );
        assert_eq!(obj.token(), TypeToken::class("Person"));
        assert!(obj.get("name").is_some());
        assert!(obj.get("missing").is_none());

        let age = obj.get("age").and_then(|v| v.as_any().downcast_ref::<i32>());
        assert_eq!(age, Some(&36));
    }

    #[test]
    fn variant_classifies_by_name() {
        let color = DynamicVariant::new("Color", "RED");
        assert_eq!(color.token(), TypeToken::enumeration("Color"));
        let DynamicRef::Variant(name) = color.dynamic_ref() else {
            panic!("expected a variant");
        };
        assert_eq!(name, "RED");
    }
}
