use std::sync::Arc;

use crate::convert::{
    Concern, Context, Converter, Deserializer, Factory, FactoryKind, Markers, Produced, Serializer,
};
use crate::engine::JsonBind;
use crate::error::{Error, Result};
use crate::stream::{ObjectReader, ObjectWriter, ValueKind};
use crate::token::TypeToken;
use crate::value::{boxed, Dynamic, DynamicRef, DynamicSequence, DynamicValue};

// -----------------------------------------------------------------------------
// ListFactory

/// Produces converters for list, set and array tokens.
///
/// Elements serialize in iteration order; unordered targets get their order
/// back through repeated insertion at the typed boundary.
pub struct ListFactory;

fn element_token(token: &TypeToken) -> Option<&TypeToken> {
    match token {
        TypeToken::List(elem) | TypeToken::Set(elem) | TypeToken::Array(elem) => Some(elem),
        _ => None,
    }
}

impl Factory for ListFactory {
    fn kind(&self) -> FactoryKind {
        FactoryKind::Converter
    }

    fn accepts(&self, token: &TypeToken) -> bool {
        element_token(token).is_some()
    }

    fn create(&self, token: &TypeToken, engine: &JsonBind) -> Result<Option<Produced>> {
        let Some(elem) = element_token(token) else {
            return Ok(None);
        };
        let converter = SequenceConverter {
            token: token.clone(),
            element: engine.provide_converter(elem)?,
        };
        Ok(Some(Produced::Converter(Arc::new(converter))))
    }
}

// -----------------------------------------------------------------------------
// SequenceConverter

struct SequenceConverter {
    token: TypeToken,
    element: Arc<dyn Converter>,
}

// Array output; class metadata has no object to land on.
impl Markers for SequenceConverter {
    fn handles(&self, concern: Concern) -> bool {
        concern == Concern::ClassMetadata
    }
}

impl Serializer for SequenceConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        let DynamicRef::Sequence(sequence) = value.dynamic_ref() else {
            return Err(Error::value(format!(
                "expected a sequence value, found one of type `{}`",
                value.token()
            )));
        };
        writer.begin_array()?;
        for item in sequence.iter_dyn() {
            self.element.serialize(item, writer, ctx)?;
        }
        writer.end_array()
    }
}

impl Deserializer for SequenceConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        reader.begin_array()?;
        let mut items = Vec::new();
        while reader.has_next() {
            reader.next()?;
            items.push(self.element.deserialize(reader, ctx)?);
        }
        reader.end_array()?;
        Ok(boxed(DynamicSequence::new(self.token.clone(), items)))
    }
}

// -----------------------------------------------------------------------------
// SingleValueAsListFactory

/// When enabled, a non-array token deserializing into a list target yields
/// a one-element collection instead of an error.
///
/// Registered ahead of [`ListFactory`], so it wins the first-match walk.
pub struct SingleValueAsListFactory;

impl Factory for SingleValueAsListFactory {
    fn kind(&self) -> FactoryKind {
        FactoryKind::Converter
    }

    fn accepts(&self, token: &TypeToken) -> bool {
        element_token(token).is_some()
    }

    fn create(&self, token: &TypeToken, engine: &JsonBind) -> Result<Option<Produced>> {
        let Some(elem) = element_token(token) else {
            return Ok(None);
        };
        let element = engine.provide_converter(elem)?;
        let converter = SingleValueAsListConverter {
            sequence: SequenceConverter {
                token: token.clone(),
                element: element.clone(),
            },
            element,
        };
        Ok(Some(Produced::Converter(Arc::new(converter))))
    }
}

struct SingleValueAsListConverter {
    sequence: SequenceConverter,
    element: Arc<dyn Converter>,
}

impl Markers for SingleValueAsListConverter {
    fn handles(&self, concern: Concern) -> bool {
        concern == Concern::ClassMetadata
    }
}

impl Serializer for SingleValueAsListConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        self.sequence.serialize(value, writer, ctx)
    }
}

impl Deserializer for SingleValueAsListConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        if reader.value_kind()? == ValueKind::Array {
            return self.sequence.deserialize(reader, ctx);
        }
        let single = self.element.deserialize(reader, ctx)?;
        Ok(boxed(DynamicSequence::new(
            self.sequence.token.clone(),
            vec![single],
        )))
    }
}
