use std::sync::Arc;

use crate::convert::{
    Concern, Context, Deserializer, Factory, FactoryKind, Markers, Produced, Serializer,
};
use crate::engine::JsonBind;
use crate::error::{Error, Result};
use crate::stream::{ObjectReader, ObjectWriter};
use crate::token::TypeToken;
use crate::value::{boxed, Dynamic, DynamicRef, DynamicValue};

// -----------------------------------------------------------------------------
// PrimitiveFactory

/// Produces the converters for primitive-equivalent types and strings.
pub struct PrimitiveFactory;

impl Factory for PrimitiveFactory {
    fn kind(&self) -> FactoryKind {
        FactoryKind::Converter
    }

    fn accepts(&self, token: &TypeToken) -> bool {
        token.is_primitive() || *token == TypeToken::String
    }

    fn create(&self, token: &TypeToken, _engine: &JsonBind) -> Result<Option<Produced>> {
        let converter: Arc<dyn crate::convert::Converter> = match token {
            TypeToken::Bool => Arc::new(BoolConverter),
            TypeToken::Int => Arc::new(IntConverter),
            TypeToken::Long => Arc::new(LongConverter),
            TypeToken::Short => Arc::new(ShortConverter),
            TypeToken::Byte => Arc::new(ByteConverter),
            TypeToken::Double => Arc::new(DoubleConverter),
            TypeToken::Float => Arc::new(FloatConverter),
            TypeToken::Char => Arc::new(CharConverter),
            TypeToken::String => Arc::new(StringConverter),
            _ => return Ok(None),
        };
        Ok(Some(Produced::Converter(converter)))
    }
}

fn wrong_shape(expected: &str, value: &dyn Dynamic) -> Error {
    Error::value(format!(
        "expected a {expected} value, found one of type `{}`",
        value.token()
    ))
}

// Leaf output is never an object; class metadata must not wrap these.
macro_rules! leaf {
    ($name:ident) => {
        struct $name;

        impl Markers for $name {
            fn handles(&self, concern: Concern) -> bool {
                concern == Concern::ClassMetadata
            }
        }
    };
}

// -----------------------------------------------------------------------------
// Booleans and integers

leaf!(BoolConverter);

impl Serializer for BoolConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        match value.dynamic_ref() {
            DynamicRef::Bool(v) => writer.write_bool(v),
            _ => Err(wrong_shape("bool", value)),
        }
    }
}

impl Deserializer for BoolConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        reader.value_as_bool().map(boxed)
    }
}

leaf!(IntConverter);

impl Serializer for IntConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        match value.dynamic_ref() {
            DynamicRef::Int(v) => writer.write_i64(i64::from(v)),
            _ => Err(wrong_shape("int", value)),
        }
    }
}

impl Deserializer for IntConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        reader.value_as_i32().map(boxed)
    }
}

leaf!(LongConverter);

impl Serializer for LongConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        match value.dynamic_ref() {
            DynamicRef::Long(v) => writer.write_i64(v),
            _ => Err(wrong_shape("long", value)),
        }
    }
}

impl Deserializer for LongConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        reader.value_as_i64().map(boxed)
    }
}

leaf!(ShortConverter);

impl Serializer for ShortConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        match value.dynamic_ref() {
            DynamicRef::Short(v) => writer.write_i64(i64::from(v)),
            _ => Err(wrong_shape("short", value)),
        }
    }
}

impl Deserializer for ShortConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        let wide = reader.value_as_i64()?;
        i16::try_from(wide)
            .map(boxed)
            .map_err(|_| Error::value(format!("number {wide} does not fit in a short")))
    }
}

leaf!(ByteConverter);

impl Serializer for ByteConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        match value.dynamic_ref() {
            DynamicRef::Byte(v) => writer.write_i64(i64::from(v)),
            _ => Err(wrong_shape("byte", value)),
        }
    }
}

impl Deserializer for ByteConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        let wide = reader.value_as_i64()?;
        i8::try_from(wide)
            .map(boxed)
            .map_err(|_| Error::value(format!("number {wide} does not fit in a byte")))
    }
}

// -----------------------------------------------------------------------------
// Floating point

leaf!(DoubleConverter);

impl Serializer for DoubleConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        match value.dynamic_ref() {
            DynamicRef::Double(v) => writer.write_f64(v),
            _ => Err(wrong_shape("double", value)),
        }
    }
}

impl Deserializer for DoubleConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        reader.value_as_f64().map(boxed)
    }
}

leaf!(FloatConverter);

impl Serializer for FloatConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        match value.dynamic_ref() {
            DynamicRef::Float(v) => writer.write_f64(f64::from(v)),
            _ => Err(wrong_shape("float", value)),
        }
    }
}

impl Deserializer for FloatConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        reader.value_as_f64().map(|v| boxed(v as f32))
    }
}

// -----------------------------------------------------------------------------
// Char and String

leaf!(CharConverter);

impl Serializer for CharConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        match value.dynamic_ref() {
            DynamicRef::Char(v) => writer.write_string(&format!("\\u{:04x}", v as u32)),
            _ => Err(wrong_shape("char", value)),
        }
    }
}

impl Deserializer for CharConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        let text = reader.value_as_string()?;
        if let Some(hex) = text.strip_prefix("\\u") {
            let code = u32::from_str_radix(hex, 16)
                .map_err(|_| Error::value(format!("`{text}` is not a valid char escape")))?;
            return char::from_u32(code)
                .map(boxed)
                .ok_or_else(|| Error::value(format!("`{text}` is not a valid char escape")));
        }
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(boxed(c)),
            _ => Err(Error::value(format!("`{text}` is not a single char"))),
        }
    }
}

leaf!(StringConverter);

impl Serializer for StringConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        match value.dynamic_ref() {
            DynamicRef::Str(v) => writer.write_string(v),
            _ => Err(wrong_shape("string", value)),
        }
    }
}

impl Deserializer for StringConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        reader.value_as_string().map(boxed)
    }
}

// -----------------------------------------------------------------------------
// Untyped numeric reading

/// Reads an ambiguous numeric token into the narrowest exact type: an `int`
/// if it fits, a `long` otherwise, a `double` for tokens carrying a
/// fractional part.
pub(crate) fn read_narrowest_number(reader: &dyn ObjectReader) -> Result<DynamicValue> {
    use crate::stream::ValueKind;

    match reader.value_kind()? {
        ValueKind::Integer => {
            let wide = reader.value_as_i64()?;
            match i32::try_from(wide) {
                Ok(narrow) => Ok(boxed(narrow)),
                Err(_) => Ok(boxed(wide)),
            }
        }
        ValueKind::Double => reader.value_as_f64().map(boxed),
        _ => Err(Error::value("expected a numeric token")),
    }
}
