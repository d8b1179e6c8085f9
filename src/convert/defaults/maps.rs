use std::sync::Arc;

use crate::convert::{
    Concern, Context, Converter, Deserializer, Factory, FactoryKind, Markers, Produced, Serializer,
};
use crate::engine::JsonBind;
use crate::error::{Error, Result};
use crate::stream::{ObjectReader, ObjectWriter};
use crate::token::TypeToken;
use crate::value::{boxed, Dynamic, DynamicMapping, DynamicRef, DynamicValue};

// -----------------------------------------------------------------------------
// KeyAdapter

/// A reversible string codec for primitive-like map keys.
///
/// String keys pass through verbatim; `any`-typed keys are written as the
/// text of whatever scalar they carry and read back as strings.
enum KeyAdapter {
    Str,
    Int,
    Long,
    Double,
    Float,
    Short,
    Runtime,
}

impl KeyAdapter {
    fn for_token(token: &TypeToken) -> Option<Self> {
        match token {
            TypeToken::String => Some(Self::Str),
            TypeToken::Int => Some(Self::Int),
            TypeToken::Long => Some(Self::Long),
            TypeToken::Double => Some(Self::Double),
            TypeToken::Float => Some(Self::Float),
            TypeToken::Short => Some(Self::Short),
            TypeToken::Any => Some(Self::Runtime),
            _ => None,
        }
    }

    fn encode(&self, key: &dyn Dynamic) -> Result<String> {
        let text = match (self, key.dynamic_ref()) {
            (Self::Str | Self::Runtime, DynamicRef::Str(v)) => v.to_owned(),
            (Self::Int | Self::Runtime, DynamicRef::Int(v)) => v.to_string(),
            (Self::Long | Self::Runtime, DynamicRef::Long(v)) => v.to_string(),
            (Self::Double | Self::Runtime, DynamicRef::Double(v)) => v.to_string(),
            (Self::Float | Self::Runtime, DynamicRef::Float(v)) => v.to_string(),
            (Self::Short | Self::Runtime, DynamicRef::Short(v)) => v.to_string(),
            (Self::Runtime, DynamicRef::Bool(v)) => v.to_string(),
            (Self::Runtime, DynamicRef::Byte(v)) => v.to_string(),
            (Self::Runtime, DynamicRef::Char(v)) => v.to_string(),
            _ => {
                return Err(Error::value(format!(
                    "map key of type `{}` does not fit its declared key shape",
                    key.token()
                )));
            }
        };
        Ok(text)
    }

    fn decode(&self, name: &str) -> Result<DynamicValue> {
        fn parse<T>(name: &str, what: &str) -> Result<T>
        where
            T: core::str::FromStr,
        {
            name.parse()
                .map_err(|_| Error::value(format!("cannot read map key `{name}` as a {what}")))
        }

        match self {
            Self::Str | Self::Runtime => Ok(boxed(name.to_owned())),
            Self::Int => parse::<i32>(name, "int").map(boxed),
            Self::Long => parse::<i64>(name, "long").map(boxed),
            Self::Double => parse::<f64>(name, "double").map(boxed),
            Self::Float => parse::<f32>(name, "float").map(boxed),
            Self::Short => parse::<i16>(name, "short").map(boxed),
        }
    }
}

// -----------------------------------------------------------------------------
// MapFactory

/// Produces converters for map tokens.
///
/// Keys with a reversible string form go through a [`KeyAdapter`] and the
/// map serializes as a JSON object; any other key type falls back to the
/// explicit `[{"key": …, "value": …}]` pair-array form.
pub struct MapFactory;

impl Factory for MapFactory {
    fn kind(&self) -> FactoryKind {
        FactoryKind::Converter
    }

    fn accepts(&self, token: &TypeToken) -> bool {
        matches!(token, TypeToken::Map(_, _))
    }

    fn create(&self, token: &TypeToken, engine: &JsonBind) -> Result<Option<Produced>> {
        let TypeToken::Map(key, value) = token else {
            return Ok(None);
        };
        let converter: Arc<dyn Converter> = match KeyAdapter::for_token(key) {
            Some(adapter) => Arc::new(MapConverter {
                token: token.clone(),
                adapter,
                value: engine.provide_converter(value)?,
            }),
            None => Arc::new(ComplexMapConverter {
                token: token.clone(),
                key: engine.provide_converter(key)?,
                value: engine.provide_converter(value)?,
            }),
        };
        Ok(Some(Produced::Converter(converter)))
    }
}

fn mapping_of(value: &dyn Dynamic) -> Result<&dyn crate::value::Mapping> {
    match value.dynamic_ref() {
        DynamicRef::Mapping(mapping) => Ok(mapping),
        _ => Err(Error::value(format!(
            "expected a map value, found one of type `{}`",
            value.token()
        ))),
    }
}

// -----------------------------------------------------------------------------
// MapConverter

struct MapConverter {
    token: TypeToken,
    adapter: KeyAdapter,
    value: Arc<dyn Converter>,
}

// The object written here is the map body itself; a staged class name
// would masquerade as an entry.
impl Markers for MapConverter {
    fn handles(&self, concern: Concern) -> bool {
        concern == Concern::ClassMetadata
    }
}

impl Serializer for MapConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        let mapping = mapping_of(value)?;
        writer.begin_object()?;
        for (key, entry) in mapping.iter_dyn() {
            writer.write_name(&self.adapter.encode(key)?)?;
            self.value.serialize(entry, writer, ctx)?;
        }
        writer.end_object()
    }
}

impl Deserializer for MapConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        reader.begin_object()?;
        let mut entries = Vec::new();
        while reader.has_next() {
            reader.next()?;
            let key = self.adapter.decode(reader.name()?)?;
            entries.push((key, self.value.deserialize(reader, ctx)?));
        }
        reader.end_object()?;
        Ok(boxed(DynamicMapping::new(self.token.clone(), entries)))
    }
}

// -----------------------------------------------------------------------------
// ComplexMapConverter

struct ComplexMapConverter {
    token: TypeToken,
    key: Arc<dyn Converter>,
    value: Arc<dyn Converter>,
}

// Array output; staged metadata would corrupt the first entry wrapper.
impl Markers for ComplexMapConverter {
    fn handles(&self, concern: Concern) -> bool {
        concern == Concern::ClassMetadata
    }
}

impl Serializer for ComplexMapConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        let mapping = mapping_of(value)?;
        writer.begin_array()?;
        for (key, entry) in mapping.iter_dyn() {
            writer.begin_object()?;
            writer.write_name("key")?;
            self.key.serialize(key, writer, ctx)?;
            writer.write_name("value")?;
            self.value.serialize(entry, writer, ctx)?;
            writer.end_object()?;
        }
        writer.end_array()
    }
}

impl Deserializer for ComplexMapConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        reader.begin_array()?;
        let mut entries = Vec::new();
        while reader.has_next() {
            reader.next()?;
            reader.begin_object()?;
            let mut key = None;
            let mut value = None;
            while reader.has_next() {
                reader.next()?;
                match reader.name()? {
                    "key" => key = Some(self.key.deserialize(reader, ctx)?),
                    "value" => value = Some(self.value.deserialize(reader, ctx)?),
                    _ => reader.skip_value()?,
                }
            }
            reader.end_object()?;
            match (key, value) {
                (Some(key), Some(value)) => entries.push((key, value)),
                _ => {
                    return Err(Error::value(
                        "map entry is missing its `key` or `value` member",
                    ));
                }
            }
        }
        reader.end_array()?;
        Ok(boxed(DynamicMapping::new(self.token.clone(), entries)))
    }
}
