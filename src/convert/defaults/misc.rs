use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::bean::EnumRegistry;
use crate::convert::defaults::primitives::read_narrowest_number;
use crate::convert::{
    Concern, Context, Converter, Deserializer, Factory, FactoryKind, Markers, Produced,
    Serializer,
};
use crate::engine::JsonBind;
use crate::error::{Error, Result};
use crate::stream::{ObjectReader, ObjectWriter, ValueKind};
use crate::token::TypeToken;
use crate::value::{
    boxed, BigDecimal, BigInteger, Bytes, Dynamic, DynamicRef, DynamicValue, DynamicVariant, Null,
};

// -----------------------------------------------------------------------------
// MiscFactory

/// Produces the remaining scalar-ish converters: dates, UUIDs, big numbers,
/// raw JSON, byte buffers and the untyped catch-all.
pub struct MiscFactory {
    pub dates_as_timestamps: bool,
    pub bytes_as_int_array: bool,
}

impl Factory for MiscFactory {
    fn kind(&self) -> FactoryKind {
        FactoryKind::Converter
    }

    fn accepts(&self, token: &TypeToken) -> bool {
        matches!(
            token,
            TypeToken::Uuid
                | TypeToken::Date
                | TypeToken::BigInteger
                | TypeToken::BigDecimal
                | TypeToken::Json
                | TypeToken::Bytes
                | TypeToken::Any
                | TypeToken::Null
        )
    }

    fn create(&self, token: &TypeToken, _engine: &JsonBind) -> Result<Option<Produced>> {
        let converter: Arc<dyn Converter> = match token {
            TypeToken::Uuid => Arc::new(UuidConverter),
            TypeToken::Date => Arc::new(DateConverter {
                timestamps: self.dates_as_timestamps,
            }),
            TypeToken::BigInteger => Arc::new(BigIntegerConverter),
            TypeToken::BigDecimal => Arc::new(BigDecimalConverter),
            TypeToken::Json => Arc::new(JsonConverter),
            TypeToken::Bytes => Arc::new(BytesConverter {
                as_int_array: self.bytes_as_int_array,
            }),
            // The null wrapper intercepts the value on both sides; the
            // untyped converter only backs the token.
            TypeToken::Any | TypeToken::Null => Arc::new(UntypedConverter),
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

// -----------------------------------------------------------------------------
// Uuid / Date / big numbers

// Every converter here emits either a non-object or an object whose
// members it owns outright; none of them takes the metadata wrapper.
fn scalar_shaped(concern: Concern) -> bool {
    concern == Concern::ClassMetadata
}

struct UuidConverter;

impl Markers for UuidConverter {
    fn handles(&self, concern: Concern) -> bool {
        scalar_shaped(concern)
    }
}

impl Serializer for UuidConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        match value.dynamic_ref() {
            DynamicRef::Uuid(v) => writer.write_string(&v.to_string()),
            _ => Err(wrong_shape("uuid", value)),
        }
    }
}

impl Deserializer for UuidConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        let text = reader.value_as_string()?;
        Uuid::parse_str(&text)
            .map(boxed)
            .map_err(|_| Error::value(format!("`{text}` is not a valid uuid")))
    }
}

/// Epoch milliseconds by default; RFC 3339 text when timestamps are off.
/// A string token always parses as RFC 3339, a numeric token always means
/// epoch millis.
struct DateConverter {
    timestamps: bool,
}

impl Markers for DateConverter {
    fn handles(&self, concern: Concern) -> bool {
        scalar_shaped(concern)
    }
}

impl Serializer for DateConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        match value.dynamic_ref() {
            DynamicRef::Date(v) if self.timestamps => writer.write_i64(v.timestamp_millis()),
            DynamicRef::Date(v) => writer.write_string(&v.to_rfc3339()),
            _ => Err(wrong_shape("date", value)),
        }
    }
}

impl Deserializer for DateConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        match reader.value_kind()? {
            ValueKind::Integer => {
                let millis = reader.value_as_i64()?;
                Utc.timestamp_millis_opt(millis)
                    .single()
                    .map(boxed)
                    .ok_or_else(|| {
                        Error::value(format!("{millis} is out of range for a timestamp"))
                    })
            }
            _ => {
                let text = reader.value_as_string()?;
                DateTime::parse_from_rfc3339(&text)
                    .map(|parsed| boxed(parsed.with_timezone(&Utc)))
                    .map_err(|_| Error::value(format!("`{text}` is not a valid date")))
            }
        }
    }
}

struct BigIntegerConverter;

impl Markers for BigIntegerConverter {
    fn handles(&self, concern: Concern) -> bool {
        scalar_shaped(concern)
    }
}

impl Serializer for BigIntegerConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        match value.dynamic_ref() {
            DynamicRef::BigInteger(v) => writer.write_string(v.as_str()),
            _ => Err(wrong_shape("big integer", value)),
        }
    }
}

impl Deserializer for BigIntegerConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        reader.value_as_string()?.parse::<BigInteger>().map(boxed)
    }
}

struct BigDecimalConverter;

impl Markers for BigDecimalConverter {
    fn handles(&self, concern: Concern) -> bool {
        scalar_shaped(concern)
    }
}

impl Serializer for BigDecimalConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        match value.dynamic_ref() {
            DynamicRef::BigDecimal(v) => writer.write_string(v.as_str()),
            _ => Err(wrong_shape("big decimal", value)),
        }
    }
}

impl Deserializer for BigDecimalConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        reader.value_as_string()?.parse::<BigDecimal>().map(boxed)
    }
}

// -----------------------------------------------------------------------------
// Raw JSON

/// Verbatim passthrough. Handles nulls and metadata itself: a raw document
/// may legitimately be `null` or start with `@`-prefixed members, and
/// neither must be interpreted by the pipeline.
struct JsonConverter;

impl Markers for JsonConverter {
    fn handles(&self, concern: Concern) -> bool {
        matches!(concern, Concern::Null | Concern::ClassMetadata)
    }
}

impl Serializer for JsonConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        match value.dynamic_ref() {
            DynamicRef::Json(v) => writer.write_raw(v),
            DynamicRef::Null => writer.write_null(),
            _ => Err(wrong_shape("json", value)),
        }
    }
}

impl Deserializer for JsonConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        reader.value_raw().map(|raw| boxed(raw.clone()))
    }
}

// -----------------------------------------------------------------------------
// Byte buffers

/// A single opaque base64 token by default, or an array of small signed
/// integers when configured.
struct BytesConverter {
    as_int_array: bool,
}

impl Markers for BytesConverter {
    fn handles(&self, concern: Concern) -> bool {
        scalar_shaped(concern)
    }
}

impl Serializer for BytesConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        let DynamicRef::Bytes(bytes) = value.dynamic_ref() else {
            return Err(wrong_shape("bytes", value));
        };
        if self.as_int_array {
            writer.begin_array()?;
            for byte in bytes {
                writer.write_i64(i64::from(*byte as i8))?;
            }
            writer.end_array()
        } else {
            writer.write_string(&BASE64.encode(bytes))
        }
    }
}

impl Deserializer for BytesConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        match reader.value_kind()? {
            ValueKind::Array => {
                reader.begin_array()?;
                let mut bytes = Vec::new();
                while reader.has_next() {
                    reader.next()?;
                    let wide = reader.value_as_i32()?;
                    if !(-128..=255).contains(&wide) {
                        return Err(Error::value(format!("{wide} is not a byte value")));
                    }
                    bytes.push(wide as u8);
                }
                reader.end_array()?;
                Ok(boxed(Bytes(bytes)))
            }
            _ => {
                let text = reader.value_as_string()?;
                BASE64
                    .decode(&text)
                    .map(|decoded| boxed(Bytes(decoded)))
                    .map_err(|_| Error::value("byte buffer is not valid base64"))
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Untyped

/// The catch-all for `any`-typed positions.
///
/// Serialization is dispatched by the value's runtime token; deserialization
/// maps the JSON token kind to a default token shape. Class metadata is
/// handled here rather than by the wrapper: the converter this one
/// redirects to carries its own metadata decoration, and on the way back
/// an object's `@class` member picks the redirect target.
struct UntypedConverter;

impl Markers for UntypedConverter {
    fn handles(&self, concern: Concern) -> bool {
        scalar_shaped(concern)
    }
}

impl Serializer for UntypedConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        let runtime = value.token();
        if runtime == TypeToken::Any {
            return Err(Error::value(
                "cannot serialize a value whose runtime type is itself untyped",
            ));
        }
        ctx.engine()
            .provide_converter(&runtime)?
            .serialize(value, writer, ctx)
    }
}

impl Deserializer for UntypedConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        match reader.value_kind()? {
            ValueKind::Object => {
                if ctx.engine().is_with_class_metadata() {
                    reader.next_object_metadata()?;
                    if let Some(name) = reader.metadata("class").map(str::to_owned) {
                        let token = ctx.engine().class_for(&name)?;
                        return ctx
                            .engine()
                            .provide_converter(&token)?
                            .deserialize(reader, ctx);
                    }
                }
                ctx.engine()
                    .provide_converter(&TypeToken::map(TypeToken::String, TypeToken::Any))?
                    .deserialize(reader, ctx)
            }
            ValueKind::Array => ctx
                .engine()
                .provide_converter(&TypeToken::list(TypeToken::Any))?
                .deserialize(reader, ctx),
            ValueKind::String => reader.value_as_string().map(boxed),
            ValueKind::Integer | ValueKind::Double => read_narrowest_number(reader),
            ValueKind::Boolean => reader.value_as_bool().map(boxed),
            ValueKind::Null => Ok(boxed(Null)),
        }
    }
}

// -----------------------------------------------------------------------------
// Optionals

/// Optionals serialize as `{"value": …}`, with the member absent when
/// empty.
pub struct OptionalFactory;

impl Factory for OptionalFactory {
    fn kind(&self) -> FactoryKind {
        FactoryKind::Converter
    }

    fn accepts(&self, token: &TypeToken) -> bool {
        matches!(token, TypeToken::Optional(_))
    }

    fn create(&self, token: &TypeToken, engine: &JsonBind) -> Result<Option<Produced>> {
        let TypeToken::Optional(inner) = token else {
            return Ok(None);
        };
        let converter = OptionalConverter {
            inner: engine.provide_converter(inner)?,
        };
        Ok(Some(Produced::Converter(Arc::new(converter))))
    }
}

struct OptionalConverter {
    inner: Arc<dyn Converter>,
}

impl Markers for OptionalConverter {
    fn handles(&self, concern: Concern) -> bool {
        scalar_shaped(concern)
    }
}

impl Serializer for OptionalConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        let DynamicRef::Optional(inner) = value.dynamic_ref() else {
            return Err(wrong_shape("optional", value));
        };
        writer.begin_object()?;
        if let Some(present) = inner {
            writer.write_name("value")?;
            self.inner.serialize(present, writer, ctx)?;
        }
        writer.end_object()
    }
}

impl Deserializer for OptionalConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        reader.begin_object()?;
        let mut present = None;
        while reader.has_next() {
            reader.next()?;
            if reader.name()? == "value" {
                present = Some(self.inner.deserialize(reader, ctx)?);
            } else {
                reader.skip_value()?;
            }
        }
        reader.end_object()?;
        Ok(present.unwrap_or_else(|| boxed(Null)))
    }
}

// -----------------------------------------------------------------------------
// Enums

/// Symbolic-name conversion for registered enumerations.
pub struct EnumFactory {
    registry: Arc<EnumRegistry>,
    case_insensitive: bool,
}

impl EnumFactory {
    pub fn new(registry: Arc<EnumRegistry>, case_insensitive: bool) -> Self {
        Self {
            registry,
            case_insensitive,
        }
    }
}

impl Factory for EnumFactory {
    fn kind(&self) -> FactoryKind {
        FactoryKind::Converter
    }

    fn accepts(&self, token: &TypeToken) -> bool {
        matches!(token, TypeToken::Enum(name) if self.registry.get(name).is_some())
    }

    fn create(&self, token: &TypeToken, _engine: &JsonBind) -> Result<Option<Produced>> {
        let TypeToken::Enum(name) = token else {
            return Ok(None);
        };
        let Some(descriptor) = self.registry.get(name) else {
            return Ok(None);
        };
        let converter = EnumConverter {
            descriptor,
            case_insensitive: self.case_insensitive,
        };
        Ok(Some(Produced::Converter(Arc::new(converter))))
    }
}

struct EnumConverter {
    descriptor: Arc<crate::bean::EnumDescriptor>,
    case_insensitive: bool,
}

impl Markers for EnumConverter {
    fn handles(&self, concern: Concern) -> bool {
        scalar_shaped(concern)
    }
}

impl Serializer for EnumConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        _ctx: &mut Context<'_>,
    ) -> Result<()> {
        match value.dynamic_ref() {
            DynamicRef::Variant(name) => writer.write_string(name),
            _ => Err(wrong_shape("enum", value)),
        }
    }
}

impl Deserializer for EnumConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        _ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        let name = reader.value_as_string()?;
        match self.descriptor.lookup(&name, self.case_insensitive) {
            Some(canonical) => Ok(boxed(DynamicVariant::new(
                self.descriptor.enum_name(),
                canonical,
            ))),
            None => Err(Error::value(format!(
                "`{name}` is not a value of enum {}",
                self.descriptor.enum_name()
            ))),
        }
    }
}
