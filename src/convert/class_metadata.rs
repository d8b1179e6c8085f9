use core::any::Any;
use std::sync::Arc;

use tracing::trace;

use crate::convert::{
    ChainLink, Concern, Context, Converter, Deserializer, Markers, Serializer,
};
use crate::engine::JsonBind;
use crate::error::Result;
use crate::stream::{ObjectReader, ObjectWriter, ValueKind};
use crate::token::TypeToken;
use crate::value::{Dynamic, DynamicValue};

// -----------------------------------------------------------------------------
// ClassMetadataLink

/// Embeds type identity in serialized objects for polymorphic round-trips.
///
/// Only present in the chain when class metadata is enabled; skips
/// converters that declare they manage metadata themselves.
pub struct ClassMetadataLink {
    with_static_type: bool,
}

impl ClassMetadataLink {
    pub fn new(with_static_type: bool) -> Self {
        Self { with_static_type }
    }
}

impl ChainLink for ClassMetadataLink {
    fn decorate(
        &self,
        token: &TypeToken,
        _engine: &JsonBind,
        inner: Option<Arc<dyn Converter>>,
    ) -> Result<Option<Arc<dyn Converter>>> {
        match inner {
            Some(inner) if !inner.handles(Concern::ClassMetadata) => {
                Ok(Some(Arc::new(ClassMetadataConverter {
                    static_token: token.clone(),
                    with_static_type: self.with_static_type,
                    inner,
                })))
            }
            _ => Ok(None),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// -----------------------------------------------------------------------------
// ClassMetadataConverter

/// Writes the runtime type's alias as the first member of a serialized
/// object; on read, an explicit metadata name takes over the whole binding.
struct ClassMetadataConverter {
    static_token: TypeToken,
    with_static_type: bool,
    inner: Arc<dyn Converter>,
}

impl Markers for ClassMetadataConverter {
    fn handles(&self, concern: Concern) -> bool {
        concern == Concern::ClassMetadata || self.inner.handles(concern)
    }
}

impl Serializer for ClassMetadataConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        if !value.is_null() {
            let runtime = value.token();
            // Raw JSON passthrough and untyped catch-all values carry no
            // class identity worth recording.
            let eligible = !matches!(runtime, TypeToken::Json | TypeToken::Any);
            if eligible && (self.with_static_type || runtime != self.static_token) {
                let alias = ctx.engine().alias_for(&runtime);
                trace!(%runtime, alias, "staging class metadata");
                writer.begin_next_object_metadata()?;
                writer.write_metadata("class", &alias)?;
            }
        }
        self.inner.serialize(value, writer, ctx)
    }
}

impl Deserializer for ClassMetadataConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        if reader.value_kind()? == ValueKind::Object {
            reader.next_object_metadata()?;
            let named = reader.metadata("class").map(str::to_owned);
            if let Some(name) = named {
                // An unresolvable name is a hard failure, not a fallback.
                let token = ctx.engine().class_for(&name)?;
                if token != self.static_token {
                    trace!(%token, "class metadata redirects binding");
                    let converter = ctx.engine().provide_converter(&token)?;
                    return converter.deserialize(reader, ctx);
                }
            }
        }
        self.inner.deserialize(reader, ctx)
    }
}
