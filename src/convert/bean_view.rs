use core::any::Any;
use std::sync::Arc;

use crate::bean;
use crate::convert::{
    ChainLink, Concern, Context, Converter, Deserializer, Markers, Serializer,
};
use crate::engine::JsonBind;
use crate::error::Result;
use crate::stream::{ObjectReader, ObjectWriter};
use crate::token::TypeToken;
use crate::value::{Dynamic, DynamicValue};

// -----------------------------------------------------------------------------
// BeanViewLink

/// Applies a per-call alternate serialization shape ("view") for a type
/// without altering the type's default converter.
///
/// Only present in the chain when views are enabled.
pub struct BeanViewLink;

impl ChainLink for BeanViewLink {
    fn decorate(
        &self,
        token: &TypeToken,
        _engine: &JsonBind,
        inner: Option<Arc<dyn Converter>>,
    ) -> Result<Option<Arc<dyn Converter>>> {
        match inner {
            Some(inner) if !inner.handles(Concern::BeanView) => {
                Ok(Some(Arc::new(BeanViewConverter {
                    token: token.clone(),
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
// BeanViewConverter

/// Checks the context's active views, in selection order, for one that
/// describes this type; the first match shapes the conversion, otherwise
/// the default converter runs.
struct BeanViewConverter {
    token: TypeToken,
    inner: Arc<dyn Converter>,
}

impl BeanViewConverter {
    fn active_descriptor(&self, ctx: &Context<'_>) -> Option<Arc<bean::BeanDescriptor>> {
        ctx.views()
            .iter()
            .find_map(|view| ctx.engine().view_descriptor(view, &self.token))
    }
}

impl Markers for BeanViewConverter {
    fn handles(&self, concern: Concern) -> bool {
        concern == Concern::BeanView || self.inner.handles(concern)
    }
}

impl Serializer for BeanViewConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        match self.active_descriptor(ctx) {
            Some(descriptor) => bean::serialize_with(&descriptor, value, writer, ctx),
            None => self.inner.serialize(value, writer, ctx),
        }
    }
}

impl Deserializer for BeanViewConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        match self.active_descriptor(ctx) {
            Some(descriptor) => bean::deserialize_with(&descriptor, reader, ctx),
            None => self.inner.deserialize(reader, ctx),
        }
    }
}
