use core::any::Any;
use std::sync::Arc;

use crate::convert::{
    ChainLink, Concern, Context, Converter, Deserializer, Markers, Serializer,
};
use crate::engine::JsonBind;
use crate::error::{Error, Result};
use crate::stream::{ObjectReader, ObjectWriter, ValueKind};
use crate::token::TypeToken;
use crate::value::{Dynamic, DynamicValue};

// -----------------------------------------------------------------------------
// NullPolicyLink

/// Wraps every converter that does not declare it handles nulls itself.
pub struct NullPolicyLink {
    fail_on_null_primitive: bool,
}

impl NullPolicyLink {
    pub fn new(fail_on_null_primitive: bool) -> Self {
        Self {
            fail_on_null_primitive,
        }
    }
}

impl ChainLink for NullPolicyLink {
    fn decorate(
        &self,
        token: &TypeToken,
        _engine: &JsonBind,
        inner: Option<Arc<dyn Converter>>,
    ) -> Result<Option<Arc<dyn Converter>>> {
        match inner {
            Some(inner) if !inner.handles(Concern::Null) => Ok(Some(Arc::new(NullConverter {
                token: token.clone(),
                fail_on_null_primitive: self.fail_on_null_primitive,
                inner,
            }))),
            _ => Ok(None),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// -----------------------------------------------------------------------------
// NullConverter

/// Uniform null handling around an inner converter.
///
/// Default mode writes an explicit null token and, on read, maps a null
/// token to the per-type default value without invoking the inner converter
/// at all. With "fail on null primitive" enabled, a null on either side of a
/// primitive-equivalent type is a hard policy error.
struct NullConverter {
    token: TypeToken,
    fail_on_null_primitive: bool,
    inner: Arc<dyn Converter>,
}

impl NullConverter {
    fn check_primitive(&self) -> Result<()> {
        if self.fail_on_null_primitive && self.token.is_primitive() {
            return Err(Error::policy(format!(
                "null is not permitted for the primitive type `{}`",
                self.token
            )));
        }
        Ok(())
    }
}

impl Markers for NullConverter {
    fn handles(&self, concern: Concern) -> bool {
        concern == Concern::Null || self.inner.handles(concern)
    }
}

impl Serializer for NullConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        if value.is_null() {
            self.check_primitive()?;
            return writer.write_null();
        }
        self.inner.serialize(value, writer, ctx)
    }
}

impl Deserializer for NullConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        if reader.value_kind()? == ValueKind::Null {
            self.check_primitive()?;
            return Ok(ctx.engine().default_value(&self.token));
        }
        self.inner.deserialize(reader, ctx)
    }
}
