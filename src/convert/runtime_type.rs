use core::any::Any;
use std::sync::Arc;

use tracing::trace;

use crate::convert::{
    value_identity, ChainLink, Concern, Context, Converter, Deserializer, Markers, Serializer,
};
use crate::engine::JsonBind;
use crate::error::{Error, Result};
use crate::stream::{ObjectReader, ObjectWriter};
use crate::token::TypeToken;
use crate::value::{Dynamic, DynamicValue};

// -----------------------------------------------------------------------------
// RuntimeTypeLink

/// Redirects serialization to the value's runtime type when it differs from
/// the statically bound one.
pub struct RuntimeTypeLink;

impl ChainLink for RuntimeTypeLink {
    fn decorate(
        &self,
        token: &TypeToken,
        _engine: &JsonBind,
        inner: Option<Arc<dyn Converter>>,
    ) -> Result<Option<Arc<dyn Converter>>> {
        Ok(inner.map(|inner| {
            Arc::new(RuntimeTypeConverter {
                static_token: token.clone(),
                inner,
            }) as Arc<dyn Converter>
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// -----------------------------------------------------------------------------
// RuntimeTypeConverter

/// On serialize, re-resolves through the value's runtime token unless the
/// value is a container (handled structurally, never polymorphically).
/// Non-scalar redirections carry value-level cycle detection through the
/// context's identity set: meeting the same instance again while it is still
/// being serialized is a cyclic-graph error. Deserialization is unaffected —
/// the reader has no notion of runtime type without metadata.
struct RuntimeTypeConverter {
    static_token: TypeToken,
    inner: Arc<dyn Converter>,
}

impl Markers for RuntimeTypeConverter {
    fn handles(&self, concern: Concern) -> bool {
        self.inner.handles(concern)
    }
}

impl Serializer for RuntimeTypeConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        if value.is_null() {
            return self.inner.serialize(value, writer, ctx);
        }
        let runtime = value.token();
        if runtime == self.static_token || runtime.is_container() {
            return self.inner.serialize(value, writer, ctx);
        }

        trace!(%runtime, statically_bound = %self.static_token, "runtime type redirection");
        let engine = ctx.engine();
        if value.dynamic_ref().is_scalar() {
            // Scalars cannot participate in reference cycles.
            return engine
                .provide_converter(&runtime)?
                .serialize(value, writer, ctx);
        }

        let identity = value_identity(value);
        if !ctx.enter_value(identity) {
            return Err(Error::CyclicGraph(runtime));
        }
        let outcome = engine
            .provide_converter(&runtime)
            .and_then(|converter| converter.serialize(value, writer, ctx));
        // Removed afterward so the same instance reachable along a
        // non-cyclic sibling path still serializes.
        ctx.leave_value(identity);
        outcome
    }
}

impl Deserializer for RuntimeTypeConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        self.inner.deserialize(reader, ctx)
    }
}
