use core::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::bean::{BeanConverter, BeanProvider, BeanRegistry};
use crate::convert::{
    ChainLink, Concern, Context, Converter, Deserializer, Factory, Markers, Produced, Serializer,
};
use crate::engine::JsonBind;
use crate::error::{Error, Result};
use crate::stream::{ObjectReader, ObjectWriter};
use crate::token::TypeToken;
use crate::value::{Dynamic, DynamicValue};

// -----------------------------------------------------------------------------
// ResolutionLink

enum SerHalf {
    Shared(Arc<dyn Converter>),
    Only(Arc<dyn Serializer>),
    Missing,
}

enum DeHalf {
    Shared(Arc<dyn Converter>),
    Only(Arc<dyn Deserializer>),
    Missing,
}

/// The terminal link: resolves a token to a converter by consulting, in
/// order, explicit registrations, the ordered factory list and the
/// structural bean fallback.
///
/// The serializer and deserializer sides resolve independently and are
/// fused afterwards; registration order is the override mechanism — the
/// first factory passing the capability and acceptance pre-checks that
/// produces a value wins.
pub struct ResolutionLink {
    converters: HashMap<TypeToken, Arc<dyn Converter>>,
    serializers: HashMap<TypeToken, Arc<dyn Serializer>>,
    deserializers: HashMap<TypeToken, Arc<dyn Deserializer>>,
    factories: Vec<Arc<dyn Factory>>,
    beans: Arc<BeanRegistry>,
}

impl ResolutionLink {
    pub fn new(
        converters: HashMap<TypeToken, Arc<dyn Converter>>,
        serializers: HashMap<TypeToken, Arc<dyn Serializer>>,
        deserializers: HashMap<TypeToken, Arc<dyn Deserializer>>,
        factories: Vec<Arc<dyn Factory>>,
        beans: Arc<BeanRegistry>,
    ) -> Self {
        Self {
            converters,
            serializers,
            deserializers,
            factories,
            beans,
        }
    }

    fn serializer_side(&self, token: &TypeToken, engine: &JsonBind) -> Result<SerHalf> {
        if let Some(converter) = self.converters.get(token) {
            return Ok(SerHalf::Shared(converter.clone()));
        }
        if let Some(serializer) = self.serializers.get(token) {
            return Ok(SerHalf::Only(serializer.clone()));
        }
        for factory in &self.factories {
            if !factory.kind().can_serialize() || !factory.accepts(token) {
                continue;
            }
            match factory.create(token, engine)? {
                Some(Produced::Converter(converter)) => return Ok(SerHalf::Shared(converter)),
                Some(Produced::Serializer(serializer)) => return Ok(SerHalf::Only(serializer)),
                _ => {}
            }
        }
        Ok(SerHalf::Missing)
    }

    fn deserializer_side(&self, token: &TypeToken, engine: &JsonBind) -> Result<DeHalf> {
        if let Some(converter) = self.converters.get(token) {
            return Ok(DeHalf::Shared(converter.clone()));
        }
        if let Some(deserializer) = self.deserializers.get(token) {
            return Ok(DeHalf::Only(deserializer.clone()));
        }
        for factory in &self.factories {
            if !factory.kind().can_deserialize() || !factory.accepts(token) {
                continue;
            }
            match factory.create(token, engine)? {
                Some(Produced::Converter(converter)) => return Ok(DeHalf::Shared(converter)),
                Some(Produced::Deserializer(deserializer)) => {
                    return Ok(DeHalf::Only(deserializer));
                }
                _ => {}
            }
        }
        Ok(DeHalf::Missing)
    }

    fn bean_fallback(
        &self,
        token: &TypeToken,
        engine: &JsonBind,
    ) -> Result<Option<Arc<dyn Converter>>> {
        match self.beans.describe(token) {
            Some(descriptor) => {
                debug!(%token, "structural bean fallback");
                Ok(Some(Arc::new(BeanConverter::resolve(descriptor, engine)?)))
            }
            None => Ok(None),
        }
    }
}

impl ChainLink for ResolutionLink {
    fn decorate(
        &self,
        token: &TypeToken,
        engine: &JsonBind,
        _inner: Option<Arc<dyn Converter>>,
    ) -> Result<Option<Arc<dyn Converter>>> {
        let ser = self.serializer_side(token, engine)?;
        let de = self.deserializer_side(token, engine)?;

        match (ser, de) {
            // Same object satisfying the full contract on both sides.
            (SerHalf::Shared(a), DeHalf::Shared(b)) if Arc::ptr_eq(&a, &b) => Ok(Some(a)),
            (SerHalf::Missing, DeHalf::Missing) => self.bean_fallback(token, engine),
            (ser, de) => {
                let ser: Arc<dyn Serializer> = match ser {
                    SerHalf::Shared(converter) => converter,
                    SerHalf::Only(serializer) => serializer,
                    SerHalf::Missing => self.bean_fallback(token, engine)?.ok_or_else(|| {
                        Error::binding(token, "no serializer side could be resolved")
                    })?,
                };
                let de: Arc<dyn Deserializer> = match de {
                    DeHalf::Shared(converter) => converter,
                    DeHalf::Only(deserializer) => deserializer,
                    DeHalf::Missing => self.bean_fallback(token, engine)?.ok_or_else(|| {
                        Error::binding(token, "no deserializer side could be resolved")
                    })?,
                };
                Ok(Some(Arc::new(HalfPair { ser, de })))
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// -----------------------------------------------------------------------------
// HalfPair

/// A delegating converter fusing independently resolved halves; markers are
/// the union of both sides.
struct HalfPair {
    ser: Arc<dyn Serializer>,
    de: Arc<dyn Deserializer>,
}

impl Markers for HalfPair {
    fn handles(&self, concern: Concern) -> bool {
        self.ser.handles(concern) || self.de.handles(concern)
    }
}

impl Serializer for HalfPair {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        self.ser.serialize(value, writer, ctx)
    }
}

impl Deserializer for HalfPair {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        self.de.deserialize(reader, ctx)
    }
}
