//! The structural ("bean") fallback: property-wise conversion of
//! user-defined objects.
//!
//! Property discovery itself stays outside the engine — a
//! [`BeanProvider`] hands the resolution factory an ordered
//! [`BeanDescriptor`] when no explicit registration or factory matched.
//! The in-crate [`BeanRegistry`] implements the provider from explicit
//! registrations.

use std::collections::HashMap;
use std::sync::Arc;

use crate::convert::{Context, Converter, Deserializer, Markers, Serializer};
use crate::engine::JsonBind;
use crate::error::{Error, Result};
use crate::stream::{ObjectReader, ObjectWriter};
use crate::token::TypeToken;
use crate::value::{boxed, Dynamic, DynamicObject, DynamicValue};

// -----------------------------------------------------------------------------
// Descriptors

/// Reads one property out of a value of the described type.
pub type Accessor = Arc<dyn Fn(&dyn Dynamic) -> Result<DynamicValue> + Send + Sync>;

/// Rebuilds a concrete value from the deserialized field set.
pub type BeanConstructor = Arc<dyn Fn(DynamicObject) -> Result<DynamicValue> + Send + Sync>;

/// One serializable property: name, declared type and accessor.
pub struct BeanProperty {
    name: String,
    token: TypeToken,
    accessor: Accessor,
}

impl BeanProperty {
    pub fn new(name: impl Into<String>, token: TypeToken, accessor: Accessor) -> Self {
        Self {
            name: name.into(),
            token,
            accessor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> &TypeToken {
        &self.token
    }
}

/// The ordered property shape of a user-defined type.
///
/// Without a constructor, deserialization yields the generic
/// [`DynamicObject`]; with one, the field set is handed to it to rebuild
/// the concrete value.
pub struct BeanDescriptor {
    class_name: String,
    properties: Vec<BeanProperty>,
    constructor: Option<BeanConstructor>,
}

impl BeanDescriptor {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            properties: Vec::new(),
            constructor: None,
        }
    }

    pub fn property(
        mut self,
        name: impl Into<String>,
        token: TypeToken,
        accessor: Accessor,
    ) -> Self {
        self.properties.push(BeanProperty::new(name, token, accessor));
        self
    }

    pub fn constructor(mut self, constructor: BeanConstructor) -> Self {
        self.constructor = Some(constructor);
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn properties(&self) -> &[BeanProperty] {
        &self.properties
    }
}

/// Typed accessor helper: downcasts the receiver and applies `get`.
pub fn accessor<T, F>(get: F) -> Accessor
where
    T: Dynamic,
    F: Fn(&T) -> DynamicValue + Send + Sync + 'static,
{
    Arc::new(move |value| {
        let typed = value.as_any().downcast_ref::<T>().ok_or_else(|| {
            Error::value(format!(
                "accessor applied to a value of unexpected type `{}`",
                value.token()
            ))
        })?;
        Ok(get(typed))
    })
}

/// Typed constructor helper: builds a concrete value from the field set.
pub fn constructor<T, F>(build: F) -> BeanConstructor
where
    T: Dynamic,
    F: Fn(DynamicObject) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(move |object| build(object).map(boxed))
}

// -----------------------------------------------------------------------------
// BeanProvider / BeanRegistry

/// The last-resort structural provider consulted by the resolution factory.
pub trait BeanProvider: Send + Sync {
    fn describe(&self, token: &TypeToken) -> Option<Arc<BeanDescriptor>>;
}

/// A provider backed by explicit registrations.
#[derive(Default)]
pub struct BeanRegistry {
    beans: HashMap<TypeToken, Arc<BeanDescriptor>>,
}

impl BeanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, token: TypeToken, descriptor: BeanDescriptor) {
        self.beans.insert(token, Arc::new(descriptor));
    }

    pub(crate) fn contains_class(&self, name: &str) -> bool {
        self.beans.contains_key(&TypeToken::class(name))
    }
}

impl BeanProvider for BeanRegistry {
    fn describe(&self, token: &TypeToken) -> Option<Arc<BeanDescriptor>> {
        self.beans.get(token).cloned()
    }
}

// -----------------------------------------------------------------------------
// Enums

/// The symbolic names of a registered enumeration, in declaration order.
pub struct EnumDescriptor {
    enum_name: String,
    names: Vec<String>,
}

impl EnumDescriptor {
    pub fn new<I, S>(enum_name: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enum_name: enum_name.into(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn enum_name(&self) -> &str {
        &self.enum_name
    }

    /// Resolves a serialized name to its canonical form.
    pub fn lookup(&self, name: &str, case_insensitive: bool) -> Option<&str> {
        self.names
            .iter()
            .find(|candidate| {
                candidate.as_str() == name
                    || (case_insensitive && candidate.eq_ignore_ascii_case(name))
            })
            .map(String::as_str)
    }
}

/// The enumeration counterpart of [`BeanRegistry`].
#[derive(Default)]
pub struct EnumRegistry {
    enums: HashMap<String, Arc<EnumDescriptor>>,
}

impl EnumRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: EnumDescriptor) {
        self.enums
            .insert(descriptor.enum_name.clone(), Arc::new(descriptor));
    }

    pub fn get(&self, enum_name: &str) -> Option<Arc<EnumDescriptor>> {
        self.enums.get(enum_name).cloned()
    }

    pub(crate) fn contains(&self, enum_name: &str) -> bool {
        self.enums.contains_key(enum_name)
    }
}

// -----------------------------------------------------------------------------
// BeanConverter

struct ResolvedProperty {
    name: String,
    accessor: Accessor,
    converter: Arc<dyn Converter>,
}

/// Property-wise converter synthesized from a descriptor.
///
/// Property converters are resolved eagerly at build time; for a
/// self-referential type this recursion is what reaches the cycle-breaking
/// head of the chain.
pub(crate) struct BeanConverter {
    descriptor: Arc<BeanDescriptor>,
    properties: Vec<ResolvedProperty>,
}

impl BeanConverter {
    pub(crate) fn resolve(descriptor: Arc<BeanDescriptor>, engine: &JsonBind) -> Result<Self> {
        let properties = descriptor
            .properties
            .iter()
            .map(|property| {
                Ok(ResolvedProperty {
                    name: property.name.clone(),
                    accessor: property.accessor.clone(),
                    converter: engine.provide_converter(&property.token)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            descriptor,
            properties,
        })
    }
}

impl Markers for BeanConverter {}

impl Serializer for BeanConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        writer.begin_object()?;
        for property in &self.properties {
            let field = (property.accessor)(value)?;
            writer.write_name(&property.name)?;
            property.converter.serialize(field.as_ref(), writer, ctx)?;
        }
        writer.end_object()
    }
}

impl Deserializer for BeanConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        reader.begin_object()?;
        let mut fields = Vec::with_capacity(self.properties.len());
        while reader.has_next() {
            reader.next()?;
            let name = reader.name()?.to_owned();
            match self.properties.iter().find(|p| p.name == name) {
                Some(property) => {
                    fields.push((name, property.converter.deserialize(reader, ctx)?));
                }
                // Unknown members are ignored.
                None => reader.skip_value()?,
            }
        }
        reader.end_object()?;

        let object = DynamicObject::new(self.descriptor.class_name.clone(), fields);
        match &self.descriptor.constructor {
            Some(build) => build(object),
            None => Ok(boxed(object)),
        }
    }
}

// -----------------------------------------------------------------------------
// Per-call conversion (views)

/// Serializes `value` through `descriptor`, resolving property converters
/// per call. Used by the view layer, where the shape depends on the call.
pub(crate) fn serialize_with(
    descriptor: &BeanDescriptor,
    value: &dyn Dynamic,
    writer: &mut dyn ObjectWriter,
    ctx: &mut Context<'_>,
) -> Result<()> {
    writer.begin_object()?;
    for property in &descriptor.properties {
        let field = (property.accessor)(value)?;
        let converter = ctx.engine().provide_converter(&property.token)?;
        writer.write_name(&property.name)?;
        converter.serialize(field.as_ref(), writer, ctx)?;
    }
    writer.end_object()
}

/// Deserializes through `descriptor`, resolving property converters per
/// call.
pub(crate) fn deserialize_with(
    descriptor: &BeanDescriptor,
    reader: &mut dyn ObjectReader,
    ctx: &mut Context<'_>,
) -> Result<DynamicValue> {
    reader.begin_object()?;
    let mut fields = Vec::with_capacity(descriptor.properties.len());
    while reader.has_next() {
        reader.next()?;
        let name = reader.name()?.to_owned();
        match descriptor.properties.iter().find(|p| p.name == name) {
            Some(property) => {
                let converter = ctx.engine().provide_converter(&property.token)?;
                fields.push((name, converter.deserialize(reader, ctx)?));
            }
            None => reader.skip_value()?,
        }
    }
    reader.end_object()?;

    let object = DynamicObject::new(descriptor.class_name.clone(), fields);
    match &descriptor.constructor {
        Some(build) => build(object),
        None => Ok(boxed(object)),
    }
}
