//! The engine facade: converter cache, type registry lookups and the
//! serialize/deserialize entry points.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::debug;

use crate::bean::{BeanDescriptor, BeanRegistry, EnumRegistry};
use crate::convert::{ChainedFactory, Context, Converter};
use crate::error::{Error, Result};
use crate::stream::{JsonValueReader, JsonValueWriter, ObjectWriter};
use crate::token::TypeToken;
use crate::value::{boxed, Dynamic, DynamicValue, FromDynamic, Null, Tokenized};

// -----------------------------------------------------------------------------
// BuildGate

/// Tracks one in-flight pipeline build.
///
/// Requests for the same token from other idle threads wait on the gate
/// instead of invoking the chain a second time; a recursive request from
/// the building thread itself falls through to the chain, where the
/// cycle-breaking head takes over. A thread that holds a gate of its own
/// never waits on a foreign gate.
struct BuildGate {
    owner: ThreadId,
    done: Mutex<bool>,
    released: Condvar,
}

impl BuildGate {
    fn new(owner: ThreadId) -> Self {
        Self {
            owner,
            done: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    fn release(&self) {
        *self.done.lock() = true;
        self.released.notify_all();
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.released.wait(&mut done);
        }
    }
}

// -----------------------------------------------------------------------------
// JsonBind

pub(crate) struct EngineConfig {
    pub chain: ChainedFactory,
    pub aliases: HashMap<String, TypeToken>,
    pub beans: Arc<BeanRegistry>,
    pub enums: Arc<EnumRegistry>,
    pub views: HashMap<String, HashMap<TypeToken, Arc<BeanDescriptor>>>,
    pub with_class_metadata: bool,
    /// (member name to wrap under on serialize, member name to unwrap on
    /// deserialize).
    pub wrap_root: Option<(String, String)>,
}

/// The conversion engine.
///
/// Built once by [`JsonBindBuilder`](crate::builder::JsonBindBuilder) and
/// safe to share across threads; converters are resolved lazily, cached per
/// type token, and never replaced for the lifetime of the engine.
///
/// # Example
///
/// ```
/// use jsonbind::JsonBindBuilder;
///
/// let jb = JsonBindBuilder::new().create();
/// let doc = jb.to_value(&vec![1i32, 2, 3]).unwrap();
/// assert_eq!(doc, serde_json::json!([1, 2, 3]));
/// ```
pub struct JsonBind {
    chain: ChainedFactory,
    cache: RwLock<HashMap<TypeToken, Arc<dyn Converter>>>,
    pending: Mutex<HashMap<TypeToken, Arc<BuildGate>>>,
    aliases: HashMap<String, TypeToken>,
    reverse_aliases: HashMap<TypeToken, String>,
    beans: Arc<BeanRegistry>,
    enums: Arc<EnumRegistry>,
    views: HashMap<String, HashMap<TypeToken, Arc<BeanDescriptor>>>,
    with_class_metadata: bool,
    wrap_root: Option<(String, String)>,
}

enum Role {
    Builder(Arc<BuildGate>),
    Waiter(Arc<BuildGate>),
    Recursing,
    Independent,
}

impl JsonBind {
    pub(crate) fn from_config(config: EngineConfig) -> Self {
        let reverse_aliases = config
            .aliases
            .iter()
            .map(|(alias, token)| (token.clone(), alias.clone()))
            .collect();
        Self {
            chain: config.chain,
            cache: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            aliases: config.aliases,
            reverse_aliases,
            beans: config.beans,
            enums: config.enums,
            views: config.views,
            with_class_metadata: config.with_class_metadata,
            wrap_root: config.wrap_root,
        }
    }

    // -------------------------------------------------------------------------
    // Converter resolution

    /// Resolves (building and caching if needed) the converter for `token`.
    ///
    /// Concurrent first-time requests for one token either share the
    /// completed converter or wait for the first builder to finish. A
    /// thread that is itself mid-build never waits on another thread's
    /// gate (the gate owner may in turn be blocked on one of this
    /// thread's own gates); it builds its own copy instead, and the
    /// first completed build wins the cache. A failed build is visible
    /// to waiters only as "no converter available"; they retry once
    /// before surfacing a binding error.
    pub fn provide_converter(&self, token: &TypeToken) -> Result<Arc<dyn Converter>> {
        let mut retried = false;
        let me = thread::current().id();
        loop {
            if let Some(cached) = self.cache.read().get(token) {
                return Ok(cached.clone());
            }

            let role = {
                let mut pending = self.pending.lock();
                match pending.get(token) {
                    Some(gate) if gate.owner == me => Role::Recursing,
                    Some(gate) => {
                        if pending.values().any(|gate| gate.owner == me) {
                            Role::Independent
                        } else {
                            Role::Waiter(gate.clone())
                        }
                    }
                    None => {
                        let gate = Arc::new(BuildGate::new(me));
                        pending.insert(token.clone(), gate.clone());
                        Role::Builder(gate)
                    }
                }
            };

            match role {
                Role::Recursing => {
                    return self.chain.create(token, self)?.ok_or_else(|| {
                        Error::binding(token, "no factory or registration matched")
                    });
                }
                Role::Independent => {
                    debug!(%token, "mid-build thread racing another thread's build");
                    let converter = self.chain.create(token, self)?.ok_or_else(|| {
                        Error::binding(token, "no factory or registration matched")
                    })?;
                    return Ok(self
                        .cache
                        .write()
                        .entry(token.clone())
                        .or_insert(converter)
                        .clone());
                }
                Role::Waiter(gate) => {
                    gate.wait();
                    if retried {
                        return Err(Error::binding(
                            token,
                            "a previous attempt to build this converter failed",
                        ));
                    }
                    retried = true;
                }
                Role::Builder(gate) => {
                    debug!(%token, "cache miss, building converter pipeline");
                    let outcome = match self.chain.create(token, self) {
                        Ok(Some(converter)) => Ok(self
                            .cache
                            .write()
                            .entry(token.clone())
                            .or_insert(converter)
                            .clone()),
                        Ok(None) => {
                            Err(Error::binding(token, "no factory or registration matched"))
                        }
                        Err(error) => Err(error),
                    };
                    self.pending.lock().remove(token);
                    gate.release();
                    return outcome;
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Registry lookups

    /// The default value substituted for a null token in default null mode.
    pub fn default_value(&self, token: &TypeToken) -> DynamicValue {
        match token {
            TypeToken::Bool => boxed(false),
            TypeToken::Int => boxed(0i32),
            TypeToken::Long => boxed(0i64),
            TypeToken::Short => boxed(0i16),
            TypeToken::Byte => boxed(0i8),
            TypeToken::Double => boxed(0f64),
            TypeToken::Float => boxed(0f32),
            TypeToken::Char => boxed('\0'),
            _ => boxed(Null),
        }
    }

    /// Resolves a serialized class name (alias or plain name) to its token.
    pub fn class_for(&self, name: &str) -> Result<TypeToken> {
        if let Some(token) = self.aliases.get(name) {
            return Ok(token.clone());
        }
        if self.beans.contains_class(name) {
            return Ok(TypeToken::class(name));
        }
        if self.enums.contains(name) {
            return Ok(TypeToken::enumeration(name));
        }
        Err(Error::value(format!(
            "`{name}` does not name a known class"
        )))
    }

    /// The name written as class metadata for `token`.
    pub fn alias_for(&self, token: &TypeToken) -> String {
        if let Some(alias) = self.reverse_aliases.get(token) {
            return alias.clone();
        }
        match token {
            TypeToken::Class(name) | TypeToken::Enum(name) => name.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_with_class_metadata(&self) -> bool {
        self.with_class_metadata
    }

    pub(crate) fn view_descriptor(
        &self,
        view: &str,
        token: &TypeToken,
    ) -> Option<Arc<BeanDescriptor>> {
        self.views.get(view)?.get(token).cloned()
    }

    pub(crate) fn chain(&self) -> &ChainedFactory {
        &self.chain
    }

    // -------------------------------------------------------------------------
    // Entry points

    /// Serializes `value` into a JSON document.
    pub fn to_value(&self, value: &dyn Dynamic) -> Result<serde_json::Value> {
        self.to_value_with_views(value, &[])
    }

    /// Serializes `value` with the given views active, in selection order.
    pub fn to_value_with_views(
        &self,
        value: &dyn Dynamic,
        views: &[&str],
    ) -> Result<serde_json::Value> {
        let converter = self.provide_converter(&value.token())?;
        let mut writer = JsonValueWriter::new();
        let mut ctx = Context::with_views(self, views.iter().map(|v| (*v).to_owned()).collect());
        if let Some((wrap_under, _)) = &self.wrap_root {
            writer.begin_object()?;
            writer.write_name(wrap_under)?;
            converter.serialize(value, &mut writer, &mut ctx)?;
            writer.end_object()?;
        } else {
            converter.serialize(value, &mut writer, &mut ctx)?;
        }
        writer.finish()
    }

    /// Serializes `value` to JSON text.
    pub fn to_string(&self, value: &dyn Dynamic) -> Result<String> {
        serde_json::to_string(&self.to_value(value)?).map_err(|e| Error::stream(e.to_string()))
    }

    /// Serializes `value` to indented JSON text.
    pub fn to_string_pretty(&self, value: &dyn Dynamic) -> Result<String> {
        serde_json::to_string_pretty(&self.to_value(value)?)
            .map_err(|e| Error::stream(e.to_string()))
    }

    /// Deserializes a JSON document into a dynamic value of type `token`.
    pub fn from_value(&self, doc: serde_json::Value, token: &TypeToken) -> Result<DynamicValue> {
        let doc = match &self.wrap_root {
            Some((_, unwrap_from)) => match doc {
                serde_json::Value::Object(mut members) => {
                    members.remove(unwrap_from).ok_or_else(|| {
                        Error::value(format!("wrapped root is missing member `{unwrap_from}`"))
                    })?
                }
                _ => return Err(Error::value("wrapped root must be an object")),
            },
            None => doc,
        };
        let converter = self.provide_converter(token)?;
        let mut reader = JsonValueReader::new(doc);
        let mut ctx = Context::new(self);
        converter.deserialize(&mut reader, &mut ctx)
    }

    /// Deserializes JSON text into a dynamic value of type `token`.
    pub fn from_str(&self, text: &str, token: &TypeToken) -> Result<DynamicValue> {
        let doc = serde_json::from_str(text).map_err(|e| Error::stream(e.to_string()))?;
        self.from_value(doc, token)
    }

    /// Deserializes a JSON document directly into a concrete Rust type.
    pub fn from_value_as<T: FromDynamic + Tokenized>(&self, doc: serde_json::Value) -> Result<T> {
        let dynamic = self.from_value(doc, &T::static_token())?;
        T::from_dynamic(dynamic.as_ref())
    }

    /// Deserializes JSON text directly into a concrete Rust type.
    pub fn from_str_as<T: FromDynamic + Tokenized>(&self, text: &str) -> Result<T> {
        let doc = serde_json::from_str(text).map_err(|e| Error::stream(e.to_string()))?;
        self.from_value_as(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::JsonBindBuilder;
    use crate::convert::{Factory, FactoryKind, Produced};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFactory {
        calls: Arc<AtomicUsize>,
        inner: crate::convert::defaults::PrimitiveFactory,
    }

    impl Factory for CountingFactory {
        fn kind(&self) -> FactoryKind {
            FactoryKind::Converter
        }

        fn accepts(&self, token: &TypeToken) -> bool {
            self.inner.accepts(token)
        }

        fn create(&self, token: &TypeToken, engine: &JsonBind) -> Result<Option<Produced>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.create(token, engine)
        }
    }

    #[test]
    fn converter_built_at_most_once_per_token() {
        let calls = Arc::new(AtomicUsize::new(0));
        let jb = JsonBindBuilder::new()
            .with_factory(CountingFactory {
                calls: calls.clone(),
                inner: crate::convert::defaults::PrimitiveFactory,
            })
            .create();

        let first = jb.provide_converter(&TypeToken::Int).unwrap();
        let second = jb.provide_converter(&TypeToken::Int).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        // One invocation per resolution side, never again after caching.
        assert!(calls.load(Ordering::SeqCst) <= 2);
        let after = calls.load(Ordering::SeqCst);

        jb.provide_converter(&TypeToken::Int).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), after);
    }

    #[test]
    fn concurrent_resolution_shares_one_build() {
        let calls = Arc::new(AtomicUsize::new(0));
        let jb = Arc::new(
            JsonBindBuilder::new()
                .with_factory(CountingFactory {
                    calls: calls.clone(),
                    inner: crate::convert::defaults::PrimitiveFactory,
                })
                .create(),
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let jb = jb.clone();
                thread::spawn(move || jb.provide_converter(&TypeToken::Long).map(|_| ()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert!(calls.load(Ordering::SeqCst) <= 2);
    }

    struct NullStub;

    impl crate::convert::Markers for NullStub {}

    impl crate::convert::Serializer for NullStub {
        fn serialize(
            &self,
            _value: &dyn Dynamic,
            writer: &mut dyn ObjectWriter,
            _ctx: &mut Context<'_>,
        ) -> Result<()> {
            writer.write_null()
        }
    }

    impl crate::convert::Deserializer for NullStub {
        fn deserialize(
            &self,
            _reader: &mut dyn crate::stream::ObjectReader,
            _ctx: &mut Context<'_>,
        ) -> Result<DynamicValue> {
            Ok(boxed(Null))
        }
    }

    struct CrossFactory {
        token: TypeToken,
        other: TypeToken,
        barrier: Arc<std::sync::Barrier>,
    }

    impl Factory for CrossFactory {
        fn kind(&self) -> FactoryKind {
            FactoryKind::Converter
        }

        fn accepts(&self, token: &TypeToken) -> bool {
            *token == self.token
        }

        fn create(&self, _token: &TypeToken, engine: &JsonBind) -> Result<Option<Produced>> {
            self.barrier.wait();
            engine.provide_converter(&self.other)?;
            Ok(Some(Produced::Converter(Arc::new(NullStub))))
        }
    }

    #[test]
    fn mutually_referential_resolution_does_not_deadlock() {
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let a = TypeToken::class("A");
        let b = TypeToken::class("B");
        let jb = Arc::new(
            JsonBindBuilder::new()
                .with_factory(CrossFactory {
                    token: a.clone(),
                    other: b.clone(),
                    barrier: barrier.clone(),
                })
                .with_factory(CrossFactory {
                    token: b.clone(),
                    other: a.clone(),
                    barrier,
                })
                .create(),
        );

        // Each thread holds its own token's gate when it asks for the
        // other one; neither may wait for the other to finish.
        let first = {
            let jb = jb.clone();
            let a = a.clone();
            thread::spawn(move || jb.provide_converter(&a).map(|_| ()))
        };
        let second = {
            let jb = jb.clone();
            let b = b.clone();
            thread::spawn(move || jb.provide_converter(&b).map(|_| ()))
        };
        first.join().unwrap().unwrap();
        second.join().unwrap().unwrap();

        jb.provide_converter(&a).unwrap();
        jb.provide_converter(&b).unwrap();
    }

    #[test]
    fn unknown_type_is_a_binding_error() {
        let jb = JsonBindBuilder::new().create();
        let result = jb.provide_converter(&TypeToken::class("Nowhere"));
        assert!(matches!(result, Err(Error::Binding { .. })));
    }

    #[test]
    fn default_values_for_primitives() {
        let jb = JsonBindBuilder::new().create();
        assert_eq!(
            jb.default_value(&TypeToken::Int)
                .as_any()
                .downcast_ref::<i32>(),
            Some(&0)
        );
        assert!(jb.default_value(&TypeToken::String).is_null());
    }
}
