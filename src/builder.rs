//! Engine configuration and assembly.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bean::{BeanDescriptor, BeanRegistry, EnumDescriptor, EnumRegistry};
use crate::convert::basic::ResolutionLink;
use crate::convert::bean_view::BeanViewLink;
use crate::convert::circular::CycleBreakingLink;
use crate::convert::class_metadata::ClassMetadataLink;
use crate::convert::defaults::{
    EnumFactory, ListFactory, MapFactory, MiscFactory, OptionalFactory, PrimitiveFactory,
    SingleValueAsListFactory,
};
use crate::convert::null::NullPolicyLink;
use crate::convert::runtime_type::RuntimeTypeLink;
use crate::convert::{ChainLink, ChainedFactory, Converter, Deserializer, Factory, Serializer};
use crate::engine::{EngineConfig, JsonBind};
use crate::token::TypeToken;

// -----------------------------------------------------------------------------
// JsonBindBuilder

/// Collects configuration and assembles a [`JsonBind`] engine.
///
/// Registration order matters for factories: user factories are consulted
/// before the built-ins, so registering a factory for a token a built-in
/// also accepts overrides the built-in.
///
/// # Example
///
/// ```
/// use jsonbind::JsonBindBuilder;
///
/// let jb = JsonBindBuilder::new()
///     .use_class_metadata(true)
///     .create();
/// assert!(jb.is_with_class_metadata());
/// ```
pub struct JsonBindBuilder {
    converters: HashMap<TypeToken, Arc<dyn Converter>>,
    serializers: HashMap<TypeToken, Arc<dyn Serializer>>,
    deserializers: HashMap<TypeToken, Arc<dyn Deserializer>>,
    factories: Vec<Arc<dyn Factory>>,
    links: Vec<ChainedFactory>,
    aliases: HashMap<String, TypeToken>,
    beans: BeanRegistry,
    enums: EnumRegistry,
    views: HashMap<String, HashMap<TypeToken, Arc<BeanDescriptor>>>,
    use_class_metadata: bool,
    class_metadata_with_static_type: bool,
    fail_on_null_primitive: bool,
    use_dates_as_timestamps: bool,
    use_bytes_as_int_array: bool,
    use_case_insensitive_enums: bool,
    accept_single_value_as_list: bool,
    use_views: bool,
    wrap_root: Option<(String, String)>,
}

impl Default for JsonBindBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonBindBuilder {
    pub fn new() -> Self {
        Self {
            converters: HashMap::new(),
            serializers: HashMap::new(),
            deserializers: HashMap::new(),
            factories: Vec::new(),
            links: Vec::new(),
            aliases: HashMap::new(),
            beans: BeanRegistry::new(),
            enums: EnumRegistry::new(),
            views: HashMap::new(),
            use_class_metadata: false,
            class_metadata_with_static_type: false,
            fail_on_null_primitive: false,
            use_dates_as_timestamps: true,
            use_bytes_as_int_array: false,
            use_case_insensitive_enums: false,
            accept_single_value_as_list: false,
            use_views: false,
            wrap_root: None,
        }
    }

    // -------------------------------------------------------------------------
    // Registrations

    /// Registers an explicit converter for exactly one token; pre-empts
    /// every factory.
    pub fn with_converter(mut self, token: TypeToken, converter: impl Converter + 'static) -> Self {
        self.converters.insert(token, Arc::new(converter));
        self
    }

    /// Registers the serialize half only.
    pub fn with_serializer(
        mut self,
        token: TypeToken,
        serializer: impl Serializer + 'static,
    ) -> Self {
        self.serializers.insert(token, Arc::new(serializer));
        self
    }

    /// Registers the deserialize half only.
    pub fn with_deserializer(
        mut self,
        token: TypeToken,
        deserializer: impl Deserializer + 'static,
    ) -> Self {
        self.deserializers.insert(token, Arc::new(deserializer));
        self
    }

    /// Appends a factory to the ordered list, ahead of the built-ins.
    pub fn with_factory(mut self, factory: impl Factory + 'static) -> Self {
        self.factories.push(Arc::new(factory));
        self
    }

    /// Appends a custom chain link, after runtime-type redirection and
    /// before the view layer.
    pub fn with_link(mut self, link: impl ChainLink + 'static) -> Self {
        self.links.push(ChainedFactory::new(link));
        self
    }

    /// Names `token` for class metadata; the alias resolves back to the
    /// token on read.
    pub fn alias(mut self, name: impl Into<String>, token: TypeToken) -> Self {
        self.aliases.insert(name.into(), token);
        self
    }

    /// Registers the structural shape of a user-defined type.
    pub fn register_bean(mut self, token: TypeToken, descriptor: BeanDescriptor) -> Self {
        self.beans.register(token, descriptor);
        self
    }

    /// Registers an enumeration's symbolic names.
    pub fn register_enum(mut self, descriptor: EnumDescriptor) -> Self {
        self.enums.register(descriptor);
        self
    }

    /// Registers an alternate serialization shape for `token` under a view
    /// name, selectable per call.
    pub fn register_view(
        mut self,
        view: impl Into<String>,
        token: TypeToken,
        descriptor: BeanDescriptor,
    ) -> Self {
        self.views
            .entry(view.into())
            .or_default()
            .insert(token, Arc::new(descriptor));
        self.use_views = true;
        self
    }

    // -------------------------------------------------------------------------
    // Policy toggles

    pub fn use_class_metadata(mut self, enabled: bool) -> Self {
        self.use_class_metadata = enabled;
        self
    }

    /// Writes metadata even when static and runtime types agree. Implies
    /// class metadata.
    pub fn use_class_metadata_with_static_type(mut self, enabled: bool) -> Self {
        self.class_metadata_with_static_type = enabled;
        if enabled {
            self.use_class_metadata = true;
        }
        self
    }

    pub fn fail_on_null_primitive(mut self, enabled: bool) -> Self {
        self.fail_on_null_primitive = enabled;
        self
    }

    /// Dates as epoch milliseconds (default) or RFC 3339 text.
    pub fn use_dates_as_timestamps(mut self, enabled: bool) -> Self {
        self.use_dates_as_timestamps = enabled;
        self
    }

    /// Byte buffers as arrays of small integers instead of base64.
    pub fn use_bytes_as_int_array(mut self, enabled: bool) -> Self {
        self.use_bytes_as_int_array = enabled;
        self
    }

    pub fn use_case_insensitive_enums(mut self, enabled: bool) -> Self {
        self.use_case_insensitive_enums = enabled;
        self
    }

    /// A non-array token deserializing into a list target yields a
    /// one-element collection.
    pub fn accept_single_value_as_list(mut self, enabled: bool) -> Self {
        self.accept_single_value_as_list = enabled;
        self
    }

    pub fn use_views(mut self, enabled: bool) -> Self {
        self.use_views = enabled;
        self
    }

    /// Wraps serialized root values under `serialize_under` and unwraps
    /// `deserialize_from` on read.
    pub fn wrap_root_values(
        mut self,
        serialize_under: impl Into<String>,
        deserialize_from: impl Into<String>,
    ) -> Self {
        self.wrap_root = Some((serialize_under.into(), deserialize_from.into()));
        self
    }

    // -------------------------------------------------------------------------
    // Assembly

    /// Assembles the factory chain and produces the engine.
    pub fn create(self) -> JsonBind {
        let beans = Arc::new(self.beans);
        let enums = Arc::new(self.enums);

        let mut factories = self.factories;
        if self.accept_single_value_as_list {
            factories.push(Arc::new(SingleValueAsListFactory));
        }
        factories.push(Arc::new(ListFactory));
        factories.push(Arc::new(MapFactory));
        factories.push(Arc::new(OptionalFactory));
        factories.push(Arc::new(EnumFactory::new(
            enums.clone(),
            self.use_case_insensitive_enums,
        )));
        factories.push(Arc::new(PrimitiveFactory));
        factories.push(Arc::new(MiscFactory {
            dates_as_timestamps: self.use_dates_as_timestamps,
            bytes_as_int_array: self.use_bytes_as_int_array,
        }));

        let resolution = ChainedFactory::new(ResolutionLink::new(
            self.converters,
            self.serializers,
            self.deserializers,
            factories,
            beans.clone(),
        ));

        let mut chain = ChainedFactory::new(CycleBreakingLink::new());
        chain.append(ChainedFactory::new(NullPolicyLink::new(
            self.fail_on_null_primitive,
        )));
        if self.use_class_metadata {
            chain.append(ChainedFactory::new(ClassMetadataLink::new(
                self.class_metadata_with_static_type,
            )));
        }
        chain.append(ChainedFactory::new(RuntimeTypeLink));
        for link in self.links {
            chain.append(link);
        }
        if self.use_views {
            chain.append(ChainedFactory::new(BeanViewLink));
        }
        chain.append(resolution);

        JsonBind::from_config(EngineConfig {
            chain,
            aliases: self.aliases,
            beans,
            enums,
            views: self.views,
            with_class_metadata: self.use_class_metadata,
            wrap_root: self.wrap_root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::any::Any;
    use core::fmt;
    use std::sync::Mutex;

    use serde_json::json;

    use crate::bean::{accessor, constructor};
    use crate::convert::{Context, FactoryKind, Markers, Produced};
    use crate::error::{Error, Result};
    use crate::stream::{ObjectReader, ObjectWriter};
    use crate::value::{
        boxed, BigDecimal, BigInteger, Bytes, Dynamic, DynamicObject, DynamicRef, DynamicValue,
        DynamicVariant, FromDynamic, Null, Tokenized,
    };

    // -------------------------------------------------------------------------
    // Fixtures

    #[derive(Debug, Clone, PartialEq)]
    struct Person {
        name: String,
        age: i32,
    }

    impl Dynamic for Person {
        fn token(&self) -> TypeToken {
            TypeToken::class("Person")
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn dynamic_ref(&self) -> DynamicRef<'_> {
            DynamicRef::Object
        }
    }

    impl Tokenized for Person {
        fn static_token() -> TypeToken {
            TypeToken::class("Person")
        }
    }

    fn person_descriptor() -> BeanDescriptor {
        BeanDescriptor::new("Person")
            .property(
                "name",
                TypeToken::String,
                accessor::<Person, _>(|p| boxed(p.name.clone())),
            )
            .property(
                "age",
                TypeToken::Int,
                accessor::<Person, _>(|p| boxed(p.age)),
            )
            .constructor(constructor::<Person, _>(|object| {
                Ok(Person {
                    name: object
                        .get("name")
                        .map(String::from_dynamic)
                        .transpose()?
                        .unwrap_or_default(),
                    age: object
                        .get("age")
                        .map(i32::from_dynamic)
                        .transpose()?
                        .unwrap_or_default(),
                })
            }))
    }

    fn person_engine() -> JsonBind {
        JsonBindBuilder::new()
            .register_bean(Person::static_token(), person_descriptor())
            .create()
    }

    // -------------------------------------------------------------------------
    // Leaf round-trips

    #[test]
    fn list_of_int_round_trip() {
        let jb = JsonBindBuilder::new().create();
        let doc = jb.to_value(&vec![1i32, 2, 3]).unwrap();
        assert_eq!(doc, json!([1, 2, 3]));

        let back: Vec<i32> = jb.from_value_as(doc).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }

    #[test]
    fn scalar_round_trips() {
        let jb = JsonBindBuilder::new().create();

        assert_eq!(jb.to_value(&true).unwrap(), json!(true));
        assert_eq!(jb.to_value(&"hi".to_owned()).unwrap(), json!("hi"));
        assert_eq!(jb.to_value(&9_000_000_000i64).unwrap(), json!(9_000_000_000i64));
        assert_eq!(jb.to_value(&2.5f64).unwrap(), json!(2.5));

        let short: i16 = jb.from_value_as(json!(12)).unwrap();
        assert_eq!(short, 12);
        assert!(jb.from_value_as::<i16>(json!(70_000)).is_err());
    }

    #[test]
    fn non_finite_doubles_round_trip_via_text() {
        let jb = JsonBindBuilder::new().create();
        let doc = jb.to_value(&f64::NAN).unwrap();
        assert_eq!(doc, json!("NaN"));
        let back: f64 = jb.from_value_as(doc).unwrap();
        assert!(back.is_nan());

        let back: f64 = jb.from_value_as(json!("-Infinity")).unwrap();
        assert_eq!(back, f64::NEG_INFINITY);
    }

    #[test]
    fn char_round_trips_as_escape_form() {
        let jb = JsonBindBuilder::new().create();
        let doc = jb.to_value(&'A').unwrap();
        assert_eq!(doc, json!("\\u0041"));
        let back: char = jb.from_value_as(doc).unwrap();
        assert_eq!(back, 'A');

        let plain: char = jb.from_value_as(json!("z")).unwrap();
        assert_eq!(plain, 'z');
        assert!(jb.from_value_as::<char>(json!("zz")).is_err());
    }

    #[test]
    fn strict_scalar_parses_fail_hard() {
        let jb = JsonBindBuilder::new().create();
        assert!(jb.from_value_as::<uuid::Uuid>(json!("not-a-uuid")).is_err());
        assert!(jb.from_value_as::<BigInteger>(json!("12x")).is_err());
        assert!(jb.from_value_as::<BigDecimal>(json!("1..2")).is_err());

        let big: BigInteger = jb
            .from_value_as(json!("123456789012345678901234567890"))
            .unwrap();
        assert_eq!(big.as_str(), "123456789012345678901234567890");

        let id = uuid::Uuid::new_v4();
        let doc = jb.to_value(&id).unwrap();
        assert_eq!(jb.from_value_as::<uuid::Uuid>(doc).unwrap(), id);
    }

    #[test]
    fn dates_as_timestamps_and_text() {
        use chrono::{DateTime, TimeZone, Utc};

        let moment = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();

        let jb = JsonBindBuilder::new().create();
        let doc = jb.to_value(&moment).unwrap();
        assert_eq!(doc, json!(moment.timestamp_millis()));
        let back: DateTime<Utc> = jb.from_value_as(doc).unwrap();
        assert_eq!(back, moment);

        let jb = JsonBindBuilder::new().use_dates_as_timestamps(false).create();
        let doc = jb.to_value(&moment).unwrap();
        assert!(doc.is_string());
        let back: DateTime<Utc> = jb.from_value_as(doc).unwrap();
        assert_eq!(back, moment);

        assert!(jb.from_value_as::<DateTime<Utc>>(json!("yesterday")).is_err());
    }

    #[test]
    fn bytes_as_base64_and_int_array() {
        let payload = Bytes(vec![0, 127, 255]);

        let jb = JsonBindBuilder::new().create();
        let doc = jb.to_value(&payload).unwrap();
        assert!(doc.is_string());
        let back: Bytes = jb.from_value_as(doc).unwrap();
        assert_eq!(back, payload);

        let jb = JsonBindBuilder::new().use_bytes_as_int_array(true).create();
        let doc = jb.to_value(&payload).unwrap();
        assert_eq!(doc, json!([0, 127, -1]));
        let back: Bytes = jb.from_value_as(doc).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn optionals_serialize_as_value_member() {
        let jb = JsonBindBuilder::new().create();

        let doc = jb.to_value(&Some(5i32)).unwrap();
        assert_eq!(doc, json!({"value": 5}));
        let back: Option<i32> = jb.from_value_as(doc).unwrap();
        assert_eq!(back, Some(5));

        let doc = jb.to_value(&None::<i32>).unwrap();
        assert_eq!(doc, json!({}));
        let back: Option<i32> = jb.from_value_as(doc).unwrap();
        assert_eq!(back, None);
    }

    #[test]
    fn maps_with_primitive_like_keys_use_the_string_codec() {
        use std::collections::BTreeMap;

        let jb = JsonBindBuilder::new().create();
        let mut map = BTreeMap::new();
        map.insert(2i64, "two".to_owned());
        map.insert(10i64, "ten".to_owned());

        let doc = jb.to_value(&map).unwrap();
        assert_eq!(doc, json!({"2": "two", "10": "ten"}));

        let back: BTreeMap<i64, String> = jb.from_value_as(doc).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn maps_with_complex_keys_use_the_pair_array_form() {
        let jb = person_engine();
        let doc = json!([
            {"key": {"name": "ada", "age": 36}, "value": 1},
        ]);
        let token = TypeToken::map(Person::static_token(), TypeToken::Int);
        let dynamic = jb.from_value(doc.clone(), &token).unwrap();

        let mapping = dynamic
            .as_any()
            .downcast_ref::<crate::value::DynamicMapping>()
            .unwrap();
        assert_eq!(mapping.entries().len(), 1);

        let round = jb.to_value(mapping).unwrap();
        assert_eq!(round, doc);
    }

    #[test]
    fn enums_round_trip_by_symbolic_name() {
        let jb = JsonBindBuilder::new()
            .register_enum(EnumDescriptor::new("Color", ["RED", "GREEN", "BLUE"]))
            .create();

        let doc = jb.to_value(&DynamicVariant::new("Color", "GREEN")).unwrap();
        assert_eq!(doc, json!("GREEN"));

        let token = TypeToken::enumeration("Color");
        let back = jb.from_value(json!("GREEN"), &token).unwrap();
        let variant = back.as_any().downcast_ref::<DynamicVariant>().unwrap();
        assert_eq!(variant.name(), "GREEN");

        assert!(jb.from_value(json!("green"), &token).is_err());

        let lax = JsonBindBuilder::new()
            .register_enum(EnumDescriptor::new("Color", ["RED", "GREEN", "BLUE"]))
            .use_case_insensitive_enums(true)
            .create();
        let back = lax.from_value(json!("green"), &token).unwrap();
        let variant = back.as_any().downcast_ref::<DynamicVariant>().unwrap();
        assert_eq!(variant.name(), "GREEN");
    }

    #[test]
    fn raw_json_passes_through_verbatim() {
        let jb = JsonBindBuilder::new().use_class_metadata(true).create();
        let raw = json!({"@class": "untouched", "n": null});
        let doc = jb.to_value(&raw).unwrap();
        assert_eq!(doc, raw);

        let back: serde_json::Value = jb.from_value_as(raw.clone()).unwrap();
        assert_eq!(back, raw);
    }

    // -------------------------------------------------------------------------
    // Null policy

    #[test]
    fn default_null_policy_writes_and_defaults() {
        let jb = JsonBindBuilder::new().create();

        assert_eq!(jb.to_value(&Null).unwrap(), json!(null));

        // A null token for an int defaults to zero without the inner
        // converter running.
        let zero: i32 = jb.from_value_as(json!(null)).unwrap();
        assert_eq!(zero, 0);

        let nothing: Option<i32> = jb.from_value_as(json!(null)).unwrap();
        assert_eq!(nothing, None);
    }

    #[test]
    fn fail_on_null_primitive_is_a_hard_error() {
        let jb = JsonBindBuilder::new().fail_on_null_primitive(true).create();
        assert!(matches!(
            jb.from_value_as::<i32>(json!(null)),
            Err(Error::Policy(_))
        ));

        // Non-primitive types are unaffected.
        let nothing: Option<i32> = jb.from_value_as(json!(null)).unwrap();
        assert_eq!(nothing, None);
    }

    // -------------------------------------------------------------------------
    // Beans and self-referential types

    #[test]
    fn bean_round_trip() {
        let jb = person_engine();
        let ada = Person {
            name: "ada".to_owned(),
            age: 36,
        };

        let doc = jb.to_value(&ada).unwrap();
        assert_eq!(doc, json!({"name": "ada", "age": 36}));

        let back: Person = {
            let dynamic = jb.from_value(doc, &Person::static_token()).unwrap();
            dynamic.as_any().downcast_ref::<Person>().unwrap().clone()
        };
        assert_eq!(back, ada);
    }

    #[derive(Clone)]
    struct Chain {
        label: String,
        next: Option<std::sync::Arc<Chain>>,
    }

    impl fmt::Debug for Chain {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("Chain")
        }
    }

    impl Dynamic for Chain {
        fn token(&self) -> TypeToken {
            TypeToken::class("Chain")
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn dynamic_ref(&self) -> DynamicRef<'_> {
            DynamicRef::Object
        }
    }

    impl Tokenized for Chain {
        fn static_token() -> TypeToken {
            TypeToken::class("Chain")
        }
    }

    #[test]
    fn self_referential_type_resolves_and_round_trips() {
        // Chain's "next" property is declared as Chain itself; resolving the
        // converter recurses into the same token and must neither overflow
        // nor deadlock.
        let jb = JsonBindBuilder::new()
            .register_bean(
                Chain::static_token(),
                BeanDescriptor::new("Chain")
                    .property(
                        "label",
                        TypeToken::String,
                        accessor::<Chain, _>(|c| boxed(c.label.clone())),
                    )
                    .property(
                        "next",
                        Chain::static_token(),
                        accessor::<Chain, _>(|c| match &c.next {
                            Some(next) => boxed(next.clone()),
                            None => boxed(Null),
                        }),
                    ),
            )
            .create();

        let converter = jb.provide_converter(&Chain::static_token()).unwrap();
        let again = jb.provide_converter(&Chain::static_token()).unwrap();
        assert!(std::sync::Arc::ptr_eq(&converter, &again));

        let list = Chain {
            label: "head".to_owned(),
            next: Some(std::sync::Arc::new(Chain {
                label: "tail".to_owned(),
                next: None,
            })),
        };
        let doc = jb.to_value(&list).unwrap();
        assert_eq!(
            doc,
            json!({"label": "head", "next": {"label": "tail", "next": null}})
        );

        let dynamic = jb.from_value(doc, &Chain::static_token()).unwrap();
        let object = dynamic.as_any().downcast_ref::<DynamicObject>().unwrap();
        assert_eq!(
            object.get("label").map(String::from_dynamic).transpose().unwrap(),
            Some("head".to_owned())
        );
    }

    // -------------------------------------------------------------------------
    // Polymorphism and class metadata

    #[test]
    fn class_metadata_round_trips_the_runtime_type() {
        let jb = JsonBindBuilder::new()
            .register_bean(TypeToken::class("Shape"), BeanDescriptor::new("Shape"))
            .register_bean(Person::static_token(), person_descriptor())
            .use_class_metadata_with_static_type(true)
            .create();

        let ada = Person {
            name: "ada".to_owned(),
            age: 36,
        };
        let doc = jb.to_value(&ada).unwrap();
        let keys: Vec<&str> = doc.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["@class", "name", "age"]);
        assert_eq!(doc["@class"], json!("Person"));

        // Deserializing into an unrelated static type follows the metadata.
        let dynamic = jb.from_value(doc, &TypeToken::class("Shape")).unwrap();
        let back = dynamic.as_any().downcast_ref::<Person>().unwrap();
        assert_eq!(*back, ada);
    }

    #[test]
    fn metadata_lands_only_on_object_shaped_values() {
        let jb = JsonBindBuilder::new()
            .register_bean(Person::static_token(), person_descriptor())
            .use_class_metadata_with_static_type(true)
            .create();

        let ada = Person {
            name: "ada".to_owned(),
            age: 36,
        };
        let token = TypeToken::map(Person::static_token(), TypeToken::Int);
        let mapping = crate::value::DynamicMapping::new(
            token.clone(),
            vec![(boxed(ada.clone()), boxed(1i32))],
        );

        // The pair-array entry wrappers must not receive the map's own
        // class name; only the bean key carries one.
        let expected = json!([
            {"key": {"@class": "Person", "name": "ada", "age": 36}, "value": 1},
        ]);
        assert_eq!(jb.to_value(&mapping).unwrap(), expected);

        // Same map reached from an untyped position.
        let holder = crate::value::DynamicSequence::new(
            TypeToken::list(TypeToken::Any),
            vec![boxed(crate::value::DynamicMapping::new(
                token.clone(),
                vec![(boxed(ada), boxed(1i32))],
            ))],
        );
        assert_eq!(jb.to_value(&holder).unwrap(), json!([expected.clone()]));

        // Non-object leaves and arrays stay bare.
        assert_eq!(jb.to_value(&vec![1i32, 2]).unwrap(), json!([1, 2]));

        let dynamic = jb.from_value(expected, &token).unwrap();
        let mapping = dynamic
            .as_any()
            .downcast_ref::<crate::value::DynamicMapping>()
            .unwrap();
        assert_eq!(mapping.entries().len(), 1);
    }

    #[test]
    fn untyped_values_round_trip_through_class_metadata() {
        let jb = JsonBindBuilder::new()
            .register_bean(Person::static_token(), person_descriptor())
            .use_class_metadata_with_static_type(true)
            .create();

        let token = TypeToken::list(TypeToken::Any);
        let doc = jb
            .to_value(&crate::value::DynamicSequence::new(
                token.clone(),
                vec![boxed(Person {
                    name: "ada".to_owned(),
                    age: 36,
                })],
            ))
            .unwrap();
        assert_eq!(doc, json!([{"@class": "Person", "name": "ada", "age": 36}]));

        // The class name picks the concrete shape back out of `any`.
        let back = jb.from_value(doc, &token).unwrap();
        let seq = back
            .as_any()
            .downcast_ref::<crate::value::DynamicSequence>()
            .unwrap();
        let person = seq.items()[0].as_any().downcast_ref::<Person>().unwrap();
        assert_eq!(person.name, "ada");
        assert_eq!(person.age, 36);
    }

    #[test]
    fn metadata_aliases_resolve_both_ways() {
        let jb = JsonBindBuilder::new()
            .register_bean(Person::static_token(), person_descriptor())
            .alias("person-v1", Person::static_token())
            .use_class_metadata_with_static_type(true)
            .create();

        let doc = jb
            .to_value(&Person {
                name: "ada".to_owned(),
                age: 36,
            })
            .unwrap();
        assert_eq!(doc["@class"], json!("person-v1"));

        let dynamic = jb.from_value(doc, &Person::static_token()).unwrap();
        assert!(dynamic.as_any().downcast_ref::<Person>().is_some());
    }

    #[test]
    fn unresolvable_metadata_name_fails_hard() {
        let jb = JsonBindBuilder::new()
            .register_bean(Person::static_token(), person_descriptor())
            .use_class_metadata(true)
            .create();

        let doc = json!({"@class": "Vanished", "name": "x", "age": 1});
        assert!(jb.from_value(doc, &Person::static_token()).is_err());
    }

    // -------------------------------------------------------------------------
    // Runtime-type redirection and value cycles

    struct Node {
        next: Mutex<Option<std::sync::Arc<Node>>>,
    }

    impl fmt::Debug for Node {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("Node")
        }
    }

    impl Dynamic for Node {
        fn token(&self) -> TypeToken {
            TypeToken::class("Node")
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn dynamic_ref(&self) -> DynamicRef<'_> {
            DynamicRef::Object
        }
    }

    impl Tokenized for Node {
        fn static_token() -> TypeToken {
            TypeToken::class("Node")
        }
    }

    fn node_engine() -> JsonBind {
        // "next" is declared untyped, so every hop goes through the
        // runtime-type redirect and its identity bookkeeping.
        JsonBindBuilder::new()
            .register_bean(
                Node::static_token(),
                BeanDescriptor::new("Node").property(
                    "next",
                    TypeToken::Any,
                    accessor::<Node, _>(|node| match &*node.next.lock().unwrap() {
                        Some(next) => boxed(next.clone()),
                        None => boxed(Null),
                    }),
                ),
            )
            .create()
    }

    #[test]
    fn reference_cycle_raises_a_cycle_error() {
        let jb = node_engine();
        let node = std::sync::Arc::new(Node {
            next: Mutex::new(None),
        });
        *node.next.lock().unwrap() = Some(node.clone());

        let result = jb.to_value(&node);
        assert!(matches!(result, Err(Error::CyclicGraph(_))));

        // Break the cycle so the Arc can drop.
        *node.next.lock().unwrap() = None;
    }

    #[test]
    fn repeated_instance_on_sibling_branches_serializes_twice() {
        let jb = node_engine();
        let shared = std::sync::Arc::new(Node {
            next: Mutex::new(None),
        });
        let pair = vec![shared.clone(), shared];

        let doc = jb.to_value(&pair).unwrap();
        assert_eq!(doc, json!([{"next": null}, {"next": null}]));
    }

    /// Cycle detection keys on runtime-type redirection, and containers are
    /// exempt from redirection: a cycle reachable only through lists or
    /// maps is therefore not detected. Known limitation, preserved
    /// deliberately.
    #[test]
    fn value_cycles_through_containers_are_not_detected() {
        assert!(TypeToken::list(TypeToken::Any).is_container());
        assert!(TypeToken::map(TypeToken::String, TypeToken::Any).is_container());

        // A container value reached from an untyped position delegates to
        // its structural converter without entering the identity set.
        let jb = JsonBindBuilder::new().create();
        let nested: Vec<Vec<i32>> = vec![vec![1], vec![2]];
        let holder: Vec<DynamicValue> = vec![boxed(nested)];
        let seq = crate::value::DynamicSequence::new(
            TypeToken::list(TypeToken::Any),
            holder,
        );
        assert_eq!(jb.to_value(&seq).unwrap(), json!([[[1], [2]]]));
    }

    // -------------------------------------------------------------------------
    // Ordering and overrides

    struct FixedInt;

    impl Markers for FixedInt {}

    impl crate::convert::Serializer for FixedInt {
        fn serialize(
            &self,
            _value: &dyn Dynamic,
            writer: &mut dyn ObjectWriter,
            _ctx: &mut Context<'_>,
        ) -> Result<()> {
            writer.write_i64(42)
        }
    }

    impl crate::convert::Deserializer for FixedInt {
        fn deserialize(
            &self,
            _reader: &mut dyn ObjectReader,
            _ctx: &mut Context<'_>,
        ) -> Result<DynamicValue> {
            Ok(boxed(42i32))
        }
    }

    struct FixedIntFactory;

    impl Factory for FixedIntFactory {
        fn kind(&self) -> FactoryKind {
            FactoryKind::Converter
        }

        fn accepts(&self, token: &TypeToken) -> bool {
            *token == TypeToken::Int
        }

        fn create(&self, _token: &TypeToken, _engine: &JsonBind) -> Result<Option<Produced>> {
            Ok(Some(Produced::Converter(std::sync::Arc::new(FixedInt))))
        }
    }

    #[test]
    fn user_factory_pre_empts_the_built_in() {
        let jb = JsonBindBuilder::new().with_factory(FixedIntFactory).create();
        assert_eq!(jb.to_value(&7i32).unwrap(), json!(42));
    }

    #[test]
    fn explicit_converter_pre_empts_every_factory() {
        let jb = JsonBindBuilder::new()
            .with_converter(TypeToken::Int, FixedInt)
            .create();
        assert_eq!(jb.to_value(&7i32).unwrap(), json!(42));
        let back: i32 = jb.from_value_as(json!(7)).unwrap();
        assert_eq!(back, 42);
    }

    // -------------------------------------------------------------------------
    // Modes

    #[test]
    fn single_value_as_list_accepts_scalars() {
        let jb = JsonBindBuilder::new().accept_single_value_as_list(true).create();

        let one: Vec<i32> = jb.from_value_as(json!(5)).unwrap();
        assert_eq!(one, vec![5]);

        let many: Vec<i32> = jb.from_value_as(json!([1, 2])).unwrap();
        assert_eq!(many, vec![1, 2]);
    }

    #[test]
    fn wrapped_roots_round_trip() {
        let jb = JsonBindBuilder::new().wrap_root_values("data", "data").create();

        let doc = jb.to_value(&vec![1i32, 2]).unwrap();
        assert_eq!(doc, json!({"data": [1, 2]}));

        let back: Vec<i32> = jb.from_value_as(doc).unwrap();
        assert_eq!(back, vec![1, 2]);

        assert!(jb.from_value_as::<Vec<i32>>(json!([1, 2])).is_err());
    }

    #[test]
    fn views_reshape_without_touching_the_default() {
        let jb = JsonBindBuilder::new()
            .register_bean(Person::static_token(), person_descriptor())
            .register_view(
                "public",
                Person::static_token(),
                BeanDescriptor::new("Person").property(
                    "name",
                    TypeToken::String,
                    accessor::<Person, _>(|p| boxed(p.name.clone())),
                ),
            )
            .create();

        let ada = Person {
            name: "ada".to_owned(),
            age: 36,
        };
        assert_eq!(
            jb.to_value(&ada).unwrap(),
            json!({"name": "ada", "age": 36})
        );
        assert_eq!(
            jb.to_value_with_views(&ada, &["public"]).unwrap(),
            json!({"name": "ada"})
        );
    }

    #[test]
    fn untyped_positions_dispatch_by_runtime_and_token_kind() {
        let jb = JsonBindBuilder::new().create();

        // Serialize through the runtime token.
        let doc = jb
            .to_value(&crate::value::DynamicSequence::new(
                TypeToken::list(TypeToken::Any),
                vec![boxed(1i32), boxed("two".to_owned()), boxed(true)],
            ))
            .unwrap();
        assert_eq!(doc, json!([1, "two", true]));

        // Deserialize by token kind, narrowest number first.
        let back = jb
            .from_value(json!([1, 9_000_000_000i64, 1.5, "x"]), &TypeToken::list(TypeToken::Any))
            .unwrap();
        let seq = back
            .as_any()
            .downcast_ref::<crate::value::DynamicSequence>()
            .unwrap();
        let items = seq.items();
        assert!(items[0].as_any().downcast_ref::<i32>().is_some());
        assert!(items[1].as_any().downcast_ref::<i64>().is_some());
        assert!(items[2].as_any().downcast_ref::<f64>().is_some());
        assert!(items[3].as_any().downcast_ref::<String>().is_some());
    }
}
