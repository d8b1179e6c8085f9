use core::any::Any;
use std::sync::Arc;

use crate::convert::Converter;
use crate::engine::JsonBind;
use crate::error::{Error, Result};
use crate::token::TypeToken;

// -----------------------------------------------------------------------------
// ChainLink

/// The subclass-specific part of a chained factory node.
///
/// Most links only implement [`decorate`](ChainLink::decorate): the node
/// resolves the inner converter from the rest of the chain and offers it to
/// the link, which either wraps it or passes it through unchanged. A link
/// that needs to intercept resolution *before* the chain descends — the
/// cycle-breaking head — overrides [`around`](ChainLink::around) instead.
pub trait ChainLink: Send + Sync {
    /// Wraps `inner` in a decorator, or declines with `Ok(None)` to pass the
    /// inner converter through unchanged.
    ///
    /// `inner` is `None` when this link is the last element of the chain; a
    /// terminal link must tolerate that.
    fn decorate(
        &self,
        token: &TypeToken,
        engine: &JsonBind,
        inner: Option<Arc<dyn Converter>>,
    ) -> Result<Option<Arc<dyn Converter>>>;

    /// Wraps the whole downstream resolution for `token`.
    fn around(
        &self,
        token: &TypeToken,
        engine: &JsonBind,
        downstream: Downstream<'_>,
    ) -> Result<Option<Arc<dyn Converter>>> {
        let inner = downstream.create(token, engine)?;
        match self.decorate(token, engine, inner.clone())? {
            Some(outer) => Ok(Some(outer)),
            None => Ok(inner),
        }
    }

    /// Upcast for [`ChainedFactory::find_link`].
    fn as_any(&self) -> &dyn Any;
}

/// The portion of the chain after the current link.
pub struct Downstream<'a> {
    next: Option<&'a ChainedFactory>,
}

impl Downstream<'_> {
    pub fn create(
        &self,
        token: &TypeToken,
        engine: &JsonBind,
    ) -> Result<Option<Arc<dyn Converter>>> {
        match self.next {
            Some(factory) => factory.create(token, engine),
            None => Ok(None),
        }
    }
}

// -----------------------------------------------------------------------------
// ChainedFactory

/// A node in the singly linked factory chain.
///
/// The chain is assembled once, before first use, and never mutated after.
/// [`with_next`](ChainedFactory::with_next) refuses to overwrite an existing
/// forward link so that factories composed from several configuration call
/// sites cannot silently displace one another;
/// [`append`](ChainedFactory::append) extends at the tail without disturbing
/// interior order.
pub struct ChainedFactory {
    link: Arc<dyn ChainLink>,
    next: Option<Box<ChainedFactory>>,
}

impl ChainedFactory {
    pub fn new(link: impl ChainLink + 'static) -> Self {
        Self {
            link: Arc::new(link),
            next: None,
        }
    }

    /// Links `next` directly after this node; errors if a forward link
    /// already exists.
    pub fn with_next(mut self, next: ChainedFactory) -> Result<Self> {
        if self.next.is_some() {
            return Err(Error::ChainAlreadyLinked);
        }
        self.next = Some(Box::new(next));
        Ok(self)
    }

    /// Appends `next` after the current tail.
    pub fn append(&mut self, next: ChainedFactory) {
        let mut tail = self;
        while let Some(ref mut node) = tail.next {
            tail = node;
        }
        tail.next = Some(Box::new(next));
    }

    /// Locates a link of concrete type `T` anywhere in the chain.
    pub fn find_link<T: ChainLink + 'static>(&self) -> Option<&T> {
        let mut node = Some(self);
        while let Some(current) = node {
            if let Some(link) = current.link.as_any().downcast_ref::<T>() {
                return Some(link);
            }
            node = current.next.as_deref();
        }
        None
    }

    /// Resolves a converter for `token`, driving this link and the rest of
    /// the chain.
    pub fn create(
        &self,
        token: &TypeToken,
        engine: &JsonBind,
    ) -> Result<Option<Arc<dyn Converter>>> {
        tracing::trace!(%token, "walking factory chain link");
        self.link.around(
            token,
            engine,
            Downstream {
                next: self.next.as_deref(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::JsonBindBuilder;
    use crate::convert::{Context, Markers, Serializer};
    use crate::error::Result;
    use crate::stream::ObjectWriter;
    use crate::value::{boxed, Dynamic, DynamicValue};

    struct Tag(&'static str);

    impl Markers for Tag {}

    impl Serializer for Tag {
        fn serialize(
            &self,
            _value: &dyn Dynamic,
            writer: &mut dyn ObjectWriter,
            _ctx: &mut Context<'_>,
        ) -> Result<()> {
            writer.write_string(self.0)
        }
    }

    impl crate::convert::Deserializer for Tag {
        fn deserialize(
            &self,
            _reader: &mut dyn crate::stream::ObjectReader,
            _ctx: &mut Context<'_>,
        ) -> Result<DynamicValue> {
            Ok(boxed(self.0.to_owned()))
        }
    }

    struct TagLink(&'static str);

    impl ChainLink for TagLink {
        fn decorate(
            &self,
            _token: &TypeToken,
            _engine: &JsonBind,
            inner: Option<Arc<dyn Converter>>,
        ) -> Result<Option<Arc<dyn Converter>>> {
            match inner {
                // Pass-through when something downstream already resolved.
                Some(_) => Ok(None),
                None => Ok(Some(Arc::new(Tag(self.0)))),
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct OtherLink;

    impl ChainLink for OtherLink {
        fn decorate(
            &self,
            _token: &TypeToken,
            _engine: &JsonBind,
            _inner: Option<Arc<dyn Converter>>,
        ) -> Result<Option<Arc<dyn Converter>>> {
            Ok(None)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn with_next_refuses_overwrite() {
        let linked = ChainedFactory::new(TagLink("a"))
            .with_next(ChainedFactory::new(TagLink("b")))
            .unwrap();
        assert!(matches!(
            linked.with_next(ChainedFactory::new(TagLink("c"))),
            Err(Error::ChainAlreadyLinked)
        ));
    }

    #[test]
    fn append_extends_at_the_tail() {
        let engine = JsonBindBuilder::new().create();
        let mut chain = ChainedFactory::new(OtherLink);
        chain.append(ChainedFactory::new(TagLink("tail")));
        chain.append(ChainedFactory::new(TagLink("later")));

        // Resolution descends to the deepest link first, so the tail-most
        // producer supplies the base converter; earlier links only get to
        // decorate it.
        let conv = chain
            .create(&TypeToken::Int, &engine)
            .unwrap()
            .unwrap();
        let mut w = crate::stream::JsonValueWriter::new();
        let mut ctx = Context::new(&engine);
        conv.serialize(&1i32, &mut w, &mut ctx).unwrap();
        assert_eq!(w.finish().unwrap(), serde_json::json!("later"));
    }

    #[test]
    fn find_link_locates_by_type() {
        let mut chain = ChainedFactory::new(OtherLink);
        chain.append(ChainedFactory::new(TagLink("x")));
        assert!(chain.find_link::<TagLink>().is_some());
        assert!(chain.find_link::<OtherLink>().is_some());

        let solo = ChainedFactory::new(OtherLink);
        assert!(solo.find_link::<TagLink>().is_none());
    }
}
