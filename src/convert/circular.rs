use core::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::convert::{
    ChainLink, Context, Converter, Deserializer, Downstream, Markers, Serializer,
};
use crate::engine::JsonBind;
use crate::error::{Error, Result};
use crate::stream::{ObjectReader, ObjectWriter};
use crate::token::TypeToken;
use crate::value::{Dynamic, DynamicValue};

// -----------------------------------------------------------------------------
// CycleBreakingLink

/// The head of the factory chain: breaks infinite recursion through
/// self-referential type graphs.
///
/// While a converter for type `T` is being built, a recursive request for
/// `T` on the same thread receives a forwarding stand-in instead of
/// descending the chain again. Once the real converter is ready it is bound
/// into the stand-in, and every forwarding reference created during the
/// build starts delegating to it. Entries are scoped to the resolving
/// thread; they live only for the duration of that type's top-level
/// resolution and are removed whether the build succeeds or fails.
pub struct CycleBreakingLink {
    pending: Mutex<HashMap<(ThreadId, TypeToken), Arc<ForwardingConverter>>>,
}

impl CycleBreakingLink {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for CycleBreakingLink {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainLink for CycleBreakingLink {
    fn decorate(
        &self,
        _token: &TypeToken,
        _engine: &JsonBind,
        inner: Option<Arc<dyn Converter>>,
    ) -> Result<Option<Arc<dyn Converter>>> {
        Ok(inner)
    }

    fn around(
        &self,
        token: &TypeToken,
        engine: &JsonBind,
        downstream: Downstream<'_>,
    ) -> Result<Option<Arc<dyn Converter>>> {
        let key = (thread::current().id(), token.clone());

        let placeholder = {
            let mut pending = self.pending.lock();
            if let Some(existing) = pending.get(&key) {
                // Recursive request for a type whose build is in progress on
                // this thread: hand out the stand-in instead of descending.
                debug!(%token, "reusing forwarding stand-in for in-progress build");
                return Ok(Some(existing.clone()));
            }
            let fresh = Arc::new(ForwardingConverter::new(token.clone()));
            pending.insert(key.clone(), fresh.clone());
            fresh
        };

        let result = downstream.create(token, engine);
        self.pending.lock().remove(&key);

        match result {
            Ok(Some(real)) => {
                placeholder.bind(&real);
                Ok(Some(real))
            }
            Ok(None) => {
                placeholder.fail();
                Ok(None)
            }
            Err(error) => {
                placeholder.fail();
                Err(error)
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// -----------------------------------------------------------------------------
// ForwardingConverter

enum Slot {
    Unbound,
    // Weak: the bound pipeline owns this stand-in as one of its member
    // converters, so a strong reference here would never be reclaimed.
    Bound(Weak<dyn Converter>),
    Failed,
}

/// The forwarding stand-in handed out while a converter is being built.
///
/// Invocations arriving before binding completes block on a one-shot latch;
/// a failed build releases waiters into a hard binding error rather than a
/// stale or default converter. The stand-in holds its target weakly; the
/// engine cache keeps the target alive for as long as it is reachable.
pub struct ForwardingConverter {
    token: TypeToken,
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl ForwardingConverter {
    fn new(token: TypeToken) -> Self {
        Self {
            token,
            slot: Mutex::new(Slot::Unbound),
            ready: Condvar::new(),
        }
    }

    fn bind(&self, real: &Arc<dyn Converter>) {
        *self.slot.lock() = Slot::Bound(Arc::downgrade(real));
        self.ready.notify_all();
    }

    fn fail(&self) {
        let mut slot = self.slot.lock();
        if matches!(*slot, Slot::Unbound) {
            *slot = Slot::Failed;
        }
        self.ready.notify_all();
    }

    fn delegate(&self) -> Result<Arc<dyn Converter>> {
        let mut slot = self.slot.lock();
        while matches!(*slot, Slot::Unbound) {
            self.ready.wait(&mut slot);
        }
        match &*slot {
            Slot::Bound(real) => real.upgrade().ok_or_else(|| {
                Error::binding(&self.token, "the converter this stand-in forwards to was dropped")
            }),
            _ => Err(Error::binding(
                &self.token,
                "the build this stand-in was forwarding to failed",
            )),
        }
    }
}

impl Markers for ForwardingConverter {}

impl Serializer for ForwardingConverter {
    fn serialize(
        &self,
        value: &dyn Dynamic,
        writer: &mut dyn ObjectWriter,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        self.delegate()?.serialize(value, writer, ctx)
    }
}

impl Deserializer for ForwardingConverter {
    fn deserialize(
        &self,
        reader: &mut dyn ObjectReader,
        ctx: &mut Context<'_>,
    ) -> Result<DynamicValue> {
        self.delegate()?.deserialize(reader, ctx)
    }
}
