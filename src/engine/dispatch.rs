use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::catalog::ProtocolId;
use super::context::{Context, DispatchConfig, DissectMode, MalformedMarker};
use super::error::{DissectError, Result};
use super::registry::{DissectResult, Handler, HandlerRegistry, Key, ProtocolModule, RegistryBuilder};
use super::tree::FieldTree;
use crate::packet::ByteView;
use crate::state::{ConversationKey, SessionCounters};

/// Stack that must be left before a handler runs in place.
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each heap segment added once the red zone is reached.
const STACK_SEGMENT: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DissectStatus {
    Ok(usize),
    Malformed {
        protocol_id: ProtocolId,
        reason: String,
    },
    RecursionLimitExceeded,
}

/// Everything one top-level dissection produced.
#[derive(Debug, Clone)]
pub struct DissectOutcome {
    pub status: DissectStatus,
    pub consumed: usize,
    pub protocol_counts: HashMap<ProtocolId, u64>,
    pub layers: Vec<ProtocolId>,
    pub summary: Vec<String>,
    pub malformed: Vec<MalformedMarker>,
    pub conversation_key: Option<ConversationKey>,
    /// Present only in [`DissectMode::Tree`].
    pub tree: Option<FieldTree>,
}

impl DissectOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, DissectStatus::Ok(_))
    }

    pub fn protocol_count(&self, id: ProtocolId) -> u64 {
        self.protocol_counts.get(&id).copied().unwrap_or(0)
    }
}

/// Keeps `Context::depth` raised for as long as it lives.
struct DepthGuard<'c, 'e> {
    context: &'c mut Context<'e>,
}

impl<'e> Deref for DepthGuard<'_, 'e> {
    type Target = Context<'e>;

    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl DerefMut for DepthGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

impl Drop for DepthGuard<'_, '_> {
    fn drop(&mut self) {
        self.context.depth -= 1;
    }
}

/// Resolves tables, heuristic chains and the default handler against a
/// frozen [`HandlerRegistry`].
///
/// The engine is immutable and can be shared between worker threads; each
/// dissection gets its own [`Context`].
#[derive(Debug, Clone)]
pub struct DispatchEngine {
    registry: Arc<HandlerRegistry>,
    config: DispatchConfig,
}

impl DispatchEngine {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self::with_config(registry, DispatchConfig::default())
    }

    pub fn with_config(registry: HandlerRegistry, config: DispatchConfig) -> Self {
        Self::from_shared(Arc::new(registry), config)
    }

    pub fn from_shared(registry: Arc<HandlerRegistry>, config: DispatchConfig) -> Self {
        Self { registry, config }
    }

    /// Installs `modules` into a fresh registry and freezes it.
    pub fn from_modules(modules: &[&dyn ProtocolModule], config: DispatchConfig) -> Result<Self> {
        let mut builder = RegistryBuilder::new();
        builder.install(modules)?;
        Ok(Self::with_config(builder.freeze()?, config))
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn shared_registry(&self) -> Arc<HandlerRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Dissects one top-level buffer. `reported_len` is the on-the-wire
    /// length; pass `buffer.len()` for untruncated captures.
    pub fn dissect(
        &self,
        root_table: &str,
        root_key: impl Into<Key>,
        buffer: &[u8],
        reported_len: usize,
    ) -> DissectOutcome {
        self.dissect_bytes(
            root_table,
            root_key,
            Bytes::copy_from_slice(buffer),
            reported_len,
        )
    }

    pub fn dissect_bytes(
        &self,
        root_table: &str,
        root_key: impl Into<Key>,
        buffer: Bytes,
        reported_len: usize,
    ) -> DissectOutcome {
        let view = ByteView::with_reported_len(buffer, reported_len);
        self.run(root_table, root_key.into(), &view, self.config.mode)
    }

    pub fn dissect_view(
        &self,
        root_table: &str,
        root_key: impl Into<Key>,
        view: &ByteView,
    ) -> DissectOutcome {
        self.run(root_table, root_key.into(), view, self.config.mode)
    }

    /// Counting-only dissection: same dispatch path, no field tree.
    pub fn count(
        &self,
        root_table: &str,
        root_key: impl Into<Key>,
        buffer: &[u8],
        reported_len: usize,
    ) -> DissectOutcome {
        let view = ByteView::with_reported_len(Bytes::copy_from_slice(buffer), reported_len);
        self.run(root_table, root_key.into(), &view, DissectMode::Count)
    }

    /// Counting pre-scan over a sequence of frames.
    pub fn count_frames<'b, I>(
        &self,
        root_table: &str,
        root_key: impl Into<Key>,
        frames: I,
    ) -> SessionCounters
    where
        I: IntoIterator<Item = &'b [u8]>,
    {
        let root_key = root_key.into();
        let mut counters = SessionCounters::default();
        for frame in frames {
            let outcome = self.count(root_table, root_key.clone(), frame, frame.len());
            counters.fold(&outcome);
        }
        debug!(
            packets = counters.packets(),
            malformed = counters.malformed_packets(),
            "counting pass finished"
        );
        counters
    }

    fn run(&self, root_table: &str, root_key: Key, view: &ByteView, mode: DissectMode) -> DissectOutcome {
        let mut context = Context::new(self, mode);
        let result = self.dispatch(root_table, root_key, view, &mut context);
        context.into_outcome(view, result)
    }

    /// Exact match, then the table's heuristic chain, then the default
    /// handler. Handler failures become malformed markers, so the only
    /// error that escapes is `RecursionLimitExceeded`.
    pub fn dispatch(
        &self,
        table: &str,
        key: impl Into<Key>,
        view: &ByteView,
        context: &mut Context<'_>,
    ) -> std::result::Result<usize, DissectError> {
        let key = key.into();
        let mut guard = self.enter(context)?;
        let context = &mut *guard;

        let anchor = match self.registry.table_by_name(table) {
            Some(dispatch_table) => {
                if let Some(handler) = dispatch_table.lookup(&key) {
                    trace!(table, key = %key, protocol = %handler.id(), "exact match");
                    return Ok(self.invoke(handler, view, context, false)?.unwrap_or(0));
                }
                dispatch_table.fallback_anchor()
            }
            None => {
                warn!(table, key = %key, "dispatch into unregistered table");
                table
            }
        };

        if let Some(consumed) = self.probe_chain(anchor, view, context)? {
            return Ok(consumed);
        }

        trace!(table, key = %key, "unclaimed, using default handler");
        let handler = self.registry.default_handler();
        Ok(self.invoke(handler, view, context, false)?.unwrap_or(0))
    }

    pub fn try_table(
        &self,
        table: &str,
        key: impl Into<Key>,
        view: &ByteView,
        context: &mut Context<'_>,
    ) -> std::result::Result<Option<usize>, DissectError> {
        let key = key.into();
        let mut guard = self.enter(context)?;

        match self.registry.lookup_by_name(table, &key) {
            Some(handler) => {
                trace!(table, key = %key, protocol = %handler.id(), "exact match");
                self.invoke(handler, view, &mut guard, false)
            }
            None => Ok(None),
        }
    }

    pub fn try_heuristic(
        &self,
        anchor: &str,
        view: &ByteView,
        context: &mut Context<'_>,
    ) -> std::result::Result<Option<usize>, DissectError> {
        let mut guard = self.enter(context)?;
        self.probe_chain(anchor, view, &mut guard)
    }

    pub fn call_data(
        &self,
        view: &ByteView,
        context: &mut Context<'_>,
    ) -> std::result::Result<usize, DissectError> {
        let mut guard = self.enter(context)?;
        let handler = self.registry.default_handler();
        Ok(self.invoke(handler, view, &mut guard, false)?.unwrap_or(0))
    }

    pub fn call_named(
        &self,
        name: &str,
        view: &ByteView,
        context: &mut Context<'_>,
    ) -> std::result::Result<Option<usize>, DissectError> {
        let mut guard = self.enter(context)?;
        match self.registry.named(name) {
            Some(handler) => self.invoke(handler, view, &mut guard, false),
            None => {
                debug!(name, "no handler registered under this name");
                Ok(None)
            }
        }
    }

    fn enter<'c, 'e>(
        &self,
        context: &'c mut Context<'e>,
    ) -> std::result::Result<DepthGuard<'c, 'e>, DissectError> {
        let limit = self.config.max_depth;
        if context.depth >= limit {
            if !context.recursion_limited {
                context.recursion_limited = true;
                let protocol = context
                    .layers()
                    .last()
                    .copied()
                    .unwrap_or_else(|| self.registry.default_handler().id());
                context.mark_malformed(
                    protocol,
                    format!("dissection exceeded the maximum depth of {}", limit),
                );
            }
            debug!(limit, "recursion limit reached");
            return Err(DissectError::RecursionLimitExceeded { limit });
        }

        context.depth += 1;
        Ok(DepthGuard { context })
    }

    /// First enabled heuristic to claim a positive byte count wins.
    fn probe_chain(
        &self,
        anchor: &str,
        view: &ByteView,
        context: &mut Context<'_>,
    ) -> std::result::Result<Option<usize>, DissectError> {
        let Some(chain) = self.registry.heuristic_chain(anchor) else {
            return Ok(None);
        };

        for handler in chain.candidates() {
            if let Some(consumed) = self.invoke(handler, view, context, true)? {
                trace!(anchor, protocol = %handler.id(), consumed, "heuristic accepted");
                return Ok(Some(consumed));
            }
        }
        Ok(None)
    }

    /// Runs one handler. `None` means it rejected the data and every trace
    /// of the attempt was rolled back.
    fn invoke(
        &self,
        handler: &Handler,
        view: &ByteView,
        context: &mut Context<'_>,
        probing: bool,
    ) -> std::result::Result<Option<usize>, DissectError> {
        let checkpoint = context.checkpoint();
        context.note_protocol(handler.id());
        let parent = context.open_protocol_node(handler.id(), view);

        let available = view.remaining_captured();
        // Nesting is bounded by `max_depth`, not by the caller's thread stack.
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || {
            handler.invoke(view, &mut *context)
        });
        let claimed = match result {
            Ok(DissectResult::Consumed(0)) if probing => None,
            Ok(DissectResult::Consumed(consumed)) => {
                if consumed > available {
                    warn!(
                        protocol = %handler.id(),
                        consumed,
                        available,
                        "handler reported more bytes than the view holds"
                    );
                }
                Some(consumed.min(available))
            }
            Ok(DissectResult::Rejected) => None,
            Err(DissectError::RecursionLimitExceeded { limit }) => {
                context.close_protocol_node(parent, available);
                return Err(DissectError::RecursionLimitExceeded { limit });
            }
            Err(err) if probing => {
                debug!(protocol = %handler.id(), error = %err, "heuristic failed while probing");
                None
            }
            Err(err) => {
                debug!(protocol = %handler.id(), error = %err, "handler hit malformed data");
                context.mark_malformed(handler.id(), err.to_string());
                Some(available)
            }
        };

        match claimed {
            Some(consumed) => {
                context.close_protocol_node(parent, consumed);
                Ok(Some(consumed))
            }
            None => {
                context.rollback(checkpoint);
                Ok(None)
            }
        }
    }
}
