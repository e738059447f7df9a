//! Dispatch tables, handlers and the two-phase registry.
//!
//! Registration happens on a [`RegistryBuilder`]. Once every protocol module
//! has run, [`RegistryBuilder::freeze`] produces the read-only
//! [`HandlerRegistry`] that dissection workers share.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::catalog::{ProtocolCatalog, ProtocolId};
use super::context::Context;
use super::error::{DissectError, RegistrationError};
use super::heuristic::{HeuristicChain, HeuristicOptions};
use super::tree::FieldValue;
use crate::packet::ByteView;

/// Short name of the protocol behind the default opaque-data handler.
pub const DATA_PROTOCOL: &str = "data";

/// Pattern a handler is bound to inside a [`DispatchTable`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    UInt(u32),
    /// Inclusive on both ends.
    UIntRange(u32, u32),
    Str(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::UInt(value) => write!(f, "{}", value),
            Key::UIntRange(lo, hi) => write!(f, "{}-{}", lo, hi),
            Key::Str(value) => write!(f, "{:?}", value),
        }
    }
}

impl From<u8> for Key {
    fn from(value: u8) -> Self {
        Key::UInt(value.into())
    }
}

impl From<u16> for Key {
    fn from(value: u16) -> Self {
        Key::UInt(value.into())
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Key::UInt(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value)
    }
}

impl From<&Key> for Key {
    fn from(value: &Key) -> Self {
        value.clone()
    }
}

/// What a handler reports back for the view it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DissectResult {
    /// Bytes structurally accounted for; at most `view.remaining_captured()`.
    Consumed(usize),
    /// "Not my protocol". Only meaningful while probing heuristics.
    Rejected,
}

pub type HandlerResult = Result<DissectResult, DissectError>;

pub trait Dissector: Send + Sync {
    fn dissect(&self, view: &ByteView, context: &mut Context<'_>) -> HandlerResult;
}

impl<F> Dissector for F
where
    F: Fn(&ByteView, &mut Context<'_>) -> HandlerResult + Send + Sync,
{
    fn dissect(&self, view: &ByteView, context: &mut Context<'_>) -> HandlerResult {
        self(view, context)
    }
}

/// A dissector tagged with the protocol that owns it.
#[derive(Clone)]
pub struct Handler {
    id: ProtocolId,
    dissector: Arc<dyn Dissector>,
}

impl Handler {
    pub fn new<F>(id: ProtocolId, callback: F) -> Self
    where
        F: Fn(&ByteView, &mut Context<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            id,
            dissector: Arc::new(callback),
        }
    }

    pub fn from_dissector<D>(id: ProtocolId, dissector: D) -> Self
    where
        D: Dissector + 'static,
    {
        Self {
            id,
            dissector: Arc::new(dissector),
        }
    }

    pub fn id(&self) -> ProtocolId {
        self.id
    }

    pub(crate) fn invoke(&self, view: &ByteView, context: &mut Context<'_>) -> HandlerResult {
        self.dissector.dissect(view, context)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("id", &self.id).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableHandle(usize);

#[derive(Debug)]
pub struct DispatchTable {
    name: String,
    ui_name: String,
    exact: HashMap<u32, Handler>,
    strings: HashMap<String, Handler>,
    ranges: Vec<(u32, u32, Handler)>,
    fallback_anchor: Option<String>,
}

impl DispatchTable {
    fn new(name: &str, ui_name: &str) -> Self {
        Self {
            name: name.to_string(),
            ui_name: ui_name.to_string(),
            exact: HashMap::new(),
            strings: HashMap::new(),
            ranges: Vec::new(),
            fallback_anchor: None,
        }
    }

    fn insert(&mut self, key: Key, handler: Handler) -> Result<(), RegistrationError> {
        let taken = match &key {
            Key::UInt(value) => self.exact.contains_key(value),
            Key::Str(value) => self.strings.contains_key(value),
            Key::UIntRange(lo, hi) => {
                if lo > hi {
                    return Err(RegistrationError::InvalidRange { lo: *lo, hi: *hi });
                }
                self.ranges.iter().any(|(l, h, _)| l == lo && h == hi)
            }
        };

        if taken {
            return Err(RegistrationError::DuplicateKey {
                table: self.name.clone(),
                key,
            });
        }

        match key {
            Key::UInt(value) => {
                self.exact.insert(value, handler);
            }
            Key::Str(value) => {
                self.strings.insert(value, handler);
            }
            Key::UIntRange(lo, hi) => self.ranges.push((lo, hi, handler)),
        }
        Ok(())
    }

    /// Exact integer matches win over ranges; among overlapping ranges the
    /// first registered wins.
    pub fn lookup(&self, key: &Key) -> Option<&Handler> {
        match key {
            Key::UInt(value) => self.exact.get(value).or_else(|| {
                self.ranges
                    .iter()
                    .find(|(lo, hi, _)| (*lo..=*hi).contains(value))
                    .map(|(_, _, handler)| handler)
            }),
            Key::Str(value) => self.strings.get(value.as_str()),
            Key::UIntRange(lo, hi) => self
                .ranges
                .iter()
                .find(|(l, h, _)| l == lo && h == hi)
                .map(|(_, _, handler)| handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ui_name(&self) -> &str {
        &self.ui_name
    }

    /// Heuristic chain tried when a key misses; defaults to the table name.
    pub fn fallback_anchor(&self) -> &str {
        self.fallback_anchor.as_deref().unwrap_or(&self.name)
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.strings.len() + self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A protocol collaborator. `register` creates its protocols and tables,
/// `handoff` binds its handlers into tables owned by other modules.
pub trait ProtocolModule {
    fn register(&self, registry: &mut RegistryBuilder) -> Result<(), RegistrationError>;

    fn handoff(&self, _registry: &mut RegistryBuilder) -> Result<(), RegistrationError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    catalog: ProtocolCatalog,
    tables: Vec<DispatchTable>,
    table_index: HashMap<String, TableHandle>,
    heuristics: HashMap<String, HeuristicChain>,
    named: HashMap<String, Handler>,
    default_handler: Option<Handler>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every module's `register` phase before any `handoff` phase.
    pub fn install(&mut self, modules: &[&dyn ProtocolModule]) -> Result<(), RegistrationError> {
        for module in modules {
            module.register(self)?;
        }
        for module in modules {
            module.handoff(self)?;
        }
        Ok(())
    }

    pub fn register_protocol(
        &mut self,
        short_name: &str,
        ui_name: &str,
    ) -> Result<ProtocolId, RegistrationError> {
        let id = self.catalog.register(short_name, ui_name)?;
        debug!(protocol = short_name, id = id.get(), "registered protocol");
        Ok(id)
    }

    pub fn protocol_id(&self, short_name: &str) -> Result<ProtocolId, RegistrationError> {
        self.catalog
            .id_of(short_name)
            .ok_or_else(|| RegistrationError::UnknownProtocolName(short_name.to_string()))
    }

    pub fn catalog(&self) -> &ProtocolCatalog {
        &self.catalog
    }

    pub fn register_table(
        &mut self,
        name: &str,
        ui_name: &str,
    ) -> Result<TableHandle, RegistrationError> {
        if self.table_index.contains_key(name) {
            return Err(RegistrationError::DuplicateTable {
                name: name.to_string(),
            });
        }

        let handle = TableHandle(self.tables.len());
        self.tables.push(DispatchTable::new(name, ui_name));
        self.table_index.insert(name.to_string(), handle);
        debug!(table = name, "registered dissector table");
        Ok(handle)
    }

    pub fn table_handle(&self, name: &str) -> Result<TableHandle, RegistrationError> {
        self.table_index
            .get(name)
            .copied()
            .ok_or_else(|| RegistrationError::UnknownTable {
                name: name.to_string(),
            })
    }

    pub fn register_handler(
        &mut self,
        table: TableHandle,
        key: impl Into<Key>,
        handler: Handler,
    ) -> Result<(), RegistrationError> {
        self.check_protocol(handler.id())?;
        let table = self
            .tables
            .get_mut(table.0)
            .ok_or_else(|| RegistrationError::UnknownTable {
                name: format!("<handle {}>", table.0),
            })?;

        let key = key.into();
        debug!(table = %table.name, key = %key, protocol = %handler.id(), "registered handler");
        table.insert(key, handler)
    }

    pub fn register_handler_by_name(
        &mut self,
        table: &str,
        key: impl Into<Key>,
        handler: Handler,
    ) -> Result<(), RegistrationError> {
        let handle = self.table_handle(table)?;
        self.register_handler(handle, key, handler)
    }

    /// Points a table's miss path at another heuristic chain.
    pub fn set_fallback_chain(
        &mut self,
        table: TableHandle,
        anchor: &str,
    ) -> Result<(), RegistrationError> {
        let table = self
            .tables
            .get_mut(table.0)
            .ok_or_else(|| RegistrationError::UnknownTable {
                name: format!("<handle {}>", table.0),
            })?;
        table.fallback_anchor = Some(anchor.to_string());
        Ok(())
    }

    pub fn register_heuristic(
        &mut self,
        anchor: &str,
        handler: Handler,
    ) -> Result<(), RegistrationError> {
        self.register_heuristic_with(anchor, handler, HeuristicOptions::default())
    }

    pub fn register_heuristic_with(
        &mut self,
        anchor: &str,
        handler: Handler,
        options: HeuristicOptions,
    ) -> Result<(), RegistrationError> {
        self.check_protocol(handler.id())?;
        debug!(anchor, protocol = %handler.id(), priority = options.priority, "registered heuristic");
        self.heuristics
            .entry(anchor.to_string())
            .or_insert_with(|| HeuristicChain::new(anchor))
            .push(handler, options)
    }

    /// Handler reachable by name rather than by table key.
    pub fn register_named(&mut self, name: &str, handler: Handler) -> Result<(), RegistrationError> {
        self.check_protocol(handler.id())?;
        if self.named.contains_key(name) {
            return Err(RegistrationError::DuplicateNamedHandler {
                name: name.to_string(),
            });
        }
        self.named.insert(name.to_string(), handler);
        Ok(())
    }

    /// Replaces the opaque-data handler used when nothing claims a view.
    pub fn set_default_handler(&mut self, handler: Handler) -> Result<(), RegistrationError> {
        self.check_protocol(handler.id())?;
        self.default_handler = Some(handler);
        Ok(())
    }

    /// Ends the registration phase.
    pub fn freeze(mut self) -> Result<HandlerRegistry, RegistrationError> {
        let default_handler = match self.default_handler.take() {
            Some(handler) => handler,
            None => {
                let id = match self.catalog.id_of(DATA_PROTOCOL) {
                    Some(id) => id,
                    None => self.register_protocol(DATA_PROTOCOL, "Data")?,
                };
                Handler::new(id, dissect_opaque_data)
            }
        };

        debug!(
            protocols = self.catalog.len(),
            tables = self.tables.len(),
            heuristic_chains = self.heuristics.len(),
            "registry frozen"
        );

        Ok(HandlerRegistry {
            catalog: self.catalog,
            tables: self.tables,
            table_index: self.table_index,
            heuristics: self.heuristics,
            named: self.named,
            default_handler,
        })
    }

    fn check_protocol(&self, id: ProtocolId) -> Result<(), RegistrationError> {
        if self.catalog.contains(id) {
            Ok(())
        } else {
            Err(RegistrationError::UnknownProtocol(id))
        }
    }
}

/// Read-only registry shared by every dissection worker.
#[derive(Debug)]
pub struct HandlerRegistry {
    catalog: ProtocolCatalog,
    tables: Vec<DispatchTable>,
    table_index: HashMap<String, TableHandle>,
    heuristics: HashMap<String, HeuristicChain>,
    named: HashMap<String, Handler>,
    default_handler: Handler,
}

impl HandlerRegistry {
    pub fn catalog(&self) -> &ProtocolCatalog {
        &self.catalog
    }

    pub fn table(&self, handle: TableHandle) -> Option<&DispatchTable> {
        self.tables.get(handle.0)
    }

    pub fn table_by_name(&self, name: &str) -> Option<&DispatchTable> {
        self.table_index
            .get(name)
            .and_then(|handle| self.table(*handle))
    }

    pub fn table_handle(&self, name: &str) -> Option<TableHandle> {
        self.table_index.get(name).copied()
    }

    pub fn tables(&self) -> impl Iterator<Item = &DispatchTable> {
        self.tables.iter()
    }

    pub fn lookup(&self, table: TableHandle, key: &Key) -> Option<&Handler> {
        self.table(table).and_then(|table| table.lookup(key))
    }

    pub fn lookup_by_name(&self, table: &str, key: &Key) -> Option<&Handler> {
        self.table_by_name(table).and_then(|table| table.lookup(key))
    }

    pub fn heuristic_chain(&self, anchor: &str) -> Option<&HeuristicChain> {
        self.heuristics.get(anchor)
    }

    pub fn set_heuristic_enabled(
        &self,
        anchor: &str,
        protocol: ProtocolId,
        enabled: bool,
    ) -> Result<(), RegistrationError> {
        let found = self
            .heuristics
            .get(anchor)
            .is_some_and(|chain| chain.set_enabled(protocol, enabled));

        if found {
            debug!(anchor, protocol = %protocol, enabled, "heuristic toggled");
            Ok(())
        } else {
            Err(RegistrationError::UnknownHeuristic {
                anchor: anchor.to_string(),
                protocol,
            })
        }
    }

    pub fn named(&self, name: &str) -> Option<&Handler> {
        self.named.get(name)
    }

    pub fn default_handler(&self) -> &Handler {
        &self.default_handler
    }
}

/// Claims everything that is left as undissected bytes.
fn dissect_opaque_data(view: &ByteView, context: &mut Context<'_>) -> HandlerResult {
    if !view.is_empty() && context.is_building_tree() {
        context.add_field(
            view,
            0,
            view.captured_len(),
            "data.data",
            FieldValue::Bytes(view.to_bytes()),
        );
    }
    Ok(DissectResult::Consumed(view.remaining_captured()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consume(n: usize) -> impl Fn(&ByteView, &mut Context<'_>) -> HandlerResult + Send + Sync {
        move |_, _| Ok(DissectResult::Consumed(n))
    }

    fn builder_with_protocol() -> (RegistryBuilder, ProtocolId) {
        let mut builder = RegistryBuilder::new();
        let id = builder.register_protocol("demo", "Demo").expect("protocol");
        (builder, id)
    }

    #[test]
    fn duplicate_table_is_rejected() {
        let mut builder = RegistryBuilder::new();
        builder.register_table("demo.type", "Demo type").expect("first");
        assert_eq!(
            builder.register_table("demo.type", "Again"),
            Err(RegistrationError::DuplicateTable {
                name: "demo.type".to_string()
            })
        );
    }

    #[test]
    fn duplicate_key_is_rejected_and_first_binding_kept() {
        let (mut builder, id) = builder_with_protocol();
        let other = builder.register_protocol("other", "Other").expect("other");
        let table = builder.register_table("demo.type", "Demo type").expect("table");

        builder
            .register_handler(table, 1u32, Handler::new(id, consume(4)))
            .expect("first");
        let err = builder
            .register_handler(table, 1u32, Handler::new(other, consume(2)))
            .expect_err("second should fail");
        assert_eq!(
            err,
            RegistrationError::DuplicateKey {
                table: "demo.type".to_string(),
                key: Key::UInt(1),
            }
        );

        let registry = builder.freeze().expect("freeze");
        let handler = registry
            .lookup(table, &Key::UInt(1))
            .expect("key should resolve");
        assert_eq!(handler.id(), id);
    }

    #[test]
    fn exact_match_beats_range_and_first_range_wins() {
        let (mut builder, id) = builder_with_protocol();
        let wide = builder.register_protocol("wide", "Wide").expect("wide");
        let narrow = builder.register_protocol("narrow", "Narrow").expect("narrow");
        let table = builder.register_table("demo.port", "Demo port").expect("table");

        builder
            .register_handler(table, Key::UIntRange(1000, 2000), Handler::new(wide, consume(1)))
            .expect("wide");
        builder
            .register_handler(table, Key::UIntRange(1500, 1600), Handler::new(narrow, consume(1)))
            .expect("narrow");
        builder
            .register_handler(table, 1500u16, Handler::new(id, consume(1)))
            .expect("exact");

        let registry = builder.freeze().expect("freeze");
        let resolve = |v: u32| registry.lookup(table, &Key::UInt(v)).map(|h| h.id());
        assert_eq!(resolve(1500), Some(id));
        assert_eq!(resolve(1550), Some(wide));
        assert_eq!(resolve(2000), Some(wide));
        assert_eq!(resolve(2001), None);
        assert_eq!(
            registry
                .lookup(table, &Key::UIntRange(1500, 1600))
                .map(|h| h.id()),
            Some(narrow)
        );
    }

    #[test]
    fn inverted_range_is_a_configuration_error() {
        let (mut builder, id) = builder_with_protocol();
        let table = builder.register_table("demo.port", "Demo port").expect("table");
        assert_eq!(
            builder.register_handler(table, Key::UIntRange(9, 3), Handler::new(id, consume(0))),
            Err(RegistrationError::InvalidRange { lo: 9, hi: 3 })
        );
    }

    #[test]
    fn string_keys_resolve_exactly() {
        let (mut builder, id) = builder_with_protocol();
        builder.register_table("media_type", "Media type").expect("table");
        builder
            .register_handler_by_name("media_type", "application/json", Handler::new(id, consume(0)))
            .expect("bind");

        let registry = builder.freeze().expect("freeze");
        assert!(registry
            .lookup_by_name("media_type", &Key::from("application/json"))
            .is_some());
        assert!(registry
            .lookup_by_name("media_type", &Key::from("application/JSON"))
            .is_none());
    }

    #[test]
    fn unknown_table_and_protocol_are_configuration_errors() {
        let (mut builder, id) = builder_with_protocol();
        assert!(matches!(
            builder.register_handler_by_name("missing", 1u32, Handler::new(id, consume(0))),
            Err(RegistrationError::UnknownTable { .. })
        ));

        let mut foreign = RegistryBuilder::new();
        foreign.register_protocol("a", "A").expect("a");
        let stranger = foreign.register_protocol("b", "B").expect("b");
        let table = builder.register_table("t", "T").expect("table");
        assert_eq!(
            builder.register_handler(table, 1u32, Handler::new(stranger, consume(0))),
            Err(RegistrationError::UnknownProtocol(stranger))
        );
    }

    #[test]
    fn freeze_installs_data_protocol_for_default_handler() {
        let registry = RegistryBuilder::new().freeze().expect("freeze");
        let data = registry.catalog().id_of(DATA_PROTOCOL).expect("data protocol");
        assert_eq!(registry.default_handler().id(), data);
    }

    #[test]
    fn install_runs_register_phase_before_handoff() {
        struct Upper;
        struct Lower;

        impl ProtocolModule for Upper {
            fn register(&self, registry: &mut RegistryBuilder) -> Result<(), RegistrationError> {
                registry.register_protocol("upper", "Upper").map(|_| ())
            }

            fn handoff(&self, registry: &mut RegistryBuilder) -> Result<(), RegistrationError> {
                let id = registry.protocol_id("upper")?;
                registry.register_handler_by_name("lower.type", 7u32, Handler::new(id, consume(1)))
            }
        }

        impl ProtocolModule for Lower {
            fn register(&self, registry: &mut RegistryBuilder) -> Result<(), RegistrationError> {
                registry.register_protocol("lower", "Lower")?;
                registry.register_table("lower.type", "Lower type").map(|_| ())
            }
        }

        let mut builder = RegistryBuilder::new();
        builder.install(&[&Upper, &Lower]).expect("install");
        let registry = builder.freeze().expect("freeze");
        assert!(registry.lookup_by_name("lower.type", &Key::UInt(7)).is_some());
    }

    #[test]
    fn heuristic_toggle_on_frozen_registry() {
        let (mut builder, id) = builder_with_protocol();
        builder
            .register_heuristic("udp", Handler::new(id, consume(1)))
            .expect("heuristic");
        let registry = builder.freeze().expect("freeze");

        registry
            .set_heuristic_enabled("udp", id, false)
            .expect("toggle");
        let chain = registry.heuristic_chain("udp").expect("chain");
        assert_eq!(chain.candidates().count(), 0);
        assert!(registry.set_heuristic_enabled("tcp", id, false).is_err());
    }
}
