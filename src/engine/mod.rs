pub mod builtin;
pub mod catalog;
pub mod constants;
pub mod context;
pub mod cursor;
pub mod dispatch;
pub mod error;
pub mod heuristic;
pub mod registry;
pub mod tree;

pub use builtin::BuiltinProtocols;
pub use catalog::{ProtocolCatalog, ProtocolId, ProtocolInfo};
pub use context::{Context, DispatchConfig, DissectMode, MAX_DISSECT_DEPTH, MalformedMarker};
pub use cursor::Cursor;
pub use dispatch::{DispatchEngine, DissectOutcome, DissectStatus};
pub use error::{BoundsError, DissectError, Error, RegistrationError, Result};
pub use heuristic::{HeuristicChain, HeuristicEntry, HeuristicOptions};
pub use registry::{
    DATA_PROTOCOL, DispatchTable, DissectResult, Dissector, Handler, HandlerRegistry,
    HandlerResult, Key, ProtocolModule, RegistryBuilder, TableHandle,
};
pub use tree::{FieldNode, FieldTree, FieldValue, NodeId};
