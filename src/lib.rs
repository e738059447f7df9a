//! Protocol dissection dispatch core.
//!
//! Protocol modules register dissector tables, keyed handlers and heuristic
//! chains on a [`RegistryBuilder`] at startup. The frozen [`HandlerRegistry`]
//! is then shared by any number of workers, each running a
//! [`DispatchEngine`] over zero-copy [`ByteView`]s of captured packets.

pub mod engine;
pub mod packet;
pub mod state;

pub use engine::{
    BoundsError, BuiltinProtocols, Context, DispatchConfig, DispatchEngine, DissectError,
    DissectMode, DissectOutcome, DissectResult, DissectStatus, Dissector, Error, FieldTree, FieldValue,
    Handler, HandlerRegistry, HandlerResult, Key, ProtocolId, ProtocolModule, RegistrationError,
    RegistryBuilder, Result,
};
pub use packet::{ByteView, Endianness};
pub use state::{ConversationKey, SessionCounters};
