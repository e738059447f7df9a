pub mod conversation;
pub mod counters;

pub use conversation::ConversationKey;
pub use counters::SessionCounters;
