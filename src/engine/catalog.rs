//! Protocol identities.

use std::collections::HashMap;
use std::fmt;

use super::error::RegistrationError;

/// Stable numeric identity of a registered protocol. Assigned sequentially,
/// never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolId(u32);

impl ProtocolId {
    pub fn get(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub id: ProtocolId,
    pub short_name: String,
    pub ui_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProtocolCatalog {
    protocols: Vec<ProtocolInfo>,
    by_name: HashMap<String, ProtocolId>,
}

impl ProtocolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        short_name: &str,
        ui_name: &str,
    ) -> Result<ProtocolId, RegistrationError> {
        if self.by_name.contains_key(short_name) {
            return Err(RegistrationError::DuplicateProtocol {
                name: short_name.to_string(),
            });
        }

        let id = ProtocolId(self.protocols.len() as u32);

        self.protocols.push(ProtocolInfo {
            id,
            short_name: short_name.to_string(),
            ui_name: ui_name.to_string(),
        });
        self.by_name.insert(short_name.to_string(), id);
        Ok(id)
    }

    pub fn get(&self, id: ProtocolId) -> Option<&ProtocolInfo> {
        self.protocols.get(id.index())
    }

    pub fn id_of(&self, short_name: &str) -> Option<ProtocolId> {
        self.by_name.get(short_name).copied()
    }

    pub fn short_name(&self, id: ProtocolId) -> Option<&str> {
        self.get(id).map(|info| info.short_name.as_str())
    }

    pub fn ui_name(&self, id: ProtocolId) -> Option<&str> {
        self.get(id).map(|info| info.ui_name.as_str())
    }

    pub fn contains(&self, id: ProtocolId) -> bool {
        id.index() < self.protocols.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProtocolInfo> {
        self.protocols.iter()
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}
