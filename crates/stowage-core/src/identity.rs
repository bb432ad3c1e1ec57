use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque id/name pair carried by every persister and keeper.
/// Neither field is validated; callers must not assume uniqueness.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub name: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Identity with a random v4 UUID as its id.
    pub fn generated(name: impl Into<String>) -> Self {
        Self::new(name, Uuid::new_v4().to_string())
    }
}

/// Accessors shared by both storage contracts. Implementors only expose their
/// embedded [`Identity`]; the getters and setters are provided.
pub trait Identifiable {
    fn identity(&self) -> &Identity;

    fn identity_mut(&mut self) -> &mut Identity;

    fn id(&self) -> &str {
        &self.identity().id
    }

    fn set_id(&mut self, id: String) {
        self.identity_mut().id = id;
    }

    fn name(&self) -> &str {
        &self.identity().name
    }

    fn set_name(&mut self, name: String) {
        self.identity_mut().name = name;
    }
}

impl Identifiable for Identity {
    fn identity(&self) -> &Identity {
        self
    }

    fn identity_mut(&mut self) -> &mut Identity {
        self
    }
}
