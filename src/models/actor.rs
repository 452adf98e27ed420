use serde::{Deserialize, Serialize};

use super::enums::ActorRole;

/// An identity already authenticated by the upstream provider.
///
/// Clinical records only ever store the opaque `id`; the role is carried
/// for request-time checks and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Option<ActorRole>,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Option<ActorRole>) -> Self {
        Self { id: id.into(), role }
    }

    pub fn doctor(id: impl Into<String>) -> Self {
        Self::new(id, Some(ActorRole::Doctor))
    }

    pub fn patient(id: impl Into<String>) -> Self {
        Self::new(id, Some(ActorRole::Patient))
    }
}
