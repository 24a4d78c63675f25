//! Configuration entities owned by the memory store (§3): agents, models, providers.
//!
//! The reconciler consumes these read-only; nothing here is mutated by a `reconcile` call.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Named configuration bundle: instructions template + default model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    /// Template consumed by [`crate::system_prompt::assemble`].
    pub instructions_template: String,
    pub default_model_id: Uuid,
}

/// One addressable model on a provider (e.g. "claude-haiku-4-5-20251001").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Model {
    pub id: Uuid,
    pub name: String,
    pub provider_id: Uuid,
}

/// Provider credential/config record. Credential material is opaque bytes;
/// encrypting it at rest is out of scope here (§1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelProviderConfig {
    pub id: Uuid,
    pub kind: String,
    pub base_url: Option<String>,
    #[serde(with = "serde_bytes_opaque")]
    pub credentials: Vec<u8>,
}

mod serde_bytes_opaque {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        <Vec<u8> as serde::Deserialize>::deserialize(d)
    }
}
