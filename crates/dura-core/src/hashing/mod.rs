//! Hashing y canonicalización JSON.
//!
//! El motor lo usa para derivar identificadores estables a partir de la
//! posición de un step y para comparar inputs de forma independiente del
//! orden de claves.

pub mod canonical_json;
pub mod hash;

pub use canonical_json::to_canonical_json;
pub use hash::{derive_uuid, hash_str, hash_value};
