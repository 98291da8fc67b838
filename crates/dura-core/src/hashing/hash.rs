//! Hash helpers (blake3, salida hex de 64 caracteres).

use blake3::Hasher;
use serde_json::{json, Value};
use uuid::Uuid;

use super::to_canonical_json;

/// Hashea un string y devuelve hex.
pub fn hash_str(input: &str) -> String {
    let mut h = Hasher::new();
    h.update(input.as_bytes());
    h.finalize().to_hex().to_string()
}

/// Hash del JSON canónico de `value`.
pub fn hash_value(value: &Value) -> String {
    hash_str(&to_canonical_json(value))
}

/// UUID determinista para `(workflow_id, step_number, salt)`.
///
/// Los 16 primeros bytes del hash se marcan como versión 4 / variante RFC 4122
/// para que el valor sea un UUID válido; la derivación es estable entre
/// procesos y reintentos.
pub fn derive_uuid(workflow_id: &str, step_number: i32, salt: &str) -> Uuid {
    let canonical = to_canonical_json(&json!({
        "workflow_id": workflow_id,
        "step_number": step_number,
        "salt": salt,
    }));
    let digest = blake3::hash(canonical.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest.as_bytes()[..16]);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_value_ignores_key_order() {
        let a = hash_value(&json!({"b": 2, "a": 1}));
        let b = hash_value(&json!({"a": 1, "b": 2}));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn derived_uuid_is_stable_and_position_sensitive() {
        let first = derive_uuid("a1", 2, "message");
        assert_eq!(first, derive_uuid("a1", 2, "message"));
        assert_ne!(first, derive_uuid("a1", 3, "message"));
        assert_ne!(first, derive_uuid("a2", 2, "message"));
        assert_ne!(first, derive_uuid("a1", 2, "conversation"));
        assert_eq!(first.get_version_num(), 4);
    }
}
