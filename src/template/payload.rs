/// Handler payload embedded in the second-stage script
///
/// The payload is what the runner needs to execute a work unit remotely:
/// handler key, configuration and field declarations. It is serialized to
/// JSON, compressed with zstd and base64 encoded so it can be embedded
/// verbatim in a shell heredoc.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contract::Field;
use crate::error::{GalaxyError, Result};

pub const PAYLOAD_VERSION: u32 = 1;

/// Larger payloads get a stronger compression level
const LARGE_PAYLOAD_BYTES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerPayload {
    pub version: u32,
    pub handler: String,
    pub config: Value,
    pub base_dir: String,
    pub inputs: Vec<Field>,
    pub outputs: Vec<Field>,
}

pub fn encode_payload(payload: &HandlerPayload) -> Result<String> {
    let json = serde_json::to_vec(payload)
        .map_err(|e| GalaxyError::payload(format!("failed to serialize payload: {}", e)))?;

    let level = if json.len() > LARGE_PAYLOAD_BYTES { 5 } else { 1 };
    let compressed = zstd::encode_all(json.as_slice(), level)?;

    Ok(STANDARD.encode(compressed))
}

pub fn decode_payload(encoded: &str) -> Result<HandlerPayload> {
    let compressed = STANDARD
        .decode(encoded.trim())
        .map_err(|e| GalaxyError::payload(format!("payload is not valid base64: {}", e)))?;

    let json = zstd::decode_all(compressed.as_slice())
        .map_err(|e| GalaxyError::payload(format!("failed to decompress payload: {}", e)))?;

    let payload: HandlerPayload = serde_json::from_slice(&json)
        .map_err(|e| GalaxyError::payload(format!("failed to parse payload: {}", e)))?;

    if payload.version != PAYLOAD_VERSION {
        return Err(GalaxyError::payload(format!(
            "unsupported payload version {} (expected {})",
            payload.version, PAYLOAD_VERSION
        )));
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Role, ValueType};
    use serde_json::json;

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_payload("not base64 !!"),
            Err(GalaxyError::Payload(_))
        ));
        let not_zstd = STANDARD.encode(b"plain bytes");
        assert!(decode_payload(&not_zstd).is_err());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let payload = HandlerPayload {
            version: PAYLOAD_VERSION,
            handler: "demo.square".to_string(),
            config: json!({"scale": 2}),
            base_dir: "./galaxy".to_string(),
            inputs: vec![Field {
                name: "input_dir".to_string(),
                role: Role::InputArtifact,
                value_type: ValueType::Path,
            }],
            outputs: vec![],
        };

        let a = encode_payload(&payload).unwrap();
        let b = encode_payload(&payload).unwrap();
        assert_eq!(a, b);
        assert_eq!(decode_payload(&a).unwrap(), payload);
    }
}
