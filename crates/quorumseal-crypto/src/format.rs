//! Persisted/wire envelope format
//!
//! Envelopes serialize as JSON with camelCase field names; every binary field
//! (`iv`, `salt`, `keyHash`, `data`) is standard base64. `version` is the only
//! field that selects the decryption algorithm:
//!
//! | version | protocol                                     |
//! |---------|----------------------------------------------|
//! | 1, 2    | legacy nested wrapping (order-dependent)     |
//! | 3       | master-key envelope (order-independent)      |
//!
//! Anything else is rejected rather than guessed at.

use base64::{engine::general_purpose::STANDARD, Engine};
use quorumseal_core::{KeyType, SealError, SealResult, DEFAULT_KDF_ITERATIONS};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::kdf::KdfParams;
use crate::wrap::WrappedData;
use crate::{ALGORITHM, HASH_SIZE, MAX_PARTIES, MIN_PARTIES, NONCE_SIZE, SALT_SIZE};

/// Order-independent master-key protocol version
pub const CURRENT_VERSION: u32 = 3;

/// Version written by the legacy nested adapter
pub const LEGACY_VERSION: u32 = 2;

/// Oldest version still readable
pub const MIN_VERSION: u32 = 1;

/// Which decryption algorithm an envelope requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    OrderIndependent,
    LegacyNested,
}

impl Protocol {
    pub fn for_version(version: u32) -> SealResult<Self> {
        match version {
            CURRENT_VERSION => Ok(Self::OrderIndependent),
            MIN_VERSION..=LEGACY_VERSION => Ok(Self::LegacyNested),
            other => Err(SealError::UnsupportedVersion(other)),
        }
    }
}

/// One party's record inside an envelope.
///
/// The meaning of `data` depends on the protocol: the wrapped master key in
/// version 3, the nested-layer ciphertext in legacy envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub stage_number: u32,
    pub algorithm: String,
    pub iv: String,
    pub salt: String,
    pub key_hash: String,
    pub key_type: KeyType,
    #[serde(default)]
    pub data: String,
}

/// The top-level persisted object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub version: u32,
    pub multi_encrypted: bool,
    pub stage_count: usize,
    pub stages: Vec<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Creation time, Unix milliseconds
    pub timestamp: u64,
    /// PBKDF2 iterations used for every stage and the payload. Absent when
    /// the envelope was sealed with the default of 100,000.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf_iterations: Option<u32>,
}

/// Payload ciphertext sealed under the master key (the v3 `data` blob).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadBlob {
    pub iv: [u8; NONCE_SIZE],
    pub salt: [u8; SALT_SIZE],
    pub data: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct PayloadBlobJson {
    iv: String,
    salt: String,
    data: String,
}

impl PayloadBlob {
    /// Encode as base64 of a JSON object `{iv, salt, data}`.
    pub fn encode(&self) -> SealResult<String> {
        let json = serde_json::to_vec(&PayloadBlobJson {
            iv: encode(&self.iv),
            salt: encode(&self.salt),
            data: encode(&self.data),
        })?;
        Ok(encode(&json))
    }

    pub fn decode(blob: &str) -> SealResult<Self> {
        let json = decode("data", blob)?;
        let parsed: PayloadBlobJson = serde_json::from_slice(&json)
            .map_err(|e| SealError::Malformed(format!("payload blob is not valid JSON: {e}")))?;
        Ok(Self {
            iv: decode_array("data.iv", &parsed.iv)?,
            salt: decode_array("data.salt", &parsed.salt)?,
            data: decode("data.data", &parsed.data)?,
        })
    }
}

impl Stage {
    pub(crate) fn from_wrapped(
        stage_number: u32,
        key_type: KeyType,
        wrapped: &WrappedData,
        data: String,
    ) -> Self {
        Self {
            stage_number,
            algorithm: ALGORITHM.to_string(),
            iv: encode(&wrapped.iv),
            salt: encode(&wrapped.salt),
            key_hash: encode(&wrapped.key_hash),
            key_type,
            data,
        }
    }

    pub fn decode_iv(&self) -> SealResult<[u8; NONCE_SIZE]> {
        decode_array(&self.field("iv"), &self.iv)
    }

    pub fn decode_salt(&self) -> SealResult<[u8; SALT_SIZE]> {
        decode_array(&self.field("salt"), &self.salt)
    }

    pub fn decode_key_hash(&self) -> SealResult<[u8; HASH_SIZE]> {
        decode_array(&self.field("keyHash"), &self.key_hash)
    }

    pub fn decode_data(&self) -> SealResult<Vec<u8>> {
        decode(&self.field("data"), &self.data)
    }

    fn field(&self, name: &str) -> String {
        format!("stages[{}].{name}", self.stage_number)
    }
}

impl Envelope {
    pub fn to_json(&self) -> SealResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> SealResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| SealError::Malformed(format!("not an envelope: {e}")))
    }

    pub fn protocol(&self) -> SealResult<Protocol> {
        Protocol::for_version(self.version)
    }

    /// The KDF parameters this envelope was sealed with.
    pub fn kdf_params(&self) -> SealResult<KdfParams> {
        let params = KdfParams {
            iterations: self.kdf_iterations.unwrap_or(DEFAULT_KDF_ITERATIONS),
        };
        params
            .validate()
            .map_err(|e| SealError::Malformed(format!("kdfIterations: {e}")))?;
        Ok(params)
    }

    /// Structural checks that need no key material. Run before any
    /// cryptographic work on decrypt.
    pub fn validate_shape(&self) -> SealResult<Protocol> {
        let protocol = self.protocol()?;
        self.kdf_params()?;

        if !self.multi_encrypted {
            return Err(SealError::Malformed("multiEncrypted must be true".into()));
        }
        if self.stage_count != self.stages.len() {
            return Err(SealError::Malformed(format!(
                "stageCount is {} but {} stages are present",
                self.stage_count,
                self.stages.len()
            )));
        }
        if !(MIN_PARTIES..=MAX_PARTIES).contains(&self.stage_count) {
            return Err(SealError::Malformed(format!(
                "stageCount {} is outside {MIN_PARTIES}..={MAX_PARTIES}",
                self.stage_count
            )));
        }

        let mut numbers = HashSet::with_capacity(self.stages.len());
        let mut hashes = HashSet::with_capacity(self.stages.len());
        for stage in &self.stages {
            if stage.stage_number == 0 || stage.stage_number as usize > self.stage_count {
                return Err(SealError::Malformed(format!(
                    "stage number {} is outside 1..={}",
                    stage.stage_number, self.stage_count
                )));
            }
            if !numbers.insert(stage.stage_number) {
                return Err(SealError::Malformed(format!(
                    "stage number {} appears more than once",
                    stage.stage_number
                )));
            }
            if stage.algorithm != ALGORITHM {
                return Err(SealError::Malformed(format!(
                    "stage {}: unsupported algorithm '{}'",
                    stage.stage_number, stage.algorithm
                )));
            }
            if !hashes.insert(stage.key_hash.as_str()) {
                return Err(SealError::Malformed(format!(
                    "stage {}: keyHash duplicates another stage",
                    stage.stage_number
                )));
            }
        }

        if protocol == Protocol::OrderIndependent && self.data.is_none() {
            return Err(SealError::Malformed(
                "version 3 envelope has no payload data".into(),
            ));
        }

        Ok(protocol)
    }

    /// `(stageNumber, keyType)` for every stage, in stage order. Lets a caller
    /// see which credentials it must collect without decrypting anything.
    pub fn party_requirements(&self) -> Vec<(u32, KeyType)> {
        let mut requirements: Vec<_> = self
            .stages
            .iter()
            .map(|s| (s.stage_number, s.key_type))
            .collect();
        requirements.sort_by_key(|(number, _)| *number);
        requirements
    }

    pub fn is_multi_party(&self) -> bool {
        self.multi_encrypted
            && self.version == CURRENT_VERSION
            && self.stage_count == self.stages.len()
            && self.data.is_some()
    }

    pub fn is_legacy_two_party(&self) -> bool {
        self.multi_encrypted
            && (MIN_VERSION..=LEGACY_VERSION).contains(&self.version)
            && self.stage_count == 2
            && self.stages.len() == 2
    }
}

/// Cheap structural check on arbitrary JSON: does this look like an
/// order-independent (version 3) envelope? No decryption is attempted.
pub fn is_multi_party_envelope(value: &serde_json::Value) -> bool {
    let Some(version) = value.get("version").and_then(serde_json::Value::as_u64) else {
        return false;
    };
    version == u64::from(CURRENT_VERSION)
        && multi_encrypted(value)
        && stage_count_consistent(value, None)
        && value.get("data").is_some_and(serde_json::Value::is_string)
}

/// Cheap structural check on arbitrary JSON: does this look like a legacy
/// two-party nested envelope?
pub fn is_legacy_two_party_envelope(value: &serde_json::Value) -> bool {
    let Some(version) = value.get("version").and_then(serde_json::Value::as_u64) else {
        return false;
    };
    (u64::from(MIN_VERSION)..=u64::from(LEGACY_VERSION)).contains(&version)
        && multi_encrypted(value)
        && stage_count_consistent(value, Some(2))
}

fn multi_encrypted(value: &serde_json::Value) -> bool {
    matches!(value.get("multiEncrypted"), Some(serde_json::Value::Bool(true)))
}

fn stage_count_consistent(value: &serde_json::Value, required: Option<u64>) -> bool {
    let count = value.get("stageCount").and_then(serde_json::Value::as_u64);
    let stages = value
        .get("stages")
        .and_then(serde_json::Value::as_array)
        .map(|s| s.len() as u64);
    match (count, stages) {
        (Some(count), Some(len)) => count == len && required.map_or(true, |r| r == count),
        _ => false,
    }
}

/// Value for [`Envelope::kdf_iterations`]: recorded only when not the default.
pub(crate) fn kdf_iterations_field(params: &KdfParams) -> Option<u32> {
    (!params.is_default()).then_some(params.iterations)
}

pub(crate) fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub(crate) fn decode(field: &str, s: &str) -> SealResult<Vec<u8>> {
    STANDARD
        .decode(s)
        .map_err(|e| SealError::Malformed(format!("{field}: base64 decode: {e}")))
}

pub(crate) fn decode_array<const N: usize>(field: &str, s: &str) -> SealResult<[u8; N]> {
    let bytes = decode(field, s)?;
    bytes.as_slice().try_into().map_err(|_| {
        SealError::Malformed(format!(
            "{field}: expected {N} bytes, got {}",
            bytes.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stage(number: u32, key_hash: &str) -> Stage {
        Stage {
            stage_number: number,
            algorithm: ALGORITHM.to_string(),
            iv: encode(&[0u8; NONCE_SIZE]),
            salt: encode(&[0u8; SALT_SIZE]),
            key_hash: key_hash.to_string(),
            key_type: KeyType::RequestKey,
            data: encode(b"ciphertext"),
        }
    }

    fn envelope() -> Envelope {
        Envelope {
            version: CURRENT_VERSION,
            multi_encrypted: true,
            stage_count: 2,
            stages: vec![stage(1, "aGFzaC1h"), stage(2, "aGFzaC1i")],
            data: Some("e30=".into()),
            timestamp: 1_700_000_000_000,
            kdf_iterations: None,
        }
    }

    #[test]
    fn test_wire_field_names() {
        let value = serde_json::to_value(envelope()).unwrap();

        assert_eq!(value["version"], 3);
        assert_eq!(value["multiEncrypted"], true);
        assert_eq!(value["stageCount"], 2);
        assert_eq!(value["stages"][0]["stageNumber"], 1);
        assert_eq!(value["stages"][0]["keyType"], "request-key");
        assert_eq!(value["stages"][0]["algorithm"], ALGORITHM);
        assert!(value["stages"][0]["keyHash"].is_string());
    }

    #[test]
    fn test_kdf_iterations_on_the_wire() {
        let value = serde_json::to_value(envelope()).unwrap();
        assert!(value.get("kdfIterations").is_none());
        assert_eq!(envelope().kdf_params().unwrap().iterations, 100_000);

        let mut env = envelope();
        env.kdf_iterations = Some(2_000);
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["kdfIterations"], 2_000);
        assert_eq!(env.kdf_params().unwrap().iterations, 2_000);
    }

    #[test]
    fn test_validate_shape_rejects_out_of_range_kdf() {
        let mut env = envelope();
        env.kdf_iterations = Some(u32::MAX);
        let err = env.validate_shape().unwrap_err();
        assert!(matches!(err, SealError::Malformed(_)));
        assert!(err.to_string().contains("kdfIterations"));

        env.kdf_iterations = Some(1);
        assert!(env.validate_shape().is_err());
    }

    #[test]
    fn test_kdf_iterations_field_omits_default() {
        assert_eq!(kdf_iterations_field(&KdfParams::default()), None);
        assert_eq!(
            kdf_iterations_field(&KdfParams { iterations: 5_000 }),
            Some(5_000)
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let env = envelope();
        let parsed = Envelope::from_json(&env.to_json().unwrap()).unwrap();
        assert_eq!(parsed, env);
    }

    #[test]
    fn test_protocol_dispatch() {
        assert_eq!(
            Protocol::for_version(3).unwrap(),
            Protocol::OrderIndependent
        );
        assert_eq!(Protocol::for_version(2).unwrap(), Protocol::LegacyNested);
        assert_eq!(Protocol::for_version(1).unwrap(), Protocol::LegacyNested);
        assert!(matches!(
            Protocol::for_version(4),
            Err(SealError::UnsupportedVersion(4))
        ));
        assert!(matches!(
            Protocol::for_version(0),
            Err(SealError::UnsupportedVersion(0))
        ));
    }

    #[test]
    fn test_validate_shape_accepts_well_formed() {
        assert_eq!(
            envelope().validate_shape().unwrap(),
            Protocol::OrderIndependent
        );
    }

    #[test]
    fn test_validate_shape_stage_count_mismatch() {
        let mut env = envelope();
        env.stage_count = 3;
        assert!(matches!(env.validate_shape(), Err(SealError::Malformed(_))));
    }

    #[test]
    fn test_validate_shape_duplicate_stage_number() {
        let mut env = envelope();
        env.stages[1].stage_number = 1;
        let err = env.validate_shape().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_validate_shape_duplicate_key_hash() {
        let mut env = envelope();
        env.stages[1].key_hash = env.stages[0].key_hash.clone();
        let err = env.validate_shape().unwrap_err();
        assert!(err.to_string().contains("keyHash"));
    }

    #[test]
    fn test_validate_shape_unknown_algorithm() {
        let mut env = envelope();
        env.stages[0].algorithm = "ROT13".into();
        assert!(env.validate_shape().is_err());
    }

    #[test]
    fn test_validate_shape_requires_payload_for_v3() {
        let mut env = envelope();
        env.data = None;
        assert!(env.validate_shape().is_err());
    }

    #[test]
    fn test_validate_shape_rejects_future_version() {
        let mut env = envelope();
        env.version = 9;
        assert!(matches!(
            env.validate_shape(),
            Err(SealError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_payload_blob_roundtrip() {
        let blob = PayloadBlob {
            iv: [3u8; NONCE_SIZE],
            salt: [4u8; SALT_SIZE],
            data: b"sealed payload".to_vec(),
        };
        let encoded = blob.encode().unwrap();

        // base64 of a JSON object
        let inner: serde_json::Value =
            serde_json::from_slice(&STANDARD.decode(&encoded).unwrap()).unwrap();
        assert!(inner["iv"].is_string() && inner["salt"].is_string());

        assert_eq!(PayloadBlob::decode(&encoded).unwrap(), blob);
    }

    #[test]
    fn test_payload_blob_rejects_garbage() {
        assert!(PayloadBlob::decode("!!!").is_err());
        assert!(PayloadBlob::decode(&encode(b"not json")).is_err());
    }

    #[test]
    fn test_decode_array_length_checked() {
        let err = decode_array::<NONCE_SIZE>("iv", &encode(&[0u8; 5])).unwrap_err();
        assert!(err.to_string().contains("expected 12 bytes"));
    }

    #[test]
    fn test_party_requirements_sorted() {
        let mut env = envelope();
        env.stages.swap(0, 1);
        env.stages[0].key_type = KeyType::BearerToken;
        assert_eq!(
            env.party_requirements(),
            vec![(1, KeyType::RequestKey), (2, KeyType::BearerToken)]
        );
    }

    #[test]
    fn test_predicates_on_json() {
        let v3 = serde_json::to_value(envelope()).unwrap();
        assert!(is_multi_party_envelope(&v3));
        assert!(!is_legacy_two_party_envelope(&v3));

        let mut legacy = v3.clone();
        legacy["version"] = json!(2);
        legacy.as_object_mut().unwrap().remove("data");
        assert!(is_legacy_two_party_envelope(&legacy));
        assert!(!is_multi_party_envelope(&legacy));

        assert!(!is_multi_party_envelope(&json!({"email": "a@b.com"})));
        assert!(!is_multi_party_envelope(&json!("string")));
        assert!(!is_legacy_two_party_envelope(&json!(null)));
    }

    #[test]
    fn test_predicates_on_typed_envelope() {
        let env = envelope();
        assert!(env.is_multi_party());
        assert!(!env.is_legacy_two_party());
    }
}
