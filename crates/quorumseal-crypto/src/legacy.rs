//! Legacy nested envelopes (versions 1 and 2)
//!
//! Before master-key envelopes, payloads were wrapped onion-style:
//!
//! ```text
//! payload ─wrap(party N)─▶ … ─wrap(party 2)─▶ ─wrap(party 1)─▶ stages[0].data
//! ```
//!
//! Layout: only the outermost ciphertext is stored (in stage 1); every other
//! stage records just the iv/salt/keyHash its layer was sealed with and writes
//! `data: ""`. Inner layers are never persisted: the innermost one alone opens
//! under the last party's key. Readers ignore `data` on inner stages, so
//! envelopes that do carry each layer's ciphertext still open.
//!
//! Opening must peel layers from party 1 inward, so parties have to be
//! supplied in the order used at encryption. New envelopes should use
//! version 3.

use quorumseal_core::{KeyType, Party, SealError, SealResult};
use serde::{de::DeserializeOwned, Serialize};
use zeroize::Zeroizing;

use crate::envelope::{now_millis, validate_parties};
use crate::format::{self, Envelope, Protocol, Stage, LEGACY_VERSION};
use crate::kdf::KdfParams;
use crate::keys;
use crate::wrap::{self, WrappedData};
use crate::{HASH_SIZE, NONCE_SIZE, SALT_SIZE};

/// Header of one nested layer. Unlike a version-3 stage it carries no
/// ciphertext of its own: its input is the plaintext of the layer outside it.
struct NestedLayer {
    stage_number: u32,
    key_type: KeyType,
    iv: [u8; NONCE_SIZE],
    salt: [u8; SALT_SIZE],
    key_hash: [u8; HASH_SIZE],
}

impl NestedLayer {
    fn decode(stage: &Stage) -> SealResult<Self> {
        Ok(Self {
            stage_number: stage.stage_number,
            key_type: stage.key_type,
            iv: stage.decode_iv()?,
            salt: stage.decode_salt()?,
            key_hash: stage.decode_key_hash()?,
        })
    }

    /// Peel this layer off `ciphertext` with `party`'s key.
    fn open(
        &self,
        ciphertext: &[u8],
        party: &Party,
        params: &KdfParams,
    ) -> SealResult<Zeroizing<Vec<u8>>> {
        if party.key_type != self.key_type {
            return Err(SealError::PartyKeyTypeMismatch {
                party: party.id.clone(),
                stage: self.stage_number,
                expected: self.key_type,
                supplied: party.key_type,
            });
        }
        if !keys::key_hash_eq(&keys::key_hash(party.secret()), &self.key_hash) {
            return Err(SealError::KeyMismatch {
                stage: self.stage_number,
                key_type: self.key_type,
            });
        }

        let wrapped = WrappedData {
            iv: self.iv,
            salt: self.salt,
            key_hash: self.key_hash,
            data: ciphertext.to_vec(),
        };
        wrap::unwrap_bytes(&wrapped, party, params).map_err(|e| match e {
            SealError::Authentication => SealError::IncorrectKey {
                party: party.id.clone(),
                stage: self.stage_number,
            },
            other => other,
        })
    }
}

/// Nest `payload` under every party, innermost = last party.
pub fn encrypt_nested<T: Serialize + ?Sized>(
    payload: &T,
    parties: &[Party],
    params: &KdfParams,
) -> SealResult<Envelope> {
    validate_parties(parties)?;
    params.validate()?;

    let mut layer = Zeroizing::new(serde_json::to_vec(payload)?);
    let mut stages = Vec::with_capacity(parties.len());

    for (index, party) in parties.iter().enumerate().rev() {
        let wrapped = wrap::wrap_bytes(&layer, party, params)?;
        stages.push(Stage::from_wrapped(
            index as u32 + 1,
            party.key_type,
            &wrapped,
            String::new(),
        ));
        layer = Zeroizing::new(wrapped.data);
    }
    stages.reverse();
    if let Some(outermost) = stages.first_mut() {
        outermost.data = format::encode(&layer);
    }

    tracing::debug!(
        version = LEGACY_VERSION,
        stages = stages.len(),
        "sealed legacy nested envelope"
    );

    Ok(Envelope {
        version: LEGACY_VERSION,
        multi_encrypted: true,
        stage_count: stages.len(),
        stages,
        data: None,
        timestamp: now_millis(),
        kdf_iterations: format::kdf_iterations_field(params),
    })
}

/// Peel every layer in stage order; `parties[i]` must own stage `i + 1`.
pub fn decrypt_nested<T: DeserializeOwned>(
    envelope: &Envelope,
    parties: &[Party],
) -> SealResult<T> {
    if envelope.validate_shape()? != Protocol::LegacyNested {
        return Err(SealError::Malformed(format!(
            "version {} is not a nested envelope",
            envelope.version
        )));
    }
    if parties.len() != envelope.stage_count {
        return Err(SealError::CountMismatch {
            expected: envelope.stage_count,
            supplied: parties.len(),
        });
    }
    let params = envelope.kdf_params()?;

    let mut ordered: Vec<&Stage> = envelope.stages.iter().collect();
    ordered.sort_by_key(|s| s.stage_number);

    let mut current = match ordered.first() {
        Some(outermost) => Zeroizing::new(outermost.decode_data()?),
        None => return Err(SealError::Malformed("envelope has no stages".into())),
    };

    for (stage, party) in ordered.into_iter().zip(parties) {
        let layer = NestedLayer::decode(stage)?;
        tracing::trace!(stage = layer.stage_number, "peeling nested layer");
        current = layer.open(&current, party, &params)?;
    }

    tracing::debug!(
        version = envelope.version,
        stages = envelope.stage_count,
        "opened legacy nested envelope"
    );

    Ok(serde_json::from_slice(&current)?)
}

/// Two-party convenience form kept for older callers: owner outermost,
/// requester innermost.
pub fn encrypt_two_party<T: Serialize + ?Sized>(
    payload: &T,
    owner: &Party,
    requester: &Party,
    params: &KdfParams,
) -> SealResult<Envelope> {
    encrypt_nested(payload, &[owner.clone(), requester.clone()], params)
}

pub fn decrypt_two_party<T: DeserializeOwned>(
    envelope: &Envelope,
    owner: &Party,
    requester: &Party,
) -> SealResult<T> {
    if !envelope.is_legacy_two_party() {
        return Err(SealError::Malformed(
            "not a legacy two-party envelope".into(),
        ));
    }
    decrypt_nested(envelope, &[owner.clone(), requester.clone()])
}
