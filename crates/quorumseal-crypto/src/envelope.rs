//! Order-independent multi-party envelopes (protocol version 3)
//!
//! ```text
//! payload ──JSON──▶ AES-256-GCM(PBKDF2(M, masterSalt), masterIV) ──▶ envelope.data
//!
//! M (random 256-bit master key)
//!   ├── wrap(M, party 1) ──▶ stages[0]
//!   ├── wrap(M, party 2) ──▶ stages[1]
//!   └── …                   (independent, run on the rayon pool)
//! ```
//!
//! Decryption matches every stage to a supplied party by `keyHash`, unwraps
//! all stages in parallel, and only opens the payload once every stage has
//! produced the same master key. A stage that unwraps to a different key means
//! the envelope was tampered with or spliced together from two envelopes.
//!
//! The PBKDF2 work factor used at encryption travels in the envelope
//! (`kdfIterations`, omitted for the default), so any engine can open it.

use quorumseal_core::{KeyType, Party, SealConfig, SealError, SealResult};
use rayon::prelude::*;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

use crate::cipher;
use crate::format::{self, Envelope, PayloadBlob, Protocol, Stage, CURRENT_VERSION};
use crate::kdf::{self, KdfParams};
use crate::keys::{self, MasterKey};
use crate::legacy;
use crate::wrap::{self, WrappedData};
use crate::{HASH_SIZE, MAX_PARTIES, MIN_PARTIES};

/// A version-3 stage decoded for unwrapping: `wrapped.data` is the master key
/// ciphertext.
struct MasterKeyStage {
    stage_number: u32,
    key_type: KeyType,
    wrapped: WrappedData,
}

impl MasterKeyStage {
    fn decode(stage: &Stage) -> SealResult<Self> {
        Ok(Self {
            stage_number: stage.stage_number,
            key_type: stage.key_type,
            wrapped: WrappedData {
                iv: stage.decode_iv()?,
                salt: stage.decode_salt()?,
                key_hash: stage.decode_key_hash()?,
                data: stage.decode_data()?,
            },
        })
    }
}

/// Encrypts envelopes with a fixed KDF work factor and fan-out policy, and
/// decrypts any envelope with the work factor it declares. Stateless between
/// calls; share one instance freely.
#[derive(Debug, Clone)]
pub struct EnvelopeEngine {
    kdf: KdfParams,
    parallel: bool,
    parallel_threshold: usize,
}

impl Default for EnvelopeEngine {
    fn default() -> Self {
        Self::new(&SealConfig::default())
    }
}

impl EnvelopeEngine {
    pub fn new(config: &SealConfig) -> Self {
        Self {
            kdf: KdfParams::from(&config.kdf),
            parallel: config.engine.parallel,
            parallel_threshold: config.engine.parallel_threshold.max(1),
        }
    }

    /// Engine with default fan-out that seals with the given KDF parameters.
    pub fn with_kdf(kdf: KdfParams) -> Self {
        Self {
            kdf,
            ..Self::default()
        }
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }

    /// Seal `payload` so that all of `parties` (2..=10) are needed to open it.
    pub fn encrypt<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        parties: &[Party],
    ) -> SealResult<Envelope> {
        validate_parties(parties)?;
        self.kdf.validate()?;

        let master = MasterKey::generate();
        let plaintext = Zeroizing::new(serde_json::to_vec(payload)?);
        let blob = seal_payload(&master, &plaintext, &self.kdf)?;

        let stages = self
            .fan_out(parties, |index, party| {
                let wrapped = wrap::wrap_bytes(master.as_bytes(), party, &self.kdf)?;
                let data = format::encode(&wrapped.data);
                Ok(Stage::from_wrapped(
                    index as u32 + 1,
                    party.key_type,
                    &wrapped,
                    data,
                ))
            })
            .into_iter()
            .collect::<SealResult<Vec<_>>>()?;

        tracing::debug!(
            version = CURRENT_VERSION,
            stages = stages.len(),
            "sealed multi-party envelope"
        );

        Ok(Envelope {
            version: CURRENT_VERSION,
            multi_encrypted: true,
            stage_count: stages.len(),
            stages,
            data: Some(blob.encode()?),
            timestamp: now_millis(),
            kdf_iterations: format::kdf_iterations_field(&self.kdf),
        })
    }

    /// Open an envelope of any supported version.
    ///
    /// Version 3 envelopes accept `parties` in any order; legacy envelopes
    /// require the order used at encryption.
    pub fn decrypt<T: DeserializeOwned>(
        &self,
        envelope: &Envelope,
        parties: &[Party],
    ) -> SealResult<T> {
        match envelope.validate_shape()? {
            Protocol::OrderIndependent => self.decrypt_order_independent(envelope, parties),
            Protocol::LegacyNested => legacy::decrypt_nested(envelope, parties),
        }
    }

    /// Write a legacy nested (version 2) envelope. Only for interoperating
    /// with readers that predate version 3.
    pub fn encrypt_nested<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        parties: &[Party],
    ) -> SealResult<Envelope> {
        legacy::encrypt_nested(payload, parties, &self.kdf)
    }

    pub fn encrypt_two_party<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        owner: &Party,
        requester: &Party,
    ) -> SealResult<Envelope> {
        legacy::encrypt_two_party(payload, owner, requester, &self.kdf)
    }

    pub fn decrypt_two_party<T: DeserializeOwned>(
        &self,
        envelope: &Envelope,
        owner: &Party,
        requester: &Party,
    ) -> SealResult<T> {
        legacy::decrypt_two_party(envelope, owner, requester)
    }

    fn decrypt_order_independent<T: DeserializeOwned>(
        &self,
        envelope: &Envelope,
        parties: &[Party],
    ) -> SealResult<T> {
        if parties.len() != envelope.stage_count {
            return Err(SealError::CountMismatch {
                expected: envelope.stage_count,
                supplied: parties.len(),
            });
        }
        let kdf = envelope.kdf_params()?;

        let by_hash: HashMap<[u8; HASH_SIZE], &Party> = parties
            .iter()
            .map(|p| (keys::key_hash(p.secret()), p))
            .collect();

        let mut matched = Vec::with_capacity(envelope.stages.len());
        for stage in &envelope.stages {
            let stage = MasterKeyStage::decode(stage)?;
            let party = match_party(&stage, &by_hash, parties)?;
            matched.push((stage, party));
        }

        let candidates = self.fan_out(&matched, |_, (stage, party)| {
            tracing::trace!(stage = stage.stage_number, "unwrapping master key");
            let plaintext = wrap::unwrap_bytes(&stage.wrapped, party, &kdf).map_err(|e| match e {
                SealError::Authentication => SealError::IncorrectKey {
                    party: party.id.clone(),
                    stage: stage.stage_number,
                },
                other => other,
            })?;
            MasterKey::from_slice(&plaintext)
        });

        let master = converge(&matched, candidates, envelope.stage_count)?;

        let blob = PayloadBlob::decode(envelope.data.as_deref().unwrap_or_default())?;
        let plaintext = open_payload(&master, &blob, &kdf)?;

        tracing::debug!(
            version = envelope.version,
            stages = envelope.stage_count,
            "opened multi-party envelope"
        );

        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Run `f` over every item, on the rayon pool when enabled and the batch
    /// is large enough. Results keep input order.
    fn fan_out<I, R, F>(&self, items: &[I], f: F) -> Vec<R>
    where
        I: Sync,
        R: Send,
        F: Fn(usize, &I) -> R + Sync + Send,
    {
        if self.parallel && items.len() >= self.parallel_threshold {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| f(index, item))
                .collect()
        } else {
            items
                .iter()
                .enumerate()
                .map(|(index, item)| f(index, item))
                .collect()
        }
    }
}

/// Encrypt-time checks: party count, ids, key lengths, and no two parties
/// sharing a secret (their stages would be indistinguishable).
pub(crate) fn validate_parties(parties: &[Party]) -> SealResult<()> {
    if parties.len() < MIN_PARTIES {
        return Err(SealError::TooFewParties {
            count: parties.len(),
            min: MIN_PARTIES,
        });
    }
    if parties.len() > MAX_PARTIES {
        return Err(SealError::TooManyParties {
            count: parties.len(),
            max: MAX_PARTIES,
        });
    }

    let mut seen: HashMap<[u8; HASH_SIZE], &str> = HashMap::with_capacity(parties.len());
    for (index, party) in parties.iter().enumerate() {
        party.validate(index)?;
        if let Some(first) = seen.insert(keys::key_hash(party.secret()), &party.id) {
            return Err(SealError::DuplicateParty {
                first: first.to_string(),
                second: party.id.clone(),
            });
        }
    }
    Ok(())
}

/// Find the supplied party for a stage, distinguishing "wrong secret" from
/// "wrong kind of credential".
fn match_party<'a>(
    stage: &MasterKeyStage,
    by_hash: &HashMap<[u8; HASH_SIZE], &'a Party>,
    parties: &'a [Party],
) -> SealResult<&'a Party> {
    let Some(&party) = by_hash.get(&stage.wrapped.key_hash) else {
        return Err(if parties.iter().any(|p| p.key_type == stage.key_type) {
            SealError::KeyMismatch {
                stage: stage.stage_number,
                key_type: stage.key_type,
            }
        } else {
            SealError::KeyTypeMismatch {
                stage: stage.stage_number,
                expected: stage.key_type,
            }
        });
    };

    if party.key_type != stage.key_type {
        return Err(SealError::PartyKeyTypeMismatch {
            party: party.id.clone(),
            stage: stage.stage_number,
            expected: stage.key_type,
            supplied: party.key_type,
        });
    }
    Ok(party)
}

/// Convergence check: every stage must have produced the same master key.
fn converge(
    matched: &[(MasterKeyStage, &Party)],
    candidates: Vec<SealResult<MasterKey>>,
    expected: usize,
) -> SealResult<MasterKey> {
    let mut reference: Option<MasterKey> = None;
    let mut verified = BTreeSet::new();

    for ((stage, _), candidate) in matched.iter().zip(candidates) {
        let candidate = candidate?;
        if let Some(first) = &reference {
            if !first.ct_eq(&candidate) {
                return Err(SealError::MasterKeyMismatch {
                    stage: stage.stage_number,
                });
            }
        } else {
            reference = Some(candidate);
        }
        verified.insert(stage.stage_number);
    }

    match reference {
        Some(master) if verified.len() == expected => Ok(master),
        _ => Err(SealError::StageVerification {
            verified: verified.len(),
            expected,
        }),
    }
}

fn seal_payload(
    master: &MasterKey,
    plaintext: &[u8],
    params: &KdfParams,
) -> SealResult<PayloadBlob> {
    let salt = kdf::generate_salt();
    let iv = cipher::generate_nonce();
    let key = kdf::derive_key(master.as_bytes(), &salt, params)?;
    let data = cipher::seal(&key, &iv, plaintext, &[])?;
    Ok(PayloadBlob { iv, salt, data })
}

fn open_payload(
    master: &MasterKey,
    blob: &PayloadBlob,
    params: &KdfParams,
) -> SealResult<Zeroizing<Vec<u8>>> {
    let key = kdf::derive_key(master.as_bytes(), &blob.salt, params)?;
    cipher::open(&key, &blob.iv, &blob.data, &[]).map_err(|e| match e {
        SealError::Authentication => SealError::PayloadAuthentication,
        other => other,
    })
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
