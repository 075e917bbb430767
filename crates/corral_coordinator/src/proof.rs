//! Execution attestation.
//!
//! A proof binds (agent, timestamp, input, output) by hashing: the component
//! hashes are base64(SHA256(bytes)) and the combined hash covers the UTF-8
//! concatenation `agent_id || decimal(timestamp) || input_hash ||
//! output_hash`. Standard base64 alphabet with padding and ASCII-decimal
//! timestamps are compatibility-bearing; changing either invalidates stored
//! proofs.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use corral_ids::{AgentId, ProofId};
use corral_protocol::Proof;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("Duplicate proof id: {0}")]
    Duplicate(ProofId),
}

/// Result of checking a completion report against a registered proof.
/// Checks short-circuit in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    ProofNotFound,
    InputMismatch,
    OutputMismatch,
    ProofHashMismatch,
}

/// base64(SHA256(data)), standard alphabet, padded.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    BASE64.encode(hasher.finalize())
}

/// Combined proof hash over the four string components, concatenated as raw
/// UTF-8 with the timestamp in unsigned decimal.
pub fn combined_hash(
    agent_id: &AgentId,
    timestamp: i64,
    input_hash: &str,
    output_hash: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(agent_id.as_str().as_bytes());
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(input_hash.as_bytes());
    hasher.update(output_hash.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Build a well-formed proof for an execution.
pub fn build_proof(
    proof_id: ProofId,
    agent_id: AgentId,
    timestamp: i64,
    input: &[u8],
    output: &[u8],
) -> Proof {
    let input_hash = hash_bytes(input);
    let output_hash = hash_bytes(output);
    let proof_hash = combined_hash(&agent_id, timestamp, &input_hash, &output_hash);
    Proof {
        proof_id,
        agent_id,
        timestamp,
        input_hash,
        output_hash,
        proof_hash,
    }
}

/// Proof table with content verification.
#[derive(Default)]
pub struct ProofValidator {
    proofs: RwLock<HashMap<ProofId, Proof>>,
}

impl ProofValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a proof. A duplicate id is an integrity error, not an
    /// overwrite.
    pub fn register(&self, proof: Proof) -> Result<(), ProofError> {
        let mut proofs = self.write();
        if proofs.contains_key(&proof.proof_id) {
            return Err(ProofError::Duplicate(proof.proof_id));
        }
        debug!(proof = %proof.proof_id, agent = %proof.agent_id, "Registered proof");
        proofs.insert(proof.proof_id.clone(), proof);
        Ok(())
    }

    /// Verify raw input/output bytes against a registered proof.
    ///
    /// O(|input| + |output|): each buffer is hashed once, then the combined
    /// hash is recomputed over four fixed-size strings.
    pub fn validate(&self, proof_id: &ProofId, input: &[u8], output: &[u8]) -> ValidationOutcome {
        let proof = match self.get(proof_id) {
            Some(proof) => proof,
            None => return ValidationOutcome::ProofNotFound,
        };

        if hash_bytes(input) != proof.input_hash {
            return ValidationOutcome::InputMismatch;
        }
        if hash_bytes(output) != proof.output_hash {
            return ValidationOutcome::OutputMismatch;
        }
        let expected = combined_hash(
            &proof.agent_id,
            proof.timestamp,
            &proof.input_hash,
            &proof.output_hash,
        );
        if expected != proof.proof_hash {
            return ValidationOutcome::ProofHashMismatch;
        }
        ValidationOutcome::Valid
    }

    pub fn get(&self, proof_id: &ProofId) -> Option<Proof> {
        self.read().get(proof_id).cloned()
    }

    /// Point-in-time snapshot of the proof table.
    pub fn all(&self) -> Vec<Proof> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ProofId, Proof>> {
        self.proofs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<ProofId, Proof>> {
        self.proofs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes_known_value() {
        // SHA256("in"), standard base64 with padding.
        assert_eq!(
            hash_bytes(b"in"),
            "WClnU00PkJ0Za5f55pITQnd66oe0b6Ut8WU4nbH7jM8="
        );
        assert_eq!(
            hash_bytes(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn test_build_then_validate_is_valid() {
        let validator = ProofValidator::new();
        let proof = build_proof(
            ProofId::from("the-proof-id"),
            AgentId::from("a1"),
            1_700_000_000,
            b"in",
            b"out",
        );
        validator.register(proof).unwrap();

        assert_eq!(
            validator.validate(&ProofId::from("the-proof-id"), b"in", b"out"),
            ValidationOutcome::Valid
        );
    }

    #[test]
    fn test_validate_short_circuit_order() {
        let validator = ProofValidator::new();
        assert_eq!(
            validator.validate(&ProofId::from("missing"), b"in", b"out"),
            ValidationOutcome::ProofNotFound
        );

        let proof = build_proof(
            ProofId::from("p1"),
            AgentId::from("a1"),
            1_700_000_000,
            b"in",
            b"out",
        );
        validator.register(proof).unwrap();

        // Both buffers wrong: input is reported first.
        assert_eq!(
            validator.validate(&ProofId::from("p1"), b"IN", b"OUT"),
            ValidationOutcome::InputMismatch
        );
        assert_eq!(
            validator.validate(&ProofId::from("p1"), b"in", b"OUT"),
            ValidationOutcome::OutputMismatch
        );
    }

    #[test]
    fn test_tampered_combined_hash_detected() {
        let validator = ProofValidator::new();
        let mut proof = build_proof(
            ProofId::from("p1"),
            AgentId::from("a1"),
            1_700_000_000,
            b"in",
            b"out",
        );
        proof.proof_hash = hash_bytes(b"forged");
        validator.register(proof).unwrap();

        assert_eq!(
            validator.validate(&ProofId::from("p1"), b"in", b"out"),
            ValidationOutcome::ProofHashMismatch
        );
    }

    #[test]
    fn test_single_bit_flip_is_detected() {
        let validator = ProofValidator::new();
        let proof = build_proof(
            ProofId::from("p1"),
            AgentId::from("a1"),
            1_700_000_000,
            b"in",
            b"out",
        );
        validator.register(proof).unwrap();

        let mut input = b"in".to_vec();
        input[0] ^= 0x01;
        assert_eq!(
            validator.validate(&ProofId::from("p1"), &input, b"out"),
            ValidationOutcome::InputMismatch
        );

        let mut output = b"out".to_vec();
        output[2] ^= 0x80;
        assert_eq!(
            validator.validate(&ProofId::from("p1"), b"in", &output),
            ValidationOutcome::OutputMismatch
        );
    }

    #[test]
    fn test_duplicate_registration_is_an_error() {
        let validator = ProofValidator::new();
        let proof = build_proof(
            ProofId::from("p1"),
            AgentId::from("a1"),
            1_700_000_000,
            b"in",
            b"out",
        );
        validator.register(proof.clone()).unwrap();

        assert_eq!(
            validator.register(proof),
            Err(ProofError::Duplicate(ProofId::from("p1")))
        );
        assert_eq!(validator.len(), 1);
    }

    #[test]
    fn test_timestamp_encoded_as_decimal() {
        // Same inputs, different timestamps: combined hashes must differ.
        let a = combined_hash(&AgentId::from("a1"), 1, "x", "y");
        let b = combined_hash(&AgentId::from("a1"), 10, "x", "y");
        assert_ne!(a, b);
    }
}
