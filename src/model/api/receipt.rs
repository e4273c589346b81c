use chrono::{DateTime, Utc};
use data_encoding::{BASE32_NOPAD, HEXLOWER};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::{
    common::ballot::PositionVote,
    db::vote_record::{SealedVote, VoteRecord},
};

const VERIFICATION_CODE_DOMAIN: &[u8] = b"verification-code:";

/// A voter-facing proof of a committed vote.
///
/// Receipts are derived from the vote record on demand, so asking for one again
/// after an ambiguous failure always yields the same answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub verification_code: String,
    pub receipt_hash: String,
    pub timestamp: DateTime<Utc>,
    /// True iff a committed vote record backs this receipt.
    pub verified: bool,
}

impl VoteReceipt {
    /// Construct the receipt for a committed record.
    pub fn for_record(record: &VoteRecord) -> Self {
        let receipt_hash = receipt_hash(&record.sealed.content, &record.sealed.seal);
        Self {
            verification_code: verification_code(&receipt_hash),
            receipt_hash,
            timestamp: record.cast_at,
            verified: true,
        }
    }
}

/// A committed vote as published after the election, stripped of voter and
/// session identity. Voters can find their own vote by verification code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedVote {
    pub verification_code: String,
    pub receipt_hash: String,
    pub content: Vec<PositionVote>,
    pub seal: String,
    pub cast_at: DateTime<Utc>,
}

impl PublishedVote {
    pub fn from_record(record: &VoteRecord) -> Self {
        let receipt = VoteReceipt::for_record(record);
        Self {
            verification_code: receipt.verification_code,
            receipt_hash: receipt.receipt_hash,
            content: record.sealed.content.clone(),
            seal: record.sealed.seal.clone(),
            cast_at: record.cast_at,
        }
    }

    /// Check that the published hash and code match the published content.
    pub fn is_consistent(&self) -> bool {
        let expected_hash = receipt_hash(&self.content, &self.seal);
        self.receipt_hash == expected_hash
            && self.verification_code == verification_code(&expected_hash)
    }
}

/// Hash of the sealed content and its seal, hex encoded.
pub fn receipt_hash(content: &[PositionVote], seal: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(SealedVote::canonical_content(content));
    hasher.update(seal.as_bytes());
    HEXLOWER.encode(&hasher.finalize())
}

/// Short, human-typable code derived from a receipt hash, e.g. `K5QW-2XNA`.
pub fn verification_code(receipt_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(VERIFICATION_CODE_DOMAIN);
    hasher.update(receipt_hash.as_bytes());
    let code = BASE32_NOPAD.encode(&hasher.finalize()[..5]);
    format!("{}-{}", &code[..4], &code[4..])
}
