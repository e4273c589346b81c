use std::sync::Arc;

use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::model::{
    api::ballot::Ballot,
    common::{ballot::PositionVote, election::ElectionId},
    db::vote_record::SealedVote,
    mongodb::Id,
};

pub type HmacSha256 = Hmac<Sha256>;

/// Shared handle to the sealer, as placed in managed state.
pub type DynSealer = Arc<dyn VoteSealer>;

#[derive(Debug, Error)]
pub enum SealError {
    #[error("Sealing service unavailable: {0}")]
    Unavailable(String),
}

/// Turns validated ballot content into an opaque, tamper-evident sealed vote.
///
/// Sealing may be backed by a remote service and is allowed to fail
/// transiently. Verification must be local and cheap, since tallying checks
/// every record.
#[rocket::async_trait]
pub trait VoteSealer: Send + Sync {
    async fn seal(&self, ballot: &Ballot) -> Result<SealedVote, SealError>;

    /// Does the seal match the sealed content, election and session?
    fn verify(&self, sealed: &SealedVote) -> bool;
}

/// A sealer keyed by a server secret: the seal is an HMAC-SHA256 over the
/// election, session and canonical content.
pub struct HmacSealer {
    key: Vec<u8>,
}

impl HmacSealer {
    pub fn new(key: &[u8]) -> Self {
        Self { key: key.to_vec() }
    }

    fn mac(&self, election_id: ElectionId, session_id: Id, content: &[PositionVote]) -> HmacSha256 {
        let mut hmac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        hmac.update(&election_id.to_be_bytes());
        hmac.update(&session_id.to_bytes());
        hmac.update(&SealedVote::canonical_content(content));
        hmac
    }
}

#[rocket::async_trait]
impl VoteSealer for HmacSealer {
    async fn seal(&self, ballot: &Ballot) -> Result<SealedVote, SealError> {
        let content = canonicalise(&ballot.votes);
        let session_id = *ballot.session_id;
        let seal = self
            .mac(ballot.election_id, session_id, &content)
            .finalize()
            .into_bytes();
        Ok(SealedVote {
            election_id: ballot.election_id,
            session_id,
            content,
            seal: HEXLOWER.encode(&seal),
        })
    }

    fn verify(&self, sealed: &SealedVote) -> bool {
        let seal = match HEXLOWER.decode(sealed.seal.as_bytes()) {
            Ok(seal) => seal,
            Err(_) => return false,
        };
        self.mac(sealed.election_id, sealed.session_id, &sealed.content)
            .verify_slice(&seal)
            .is_ok()
    }
}

/// Canonical form of vote content: entries ordered by position, candidates
/// ordered by ID, so that equal choices always seal identically.
pub fn canonicalise(votes: &[PositionVote]) -> Vec<PositionVote> {
    let mut content = votes.to_vec();
    for vote in content.iter_mut() {
        vote.candidate_ids.sort();
    }
    content.sort_by_key(|v| v.position_id);
    content
}

/// Sealers for tests.
#[cfg(test)]
pub(crate) mod examples {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// A sealer that fails a set number of times before delegating to an
    /// [`HmacSealer`].
    pub struct FlakySealer {
        failures_left: AtomicUsize,
        inner: HmacSealer,
    }

    impl FlakySealer {
        pub fn new(failures: usize) -> Self {
            Self {
                failures_left: AtomicUsize::new(failures),
                inner: HmacSealer::new(b"test seal secret"),
            }
        }
    }

    #[rocket::async_trait]
    impl VoteSealer for FlakySealer {
        async fn seal(&self, ballot: &Ballot) -> Result<SealedVote, SealError> {
            let failed = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(SealError::Unavailable("connection reset".to_string()));
            }
            self.inner.seal(ballot).await
        }

        fn verify(&self, sealed: &SealedVote) -> bool {
            self.inner.verify(sealed)
        }
    }
}
