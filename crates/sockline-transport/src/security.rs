//! Security collaborator interface.
//!
//! Transports that terminate TLS hand each trust challenge to an optional
//! [`SecurityPolicy`]. Without a policy they perform their default trust
//! evaluation.

use std::fmt;

use bytes::Bytes;

/// A trust challenge raised while opening a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustChallenge {
    /// Host being connected to.
    pub host: String,
    /// Presented certificate chain, leaf first, DER encoded.
    pub certificate_chain: Vec<Bytes>,
}

impl TrustChallenge {
    /// Leaf certificate, if any was presented.
    pub fn leaf(&self) -> Option<&Bytes> {
        self.certificate_chain.first()
    }
}

/// Outcome of a trust evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustDecision {
    /// Fall back to the transport's standard trust evaluation.
    PerformDefault,
    /// Trust the peer, optionally presenting a client credential.
    Accept { credential: Option<Bytes> },
    /// Abort the connection attempt.
    Reject,
}

/// Decides whether a peer is trusted.
pub trait SecurityPolicy: Send + Sync {
    /// Evaluate one challenge.
    fn evaluate(&self, challenge: &TrustChallenge) -> TrustDecision;
}

/// Accepts only peers whose leaf certificate matches one of the pins.
#[derive(Clone, Default)]
pub struct CertificatePinning {
    pins: Vec<Bytes>,
}

impl CertificatePinning {
    /// Create a policy pinned to the given DER certificates.
    pub fn new(pins: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            pins: pins.into_iter().collect(),
        }
    }

    /// Number of pinned certificates.
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    /// Returns true when no certificate is pinned.
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

impl SecurityPolicy for CertificatePinning {
    fn evaluate(&self, challenge: &TrustChallenge) -> TrustDecision {
        match challenge.leaf() {
            Some(leaf) if self.pins.iter().any(|pin| pin == leaf) => {
                TrustDecision::Accept { credential: None }
            }
            _ => TrustDecision::Reject,
        }
    }
}

impl fmt::Debug for CertificatePinning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificatePinning")
            .field("pins", &self.pins.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(chain: &[&'static [u8]]) -> TrustChallenge {
        TrustChallenge {
            host: "chat.local".to_string(),
            certificate_chain: chain.iter().map(|der| Bytes::from_static(der)).collect(),
        }
    }

    #[test]
    fn pinned_leaf_is_accepted() {
        let policy = CertificatePinning::new([Bytes::from_static(b"leaf-a")]);
        assert_eq!(
            policy.evaluate(&challenge(&[b"leaf-a", b"root"])),
            TrustDecision::Accept { credential: None }
        );
    }

    #[test]
    fn pin_on_intermediate_does_not_count() {
        let policy = CertificatePinning::new([Bytes::from_static(b"root")]);
        assert_eq!(
            policy.evaluate(&challenge(&[b"leaf-a", b"root"])),
            TrustDecision::Reject
        );
    }

    #[test]
    fn empty_chain_is_rejected() {
        let policy = CertificatePinning::new([Bytes::from_static(b"leaf-a")]);
        assert_eq!(policy.evaluate(&challenge(&[])), TrustDecision::Reject);
        assert!(!policy.is_empty());
    }
}
