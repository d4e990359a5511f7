// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! This module provides the [`Verifier`] type which runs the whole verification pipeline over a
//! scanned certificate payload.

use std::sync::Arc;

use crate::{
    codec::RawCertificatePayload,
    crypto::SignatureAlgorithm,
    envelope::{KeyIdentifier, SignedEnvelope},
    error::{DecodeStage, Result, VerificationError},
    models::{Certificate, EntryKind},
    revocation::RevocationChecker,
    trust::{TrustAnchor, TrustStore, UsagePolicy},
};

/// The outcome of verifying a certificate payload.
///
/// Exactly one verdict is produced per verification.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationVerdict {
    /// The certificate is valid.
    Valid(Certificate),
    /// The payload could not be decoded at the given stage.
    MalformedPayload(DecodeStage),
    /// No trust anchor is registered under the payload's key identifier.
    UnknownSigner(KeyIdentifier),
    /// None of the candidate trust anchors verified the signature.
    SignatureInvalid,
    /// The signing trust anchor is outside of its validity window.
    ExpiredSignatureWindow,
    /// The signing trust anchor may not sign certificates of this kind.
    UsageNotAllowed(EntryKind),
    /// The relevant entry of the certificate has been revoked.
    Revoked,
    /// The certificate expired at the given timestamp.
    CertificateExpired(i64),
    /// The certificate becomes valid at the given timestamp.
    CertificateNotYetValid(i64),
}

impl VerificationVerdict {
    /// Returns `true` for [`VerificationVerdict::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

impl From<VerificationError> for VerificationVerdict {
    fn from(error: VerificationError) -> Self {
        match error {
            VerificationError::MalformedPayload(stage) => Self::MalformedPayload(stage),
            VerificationError::UnknownSigner(kid) => Self::UnknownSigner(kid),
            VerificationError::SignatureInvalid => Self::SignatureInvalid,
            VerificationError::ExpiredSignatureWindow => Self::ExpiredSignatureWindow,
            VerificationError::UsageNotAllowed(kind) => Self::UsageNotAllowed(kind),
            VerificationError::Revoked => Self::Revoked,
            VerificationError::CertificateExpired(exp) => Self::CertificateExpired(exp),
            VerificationError::CertificateNotYetValid(iat) => Self::CertificateNotYetValid(iat),
        }
    }
}

impl From<Result<VerifiedCertificate>> for VerificationVerdict {
    fn from(result: Result<VerifiedCertificate>) -> Self {
        match result {
            Ok(verified) => Self::Valid(verified.certificate),
            Err(err) => err.error.into(),
        }
    }
}

/// A certificate which passed every verification step.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedCertificate {
    payload: RawCertificatePayload,
    certificate: Certificate,
    key_identifier: KeyIdentifier,
    algorithm: SignatureAlgorithm,
}

impl VerifiedCertificate {
    /// The payload the certificate was decoded from.
    pub fn payload(&self) -> &RawCertificatePayload {
        &self.payload
    }

    /// The decoded certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// The key identifier of the signer.
    pub fn key_identifier(&self) -> KeyIdentifier {
        self.key_identifier
    }

    /// The algorithm of the signature.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Splits into the payload and the decoded certificate.
    pub fn into_parts(self) -> (RawCertificatePayload, Certificate) {
        (self.payload, self.certificate)
    }
}

/// Verifier of scanned certificate payloads.
///
/// The verifier keeps no state of its own; it reads the current trust and revocation snapshots
/// on every call, so reloading either of them never needs to touch the verifier.
#[derive(Debug, Clone)]
pub struct Verifier {
    trust_store: Arc<TrustStore>,
    revocation: Arc<RevocationChecker>,
    usage_policy: UsagePolicy,
}

impl Verifier {
    /// Creates a new [`Verifier`] applying the default [`UsagePolicy`].
    pub fn new(trust_store: Arc<TrustStore>, revocation: Arc<RevocationChecker>) -> Self {
        Self {
            trust_store,
            revocation,
            usage_policy: UsagePolicy::default(),
        }
    }

    /// Replaces the [`UsagePolicy`].
    pub fn with_usage_policy(mut self, usage_policy: UsagePolicy) -> Self {
        self.usage_policy = usage_policy;
        self
    }

    /// The trust store the verifier reads from.
    pub fn trust_store(&self) -> &Arc<TrustStore> {
        &self.trust_store
    }

    /// The revocation checker the verifier reads from.
    pub fn revocation(&self) -> &Arc<RevocationChecker> {
        &self.revocation
    }

    /// Runs the verification pipeline over the `payload` and returns a single
    /// [`VerificationVerdict`].
    pub fn verdict(
        &self,
        payload: &RawCertificatePayload,
        current_time: u64,
    ) -> VerificationVerdict {
        self.verify(payload, current_time).into()
    }

    /// Runs the verification pipeline over the `payload`.
    ///
    /// The steps run in a fixed order and the first failing step decides the error:
    ///
    ///   1. decoding the text, the envelope and the claims,
    ///   2. looking the signer up by its key identifier,
    ///   3. verifying the signature with every candidate signer until one succeeds,
    ///   4. the validity window of the signer,
    ///   5. the usage policy of the signer,
    ///   6. revocation of the relevant entry,
    ///   7. the issuing and expiration time of the certificate.
    ///
    /// # Errors
    ///
    /// Returns the [`VerificationError`] of the first failing step.
    pub fn verify(
        &self,
        payload: &RawCertificatePayload,
        current_time: u64,
    ) -> Result<VerifiedCertificate> {
        let envelope = SignedEnvelope::parse(&payload.decode()?)?;
        let certificate = Certificate::decode(envelope.payload())?;

        let key_identifier = envelope.key_identifier();
        let trust = self.trust_store.snapshot();
        let candidates = trust.lookup(&key_identifier);

        if candidates.is_empty() {
            return Err(bherror::Error::root(VerificationError::UnknownSigner(
                key_identifier,
            )));
        }

        let anchor = find_signer(&envelope, candidates)?;

        anchor.validate_time(current_time)?;
        self.usage_policy.check(anchor, certificate.kind())?;

        if let Some(entry) = certificate.relevant_entry() {
            if self.revocation.is_revoked_entry(&entry, current_time) {
                return Err(bherror::Error::root(VerificationError::Revoked)
                    .ctx(format!("key identifier {}", key_identifier)));
            }
        }

        certificate.validate_time(current_time)?;

        Ok(VerifiedCertificate {
            payload: payload.clone(),
            certificate,
            key_identifier,
            algorithm: envelope.algorithm(),
        })
    }
}

/// Returns the first candidate whose key verifies the signature of the `envelope`.
fn find_signer<'a>(
    envelope: &SignedEnvelope,
    candidates: &'a [TrustAnchor],
) -> Result<&'a TrustAnchor> {
    let signed_data = envelope.signed_data();
    let algorithm = envelope.algorithm();

    for (index, anchor) in candidates.iter().enumerate() {
        match algorithm.verify(&signed_data, envelope.signature(), anchor.public_key()) {
            Ok(true) => return Ok(anchor),
            Ok(false) => tracing::debug!(
                kid = %anchor.key_identifier(),
                candidate = index,
                %algorithm,
                "signature does not match candidate"
            ),
            Err(err) => tracing::debug!(
                kid = %anchor.key_identifier(),
                candidate = index,
                %algorithm,
                error = %err,
                "failed to verify signature with candidate"
            ),
        }
    }

    Err(bherror::Error::root(VerificationError::SignatureInvalid).ctx(format!(
        "{} candidate(s) for key identifier {}",
        candidates.len(),
        envelope.key_identifier()
    )))
}
