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

//! This module defines the error values returned by the crate API.

use crate::{envelope::KeyIdentifier, models::EntryKind};

/// The step of the decoding chain which rejected a payload.
#[derive(strum_macros::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    /// Prefix, `Base45` or `DEFLATE` decoding.
    #[strum(to_string = "text")]
    Text,
    /// The `COSE_Sign1` structure.
    #[strum(to_string = "envelope")]
    Envelope,
    /// The CWT claims and the certificate schema.
    #[strum(to_string = "schema")]
    Schema,
}

/// Error type returned when verifying a certificate.
///
/// The set of variants is closed; every failed verification ends in exactly one of them.
#[derive(strum_macros::Display, Debug, Clone, PartialEq)]
pub enum VerificationError {
    /// The payload could not be decoded at the given stage.
    #[strum(to_string = "Malformed payload at the {0} stage")]
    MalformedPayload(DecodeStage),
    /// No trust anchor is registered under the payload's key identifier.
    #[strum(to_string = "Unknown signer with key identifier {0}")]
    UnknownSigner(KeyIdentifier),
    /// None of the candidate trust anchors verified the signature.
    #[strum(to_string = "Signature validation failed")]
    SignatureInvalid,
    /// The signing trust anchor is outside of its own validity window.
    #[strum(to_string = "Signer is outside of its validity window")]
    ExpiredSignatureWindow,
    /// The signing trust anchor may not sign certificates of this kind.
    #[strum(to_string = "Signer is not allowed to sign {0} certificates")]
    UsageNotAllowed(EntryKind),
    /// The relevant entry of the certificate has been revoked.
    #[strum(to_string = "Certificate has been revoked")]
    Revoked,
    /// The certificate has expired.
    #[strum(to_string = "Certificate expired at timestamp {0}")]
    CertificateExpired(i64),
    /// The certificate isn't valid yet, but will be at a later time.
    #[strum(to_string = "Certificate becomes valid at timestamp {0}")]
    CertificateNotYetValid(i64),
}

impl bherror::BhError for VerificationError {}

/// Type alias for [`bherror::Result`] types returned by the verification API.
pub type Result<T> = bherror::Result<T, VerificationError>;

/// Error type returned when encoding certificates and payloads.
#[derive(strum_macros::Display, Debug, Clone, PartialEq)]
pub enum EncodingError {
    /// Error when compressing the payload.
    #[strum(to_string = "Compression failed")]
    Compression,
    /// Error when serializing to `CBOR`.
    #[strum(to_string = "CBOR serialization failed")]
    Cbor,
    /// Error when building or signing the `COSE` structure.
    #[strum(to_string = "COSE serialization failed")]
    Cose,
}

impl bherror::BhError for EncodingError {}

/// Error type returned by the [`TrustStore`][crate::TrustStore] and
/// [`TrustAnchor`][crate::TrustAnchor] constructors.
#[derive(strum_macros::Display, Debug, Clone, PartialEq)]
pub enum TrustStoreError {
    /// The same key was listed twice with different metadata.
    #[strum(to_string = "Conflicting trust anchors for key identifier {0}")]
    ConflictingAnchor(KeyIdentifier),
    /// The signer certificate could not be parsed.
    #[strum(to_string = "Invalid signer certificate")]
    InvalidCertificate,
    /// The public key could not be parsed.
    #[strum(to_string = "Invalid public key")]
    InvalidPublicKey,
    /// The validity window is empty.
    #[strum(to_string = "Invalid validity window: not before {0}, not after {1}")]
    InvalidValidity(i64, i64),
}

impl bherror::BhError for TrustStoreError {}

/// Error type returned by the [`RevocationChecker`][crate::RevocationChecker].
#[derive(strum_macros::Display, Debug, Clone, PartialEq)]
pub enum RevocationError {
    /// The revocation source failed to provide a new revocation set.
    #[strum(to_string = "Failed to fetch the revocation set")]
    Fetch,
}

impl bherror::BhError for RevocationError {}
