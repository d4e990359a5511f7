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

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! This crate provides the functionality for decoding and verifying EU Digital COVID
//! Certificates ([DCC][1]) as they are scanned from QR codes.
//!
//! [1]: <https://ec.europa.eu/health/sites/default/files/ehealth/docs/covid-certificate_json_specification_en.pdf>
//!
//! # Details
//!
//! A scanned payload passes through the following steps, each provided by its own module.
//!
//!   * [`codec`] strips the `HC1:` prefix and decodes `Base45` and `ZLIB`.
//!   * [`envelope`] parses the signed `COSE_Sign1` structure.
//!   * [`models`] decodes the CWT claims and the certificate schema.
//!   * [`trust`] holds the trusted signer keys and their usage policy.
//!   * [`revocation`] holds the revoked certificate identifiers.
//!   * [`verifier`] runs all of the above and produces a single verdict.
//!
//! The error values are described in the [`error`] module.
//!
//! The trust and revocation data are shared snapshots which can be replaced at any time, from
//! any thread, without disturbing verifications in progress.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bhhcert::{
//!     RawCertificatePayload, RevocationChecker, RevocationConfig, TrustAnchor, TrustStore,
//!     VerificationVerdict, Verifier,
//! };
//!
//! // `DER` encoded signer certificates obtained from the trust list.
//! let signer_certificates: Vec<Vec<u8>> = vec![];
//!
//! let trust_store = Arc::new(TrustStore::new());
//! trust_store
//!     .load(
//!         signer_certificates
//!             .iter()
//!             .map(|der| TrustAnchor::from_certificate_der(der))
//!             .collect::<Result<Vec<_>, _>>()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let revocation = Arc::new(RevocationChecker::new(RevocationConfig::default()));
//! let verifier = Verifier::new(trust_store, revocation);
//!
//! let payload = RawCertificatePayload::new("HC1:NCFOXN%TS3DH3ZSUZK+.V0ETD%65NL-AH...");
//! let current_time = 1_625_000_000;
//!
//! match verifier.verdict(&payload, current_time) {
//!     VerificationVerdict::Valid(certificate) => {
//!         println!("valid certificate of {}", certificate.subject_name().full_name())
//!     }
//!     verdict => println!("rejected: {:?}", verdict),
//! }
//! ```

pub mod codec;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod models;
pub mod revocation;
#[cfg(any(feature = "test-utils", test))]
pub mod test_utils;
pub mod trust;
pub mod verifier;

pub use codec::{RawCertificatePayload, HC1_PREFIX};
pub use crypto::SignatureAlgorithm;
pub use envelope::{KeyIdentifier, SignedEnvelope};
pub use error::{
    DecodeStage, EncodingError, Result, RevocationError, TrustStoreError, VerificationError,
};
pub use models::{Certificate, EntryKind, HealthCertificate};
pub use revocation::{
    RevocationChecker, RevocationConfig, RevocationSet, RevocationSource, StalenessPolicy,
};
pub use trust::{TrustAnchor, TrustStore, UsagePolicy, UsageTag};
pub use verifier::{VerificationVerdict, VerifiedCertificate, Verifier};
