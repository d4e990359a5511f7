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

//! The set of trusted signer keys.
//!
//! The [`TrustStore`] holds an immutable [`TrustSnapshot`] which is replaced as a whole whenever
//! a new set of [`TrustAnchor`]s is loaded.  Readers take the current snapshot without locking,
//! and always see either the old or the new set.

mod usage;

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use arc_swap::ArcSwap;
use bherror::traits::{ErrorContext as _, ForeignError as _};
use openssl::pkey::{PKey, Public};
use x509_parser::prelude::*;

pub use usage::{
    UsagePolicy, UsageTag, EKU_RECOVERY, EKU_RECOVERY_ALT, EKU_TEST, EKU_TEST_ALT,
    EKU_VACCINATION, EKU_VACCINATION_ALT,
};

use crate::{
    envelope::KeyIdentifier,
    error::{Result, TrustStoreError, VerificationError},
};

/// A public key trusted to sign certificates within a validity window.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    key_identifier: KeyIdentifier,
    public_key: PKey<Public>,
    public_key_der: Vec<u8>,
    not_before: i64,
    not_after: i64,
    usage_tags: BTreeSet<UsageTag>,
}

impl TrustAnchor {
    /// Creates a new [`TrustAnchor`] from a `DER` encoded `SubjectPublicKeyInfo`.
    ///
    /// The anchor may sign within `[not_before, not_after)`.
    ///
    /// # Errors
    ///
    /// Returns [`TrustStoreError::InvalidPublicKey`] if the key can't be parsed, and
    /// [`TrustStoreError::InvalidValidity`] if the validity window is empty.
    pub fn new(
        key_identifier: KeyIdentifier,
        public_key_der: impl Into<Vec<u8>>,
        not_before: i64,
        not_after: i64,
        usage_tags: impl IntoIterator<Item = UsageTag>,
    ) -> bherror::Result<Self, TrustStoreError> {
        if not_before >= not_after {
            return Err(bherror::Error::root(TrustStoreError::InvalidValidity(
                not_before, not_after,
            )));
        }

        let public_key_der = public_key_der.into();
        let public_key = PKey::public_key_from_der(&public_key_der)
            .foreign_err(|| TrustStoreError::InvalidPublicKey)
            .ctx(|| format!("key identifier {}", key_identifier))?;

        Ok(Self {
            key_identifier,
            public_key,
            public_key_der,
            not_before,
            not_after,
            usage_tags: usage_tags.into_iter().collect(),
        })
    }

    /// Creates a new [`TrustAnchor`] from a `DER` encoded X.509 signer certificate.
    ///
    /// The key identifier is derived from the certificate, the validity window is taken from
    /// its validity, and the usage tags are the OIDs of its extended key usage extension.
    pub fn from_certificate_der(der: &[u8]) -> bherror::Result<Self, TrustStoreError> {
        let (_, certificate) =
            X509Certificate::from_der(der).foreign_err(|| TrustStoreError::InvalidCertificate)?;

        let validity = certificate.validity();

        let usage_tags = match certificate
            .extended_key_usage()
            .foreign_err(|| TrustStoreError::InvalidCertificate)?
        {
            Some(extension) => extension
                .value
                .other
                .iter()
                .map(|oid| UsageTag::new(oid.to_id_string()))
                .collect(),
            None => Vec::new(),
        };

        Self::new(
            KeyIdentifier::from_certificate_der(der),
            certificate.public_key().raw,
            validity.not_before.timestamp(),
            validity.not_after.timestamp(),
            usage_tags,
        )
    }

    /// The key identifier the anchor is registered under.
    pub fn key_identifier(&self) -> KeyIdentifier {
        self.key_identifier
    }

    /// The public key.
    pub fn public_key(&self) -> &PKey<Public> {
        &self.public_key
    }

    /// The `DER` encoded `SubjectPublicKeyInfo` of the public key.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    /// Start of the validity window, inclusive.
    pub fn not_before(&self) -> i64 {
        self.not_before
    }

    /// End of the validity window, exclusive.
    pub fn not_after(&self) -> i64 {
        self.not_after
    }

    /// The usage tags restricting what the anchor may sign.
    pub fn usage_tags(&self) -> &BTreeSet<UsageTag> {
        &self.usage_tags
    }

    /// Checks that `current_time` lies within the validity window of the anchor.
    pub fn validate_time(&self, current_time: u64) -> Result<()> {
        let now = current_time as i128;

        if now < self.not_before as i128 || now >= self.not_after as i128 {
            return Err(
                bherror::Error::root(VerificationError::ExpiredSignatureWindow).ctx(format!(
                    "signer {} is valid within [{}, {})",
                    self.key_identifier, self.not_before, self.not_after
                )),
            );
        }

        Ok(())
    }

    fn same_key(&self, other: &Self) -> bool {
        self.key_identifier == other.key_identifier && self.public_key_der == other.public_key_der
    }
}

impl PartialEq for TrustAnchor {
    fn eq(&self, other: &Self) -> bool {
        self.same_key(other)
            && self.not_before == other.not_before
            && self.not_after == other.not_after
            && self.usage_tags == other.usage_tags
    }
}

impl Eq for TrustAnchor {}

/// An immutable, versioned set of [`TrustAnchor`]s.
#[derive(Debug, Default)]
pub struct TrustSnapshot {
    version: u64,
    anchors: BTreeMap<KeyIdentifier, Vec<TrustAnchor>>,
}

impl TrustSnapshot {
    /// The version of the snapshot, incremented on every load.  The initial empty snapshot has
    /// version `0`.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// All anchors registered under `key_identifier`, in load order.
    pub fn lookup(&self, key_identifier: &KeyIdentifier) -> &[TrustAnchor] {
        self.anchors
            .get(key_identifier)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The number of anchors in the snapshot.
    pub fn len(&self) -> usize {
        self.anchors.values().map(Vec::len).sum()
    }

    /// Returns `true` if the snapshot holds no anchors.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

/// A store of trusted signer keys, safe to share between threads.
#[derive(Debug, Default)]
pub struct TrustStore {
    snapshot: ArcSwap<TrustSnapshot>,
}

impl TrustStore {
    /// Creates an empty [`TrustStore`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole set of trusted keys with `anchors`.
    ///
    /// Several anchors may share a key identifier.  Exact duplicates are collapsed.
    ///
    /// # Errors
    ///
    /// Returns [`TrustStoreError::ConflictingAnchor`] if the same key is listed more than once
    /// with a different validity window or usage tags.  The store is left unchanged.
    pub fn load(
        &self,
        anchors: impl IntoIterator<Item = TrustAnchor>,
    ) -> bherror::Result<(), TrustStoreError> {
        let mut grouped: BTreeMap<KeyIdentifier, Vec<TrustAnchor>> = BTreeMap::new();

        for anchor in anchors {
            let candidates = grouped.entry(anchor.key_identifier).or_default();

            match candidates.iter().find(|known| known.same_key(&anchor)) {
                Some(known) if *known == anchor => continue,
                Some(_) => {
                    return Err(bherror::Error::root(TrustStoreError::ConflictingAnchor(
                        anchor.key_identifier,
                    )));
                }
                None => candidates.push(anchor),
            }
        }

        let count: usize = grouped.values().map(Vec::len).sum();
        let previous = self.snapshot.rcu(|current| TrustSnapshot {
            version: current.version + 1,
            anchors: grouped.clone(),
        });

        tracing::info!(
            version = previous.version + 1,
            anchors = count,
            "trust store reloaded"
        );

        Ok(())
    }

    /// All anchors registered under `key_identifier` in the current snapshot.
    pub fn lookup(&self, key_identifier: &KeyIdentifier) -> Vec<TrustAnchor> {
        self.snapshot.load().lookup(key_identifier).to_vec()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<TrustSnapshot> {
        self.snapshot.load_full()
    }

    /// The version of the current snapshot.
    pub fn version(&self) -> u64 {
        self.snapshot.load().version
    }
}
