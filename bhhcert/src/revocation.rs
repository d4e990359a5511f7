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

//! Revocation of issued certificates.
//!
//! A [`RevocationChecker`] answers from an immutable [`RevocationSet`] snapshot, which is
//! replaced as a whole by [`RevocationChecker::refresh`].  Checking never waits on a refresh.
//!
//! A revoked entry is listed either by its certificate identifier (`ci`), or by one of the
//! 128-bit hashes derived from it, see [`uci_hash`] and [`country_uci_hash`].

use std::{collections::BTreeSet, future::Future, sync::Arc};

use arc_swap::ArcSwap;
use bherror::{traits::PropagateError as _, BhError};
use serde::{Deserialize, Serialize};

use crate::{error::RevocationError, models::Entry};

/// The length in bytes of a revocation hash.
pub const REVOCATION_HASH_LEN: usize = 16;

/// A truncated `SHA-256` digest listed in place of a certificate identifier.
pub type RevocationHash = [u8; REVOCATION_HASH_LEN];

/// The hash of the certificate identifier alone.
pub fn uci_hash(certificate_identifier: &str) -> RevocationHash {
    truncated_sha256(certificate_identifier.as_bytes())
}

/// The hash of the issuing country code followed by the certificate identifier.
pub fn country_uci_hash(country: &str, certificate_identifier: &str) -> RevocationHash {
    truncated_sha256(format!("{}{}", country, certificate_identifier).as_bytes())
}

fn truncated_sha256(data: &[u8]) -> RevocationHash {
    let digest = openssl::sha::sha256(data);

    let mut hash = [0u8; REVOCATION_HASH_LEN];
    hash.copy_from_slice(&digest[..REVOCATION_HASH_LEN]);
    hash
}

/// A set of revoked certificate identifiers and hashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationSet {
    #[serde(default)]
    identifiers: BTreeSet<String>,
    #[serde(default)]
    hashes: BTreeSet<RevocationHash>,
}

impl RevocationSet {
    /// Creates an empty [`RevocationSet`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a [`RevocationSet`] from its identifiers and hashes.
    pub fn from_parts(
        identifiers: impl IntoIterator<Item = String>,
        hashes: impl IntoIterator<Item = RevocationHash>,
    ) -> Self {
        Self {
            identifiers: identifiers.into_iter().collect(),
            hashes: hashes.into_iter().collect(),
        }
    }

    /// Adds a revoked certificate identifier.
    pub fn with_identifier(mut self, certificate_identifier: impl Into<String>) -> Self {
        self.identifiers.insert(certificate_identifier.into());
        self
    }

    /// Adds a revocation hash.
    pub fn with_hash(mut self, hash: RevocationHash) -> Self {
        self.hashes.insert(hash);
        self
    }

    /// Returns `true` if the certificate identifier is revoked, either directly or through its
    /// [`uci_hash`].
    pub fn contains(&self, certificate_identifier: &str) -> bool {
        self.identifiers.contains(certificate_identifier)
            || self.hashes.contains(&uci_hash(certificate_identifier))
    }

    /// Returns `true` if the entry is revoked through its identifier or any hash derived from
    /// it.
    pub fn contains_entry(&self, entry: &Entry<'_>) -> bool {
        let certificate_identifier = entry.certificate_identifier();

        self.contains(certificate_identifier)
            || self
                .hashes
                .contains(&country_uci_hash(entry.country(), certificate_identifier))
    }

    /// The number of identifiers and hashes in the set.
    pub fn len(&self) -> usize {
        self.identifiers.len() + self.hashes.len()
    }

    /// Returns `true` if nothing is revoked.
    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty() && self.hashes.is_empty()
    }
}

/// What to answer while the revocation data is older than allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalenessPolicy {
    /// Answer from the stale data and log a warning.
    #[default]
    ServeStale,
    /// Report every certificate as revoked.
    TreatAsRevoked,
}

/// Configuration of the [`RevocationChecker`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationConfig {
    /// The age in seconds after which the revocation data is stale.
    pub max_age_secs: u64,
    /// What to answer while the data is stale.
    #[serde(default)]
    pub staleness_policy: StalenessPolicy,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 24 * 60 * 60,
            staleness_policy: StalenessPolicy::default(),
        }
    }
}

/// Trait that defines the interface for fetching the current [`RevocationSet`].
pub trait RevocationSource {
    /// The error type returned by the source.
    type Err;

    /// Fetches the complete current revocation set.
    fn fetch(&self) -> impl Future<Output = Result<RevocationSet, Self::Err>>;
}

/// An immutable revocation set together with the time it was obtained.
#[derive(Debug, Default)]
pub struct RevocationSnapshot {
    set: RevocationSet,
    updated_at: Option<u64>,
}

impl RevocationSnapshot {
    /// The revocation set.
    pub fn set(&self) -> &RevocationSet {
        &self.set
    }

    /// The time the set was loaded, or [`None`] if nothing was loaded yet.
    pub fn updated_at(&self) -> Option<u64> {
        self.updated_at
    }
}

/// Checks certificate entries against the latest known revocation set.
#[derive(Debug, Default)]
pub struct RevocationChecker {
    config: RevocationConfig,
    snapshot: ArcSwap<RevocationSnapshot>,
}

impl RevocationChecker {
    /// Creates a [`RevocationChecker`] without any revocation data.
    ///
    /// Until the first set is loaded the checker is stale.
    pub fn new(config: RevocationConfig) -> Self {
        Self {
            config,
            snapshot: ArcSwap::default(),
        }
    }

    /// The configuration of the checker.
    pub fn config(&self) -> &RevocationConfig {
        &self.config
    }

    /// Replaces the revocation set, marking it as obtained at `current_time`.
    pub fn load(&self, set: RevocationSet, current_time: u64) {
        let entries = set.len();

        self.snapshot.store(Arc::new(RevocationSnapshot {
            set,
            updated_at: Some(current_time),
        }));

        tracing::info!(entries, updated_at = current_time, "revocation set replaced");
    }

    /// Fetches a new revocation set from the `source` and replaces the current one.
    ///
    /// # Errors
    ///
    /// Returns [`RevocationError::Fetch`] if the source fails.  The last good set is kept and
    /// keeps aging.
    pub async fn refresh<S, E>(
        &self,
        source: &S,
        current_time: u64,
    ) -> bherror::Result<(), RevocationError>
    where
        E: BhError,
        S: RevocationSource<Err = bherror::Error<E>>,
    {
        match source.fetch().await {
            Ok(set) => {
                self.load(set, current_time);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    updated_at = ?self.snapshot.load().updated_at,
                    "revocation refresh failed, keeping the last good set"
                );
                Err(err).with_err(|| RevocationError::Fetch)
            }
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<RevocationSnapshot> {
        self.snapshot.load_full()
    }

    /// Returns `true` if the revocation data at `current_time` is older than the configured
    /// maximum age, or if none was loaded.
    pub fn is_stale(&self, current_time: u64) -> bool {
        snapshot_is_stale(&self.snapshot.load(), &self.config, current_time)
    }

    /// Checks a single certificate identifier.
    pub fn is_revoked(&self, certificate_identifier: &str, current_time: u64) -> bool {
        self.check(current_time, |set| set.contains(certificate_identifier))
    }

    /// Checks a certificate entry, including the hashes derived from its issuing country.
    pub fn is_revoked_entry(&self, entry: &Entry<'_>, current_time: u64) -> bool {
        self.check(current_time, |set| set.contains_entry(entry))
    }

    fn check(&self, current_time: u64, contains: impl FnOnce(&RevocationSet) -> bool) -> bool {
        let snapshot = self.snapshot.load();

        if snapshot_is_stale(&snapshot, &self.config, current_time) {
            match self.config.staleness_policy {
                StalenessPolicy::TreatAsRevoked => return true,
                StalenessPolicy::ServeStale => tracing::warn!(
                    updated_at = ?snapshot.updated_at,
                    max_age_secs = self.config.max_age_secs,
                    "revocation data is stale, serving it anyway"
                ),
            }
        }

        contains(&snapshot.set)
    }
}

fn snapshot_is_stale(
    snapshot: &RevocationSnapshot,
    config: &RevocationConfig,
    current_time: u64,
) -> bool {
    match snapshot.updated_at {
        Some(updated_at) => current_time.saturating_sub(updated_at) > config.max_age_secs,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::test_utils::{vaccination, vaccination_certificate};

    #[derive(strum_macros::Display, Debug)]
    enum SourceError {
        #[strum(to_string = "source unavailable")]
        Unavailable,
    }

    impl BhError for SourceError {}

    struct StaticSource(Option<RevocationSet>);

    impl RevocationSource for StaticSource {
        type Err = bherror::Error<SourceError>;

        async fn fetch(&self) -> Result<RevocationSet, Self::Err> {
            self.0
                .clone()
                .ok_or_else(|| bherror::Error::root(SourceError::Unavailable))
        }
    }

    fn fresh_config() -> RevocationConfig {
        RevocationConfig {
            max_age_secs: 100,
            staleness_policy: StalenessPolicy::TreatAsRevoked,
        }
    }

    #[test]
    fn test_hashes() {
        assert_eq!(
            uci_hash("URN:UVCI:01:AT:10807843F94AEE0EE5093FBC254BD813#B"),
            openssl::sha::sha256(b"URN:UVCI:01:AT:10807843F94AEE0EE5093FBC254BD813#B")[..16]
        );
        assert_eq!(
            country_uci_hash("AT", "URN:UVCI:01:AT:10807843F94AEE0EE5093FBC254BD813#B"),
            openssl::sha::sha256(b"ATURN:UVCI:01:AT:10807843F94AEE0EE5093FBC254BD813#B")[..16]
        );
        assert_eq!(
            hex::encode(uci_hash("abc")),
            "ba7816bf8f01cfea414140de5dae2223"
        );
    }

    #[test]
    fn test_set_matches_identifiers_and_hashes() {
        let set = RevocationSet::new()
            .with_identifier("URN:UVCI:01:HR:1")
            .with_hash(uci_hash("URN:UVCI:01:HR:2"))
            .with_hash(country_uci_hash("HR", "URN:UVCI:01:HR:3"));

        assert!(set.contains("URN:UVCI:01:HR:1"));
        assert!(set.contains("URN:UVCI:01:HR:2"));
        // The country hash only matches a whole entry.
        assert!(!set.contains("URN:UVCI:01:HR:3"));
        assert!(!set.contains("URN:UVCI:01:HR:4"));

        let revoked = vaccination("2021-06-01", "URN:UVCI:01:HR:3");
        let certificate = vaccination_certificate(0, 100);
        assert!(set.contains_entry(&Entry::Vaccination(&revoked)));
        assert!(!set.contains_entry(&certificate.relevant_entry().unwrap()));
    }

    #[test]
    fn test_set_from_feed() {
        let set: RevocationSet = serde_json::from_str(&format!(
            r#"{{ "identifiers": ["URN:UVCI:01:HR:1"], "hashes": [{:?}] }}"#,
            uci_hash("URN:UVCI:01:HR:2")
        ))
        .unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.contains("URN:UVCI:01:HR:2"));
    }

    #[tokio::test]
    async fn test_refresh_replaces_set() {
        let checker = RevocationChecker::new(fresh_config());
        let source = StaticSource(Some(RevocationSet::new().with_identifier("revoked")));

        checker.refresh(&source, 10).await.unwrap();

        assert!(checker.is_revoked("revoked", 20));
        assert!(!checker.is_revoked("valid", 20));
        assert_eq!(checker.snapshot().updated_at(), Some(10));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_last_good_set() {
        let checker = RevocationChecker::new(fresh_config());
        checker.load(RevocationSet::new().with_identifier("revoked"), 10);

        let err = checker
            .refresh(&StaticSource(None), 20)
            .await
            .unwrap_err();

        assert_matches!(err.error, RevocationError::Fetch);
        assert!(checker.is_revoked("revoked", 30));
        assert!(!checker.is_revoked("valid", 30));
        assert_eq!(checker.snapshot().updated_at(), Some(10));
    }

    #[test]
    fn test_staleness() {
        let checker = RevocationChecker::new(fresh_config());
        assert!(checker.is_stale(0));

        checker.load(RevocationSet::new(), 10);
        assert!(!checker.is_stale(10));
        assert!(!checker.is_stale(110));
        assert!(checker.is_stale(111));
    }

    #[test]
    fn test_stale_treated_as_revoked() {
        let checker = RevocationChecker::new(fresh_config());
        assert!(checker.is_revoked("valid", 0));

        checker.load(RevocationSet::new(), 10);
        assert!(!checker.is_revoked("valid", 50));
        assert!(checker.is_revoked("valid", 200));
    }

    #[test]
    fn test_stale_served_by_default() {
        let checker = RevocationChecker::new(RevocationConfig {
            max_age_secs: 100,
            ..Default::default()
        });
        checker.load(RevocationSet::new().with_identifier("revoked"), 10);

        assert!(checker.is_revoked("revoked", 1_000));
        assert!(!checker.is_revoked("valid", 1_000));
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{ "max_age_secs": 3600, "staleness_policy": "treat_as_revoked" }"#;
        let config: RevocationConfig = serde_json::from_str(json).unwrap();

        assert_eq!(
            config,
            RevocationConfig {
                max_age_secs: 3600,
                staleness_policy: StalenessPolicy::TreatAsRevoked,
            }
        );

        let config: RevocationConfig = serde_json::from_str(r#"{ "max_age_secs": 60 }"#).unwrap();
        assert_eq!(config.staleness_policy, StalenessPolicy::ServeStale);
    }
}
