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

//! Usage policy of the trust anchors.
//!
//! Signer certificates restrict which kinds of health certificates they may sign through their
//! extended key usage.  Which tag grants which kind is configuration, not code.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::TrustAnchor;
use crate::{
    error::{Result, VerificationError},
    models::EntryKind,
};

/// Extended key usage OID allowing a signer to issue test certificates.
pub const EKU_TEST: &str = "1.3.6.1.4.1.1847.2021.1.1";
/// Extended key usage OID allowing a signer to issue vaccination certificates.
pub const EKU_VACCINATION: &str = "1.3.6.1.4.1.1847.2021.1.2";
/// Extended key usage OID allowing a signer to issue recovery certificates.
pub const EKU_RECOVERY: &str = "1.3.6.1.4.1.1847.2021.1.3";
/// Alternative OID of [`EKU_TEST`] found in early signer certificates.
pub const EKU_TEST_ALT: &str = "1.3.6.1.4.1.0.1847.2021.1.1";
/// Alternative OID of [`EKU_VACCINATION`] found in early signer certificates.
pub const EKU_VACCINATION_ALT: &str = "1.3.6.1.4.1.0.1847.2021.1.2";
/// Alternative OID of [`EKU_RECOVERY`] found in early signer certificates.
pub const EKU_RECOVERY_ALT: &str = "1.3.6.1.4.1.0.1847.2021.1.3";

/// A usage tag of a trust anchor, in practice the dotted form of an extended key usage OID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageTag(String);

impl UsageTag {
    /// Creates a new [`UsageTag`].
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The tag text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UsageTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Maps usage tags to the kinds of certificates they grant.
///
/// A trust anchor carrying none of the tags known to the policy is unrestricted.  Otherwise it
/// may only sign the kinds granted by at least one of its known tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePolicy {
    rules: BTreeMap<UsageTag, BTreeSet<EntryKind>>,
}

impl Default for UsagePolicy {
    /// The policy of the EU DCC trust framework.
    fn default() -> Self {
        Self::empty()
            .with_rule(EKU_TEST, [EntryKind::Test])
            .with_rule(EKU_TEST_ALT, [EntryKind::Test])
            .with_rule(EKU_VACCINATION, [EntryKind::Vaccination])
            .with_rule(EKU_VACCINATION_ALT, [EntryKind::Vaccination])
            .with_rule(EKU_RECOVERY, [EntryKind::Recovery])
            .with_rule(EKU_RECOVERY_ALT, [EntryKind::Recovery])
    }
}

impl UsagePolicy {
    /// A policy without rules, under which every trust anchor is unrestricted.
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Adds a rule granting the `kinds` to anchors tagged with `tag`.
    pub fn with_rule(
        mut self,
        tag: impl Into<UsageTag>,
        kinds: impl IntoIterator<Item = EntryKind>,
    ) -> Self {
        self.rules.entry(tag.into()).or_default().extend(kinds);
        self
    }

    /// The kinds the `tags` grant, or [`None`] if none of them is known to the policy.
    pub fn allowed_kinds<'a>(
        &self,
        tags: impl IntoIterator<Item = &'a UsageTag>,
    ) -> Option<BTreeSet<EntryKind>> {
        tags.into_iter()
            .filter_map(|tag| self.rules.get(tag))
            .fold(None, |allowed: Option<BTreeSet<EntryKind>>, kinds| {
                let mut allowed = allowed.unwrap_or_default();
                allowed.extend(kinds);
                Some(allowed)
            })
    }

    /// Checks that the `anchor` may sign certificates of the given `kind`.
    pub fn check(&self, anchor: &TrustAnchor, kind: EntryKind) -> Result<()> {
        match self.allowed_kinds(anchor.usage_tags()) {
            Some(allowed) if !allowed.contains(&kind) => Err(bherror::Error::root(
                VerificationError::UsageNotAllowed(kind),
            )
            .ctx(format!("signer {}", anchor.key_identifier()))),
            _ => Ok(()),
        }
    }
}
