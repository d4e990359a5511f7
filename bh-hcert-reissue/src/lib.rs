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

//! This crate provides a client of the certificate reissue service, which renews EU Digital
//! COVID Certificates signed with keys about to leave the trust list, and extends certificates
//! about to expire.
//!
//! Every certificate returned by the service is verified with a [`bhhcert::Verifier`] before it
//! is handed out; a single invalid certificate fails the whole call.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bh_hcert_reissue::{ReissueClient, ReissueConfig, ReqwestPostClient};
//! use bhhcert::{RawCertificatePayload, RevocationChecker, RevocationConfig, TrustStore, Verifier};
//!
//! # async fn example() {
//! let trust_store = Arc::new(TrustStore::new());
//! let revocation = Arc::new(RevocationChecker::new(RevocationConfig::default()));
//! let verifier = Verifier::new(trust_store, revocation);
//!
//! let config = ReissueConfig {
//!     base_url: "https://reissue.example.com".to_owned(),
//! };
//! let client = ReissueClient::new(ReqwestPostClient::default(), &config, verifier).unwrap();
//!
//! let stored = vec![RawCertificatePayload::new("HC1:...")];
//! let current_time = 1_650_000_000;
//!
//! match client.renew(&stored, current_time).await {
//!     Ok(reissued) => println!("received {} certificates", reissued.len()),
//!     Err(err) => println!("reissue failed with code {:?}", err.error.code()),
//! }
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
mod reissue;

pub use client::{HttpPostClient, ReqwestPostClient};
pub use error::{ProtocolError, ReissueError, Result};
pub use models::{ReissueAction, ReissueRequest, ReissueResponseItem};
pub use reissue::{ReissueClient, ReissueConfig, ReissuedCertificate, REISSUE_PATH};
