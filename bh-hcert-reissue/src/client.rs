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

//! The HTTP seam of the reissue client.

use std::future::Future;

use reqwest::{Client, ClientBuilder};

use crate::models::ReissueRequest;

/// Interface providing functionality of sending the HTTP POST request of the reissue protocol.
///
/// Implementations may restrict where requests go, e.g. by allow-listing hosts.
pub trait HttpPostClient: Sync {
    /// Error type used by this trait.
    type Err: std::error::Error + Send + Sync + 'static;

    /// Performs a HTTP POST request to `url` with the JSON encoded `request` as the body.
    fn post(
        &self,
        url: &str,
        request: &ReissueRequest,
    ) -> impl Future<Output = std::result::Result<reqwest::Response, Self::Err>> + Send;
}

/// [`HttpPostClient`] implementation using the [`reqwest`] crate.
#[derive(Debug, Clone, Default)]
pub struct ReqwestPostClient(Client);

impl ReqwestPostClient {
    /// Construct [`ReqwestPostClient`] from [`Client`].
    pub fn new(client: Client) -> Self {
        Self(client)
    }

    /// Construct [`ReqwestPostClient`] from [`ClientBuilder`].
    pub fn from_builder(builder: ClientBuilder) -> reqwest::Result<Self> {
        Ok(Self(builder.build()?))
    }
}

impl HttpPostClient for ReqwestPostClient {
    type Err = reqwest::Error;

    fn post(
        &self,
        url: &str,
        request: &ReissueRequest,
    ) -> impl Future<Output = reqwest::Result<reqwest::Response>> + Send {
        self.0.post(url).json(request).send()
    }
}
