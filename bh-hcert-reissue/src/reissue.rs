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

//! This module provides the [`ReissueClient`] type which renews and extends certificates
//! through the reissue service.

use bh_uri_utils::UriPathExtensions as _;
use bherror::traits::{ErrorContext as _, ForeignError as _, PropagateError as _};
use bhhcert::{Certificate, RawCertificatePayload, VerifiedCertificate, Verifier};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::{
    client::HttpPostClient,
    error::{ProtocolError, ReissueError, Result},
    models::{ReissueAction, ReissueRequest, ReissueResponseItem},
};

/// The path of the reissue endpoint, relative to the base URL of the service.
pub const REISSUE_PATH: &str = "/api/certify/v2/reissue";

/// Configuration of the [`ReissueClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReissueConfig {
    /// The `https` base URL of the reissue service.
    pub base_url: String,
}

/// A certificate returned by the reissue service which passed the full verification.
#[derive(Debug, Clone, PartialEq)]
pub struct ReissuedCertificate(VerifiedCertificate);

impl ReissuedCertificate {
    /// The payload of the reissued certificate, to be stored in place of the original.
    pub fn payload(&self) -> &RawCertificatePayload {
        self.0.payload()
    }

    /// The decoded reissued certificate.
    pub fn certificate(&self) -> &Certificate {
        self.0.certificate()
    }

    /// Splits into the payload and the decoded certificate.
    pub fn into_parts(self) -> (RawCertificatePayload, Certificate) {
        self.0.into_parts()
    }
}

impl From<VerifiedCertificate> for ReissuedCertificate {
    fn from(verified: VerifiedCertificate) -> Self {
        Self(verified)
    }
}

/// Client of the reissue service.
///
/// Every call sends exactly one request and either returns every reissued certificate, in the
/// order the service listed them, or an error.  Nothing is retried.
pub struct ReissueClient<C: HttpPostClient> {
    client: C,
    endpoint: Url,
    verifier: Verifier,
}

impl<C: HttpPostClient> ReissueClient<C> {
    /// Creates a new [`ReissueClient`].
    ///
    /// The `verifier` checks the certificates returned by the service.
    ///
    /// # Errors
    ///
    /// Returns [`ReissueError::InvalidConfiguration`] if the base URL can't be parsed or doesn't
    /// use `https`.
    pub fn new(client: C, config: &ReissueConfig, verifier: Verifier) -> Result<Self> {
        let invalid = || ReissueError::InvalidConfiguration(config.base_url.clone());

        let base_url = Url::parse(&config.base_url).foreign_err(invalid)?;

        if base_url.scheme() != "https" {
            return Err(bherror::Error::root(invalid()).ctx("the base URL must use https"));
        }

        let endpoint = base_url.add_path_suffix(REISSUE_PATH).with_err(invalid)?;

        Ok(Self {
            client,
            endpoint,
            verifier,
        })
    }

    /// The URL the requests are sent to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Reissues `certificates` whose signing keys are about to lose trust.
    ///
    /// See [`ReissueClient::reissue`] for details.
    pub async fn renew(
        &self,
        certificates: &[RawCertificatePayload],
        current_time: u64,
    ) -> Result<Vec<ReissuedCertificate>> {
        self.reissue(ReissueAction::Renew, certificates, current_time)
            .await
    }

    /// Reissues `certificates` which are about to expire.
    ///
    /// See [`ReissueClient::reissue`] for details.
    pub async fn extend(
        &self,
        certificates: &[RawCertificatePayload],
        current_time: u64,
    ) -> Result<Vec<ReissuedCertificate>> {
        self.reissue(ReissueAction::Extend, certificates, current_time)
            .await
    }

    /// Sends the original payloads of `certificates` to the reissue service and verifies every
    /// certificate it returns at `current_time`.
    ///
    /// # Errors
    ///
    /// * [`ReissueError::Protocol`] if the service rejected the request with an error body.
    /// * [`ReissueError::RateLimited`] and [`ReissueError::ServerError`] for `429` and `500`
    ///   responses without an error body.
    /// * [`ReissueError::NetworkFailure`] if the request failed in transport, or for any other
    ///   unsuccessful response without an error body.
    /// * [`ReissueError::ResponseDecodeFailed`] if the successful response is not a list of
    ///   certificates.
    /// * [`ReissueError::InvalidReissuedCertificate`] with the position of the first returned
    ///   certificate which failed verification.  The verification error is kept as the source.
    pub async fn reissue(
        &self,
        action: ReissueAction,
        certificates: &[RawCertificatePayload],
        current_time: u64,
    ) -> Result<Vec<ReissuedCertificate>> {
        let request = ReissueRequest {
            action,
            certificates: certificates.to_vec(),
        };

        tracing::debug!(%action, certificates = certificates.len(), "sending reissue request");

        let response = self
            .client
            .post(self.endpoint.as_str(), &request)
            .await
            .foreign_err(|| ReissueError::NetworkFailure)
            .ctx(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .foreign_err(|| ReissueError::NetworkFailure)
            .ctx(|| format!("reading the {} response body", status))?;

        if !status.is_success() {
            let err = rejection(status, &body);
            tracing::warn!(%action, %status, error = %err, "reissue request rejected");
            return Err(err);
        }

        let items: Vec<ReissueResponseItem> =
            serde_json::from_slice(&body).foreign_err(|| ReissueError::ResponseDecodeFailed)?;

        tracing::debug!(%action, certificates = items.len(), "received reissued certificates");

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                self.verifier
                    .verify(&item.certificate, current_time)
                    .with_err(|| ReissueError::InvalidReissuedCertificate(index))
                    .map(ReissuedCertificate::from)
            })
            .collect()
    }
}

/// Maps an unsuccessful response to its error.
fn rejection(status: StatusCode, body: &[u8]) -> bherror::Error<ReissueError> {
    if let Ok(error) = serde_json::from_slice::<ProtocolError>(body) {
        return bherror::Error::root(ReissueError::Protocol(error));
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => bherror::Error::root(ReissueError::RateLimited),
        StatusCode::INTERNAL_SERVER_ERROR => bherror::Error::root(ReissueError::ServerError),
        _ => bherror::Error::root(ReissueError::NetworkFailure)
            .ctx(format!("unexpected response status {}", status)),
    }
}

#[cfg(test)]
mod tests {
    use std::{error::Error as _, io, sync::Arc, sync::Mutex};

    use assert_matches::assert_matches;
    use bhhcert::{
        test_utils::{recovery_certificate, vaccination_certificate, TestSigner},
        RevocationChecker, RevocationConfig, RevocationSet, TrustStore,
    };

    use super::*;

    const ISSUED_AT: i64 = 1_000;
    const EXPIRES_AT: i64 = 2_000;
    const NOW: u64 = 1_500;
    const BASE_URL: &str = "https://reissue.example.com";
    const ENDPOINT: &str = "https://reissue.example.com/api/certify/v2/reissue";

    struct StubClient {
        response: io::Result<http::Response<String>>,
        requests: Mutex<Vec<(String, ReissueRequest)>>,
    }

    impl StubClient {
        fn responding(status: u16, body: impl Into<String>) -> Self {
            let response = http::Response::builder()
                .status(status)
                .header("Content-Type", "application/json")
                .body(body.into())
                .unwrap();

            Self {
                response: Ok(response),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                response: Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpPostClient for StubClient {
        type Err = io::Error;

        async fn post(&self, url: &str, request: &ReissueRequest) -> io::Result<reqwest::Response> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_owned(), request.clone()));

            match &self.response {
                Ok(response) => Ok(reqwest::Response::from(response.clone())),
                Err(err) => Err(io::Error::new(err.kind(), err.to_string())),
            }
        }
    }

    struct Fixture {
        signer: TestSigner,
        verifier: Verifier,
    }

    impl Fixture {
        fn new() -> Self {
            let signer = TestSigner::generate();

            let trust_store = Arc::new(TrustStore::new());
            trust_store.load([signer.trust_anchor(0, 10_000)]).unwrap();

            let revocation = Arc::new(RevocationChecker::new(RevocationConfig::default()));
            revocation.load(RevocationSet::new(), 0);

            Self {
                verifier: Verifier::new(trust_store, revocation),
                signer,
            }
        }

        fn client(&self, stub: StubClient) -> ReissueClient<StubClient> {
            let config = ReissueConfig {
                base_url: BASE_URL.to_owned(),
            };
            ReissueClient::new(stub, &config, self.verifier.clone()).unwrap()
        }

        fn response_body(payloads: &[&RawCertificatePayload]) -> String {
            serde_json::to_string(
                &payloads
                    .iter()
                    .map(|payload| ReissueResponseItem {
                        certificate: (*payload).clone(),
                    })
                    .collect::<Vec<_>>(),
            )
            .unwrap()
        }
    }

    fn originals() -> Vec<RawCertificatePayload> {
        vec![
            RawCertificatePayload::new("HC1:ORIGINAL1"),
            RawCertificatePayload::new("HC1:ORIGINAL2"),
        ]
    }

    #[tokio::test]
    async fn test_renew() {
        let fixture = Fixture::new();
        let first = fixture
            .signer
            .issue(&vaccination_certificate(ISSUED_AT, EXPIRES_AT));
        let second = fixture
            .signer
            .issue(&recovery_certificate(ISSUED_AT, EXPIRES_AT));
        let client = fixture.client(StubClient::responding(
            200,
            Fixture::response_body(&[&first, &second]),
        ));

        let reissued = client.renew(&originals(), NOW).await.unwrap();

        assert_eq!(reissued.len(), 2);
        assert_eq!(reissued[0].payload(), &first);
        assert_eq!(
            reissued[0].certificate(),
            &vaccination_certificate(ISSUED_AT, EXPIRES_AT)
        );
        assert_eq!(reissued[1].payload(), &second);
        assert_eq!(
            reissued[1].certificate(),
            &recovery_certificate(ISSUED_AT, EXPIRES_AT)
        );

        let requests = client.client.requests.lock().unwrap();
        assert_eq!(
            *requests,
            [(
                ENDPOINT.to_owned(),
                ReissueRequest {
                    action: ReissueAction::Renew,
                    certificates: originals(),
                }
            )]
        );
    }

    #[tokio::test]
    async fn test_extend() {
        let fixture = Fixture::new();
        let payload = fixture
            .signer
            .issue(&vaccination_certificate(ISSUED_AT, EXPIRES_AT));
        let client = fixture.client(StubClient::responding(
            200,
            Fixture::response_body(&[&payload]),
        ));

        let reissued = client.extend(&originals()[..1], NOW).await.unwrap();

        assert_eq!(reissued.len(), 1);
        let requests = client.client.requests.lock().unwrap();
        assert_eq!(requests[0].1.action, ReissueAction::Extend);
        assert_eq!(requests[0].1.certificates, originals()[..1]);
    }

    #[tokio::test]
    async fn test_protocol_error() {
        let fixture = Fixture::new();
        let client = fixture.client(StubClient::responding(
            400,
            r#"{ "error": "R300", "message": "certificate can't be extended" }"#,
        ));

        let err = client.extend(&originals(), NOW).await.unwrap_err();

        assert_matches!(
            &err.error,
            ReissueError::Protocol(ProtocolError { code, message })
                if code == "R300" && message.as_deref() == Some("certificate can't be extended")
        );
        assert_eq!(err.error.code(), Some("R300"));
    }

    #[tokio::test]
    async fn test_error_body_takes_precedence_over_status() {
        let fixture = Fixture::new();
        let client = fixture.client(StubClient::responding(429, r#"{ "error": "R429X" }"#));

        let err = client.renew(&originals(), NOW).await.unwrap_err();

        assert_eq!(err.error.code(), Some("R429X"));
    }

    #[tokio::test]
    async fn test_statuses_without_error_body() {
        let fixture = Fixture::new();

        let err = fixture
            .client(StubClient::responding(429, ""))
            .renew(&originals(), NOW)
            .await
            .unwrap_err();
        assert_matches!(err.error, ReissueError::RateLimited);
        assert_eq!(err.error.code(), Some("R429"));

        let err = fixture
            .client(StubClient::responding(500, "<html>oops</html>"))
            .renew(&originals(), NOW)
            .await
            .unwrap_err();
        assert_matches!(err.error, ReissueError::ServerError);
        assert_eq!(err.error.code(), Some("R500"));

        let err = fixture
            .client(StubClient::responding(404, ""))
            .renew(&originals(), NOW)
            .await
            .unwrap_err();
        assert_matches!(err.error, ReissueError::NetworkFailure);
        assert_eq!(err.error.code(), None);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_source() {
        let fixture = Fixture::new();

        let err = fixture
            .client(StubClient::failing())
            .renew(&originals(), NOW)
            .await
            .unwrap_err();

        assert_matches!(err.error, ReissueError::NetworkFailure);
        assert_eq!(err.source().unwrap().to_string(), "refused");
    }

    #[tokio::test]
    async fn test_undecodable_response() {
        let fixture = Fixture::new();

        for body in ["", "{}", r#"[{ "cert": "HC1:A" }]"#] {
            let err = fixture
                .client(StubClient::responding(200, body))
                .renew(&originals(), NOW)
                .await
                .unwrap_err();

            assert_matches!(err.error, ReissueError::ResponseDecodeFailed, "{}", body);
        }
    }

    #[tokio::test]
    async fn test_invalid_reissued_certificate_aborts_the_call() {
        let fixture = Fixture::new();
        let valid = fixture
            .signer
            .issue(&vaccination_certificate(ISSUED_AT, EXPIRES_AT));
        let untrusted =
            TestSigner::generate().issue(&vaccination_certificate(ISSUED_AT, EXPIRES_AT));
        let client = fixture.client(StubClient::responding(
            200,
            Fixture::response_body(&[&valid, &untrusted, &valid]),
        ));

        let err = client.renew(&originals(), NOW).await.unwrap_err();

        assert_matches!(err.error, ReissueError::InvalidReissuedCertificate(1));
        assert!(err
            .source()
            .unwrap()
            .to_string()
            .starts_with("Unknown signer"));
    }

    #[tokio::test]
    async fn test_expired_reissued_certificate() {
        let fixture = Fixture::new();
        let expired = fixture.signer.issue(&vaccination_certificate(ISSUED_AT, NOW as i64));
        let client = fixture.client(StubClient::responding(
            200,
            Fixture::response_body(&[&expired]),
        ));

        let err = client.extend(&originals(), NOW).await.unwrap_err();

        assert_matches!(err.error, ReissueError::InvalidReissuedCertificate(0));
    }

    #[test]
    fn test_endpoint() {
        let fixture = Fixture::new();

        for (base_url, endpoint) in [
            (BASE_URL, ENDPOINT),
            ("https://reissue.example.com/", ENDPOINT),
            (
                "https://example.com/dcc/",
                "https://example.com/dcc/api/certify/v2/reissue",
            ),
        ] {
            let config = ReissueConfig {
                base_url: base_url.to_owned(),
            };
            let client = ReissueClient::new(
                StubClient::responding(200, "[]"),
                &config,
                fixture.verifier.clone(),
            )
            .unwrap();

            assert_eq!(client.endpoint().as_str(), endpoint);
        }
    }

    #[test]
    fn test_base_url_must_be_https() {
        let fixture = Fixture::new();

        for base_url in ["http://reissue.example.com", "not a url"] {
            let config = ReissueConfig {
                base_url: base_url.to_owned(),
            };
            let result = ReissueClient::new(
                StubClient::responding(200, "[]"),
                &config,
                fixture.verifier.clone(),
            );

            assert_matches!(
                result.map(|_| ()).unwrap_err().error,
                ReissueError::InvalidConfiguration(url) if url == base_url
            );
        }
    }
}
