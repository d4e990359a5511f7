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

//! Bodies of the reissue protocol.

use bhhcert::RawCertificatePayload;
use serde::{Deserialize, Serialize};

/// What the reissue service should do with the submitted certificates.
#[derive(strum_macros::Display, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReissueAction {
    /// Reissue certificates signed with keys which are about to leave the trust list.
    #[strum(to_string = "renew")]
    Renew,
    /// Reissue certificates which are about to expire.
    #[strum(to_string = "extend")]
    Extend,
}

/// Request body of the reissue endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReissueRequest {
    /// The requested action.
    pub action: ReissueAction,
    /// The payloads of the certificates to reissue, as they were scanned.
    pub certificates: Vec<RawCertificatePayload>,
}

/// A single element of the successful response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReissueResponseItem {
    /// The payload of the reissued certificate.
    pub certificate: RawCertificatePayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let request = ReissueRequest {
            action: ReissueAction::Extend,
            certificates: vec![
                RawCertificatePayload::new("HC1:A"),
                RawCertificatePayload::new("HC1:B"),
            ],
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({ "action": "extend", "certificates": ["HC1:A", "HC1:B"] })
        );
    }

    #[test]
    fn test_response_body() {
        let json = r#"[{ "certificate": "HC1:A" }, { "certificate": "HC1:B", "extra": 1 }]"#;
        let items: Vec<ReissueResponseItem> = serde_json::from_str(json).unwrap();

        assert_eq!(
            items,
            [
                ReissueResponseItem {
                    certificate: RawCertificatePayload::new("HC1:A")
                },
                ReissueResponseItem {
                    certificate: RawCertificatePayload::new("HC1:B")
                },
            ]
        );
    }
}
