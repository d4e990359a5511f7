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

use std::fmt;

use serde::{Deserialize, Serialize};

/// Code reported for an HTTP `429` response without an error body.
pub const RATE_LIMITED_CODE: &str = "R429";
/// Code reported for an HTTP `500` response without an error body.
pub const SERVER_ERROR_CODE: &str = "R500";

/// The error body of a rejected reissue request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolError {
    /// The error code assigned by the reissue service.
    #[serde(rename = "error")]
    pub code: String,
    /// Human readable explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => f.write_str(&self.code),
        }
    }
}

/// Error type used across the crate API.
#[derive(strum_macros::Display, Debug, Clone, PartialEq)]
pub enum ReissueError {
    /// The configured base URL can't be used.
    #[strum(to_string = "Invalid reissue service URL: {0}")]
    InvalidConfiguration(String),
    /// The reissue service rejected the request with an error body.
    #[strum(to_string = "Reissue rejected: {0}")]
    Protocol(ProtocolError),
    /// The reissue service answered `429` without an error body.
    #[strum(to_string = "Reissue service is rate limiting requests")]
    RateLimited,
    /// The reissue service answered `500` without an error body.
    #[strum(to_string = "Reissue service failed")]
    ServerError,
    /// The request could not be sent or the response could not be received.
    #[strum(to_string = "Network failure")]
    NetworkFailure,
    /// The successful response body is not a list of certificates.
    #[strum(to_string = "Failed to decode the reissue response")]
    ResponseDecodeFailed,
    /// The reissued certificate at the given position failed verification.
    #[strum(to_string = "Reissued certificate at index {0} is invalid")]
    InvalidReissuedCertificate(usize),
}

impl ReissueError {
    /// The error code to present for this error, if the service provided or implied one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Protocol(error) => Some(&error.code),
            Self::RateLimited => Some(RATE_LIMITED_CODE),
            Self::ServerError => Some(SERVER_ERROR_CODE),
            _ => None,
        }
    }
}

impl bherror::BhError for ReissueError {}

/// Type alias for [`bherror::Result`] types returned by the crate's API.
pub type Result<T> = bherror::Result<T, ReissueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let protocol = ReissueError::Protocol(ProtocolError {
            code: "RENEW_NOT_ALLOWED".to_owned(),
            message: None,
        });

        assert_eq!(protocol.code(), Some("RENEW_NOT_ALLOWED"));
        assert_eq!(ReissueError::RateLimited.code(), Some("R429"));
        assert_eq!(ReissueError::ServerError.code(), Some("R500"));
        assert_eq!(ReissueError::NetworkFailure.code(), None);
    }

    #[test]
    fn test_protocol_error_body() {
        let json = r#"{ "error": "R1", "message": "too many certificates" }"#;
        let error: ProtocolError = serde_json::from_str(json).unwrap();

        assert_eq!(error.code, "R1");
        assert_eq!(error.message.as_deref(), Some("too many certificates"));
        assert_eq!(error.to_string(), "R1: too many certificates");

        let error: ProtocolError = serde_json::from_str(r#"{ "error": "R2" }"#).unwrap();
        assert_eq!(error.message, None);
    }
}
