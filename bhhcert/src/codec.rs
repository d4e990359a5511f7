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

//! Text codec for the QR payloads.
//!
//! A payload is the [`HC1_PREFIX`] followed by the `Base45` encoding ([RFC 9285][1]) of the
//! `ZLIB`-wrapped `DEFLATE` compression of the `COSE_Sign1` bytes.
//!
//! [1]: <https://www.rfc-editor.org/rfc/rfc9285>

use std::{
    fmt,
    io::{Read as _, Write as _},
};

pub use base45::{decode as base45_decode, encode as base45_encode};
use bherror::traits::{ErrorContext as _, ForeignError as _};
use flate2::{
    read::{DeflateDecoder, ZlibDecoder},
    write::ZlibEncoder,
    Compression,
};

use serde::{Deserialize, Serialize};

use crate::error::{DecodeStage, EncodingError, Result, VerificationError};

/// The scheme marker every health certificate payload starts with.
pub const HC1_PREFIX: &str = "HC1:";

/// Upper bound on the size of an inflated payload.
const MAX_INFLATED_LEN: u64 = 1 << 20;

/// A QR payload exactly as scanned or received, e.g. `HC1:NCFOXN%TS3DH...`.
///
/// The payload is never modified; re-submitting a certificate always uses these original bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawCertificatePayload(String);

impl RawCertificatePayload {
    /// Wraps the payload text.
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    /// The payload text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the payload into the raw `COSE_Sign1` bytes, see [`decode`].
    pub fn decode(&self) -> Result<Vec<u8>> {
        decode(&self.0)
    }
}

impl From<String> for RawCertificatePayload {
    fn from(payload: String) -> Self {
        Self(payload)
    }
}

impl From<RawCertificatePayload> for String {
    fn from(payload: RawCertificatePayload) -> Self {
        payload.0
    }
}

impl AsRef<str> for RawCertificatePayload {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RawCertificatePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decodes a QR payload into the raw `COSE_Sign1` bytes.
///
/// # Errors
///
/// Returns [`VerificationError::MalformedPayload`] tagged with [`DecodeStage::Text`] if the text
/// lacks the [`HC1_PREFIX`], is not valid `Base45` or does not inflate.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let malformed = || VerificationError::MalformedPayload(DecodeStage::Text);

    let Some(body) = text.strip_prefix(HC1_PREFIX) else {
        return Err(bherror::Error::root(malformed()).ctx("missing payload prefix"));
    };

    let compressed = base45_decode(body)
        .foreign_err(malformed)
        .ctx(|| "payload is not valid Base45")?;

    inflate(&compressed)
        .foreign_err(malformed)
        .ctx(|| "payload does not inflate")
}

/// Encodes the raw `COSE_Sign1` bytes into a QR payload.
///
/// This is the exact inverse of [`decode`].
pub fn encode(bytes: impl AsRef<[u8]>) -> bherror::Result<String, EncodingError> {
    // `Compression::best()` sets the highest possible compression level.
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(bytes.as_ref())
        .foreign_err(|| EncodingError::Compression)?;
    let compressed = encoder.finish().foreign_err(|| EncodingError::Compression)?;

    Ok(format!("{}{}", HC1_PREFIX, base45_encode(compressed)))
}

/// Inflates `ZLIB`-wrapped `DEFLATE` data, falling back to raw `DEFLATE` for payloads produced
/// without the `ZLIB` header.
fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    read_limited(ZlibDecoder::new(data)).or_else(|_| read_limited(DeflateDecoder::new(data)))
}

fn read_limited(decoder: impl std::io::Read) -> std::io::Result<Vec<u8>> {
    let mut inflated = Vec::new();
    decoder
        .take(MAX_INFLATED_LEN + 1)
        .read_to_end(&mut inflated)?;

    if inflated.len() as u64 > MAX_INFLATED_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "inflated payload too large",
        ));
    }

    Ok(inflated)
}
