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

//! The `COSE_Sign1` envelope ([RFC 9052][1]) carrying the signed certificate.
//!
//! [1]: <https://www.rfc-editor.org/rfc/rfc9052#section-4.2>

use std::fmt;

use bherror::traits::ForeignError as _;
use coset::{iana::CborTag, AsCborValue as _, CoseSign1, Header, RegisteredLabelWithPrivate};

use crate::{
    crypto::SignatureAlgorithm,
    error::{DecodeStage, EncodingError, Result, VerificationError},
};

/// The 8-byte identifier of the key that signed a certificate.
///
/// Identifiers are short, so several trust anchors may share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyIdentifier([u8; KeyIdentifier::LEN]);

impl KeyIdentifier {
    /// The length of the identifier in bytes.
    pub const LEN: usize = 8;

    /// Creates a [`KeyIdentifier`] from its bytes.
    pub fn new(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Creates a [`KeyIdentifier`] from a slice, if it has exactly [`KeyIdentifier::LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// Derives the identifier of a signer certificate: the first 8 bytes of the `SHA-256`
    /// digest of its `DER` encoding.
    pub fn from_certificate_der(der: &[u8]) -> Self {
        let digest = openssl::sha::sha256(der);

        let mut bytes = [0u8; Self::LEN];
        bytes.copy_from_slice(&digest[..Self::LEN]);
        Self(bytes)
    }

    /// The identifier bytes.
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A parsed `COSE_Sign1` structure.
///
/// The protected header keeps the bytes it was received with, and the signed data is always
/// rebuilt from those bytes.
#[derive(Debug, Clone)]
pub struct SignedEnvelope {
    inner: CoseSign1,
    key_identifier: KeyIdentifier,
    algorithm: SignatureAlgorithm,
}

impl SignedEnvelope {
    /// Parses a tagged or untagged `COSE_Sign1` structure.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::MalformedPayload`] tagged with [`DecodeStage::Envelope`] if
    /// the bytes aren't a single 4-element `COSE_Sign1` array, the payload is detached, or the
    /// `alg` or `kid` header is absent or invalid.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = bytes;
        let value: ciborium::Value = ciborium::from_reader(&mut reader).foreign_err(malformed)?;

        if !reader.is_empty() {
            return Err(bherror::Error::root(malformed()).ctx("trailing bytes after COSE_Sign1"));
        }

        let value = match value {
            ciborium::Value::Tag(tag, value) if tag == CborTag::CoseSign1 as u64 => *value,
            ciborium::Value::Tag(tag, _) => {
                return Err(bherror::Error::root(malformed())
                    .ctx(format!("unexpected CBOR tag {}", tag)));
            }
            value => value,
        };

        let inner = CoseSign1::from_cbor_value(value)
            .map_err(|err| bherror::Error::root(malformed()).ctx(err.to_string()))?;

        if inner.payload.is_none() {
            return Err(bherror::Error::root(malformed()).ctx("detached payload"));
        }

        let algorithm = match &inner.protected.header.alg {
            Some(RegisteredLabelWithPrivate::Assigned(algorithm)) => {
                SignatureAlgorithm::from_cose(*algorithm).ok_or_else(|| {
                    bherror::Error::root(malformed())
                        .ctx(format!("unsupported algorithm {:?}", algorithm))
                })?
            }
            _ => {
                return Err(
                    bherror::Error::root(malformed()).ctx("missing protected `alg` header")
                );
            }
        };

        let key_identifier = key_identifier(&inner.protected.header, &inner.unprotected)?;

        Ok(Self {
            inner,
            key_identifier,
            algorithm,
        })
    }

    /// Serializes the envelope as a tagged `COSE_Sign1` structure.
    ///
    /// The protected header is written with its original bytes.
    pub fn to_vec(&self) -> bherror::Result<Vec<u8>, EncodingError> {
        let value = self
            .inner
            .clone()
            .to_cbor_value()
            .map_err(|err| {
                bherror::Error::root(EncodingError::Cose).ctx(err.to_string())
            })?;
        let tagged = ciborium::Value::Tag(CborTag::CoseSign1 as u64, Box::new(value));

        let mut encoded = Vec::new();
        ciborium::into_writer(&tagged, &mut encoded)
            .foreign_err(|| EncodingError::Cbor)?;

        Ok(encoded)
    }

    /// The identifier of the signing key.
    pub fn key_identifier(&self) -> KeyIdentifier {
        self.key_identifier
    }

    /// The signature algorithm from the protected header.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// The protected header exactly as it was encoded.
    pub fn protected_header_bytes(&self) -> &[u8] {
        self.inner.protected.original_data.as_deref().unwrap_or_default()
    }

    /// The unprotected header.
    pub fn unprotected_header(&self) -> &Header {
        &self.inner.unprotected
    }

    /// The payload, i.e. the encoded CWT claims.
    pub fn payload(&self) -> &[u8] {
        self.inner.payload.as_deref().unwrap_or_default()
    }

    /// The signature.
    pub fn signature(&self) -> &[u8] {
        &self.inner.signature
    }

    /// The `Sig_structure` the signature was computed over.
    pub fn signed_data(&self) -> Vec<u8> {
        self.inner.tbs_data(&[])
    }
}

/// The `kid` is read from the protected header and, failing that, from the unprotected one.
fn key_identifier(protected: &Header, unprotected: &Header) -> Result<KeyIdentifier> {
    let kid = if protected.key_id.is_empty() {
        &unprotected.key_id
    } else {
        &protected.key_id
    };

    if kid.is_empty() {
        return Err(bherror::Error::root(malformed()).ctx("missing `kid` header"));
    }

    KeyIdentifier::from_slice(kid).ok_or_else(|| {
        bherror::Error::root(malformed()).ctx(format!("`kid` has {} bytes", kid.len()))
    })
}

fn malformed() -> VerificationError {
    VerificationError::MalformedPayload(DecodeStage::Envelope)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use coset::{iana, CborSerializable as _, CoseSign1Builder, HeaderBuilder};

    use super::*;

    const KID: [u8; 8] = [0xd9, 0x19, 0x37, 0x5f, 0xc1, 0xe7, 0xb6, 0xb2];

    fn sign1(protected: Header, unprotected: Header) -> CoseSign1 {
        CoseSign1Builder::new()
            .protected(protected)
            .unprotected(unprotected)
            .payload(b"claims".to_vec())
            .signature(vec![0xaa; 64])
            .build()
    }

    fn protected_es256(kid: &[u8]) -> Header {
        HeaderBuilder::new()
            .algorithm(iana::Algorithm::ES256)
            .key_id(kid.to_vec())
            .build()
    }

    fn tagged(sign1: CoseSign1) -> Vec<u8> {
        let value = ciborium::Value::Tag(18, Box::new(sign1.to_cbor_value().unwrap()));
        let mut encoded = Vec::new();
        ciborium::into_writer(&value, &mut encoded).unwrap();
        encoded
    }

    fn assert_malformed(bytes: &[u8]) {
        assert_eq!(
            SignedEnvelope::parse(bytes).unwrap_err().error,
            VerificationError::MalformedPayload(DecodeStage::Envelope)
        );
    }

    #[test]
    fn test_parse_tagged_and_untagged() {
        let sign1 = sign1(protected_es256(&KID), Header::default());

        for bytes in [tagged(sign1.clone()), sign1.to_vec().unwrap()] {
            let envelope = SignedEnvelope::parse(&bytes).unwrap();

            assert_eq!(envelope.key_identifier(), KeyIdentifier::new(KID));
            assert_eq!(envelope.algorithm(), SignatureAlgorithm::Es256);
            assert_eq!(envelope.payload(), b"claims");
            assert_eq!(envelope.signature(), &[0xaa; 64]);
        }
    }

    #[test]
    fn test_kid_from_unprotected_header() {
        let protected = HeaderBuilder::new()
            .algorithm(iana::Algorithm::PS256)
            .build();
        let unprotected = HeaderBuilder::new().key_id(KID.to_vec()).build();

        let envelope = SignedEnvelope::parse(&tagged(sign1(protected, unprotected))).unwrap();

        assert_eq!(envelope.key_identifier(), KeyIdentifier::new(KID));
        assert_eq!(envelope.algorithm(), SignatureAlgorithm::Ps256);
        assert_eq!(envelope.unprotected_header().key_id, KID.to_vec());
    }

    #[test]
    fn test_protected_kid_takes_precedence() {
        let unprotected = HeaderBuilder::new().key_id(vec![0x01; 8]).build();

        let envelope =
            SignedEnvelope::parse(&tagged(sign1(protected_es256(&KID), unprotected))).unwrap();

        assert_eq!(envelope.key_identifier(), KeyIdentifier::new(KID));
    }

    /// The protected header below encodes `alg` (`-7`) as the non-minimal `0x38 0x06`, which a
    /// re-serialization would turn into `0x26`.  Its bytes must reach the signed data unchanged.
    #[test]
    fn test_protected_header_bytes_are_kept() {
        let protected = [&[0xa2, 0x01, 0x38, 0x06, 0x04, 0x48][..], &KID[..]].concat();

        let value = ciborium::Value::Array(vec![
            ciborium::Value::Bytes(protected.clone()),
            ciborium::Value::Map(vec![]),
            ciborium::Value::Bytes(b"claims".to_vec()),
            ciborium::Value::Bytes(vec![0xaa; 64]),
        ]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).unwrap();

        let envelope = SignedEnvelope::parse(&bytes).unwrap();

        assert_eq!(envelope.protected_header_bytes(), protected.as_slice());
        assert_eq!(envelope.key_identifier(), KeyIdentifier::new(KID));

        let expected_signed_data = {
            let sig_structure = ciborium::Value::Array(vec![
                ciborium::Value::Text("Signature1".to_owned()),
                ciborium::Value::Bytes(protected.clone()),
                ciborium::Value::Bytes(vec![]),
                ciborium::Value::Bytes(b"claims".to_vec()),
            ]);
            let mut encoded = Vec::new();
            ciborium::into_writer(&sig_structure, &mut encoded).unwrap();
            encoded
        };
        assert_eq!(envelope.signed_data(), expected_signed_data);

        let reparsed = SignedEnvelope::parse(&envelope.to_vec().unwrap()).unwrap();
        assert_eq!(reparsed.protected_header_bytes(), protected.as_slice());
    }

    #[test]
    fn test_parse_rejects_malformed_structures() {
        // Not CBOR at all.
        assert_malformed(&[0xff, 0x00]);

        // Wrong tag (CWT instead of COSE_Sign1).
        let sign1 = sign1(protected_es256(&KID), Header::default());
        let value = ciborium::Value::Tag(61, Box::new(sign1.clone().to_cbor_value().unwrap()));
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).unwrap();
        assert_malformed(&bytes);

        // Three elements instead of four.
        let value = ciborium::Value::Array(vec![
            ciborium::Value::Bytes(vec![]),
            ciborium::Value::Map(vec![]),
            ciborium::Value::Bytes(b"claims".to_vec()),
        ]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).unwrap();
        assert_malformed(&bytes);

        // Signature of the wrong type.
        let mut elements = sign1.clone().to_cbor_value().unwrap().into_array().unwrap();
        elements[3] = ciborium::Value::Text("signature".to_owned());
        let mut bytes = Vec::new();
        ciborium::into_writer(&ciborium::Value::Array(elements), &mut bytes).unwrap();
        assert_malformed(&bytes);

        // Trailing bytes.
        let mut bytes = tagged(sign1);
        bytes.push(0x00);
        assert_malformed(&bytes);
    }

    #[test]
    fn test_parse_rejects_missing_headers() {
        // Missing `kid`.
        let protected = HeaderBuilder::new()
            .algorithm(iana::Algorithm::ES256)
            .build();
        assert_malformed(&tagged(sign1(protected, Header::default())));

        // `kid` of the wrong length.
        assert_malformed(&tagged(sign1(protected_es256(&KID[..7]), Header::default())));

        // Missing `alg`.
        let protected = HeaderBuilder::new().key_id(KID.to_vec()).build();
        assert_malformed(&tagged(sign1(protected, Header::default())));

        // Unsupported `alg`.
        let protected = HeaderBuilder::new()
            .algorithm(iana::Algorithm::EdDSA)
            .key_id(KID.to_vec())
            .build();
        assert_malformed(&tagged(sign1(protected, Header::default())));

        // Detached payload.
        let mut detached = sign1(protected_es256(&KID), Header::default());
        detached.payload = None;
        assert_malformed(&tagged(detached));
    }

    #[test]
    fn test_key_identifier_from_certificate() {
        let kid = KeyIdentifier::from_certificate_der(b"certificate");
        let digest = openssl::sha::sha256(b"certificate");

        assert_eq!(kid.as_bytes(), &digest[..8]);
        assert_eq!(kid.to_string(), hex::encode(&digest[..8]));
        assert_matches!(KeyIdentifier::from_slice(&digest), None);
    }
}
