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

//! Signature verification over the `openssl` crate.

use coset::iana::Algorithm;
use openssl::{
    bn::BigNum,
    ecdsa::EcdsaSig,
    error::ErrorStack,
    hash::{hash, MessageDigest},
    pkey::{Id, PKey, Public},
    rsa::Padding,
    sign::{RsaPssSaltlen, Verifier},
};

/// Signature algorithms a health certificate can be signed with.
#[derive(strum_macros::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// ECDSA using P-256 and SHA-256.
    #[strum(to_string = "ES256")]
    Es256,
    /// ECDSA using P-384 and SHA-384.
    #[strum(to_string = "ES384")]
    Es384,
    /// ECDSA using P-521 and SHA-512.
    #[strum(to_string = "ES512")]
    Es512,
    /// RSASSA-PSS using SHA-256 and MGF1 with SHA-256.
    #[strum(to_string = "PS256")]
    Ps256,
    /// RSASSA-PSS using SHA-384 and MGF1 with SHA-384.
    #[strum(to_string = "PS384")]
    Ps384,
    /// RSASSA-PSS using SHA-512 and MGF1 with SHA-512.
    #[strum(to_string = "PS512")]
    Ps512,
}

impl SignatureAlgorithm {
    /// Maps the `COSE` algorithm identifier, if it is supported.
    pub fn from_cose(algorithm: Algorithm) -> Option<Self> {
        match algorithm {
            Algorithm::ES256 => Some(Self::Es256),
            Algorithm::ES384 => Some(Self::Es384),
            Algorithm::ES512 => Some(Self::Es512),
            Algorithm::PS256 => Some(Self::Ps256),
            Algorithm::PS384 => Some(Self::Ps384),
            Algorithm::PS512 => Some(Self::Ps512),
            _ => None,
        }
    }

    /// The `COSE` algorithm identifier.
    pub fn to_cose(self) -> Algorithm {
        match self {
            Self::Es256 => Algorithm::ES256,
            Self::Es384 => Algorithm::ES384,
            Self::Es512 => Algorithm::ES512,
            Self::Ps256 => Algorithm::PS256,
            Self::Ps384 => Algorithm::PS384,
            Self::Ps512 => Algorithm::PS512,
        }
    }

    fn digest(self) -> MessageDigest {
        match self {
            Self::Es256 | Self::Ps256 => MessageDigest::sha256(),
            Self::Es384 | Self::Ps384 => MessageDigest::sha384(),
            Self::Es512 | Self::Ps512 => MessageDigest::sha512(),
        }
    }

    /// Verifies the `signature` of the `message` with the `public_key`.
    ///
    /// Returns `Ok(false)` if the signature doesn't match, including when the key type doesn't
    /// fit the algorithm.
    pub(crate) fn verify(
        self,
        message: &[u8],
        signature: &[u8],
        public_key: &PKey<Public>,
    ) -> Result<bool, ErrorStack> {
        match self {
            Self::Es256 => verify_ecdsa(self.digest(), 32, message, signature, public_key),
            Self::Es384 => verify_ecdsa(self.digest(), 48, message, signature, public_key),
            Self::Es512 => verify_ecdsa(self.digest(), 66, message, signature, public_key),
            Self::Ps256 | Self::Ps384 | Self::Ps512 => {
                verify_rsa_pss(self.digest(), message, signature, public_key)
            }
        }
    }
}

/// `COSE` carries `ECDSA` signatures as the fixed-size concatenation `r || s`.
fn verify_ecdsa(
    digest: MessageDigest,
    component_len: usize,
    message: &[u8],
    signature: &[u8],
    public_key: &PKey<Public>,
) -> Result<bool, ErrorStack> {
    if public_key.id() != Id::EC || signature.len() != 2 * component_len {
        return Ok(false);
    }

    let ec_key = public_key.ec_key()?;
    let (r, s) = signature.split_at(component_len);
    let signature =
        EcdsaSig::from_private_components(BigNum::from_slice(r)?, BigNum::from_slice(s)?)?;

    let digest = hash(digest, message)?;

    signature.verify(&digest, &ec_key)
}

fn verify_rsa_pss(
    digest: MessageDigest,
    message: &[u8],
    signature: &[u8],
    public_key: &PKey<Public>,
) -> Result<bool, ErrorStack> {
    if public_key.id() != Id::RSA {
        return Ok(false);
    }

    let mut verifier = Verifier::new(digest, public_key)?;
    verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
    verifier.set_rsa_mgf1_md(digest)?;
    verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;

    // A malformed signature makes `openssl` report an error instead of a mismatch.
    Ok(verifier.verify_oneshot(signature, message).unwrap_or(false))
}
