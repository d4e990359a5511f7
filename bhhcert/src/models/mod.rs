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

//! Data model of a decoded certificate.
//!
//! The `COSE_Sign1` payload is a CBOR Web Token ([RFC 8392][1]) whose claims are mapped onto
//! [`Certificate`].  The EU DCC itself lives in the `hcert` claim (`-260`) under the key `1` and
//! is modelled by [`HealthCertificate`].
//!
//! [1]: <https://www.rfc-editor.org/rfc/rfc8392>

mod dates;
mod hcert;

use bherror::traits::ForeignError as _;
use ciborium::Value;
pub use dates::{BirthDate, BirthDatePrecision, IsoDate, IsoDateTime};
pub use hcert::{
    AdditionalFields, Entries, Entry, EntryKind, HealthCertificate, PersonName, Recovery, Test,
    Vaccination, TEST_RESULT_DETECTED,
};

use crate::error::{DecodeStage, EncodingError, Result, VerificationError};

/// CWT claim key of the issuer country (`iss`).
pub const CLAIM_ISSUER: i64 = 1;
/// CWT claim key of the expiration time (`exp`).
pub const CLAIM_EXPIRATION: i64 = 4;
/// CWT claim key of the issuing time (`iat`).
pub const CLAIM_ISSUED_AT: i64 = 6;
/// CWT claim key of the health certificate container (`hcert`).
pub const CLAIM_HCERT: i64 = -260;
/// Key of the EU DCC v1 inside the `hcert` claim.
pub const HCERT_EU_DCC_V1: i64 = 1;

/// A decoded health certificate together with its CWT claims.
#[derive(Debug, Clone, PartialEq)]
pub struct Certificate {
    /// The ISO 3166-1 alpha-2 code of the issuing country (`iss`).
    pub issuer: String,
    /// The issuing time as seconds since the Unix epoch (`iat`).
    pub issued_at: i64,
    /// The expiration time as seconds since the Unix epoch (`exp`).
    pub expires_at: i64,
    /// The EU DCC payload.
    pub health_certificate: HealthCertificate,
    additional_claims: Vec<(Value, Value)>,
    additional_hcert: Vec<(Value, Value)>,
}

impl Certificate {
    /// Creates a new [`Certificate`] without any additional claims.
    pub fn new(
        issuer: String,
        issued_at: i64,
        expires_at: i64,
        health_certificate: HealthCertificate,
    ) -> Self {
        Self {
            issuer,
            issued_at,
            expires_at,
            health_certificate,
            additional_claims: Vec::new(),
            additional_hcert: Vec::new(),
        }
    }

    /// Decodes the CWT claims from the `COSE_Sign1` payload bytes.
    ///
    /// Unknown claims and unknown fields are tolerated and kept, so [`Certificate::encode`]
    /// reproduces them.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::MalformedPayload`] tagged with [`DecodeStage::Schema`] if a
    /// required claim or field is missing, a date can't be parsed, or the certificate doesn't
    /// hold exactly one kind of entries.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let claims: Value = ciborium::from_reader(payload).foreign_err(malformed)?;
        let claims = claims
            .into_map()
            .map_err(|_| bherror::Error::root(malformed()).ctx("CWT claims are not a map"))?;

        let mut issuer = None;
        let mut issued_at = None;
        let mut expires_at = None;
        let mut hcert = None;
        let mut additional_claims = Vec::new();

        for (label, value) in claims {
            match integer_label(&label) {
                Some(CLAIM_ISSUER) => {
                    let text = value.into_text().map_err(|_| {
                        bherror::Error::root(malformed()).ctx("`iss` is not a string")
                    })?;
                    issuer = Some(text);
                }
                Some(CLAIM_EXPIRATION) => expires_at = Some(timestamp(&value, "exp")?),
                Some(CLAIM_ISSUED_AT) => issued_at = Some(timestamp(&value, "iat")?),
                Some(CLAIM_HCERT) => hcert = Some(value),
                _ => additional_claims.push((label, value)),
            }
        }

        let issuer = issuer.ok_or_else(|| missing("iss"))?;
        let issued_at = issued_at.ok_or_else(|| missing("iat"))?;
        let expires_at = expires_at.ok_or_else(|| missing("exp"))?;
        let hcert = hcert.ok_or_else(|| missing("hcert"))?;

        let (health_certificate, additional_hcert) = decode_hcert(hcert)?;

        Ok(Self {
            issuer,
            issued_at,
            expires_at,
            health_certificate,
            additional_claims,
            additional_hcert,
        })
    }

    /// Encodes the certificate back into CWT claims bytes.
    pub fn encode(&self) -> bherror::Result<Vec<u8>, EncodingError> {
        let dcc = self.health_certificate.to_value()?;

        let mut hcert = vec![(Value::from(HCERT_EU_DCC_V1), dcc)];
        hcert.extend(self.additional_hcert.iter().cloned());

        let mut claims = vec![
            (Value::from(CLAIM_ISSUER), Value::from(self.issuer.clone())),
            (Value::from(CLAIM_EXPIRATION), Value::from(self.expires_at)),
            (Value::from(CLAIM_ISSUED_AT), Value::from(self.issued_at)),
            (Value::from(CLAIM_HCERT), Value::Map(hcert)),
        ];
        claims.extend(self.additional_claims.iter().cloned());

        let mut encoded = Vec::new();
        ciborium::into_writer(&Value::Map(claims), &mut encoded)
            .foreign_err(|| EncodingError::Cbor)?;

        Ok(encoded)
    }

    /// The name of the certificate holder.
    pub fn subject_name(&self) -> &PersonName {
        &self.health_certificate.name
    }

    /// The date of birth of the certificate holder.
    pub fn subject_birth_date(&self) -> Option<&BirthDate> {
        self.health_certificate.date_of_birth.as_ref()
    }

    /// The version of the schema the certificate was issued with.
    pub fn schema_version(&self) -> &str {
        &self.health_certificate.schema_version
    }

    /// The kind of the certificate.
    pub fn kind(&self) -> EntryKind {
        self.health_certificate.kind()
    }

    /// The entry which drives the validity decisions, see [`Entries::relevant`].
    pub fn relevant_entry(&self) -> Option<Entry<'_>> {
        self.health_certificate.entries.relevant()
    }

    /// Validates the issuing and the expiration time against `current_time`.
    ///
    /// The certificate is valid within `[iat, exp)`.
    pub fn validate_time(&self, current_time: u64) -> Result<()> {
        if (current_time as i128) < (self.issued_at as i128) {
            return Err(bherror::Error::root(
                VerificationError::CertificateNotYetValid(self.issued_at),
            ));
        }

        if (current_time as i128) >= (self.expires_at as i128) {
            return Err(bherror::Error::root(VerificationError::CertificateExpired(
                self.expires_at,
            )));
        }

        Ok(())
    }
}

fn decode_hcert(hcert: Value) -> Result<(HealthCertificate, Vec<(Value, Value)>)> {
    let hcert = hcert
        .into_map()
        .map_err(|_| bherror::Error::root(malformed()).ctx("`hcert` is not a map"))?;

    let mut dcc = None;
    let mut additional = Vec::new();

    for (label, value) in hcert {
        if dcc.is_none() && integer_label(&label) == Some(HCERT_EU_DCC_V1) {
            dcc = Some(value);
        } else {
            additional.push((label, value));
        }
    }

    let dcc = dcc.ok_or_else(|| missing("hcert EU DCC v1"))?;
    let health_certificate = HealthCertificate::from_value(dcc)?;

    Ok((health_certificate, additional))
}

fn malformed() -> VerificationError {
    VerificationError::MalformedPayload(DecodeStage::Schema)
}

#[track_caller]
fn missing(claim: &'static str) -> bherror::Error<VerificationError> {
    bherror::Error::root(malformed()).ctx(format!("missing `{}` claim", claim))
}

fn integer_label(label: &Value) -> Option<i64> {
    label
        .as_integer()
        .and_then(|label| i64::try_from(label).ok())
}

/// Reads a NumericDate, which some issuers encode as a float.
fn timestamp(value: &Value, claim: &'static str) -> Result<i64> {
    let seconds = match value {
        Value::Integer(seconds) => i64::try_from(*seconds).ok(),
        Value::Float(seconds) if seconds.is_finite() => Some(seconds.trunc() as i64),
        _ => None,
    };

    seconds.ok_or_else(|| {
        bherror::Error::root(malformed()).ctx(format!("`{}` is not a NumericDate", claim))
    })
}
