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

//! Fixtures for tests of this crate and the crates built on top of it.
//!
//! Do NOT use anything here in production code.

use coset::{iana, CoseSign1Builder, HeaderBuilder, TaggedCborSerializable as _};
use openssl::{
    ec::{EcGroup, EcKey},
    ecdsa::EcdsaSig,
    nid::Nid,
    pkey::{PKey, Private, Public},
};

use crate::{
    codec::{self, RawCertificatePayload},
    envelope::KeyIdentifier,
    models::{
        Certificate, Entries, HealthCertificate, IsoDate, PersonName, Recovery, Test, Vaccination,
    },
    trust::{TrustAnchor, UsageTag},
};

/// An `ES256` signer on a freshly generated P-256 key.
#[derive(Debug, Clone)]
pub struct TestSigner {
    private_key: PKey<Private>,
    public_key: PKey<Public>,
    key_identifier: KeyIdentifier,
}

impl TestSigner {
    /// Generates a new key.  The key identifier is derived from the public key.
    pub fn generate() -> Self {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let private_key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

        let public_key_der = private_key.public_key_to_der().unwrap();
        let public_key = PKey::public_key_from_der(&public_key_der).unwrap();

        let digest = openssl::sha::sha256(&public_key_der);
        let key_identifier = KeyIdentifier::from_slice(&digest[..KeyIdentifier::LEN]).unwrap();

        Self {
            private_key,
            public_key,
            key_identifier,
        }
    }

    /// Replaces the key identifier, e.g. to provoke collisions.
    pub fn with_key_identifier(mut self, key_identifier: KeyIdentifier) -> Self {
        self.key_identifier = key_identifier;
        self
    }

    /// The key identifier put into the signed envelopes.
    pub fn key_identifier(&self) -> KeyIdentifier {
        self.key_identifier
    }

    /// The public key.
    pub fn public_key(&self) -> &PKey<Public> {
        &self.public_key
    }

    /// The private key.
    pub fn private_key(&self) -> &PKey<Private> {
        &self.private_key
    }

    /// An unrestricted trust anchor for the key, valid within `[not_before, not_after)`.
    pub fn trust_anchor(&self, not_before: i64, not_after: i64) -> TrustAnchor {
        self.trust_anchor_with_usage(not_before, not_after, &[])
    }

    /// A trust anchor for the key, tagged with the given usage OIDs.
    pub fn trust_anchor_with_usage(
        &self,
        not_before: i64,
        not_after: i64,
        usage: &[&str],
    ) -> TrustAnchor {
        TrustAnchor::new(
            self.key_identifier,
            self.public_key.public_key_to_der().unwrap(),
            not_before,
            not_after,
            usage.iter().copied().map(UsageTag::from),
        )
        .unwrap()
    }

    /// Signs the `message` as `ES256`, returning the `r || s` signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let digest = openssl::sha::sha256(message);
        let signature = EcdsaSig::sign(&digest, &self.private_key.ec_key().unwrap()).unwrap();

        let mut bytes = signature.r().to_vec_padded(32).unwrap();
        bytes.extend(signature.s().to_vec_padded(32).unwrap());
        bytes
    }

    /// Wraps the `payload` into a tagged `COSE_Sign1` signed by this key.
    pub fn sign_envelope(&self, payload: Vec<u8>) -> Vec<u8> {
        let protected = HeaderBuilder::new()
            .algorithm(iana::Algorithm::ES256)
            .key_id(self.key_identifier.as_bytes().to_vec())
            .build();

        CoseSign1Builder::new()
            .protected(protected)
            .payload(payload)
            .create_signature(&[], |data| self.sign(data))
            .build()
            .to_tagged_vec()
            .unwrap()
    }

    /// Issues the `certificate` as a complete `HC1:` payload.
    pub fn issue(&self, certificate: &Certificate) -> RawCertificatePayload {
        let envelope = self.sign_envelope(certificate.encode().unwrap());
        RawCertificatePayload::new(codec::encode(envelope).unwrap())
    }
}

fn holder() -> PersonName {
    PersonName {
        family_name: Some("Horvat".to_owned()),
        standardised_family_name: "HORVAT".to_owned(),
        given_name: Some("Ivan".to_owned()),
        standardised_given_name: Some("IVAN".to_owned()),
        additional: Vec::new(),
    }
}

fn certificate(issued_at: i64, expires_at: i64, entries: Entries) -> Certificate {
    Certificate::new(
        "HR".to_owned(),
        issued_at,
        expires_at,
        HealthCertificate {
            schema_version: "1.3.0".to_owned(),
            name: holder(),
            date_of_birth: Some("1990-01-01".parse().unwrap()),
            entries,
            additional: Vec::new(),
        },
    )
}

/// A second dose of a vaccination series given on `date`.
pub fn vaccination(date: &str, certificate_identifier: &str) -> Vaccination {
    Vaccination {
        target_disease: "840539006".to_owned(),
        vaccine_prophylaxis: "1119349007".to_owned(),
        medicinal_product: "EU/1/20/1507".to_owned(),
        manufacturer: "ORG-100031184".to_owned(),
        dose_number: 2,
        total_doses: 2,
        vaccination_date: date.parse::<IsoDate>().unwrap(),
        country: "HR".to_owned(),
        certificate_issuer: "Ministry of Health, Croatia".to_owned(),
        certificate_identifier: certificate_identifier.to_owned(),
        additional: Vec::new(),
    }
}

/// A certificate holding a single vaccination given on `2021-06-01`.
pub fn vaccination_certificate(issued_at: i64, expires_at: i64) -> Certificate {
    certificate(
        issued_at,
        expires_at,
        Entries::Vaccinations(vec![vaccination(
            "2021-06-01",
            "URN:UVCI:01:HR:VACCINATION#1",
        )]),
    )
}

/// A certificate holding a single negative NAA test.
pub fn test_certificate(issued_at: i64, expires_at: i64) -> Certificate {
    certificate(
        issued_at,
        expires_at,
        Entries::Tests(vec![Test {
            target_disease: "840539006".to_owned(),
            test_type: "LP6464-4".to_owned(),
            test_name: Some("Roche LightCycler qPCR".to_owned()),
            test_device: None,
            sample_collection_time: "2021-05-30T10:12:22Z".parse().unwrap(),
            test_result: "260415000".to_owned(),
            testing_centre: Some("Testing centre Zagreb".to_owned()),
            country: "HR".to_owned(),
            certificate_issuer: "Ministry of Health, Croatia".to_owned(),
            certificate_identifier: "URN:UVCI:01:HR:TEST#1".to_owned(),
            additional: Vec::new(),
        }]),
    )
}

/// A certificate holding a single recovery after a positive result on `2021-04-01`.
pub fn recovery_certificate(issued_at: i64, expires_at: i64) -> Certificate {
    certificate(
        issued_at,
        expires_at,
        Entries::Recoveries(vec![Recovery {
            target_disease: "840539006".to_owned(),
            first_positive_result: "2021-04-01".parse().unwrap(),
            valid_from: "2021-04-15".parse().unwrap(),
            valid_until: "2021-10-01".parse().unwrap(),
            country: "HR".to_owned(),
            certificate_issuer: "Ministry of Health, Croatia".to_owned(),
            certificate_identifier: "URN:UVCI:01:HR:RECOVERY#1".to_owned(),
            additional: Vec::new(),
        }]),
    )
}
