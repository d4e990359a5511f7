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

//! Data model of the `hcert` claim payload, the EU Digital COVID Certificate itself.
//!
//! Field names follow the [JSON schema][1] of the EU DCC.  Fields this crate does not know are
//! kept in the `additional` bags of the containing record, with their `CBOR` keys and values as
//! found, so forward-compatible certificates survive a decode/encode cycle untouched.
//!
//! [1]: <https://github.com/ehn-dcc-development/ehn-dcc-schema>

use bherror::traits::ForeignError as _;
use chrono::{DateTime, NaiveDate, Utc};
use ciborium::Value;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{malformed, BirthDate, IsoDate, IsoDateTime};
use crate::error::{EncodingError, Result};

/// Fields which are not part of the known schema, with their original keys and values.
pub type AdditionalFields = Vec<(Value, Value)>;

/// The SNOMED CT code of a "detected" test result.
pub const TEST_RESULT_DETECTED: &str = "260373001";

/// The kind of entries a certificate holds.
#[derive(
    strum_macros::Display,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Vaccination certificate.
    #[strum(to_string = "vaccination")]
    Vaccination,
    /// Test certificate.
    #[strum(to_string = "test")]
    Test,
    /// Recovery certificate.
    #[strum(to_string = "recovery")]
    Recovery,
}

/// A `CBOR` map record whose unknown fields are kept verbatim.
///
/// `serde` only sees the known fields.  The rest are split off the map before deserializing and
/// appended after serializing, since flattening can't hold tagged values or non-text keys.
trait OpenRecord: Serialize + DeserializeOwned {
    /// Keys of the known fields.
    const FIELDS: &'static [&'static str];

    fn additional(&self) -> &AdditionalFields;

    fn additional_mut(&mut self) -> &mut AdditionalFields;

    fn from_value(value: Value) -> Result<Self> {
        let fields = value
            .into_map()
            .map_err(|_| bherror::Error::root(malformed()).ctx("record is not a map"))?;

        let (known, additional): (Vec<_>, Vec<_>) = fields
            .into_iter()
            .partition(|(key, _)| key.as_text().is_some_and(|key| Self::FIELDS.contains(&key)));

        let mut record: Self = Value::Map(known).deserialized().foreign_err(malformed)?;
        *record.additional_mut() = additional;

        Ok(record)
    }

    fn to_value(&self) -> bherror::Result<Value, EncodingError> {
        let mut fields = Value::serialized(self)
            .foreign_err(|| EncodingError::Cbor)?
            .into_map()
            .map_err(|_| bherror::Error::root(EncodingError::Cbor).ctx("record is not a map"))?;
        fields.extend(self.additional().iter().cloned());

        Ok(Value::Map(fields))
    }
}

macro_rules! open_record {
    ($record:ty, [$($field:literal),* $(,)?]) => {
        impl OpenRecord for $record {
            const FIELDS: &'static [&'static str] = &[$($field),*];

            fn additional(&self) -> &AdditionalFields {
                &self.additional
            }

            fn additional_mut(&mut self) -> &mut AdditionalFields {
                &mut self.additional
            }
        }
    };
}

open_record!(HealthCertificateUnverified, ["ver", "nam", "dob", "v", "t", "r"]);
open_record!(PersonName, ["fn", "fnt", "gn", "gnt"]);
open_record!(
    Vaccination,
    ["tg", "vp", "mp", "ma", "dn", "sd", "dt", "co", "is", "ci"]
);
open_record!(
    Test,
    ["tg", "tt", "nm", "ma", "sc", "tr", "tc", "co", "is", "ci"]
);
open_record!(Recovery, ["tg", "fr", "df", "du", "co", "is", "ci"]);

/// The EU Digital COVID Certificate payload.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthCertificate {
    /// The schema version (`ver`).
    pub schema_version: String,
    /// The name of the holder (`nam`).
    pub name: PersonName,
    /// The date of birth of the holder (`dob`).
    pub date_of_birth: Option<BirthDate>,
    /// The entries, exactly one populated kind of `v`, `t` or `r`.
    pub entries: Entries,
    /// Unknown top-level fields.
    pub additional: AdditionalFields,
}

impl HealthCertificate {
    /// The kind of the certificate.
    pub fn kind(&self) -> EntryKind {
        self.entries.kind()
    }

    /// Decodes the EU DCC map, checking that exactly one entry list is populated.
    pub(crate) fn from_value(value: Value) -> Result<Self> {
        let unverified = HealthCertificateUnverified::from_value(value)?;

        let vaccinations: Vec<Vaccination> = records(unverified.v)?;
        let tests: Vec<Test> = records(unverified.t)?;
        let recoveries: Vec<Recovery> = records(unverified.r)?;

        let entries = match (
            vaccinations.is_empty(),
            tests.is_empty(),
            recoveries.is_empty(),
        ) {
            (false, true, true) => Entries::Vaccinations(vaccinations),
            (true, false, true) => Entries::Tests(tests),
            (true, true, false) => Entries::Recoveries(recoveries),
            (true, true, true) => {
                return Err(bherror::Error::root(malformed()).ctx("certificate holds no entries"))
            }
            _ => {
                return Err(bherror::Error::root(malformed()).ctx("certificate mixes entry kinds"))
            }
        };

        Ok(Self {
            schema_version: unverified.ver,
            name: PersonName::from_value(unverified.nam)?,
            date_of_birth: unverified.dob,
            entries,
            additional: unverified.additional,
        })
    }

    /// Encodes the EU DCC map, unknown fields included.
    pub(crate) fn to_value(&self) -> bherror::Result<Value, EncodingError> {
        let (v, t, r) = match &self.entries {
            Entries::Vaccinations(v) => (Some(values(v)?), None, None),
            Entries::Tests(t) => (None, Some(values(t)?), None),
            Entries::Recoveries(r) => (None, None, Some(values(r)?)),
        };

        HealthCertificateUnverified {
            ver: self.schema_version.clone(),
            nam: self.name.to_value()?,
            dob: self.date_of_birth.clone(),
            v,
            t,
            r,
            additional: self.additional.clone(),
        }
        .to_value()
    }
}

/// "Shadow" type of a [`HealthCertificate`] before its name and entries are decoded.
#[derive(Serialize, Deserialize)]
struct HealthCertificateUnverified {
    ver: String,
    nam: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dob: Option<BirthDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    r: Option<Vec<Value>>,
    #[serde(skip)]
    additional: AdditionalFields,
}

fn records<T: OpenRecord>(values: Option<Vec<Value>>) -> Result<Vec<T>> {
    values
        .unwrap_or_default()
        .into_iter()
        .map(T::from_value)
        .collect()
}

fn values<T: OpenRecord>(records: &[T]) -> bherror::Result<Vec<Value>, EncodingError> {
    records.iter().map(OpenRecord::to_value).collect()
}

/// The name of the certificate holder (`nam`).
///
/// Only the standardised family name is mandatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonName {
    /// Family name as printed in the travel document (`fn`).
    #[serde(rename = "fn", default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    /// Family name transliterated to the ICAO 9303 charset (`fnt`).
    #[serde(rename = "fnt")]
    pub standardised_family_name: String,
    /// Given name as printed in the travel document (`gn`).
    #[serde(rename = "gn", default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    /// Given name transliterated to the ICAO 9303 charset (`gnt`).
    #[serde(rename = "gnt", default, skip_serializing_if = "Option::is_none")]
    pub standardised_given_name: Option<String>,
    /// Unknown fields, kept by the certificate decoder and encoder.
    #[serde(skip)]
    pub additional: AdditionalFields,
}

impl PersonName {
    /// `"<given name> <family name>"`, preferring the printed forms over the transliterated ones.
    pub fn full_name(&self) -> String {
        let family = self
            .family_name
            .as_deref()
            .unwrap_or(&self.standardised_family_name);
        let given = self
            .given_name
            .as_deref()
            .or(self.standardised_given_name.as_deref());

        match given {
            Some(given) if !given.is_empty() => format!("{} {}", given, family),
            _ => family.to_owned(),
        }
    }

    /// `"<FAMILY><<GIVEN>"`, the machine-readable form of the transliterated names.
    pub fn standardised_full_name(&self) -> String {
        match &self.standardised_given_name {
            Some(given) => format!("{}<<{}", self.standardised_family_name, given),
            None => self.standardised_family_name.clone(),
        }
    }
}

/// A vaccination entry (`v`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vaccination {
    /// Disease or agent targeted (`tg`).
    #[serde(rename = "tg")]
    pub target_disease: String,
    /// Vaccine or prophylaxis (`vp`).
    #[serde(rename = "vp")]
    pub vaccine_prophylaxis: String,
    /// Vaccine medicinal product (`mp`).
    #[serde(rename = "mp")]
    pub medicinal_product: String,
    /// Marketing authorisation holder or manufacturer (`ma`).
    #[serde(rename = "ma")]
    pub manufacturer: String,
    /// Number in a series of doses (`dn`).
    #[serde(rename = "dn")]
    pub dose_number: u32,
    /// The overall number of doses in the series (`sd`).
    #[serde(rename = "sd")]
    pub total_doses: u32,
    /// Date of vaccination (`dt`).
    #[serde(rename = "dt")]
    pub vaccination_date: IsoDate,
    /// Member state or third country in which the vaccine was administered (`co`).
    #[serde(rename = "co")]
    pub country: String,
    /// Certificate issuer (`is`).
    #[serde(rename = "is")]
    pub certificate_issuer: String,
    /// Unique certificate identifier (`ci`).
    #[serde(rename = "ci")]
    pub certificate_identifier: String,
    /// Unknown fields, kept by the certificate decoder and encoder.
    #[serde(skip)]
    pub additional: AdditionalFields,
}

impl Vaccination {
    /// Whether this dose completes the vaccination series.
    pub fn is_full_immunization(&self) -> bool {
        self.dose_number >= self.total_doses
    }
}

/// A test entry (`t`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Test {
    /// Disease or agent targeted (`tg`).
    #[serde(rename = "tg")]
    pub target_disease: String,
    /// The type of test (`tt`).
    #[serde(rename = "tt")]
    pub test_type: String,
    /// NAA test name (`nm`).
    #[serde(rename = "nm", default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    /// RAT test name and manufacturer (`ma`).
    #[serde(rename = "ma", default, skip_serializing_if = "Option::is_none")]
    pub test_device: Option<String>,
    /// Date and time of the test sample collection (`sc`).
    #[serde(rename = "sc")]
    pub sample_collection_time: IsoDateTime,
    /// Result of the test (`tr`).
    #[serde(rename = "tr")]
    pub test_result: String,
    /// Testing centre or facility (`tc`).
    #[serde(rename = "tc", default, skip_serializing_if = "Option::is_none")]
    pub testing_centre: Option<String>,
    /// Member state or third country in which the test was carried out (`co`).
    #[serde(rename = "co")]
    pub country: String,
    /// Certificate issuer (`is`).
    #[serde(rename = "is")]
    pub certificate_issuer: String,
    /// Unique certificate identifier (`ci`).
    #[serde(rename = "ci")]
    pub certificate_identifier: String,
    /// Unknown fields, kept by the certificate decoder and encoder.
    #[serde(skip)]
    pub additional: AdditionalFields,
}

impl Test {
    /// Whether the test detected the targeted agent.
    pub fn is_positive(&self) -> bool {
        self.test_result == TEST_RESULT_DETECTED
    }
}

/// A recovery entry (`r`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recovery {
    /// Disease or agent the holder has recovered from (`tg`).
    #[serde(rename = "tg")]
    pub target_disease: String,
    /// Date of the holder's first positive test result (`fr`).
    #[serde(rename = "fr")]
    pub first_positive_result: IsoDate,
    /// Certificate valid from (`df`).
    #[serde(rename = "df")]
    pub valid_from: IsoDate,
    /// Certificate valid until (`du`).
    #[serde(rename = "du")]
    pub valid_until: IsoDate,
    /// Member state or third country in which the test was carried out (`co`).
    #[serde(rename = "co")]
    pub country: String,
    /// Certificate issuer (`is`).
    #[serde(rename = "is")]
    pub certificate_issuer: String,
    /// Unique certificate identifier (`ci`).
    #[serde(rename = "ci")]
    pub certificate_identifier: String,
    /// Unknown fields, kept by the certificate decoder and encoder.
    #[serde(skip)]
    pub additional: AdditionalFields,
}

impl Recovery {
    /// Whether `date` lies within `[df, du]`.
    pub fn is_valid_at(&self, date: NaiveDate) -> bool {
        self.valid_from.date() <= date && date <= self.valid_until.date()
    }
}

/// The entries of a certificate, all of one kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Entries {
    /// Vaccination entries (`v`).
    Vaccinations(Vec<Vaccination>),
    /// Test entries (`t`).
    Tests(Vec<Test>),
    /// Recovery entries (`r`).
    Recoveries(Vec<Recovery>),
}

impl Entries {
    /// The kind of the entries.
    pub fn kind(&self) -> EntryKind {
        match self {
            Entries::Vaccinations(_) => EntryKind::Vaccination,
            Entries::Tests(_) => EntryKind::Test,
            Entries::Recoveries(_) => EntryKind::Recovery,
        }
    }

    /// Iterates over the entries in their encoded order.
    pub fn iter(&self) -> impl Iterator<Item = Entry<'_>> + '_ {
        let (v, t, r): (&[Vaccination], &[Test], &[Recovery]) = match self {
            Entries::Vaccinations(v) => (v.as_slice(), &[], &[]),
            Entries::Tests(t) => (&[], t.as_slice(), &[]),
            Entries::Recoveries(r) => (&[], &[], r.as_slice()),
        };

        v.iter()
            .map(Entry::Vaccination)
            .chain(t.iter().map(Entry::Test))
            .chain(r.iter().map(Entry::Recovery))
    }

    /// Returns the entry which drives the validity decisions.
    ///
    /// That is the entry with the latest event date: the vaccination date (`dt`), the sample
    /// collection time (`sc`) or the first positive result (`fr`).  Among entries sharing the
    /// latest date the first one listed is returned.
    pub fn relevant(&self) -> Option<Entry<'_>> {
        self.iter().reduce(|relevant, entry| {
            if entry.event_time() > relevant.event_time() {
                entry
            } else {
                relevant
            }
        })
    }
}

/// A reference to a single entry of a certificate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Entry<'a> {
    /// A vaccination entry.
    Vaccination(&'a Vaccination),
    /// A test entry.
    Test(&'a Test),
    /// A recovery entry.
    Recovery(&'a Recovery),
}

impl Entry<'_> {
    /// The kind of the entry.
    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Vaccination(_) => EntryKind::Vaccination,
            Entry::Test(_) => EntryKind::Test,
            Entry::Recovery(_) => EntryKind::Recovery,
        }
    }

    /// The unique certificate identifier (`ci`).
    pub fn certificate_identifier(&self) -> &str {
        match self {
            Entry::Vaccination(v) => &v.certificate_identifier,
            Entry::Test(t) => &t.certificate_identifier,
            Entry::Recovery(r) => &r.certificate_identifier,
        }
    }

    /// The country of the event (`co`).
    pub fn country(&self) -> &str {
        match self {
            Entry::Vaccination(v) => &v.country,
            Entry::Test(t) => &t.country,
            Entry::Recovery(r) => &r.country,
        }
    }

    /// The instant of the event the entry records.
    pub fn event_time(&self) -> DateTime<Utc> {
        match self {
            Entry::Vaccination(v) => v.vaccination_date.start_of_day(),
            Entry::Test(t) => t.sample_collection_time.to_utc(),
            Entry::Recovery(r) => r.first_positive_result.start_of_day(),
        }
    }
}
