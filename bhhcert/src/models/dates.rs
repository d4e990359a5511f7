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

//! Date types of the certificate schema.
//!
//! The schema carries dates as text.  Every type here keeps the original text next to its parsed
//! value, so a decoded certificate re-encodes to exactly the same date strings.

use std::{fmt, str::FromStr};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A calendar date in the `YYYY-MM-DD` format, e.g. the date of a vaccination.
///
/// Some issuers append a time to the date; it is tolerated and kept, but ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct IsoDate {
    text: String,
    date: NaiveDate,
}

impl IsoDate {
    /// The parsed date.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// The date as the instant of its start in `UTC`.
    pub fn start_of_day(&self) -> DateTime<Utc> {
        self.date.and_time(NaiveTime::default()).and_utc()
    }

    /// The date text as it was encoded.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl From<NaiveDate> for IsoDate {
    fn from(date: NaiveDate) -> Self {
        Self {
            text: date.format(DATE_FORMAT).to_string(),
            date,
        }
    }
}

impl FromStr for IsoDate {
    type Err = chrono::ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let date = NaiveDate::parse_from_str(date_part(value), DATE_FORMAT)?;

        Ok(Self {
            text: value.to_owned(),
            date,
        })
    }
}

impl TryFrom<String> for IsoDate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .parse()
            .map_err(|err: chrono::ParseError| format!("invalid date {:?}: {}", value, err))
    }
}

impl From<IsoDate> for String {
    fn from(date: IsoDate) -> Self {
        date.text
    }
}

impl fmt::Display for IsoDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A date and time in the `RFC 3339` format, e.g. the sample collection time of a test.
///
/// A missing offset is read as `UTC`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct IsoDateTime {
    text: String,
    date_time: DateTime<FixedOffset>,
}

impl IsoDateTime {
    /// The parsed instant in `UTC`.
    pub fn to_utc(&self) -> DateTime<Utc> {
        self.date_time.with_timezone(&Utc)
    }

    /// The date time text as it was encoded.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl From<DateTime<Utc>> for IsoDateTime {
    fn from(date_time: DateTime<Utc>) -> Self {
        Self {
            text: date_time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            date_time: date_time.into(),
        }
    }
}

impl FromStr for IsoDateTime {
    type Err = chrono::ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let date_time = match DateTime::parse_from_rfc3339(value) {
            Ok(date_time) => date_time,
            Err(err) => NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
                .map(|naive| naive.and_utc().into())
                .map_err(|_| err)?,
        };

        Ok(Self {
            text: value.to_owned(),
            date_time,
        })
    }
}

impl TryFrom<String> for IsoDateTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .parse()
            .map_err(|err: chrono::ParseError| format!("invalid date time {:?}: {}", value, err))
    }
}

impl From<IsoDateTime> for String {
    fn from(date_time: IsoDateTime) -> Self {
        date_time.text
    }
}

impl fmt::Display for IsoDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// The date of birth of the certificate holder.
///
/// The schema allows partial dates: `""`, `YYYY`, `YYYY-MM` or `YYYY-MM-DD`, optionally
/// followed by a time which is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct BirthDate {
    text: String,
    precision: BirthDatePrecision,
}

/// How much of a [`BirthDate`] is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BirthDatePrecision {
    /// Nothing is known.
    Unknown,
    /// Only the year is known.
    Year(i32),
    /// Only the year and month are known.
    YearMonth(i32, u32),
    /// The full date is known.
    Full(NaiveDate),
}

impl BirthDate {
    /// The known part of the date.
    pub fn precision(&self) -> BirthDatePrecision {
        self.precision
    }

    /// The full date, if it is known.
    pub fn date(&self) -> Option<NaiveDate> {
        match self.precision {
            BirthDatePrecision::Full(date) => Some(date),
            _ => None,
        }
    }

    /// The birth year, if it is known.
    pub fn year(&self) -> Option<i32> {
        match self.precision {
            BirthDatePrecision::Unknown => None,
            BirthDatePrecision::Year(year) | BirthDatePrecision::YearMonth(year, _) => Some(year),
            BirthDatePrecision::Full(date) => Some(chrono::Datelike::year(&date)),
        }
    }

    /// The date text as it was encoded.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl From<NaiveDate> for BirthDate {
    fn from(date: NaiveDate) -> Self {
        Self {
            text: date.format(DATE_FORMAT).to_string(),
            precision: BirthDatePrecision::Full(date),
        }
    }
}

impl FromStr for BirthDate {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid date of birth {:?}", value);

        let date = date_part(value);
        let precision = if date.is_empty() {
            BirthDatePrecision::Unknown
        } else {
            let mut parts = date.split('-');
            let year = parse_component(parts.next(), 4).ok_or_else(invalid)?;
            match (parts.next(), parts.next(), parts.next()) {
                (None, _, _) => BirthDatePrecision::Year(year as i32),
                (Some(month), None, _) => {
                    let month = parse_component(Some(month), 2)
                        .filter(|month| (1..=12).contains(month))
                        .ok_or_else(invalid)?;
                    BirthDatePrecision::YearMonth(year as i32, month)
                }
                (Some(_), Some(_), None) => BirthDatePrecision::Full(
                    NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|_| invalid())?,
                ),
                _ => return Err(invalid()),
            }
        };

        Ok(Self {
            text: value.to_owned(),
            precision,
        })
    }
}

impl TryFrom<String> for BirthDate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BirthDate> for String {
    fn from(date: BirthDate) -> Self {
        date.text
    }
}

impl fmt::Display for BirthDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Strips the time part of a `YYYY-MM-DDThh:mm:ss` value.
fn date_part(value: &str) -> &str {
    value.split_once('T').map_or(value, |(date, _)| date)
}

fn parse_component(component: Option<&str>, digits: usize) -> Option<u32> {
    component
        .filter(|component| {
            component.len() == digits && component.bytes().all(|b| b.is_ascii_digit())
        })
        .and_then(|component| component.parse().ok())
}
