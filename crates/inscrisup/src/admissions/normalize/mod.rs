//! Turns raw admission signals into canonical [`AdmissionOffer`] values.
//!
//! Each external source has its own decoder module; both map their native
//! codes into the single [`OfferState`](super::domain::OfferState) vocabulary
//! and report every missing or invalid field at once.

mod address;
pub mod dates;
pub mod push;
pub mod scrape;

pub use address::{format_postal_address, PostalAddress};
pub use push::{decode_push, PushAdmission, PushCredentialsField};
pub use scrape::{normalize_scraped, split_candidate_name, AddressRecord, ScrapedRow};

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::domain::{AdmissionOffer, FileNumber};

/// One field that was absent or could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub problem: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

/// A raw row that cannot become an offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("malformed admission input ({})", describe(.fields))]
pub struct MalformedInput {
    /// Set when the admission-file number itself was readable.
    pub file_number: Option<FileNumber>,
    pub fields: Vec<FieldError>,
}

fn describe(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Accumulates field problems so a row reports all of them at once.
#[derive(Debug, Default)]
pub(crate) struct FieldCheck {
    errors: Vec<FieldError>,
}

impl FieldCheck {
    pub(crate) fn require<T>(&mut self, field: &'static str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.fail(field, "missing");
        }
        value
    }

    pub(crate) fn parse<T>(
        &mut self,
        field: &'static str,
        raw: Option<&str>,
        parser: impl FnOnce(&str) -> Option<T>,
    ) -> Option<T> {
        match raw.map(str::trim).filter(|value| !value.is_empty()) {
            None => {
                self.fail(field, "missing");
                None
            }
            Some(value) => {
                let parsed = parser(value);
                if parsed.is_none() {
                    self.fail(field, format!("cannot parse '{value}'"));
                }
                parsed
            }
        }
    }

    pub(crate) fn fail(&mut self, field: &'static str, problem: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            problem: problem.into(),
        });
    }

    pub(crate) fn finish(self, file_number: Option<FileNumber>) -> Result<(), MalformedInput> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(MalformedInput {
                file_number,
                fields: self.errors,
            })
        }
    }
}

/// Keeps one offer per candidate, preferring the highest-ranked state.
///
/// Ties keep the offer seen first. The result iterates in file-number order.
pub fn deduplicate<I>(offers: I) -> BTreeMap<FileNumber, AdmissionOffer>
where
    I: IntoIterator<Item = AdmissionOffer>,
{
    let mut kept: BTreeMap<FileNumber, AdmissionOffer> = BTreeMap::new();
    for offer in offers {
        match kept.get(&offer.file_number) {
            Some(existing) if existing.state.rank() >= offer.state.rank() => {}
            _ => {
                kept.insert(offer.file_number, offer);
            }
        }
    }
    kept
}
