use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use super::dates::{parse_french_datetime, parse_french_day_month};
use super::{FieldCheck, MalformedInput};
use crate::admissions::catalog::ClassCode;
use crate::admissions::domain::{AdmissionOffer, ContactDetails, FileNumber, OfferState, Sex};

/// One row of an admission list exported from the management website.
///
/// The list a row comes from tells its state and class, so neither is a column.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapedRow {
    #[serde(rename = "Numéro", default, deserialize_with = "empty_string_as_none")]
    pub file_number: Option<String>,
    #[serde(rename = "Candidat", default, deserialize_with = "empty_string_as_none")]
    pub candidate: Option<String>,
    #[serde(
        rename = "Date proposition",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    pub offered_on: Option<String>,
    #[serde(
        rename = "Date réponse",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    pub responded_at: Option<String>,
    #[serde(rename = "Internat", default, deserialize_with = "empty_string_as_none")]
    pub boarding: Option<String>,
    #[serde(rename = "Message", default, deserialize_with = "empty_string_as_none")]
    pub message: Option<String>,
}

/// Contact details published separately from the admission lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressRecord {
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub sex: Option<Sex>,
    pub birth_date: Option<NaiveDate>,
}

impl AddressRecord {
    /// Fills the offer's optional fields without overriding what it already has.
    pub fn enrich(&self, offer: &mut AdmissionOffer) {
        let contact = &mut offer.contact;
        if contact.address.is_none() {
            contact.address = self.address.clone();
        }
        if contact.email.is_none() {
            contact.email = self.email.clone();
        }
        if contact.phone.is_none() {
            contact.phone = self.phone.clone();
        }
        if contact.sex.is_none() {
            contact.sex = self.sex;
        }
        if offer.birth_date.is_none() {
            offer.birth_date = self.birth_date;
        }
    }
}

pub(crate) fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn is_family_name_word(word: &str) -> Option<bool> {
    let mut chars = word.chars().filter(|c| c.is_alphabetic());
    let _first = chars.next()?;
    let second = chars.next()?;
    Some(second.is_uppercase())
}

/// Splits the website's "FAMILY NAME Given Name" cell.
///
/// Words whose second letter is uppercase belong to the family name, the
/// others to the given name. Single-letter words are dropped.
pub fn split_candidate_name(cell: &str) -> (String, String) {
    let mut family = Vec::new();
    let mut given = Vec::new();

    for word in cell.split_whitespace() {
        match is_family_name_word(word) {
            Some(true) => family.push(word),
            Some(false) => given.push(word),
            None => {}
        }
    }

    (family.join(" "), given.join(" "))
}

/// Normalizes a website row taken from the `state` list of `class`.
///
/// Offer dates carry no year on the website; `year` is substituted.
pub fn normalize_scraped(
    row: &ScrapedRow,
    class: &ClassCode,
    state: OfferState,
    year: i32,
) -> Result<AdmissionOffer, MalformedInput> {
    let mut check = FieldCheck::default();

    let file_number = check.parse("Numéro", row.file_number.as_deref(), |raw| {
        raw.parse::<u32>().ok().map(FileNumber)
    });

    let names = check
        .require("Candidat", row.candidate.as_deref())
        .map(split_candidate_name);
    if let Some((family, _)) = &names {
        if family.is_empty() {
            check.fail("Candidat", "no family name found");
        }
    }

    let offered_at = check.parse("Date proposition", row.offered_on.as_deref(), |raw| {
        parse_french_day_month(raw, year)
    });

    let responded_at = match row.responded_at.as_deref() {
        Some(raw) => {
            let parsed = parse_french_datetime(raw);
            if parsed.is_none() {
                check.fail("Date réponse", format!("cannot parse '{raw}'"));
            }
            parsed
        }
        None => None,
    };

    let boarding = row
        .boarding
        .as_deref()
        .is_some_and(|cell| cell.trim() == "Avec internat");

    check.finish(file_number)?;

    match (file_number, names, offered_at) {
        (Some(file_number), Some((last_name, first_name)), Some(offered_at)) => Ok(AdmissionOffer {
            file_number,
            last_name,
            first_name,
            birth_date: None,
            class: class.clone(),
            state,
            responded_at,
            offered_at,
            boarding,
            gap_year: false,
            contact: ContactDetails::default(),
        }),
        _ => Err(MalformedInput {
            file_number,
            fields: Vec::new(),
        }),
    }
}
