use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::address::{format_postal_address, PostalAddress};
use super::dates::{parse_slash_date, parse_slash_datetime};
use super::{FieldCheck, MalformedInput};
use crate::admissions::catalog::ClassCode;
use crate::admissions::domain::{AdmissionOffer, ContactDetails, FileNumber, OfferState, Sex};

/// Credentials block embedded in every push payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushCredentialsField {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub pwd: String,
}

/// One admission event pushed by the platform.
///
/// Every field is read leniently (numbers or strings) and validated later by
/// [`decode_push`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushAdmission {
    #[serde(default, alias = "indentifiant")]
    pub identifiant: Option<PushCredentialsField>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub code_candidat: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub nom: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub prenom: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub date_naissance: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub sexe: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", alias = "codeFormationPsup")]
    pub code_formationpsup: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub code_situation: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub internat: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub cesure: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub adresse1: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub adresse2: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub adresse3: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub code_postal: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub libelle_commune: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub libelle_pays: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub mail: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub telephone: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub date_reponse: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub date_proposition: Option<String>,
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::Bool(flag)) => Some(if flag { "1" } else { "0" }.to_string()),
        _ => None,
    }
    .filter(|text| !text.trim().is_empty()))
}

/// Response-situation codes of the push API. Never shared with the website lists.
fn decode_situation(code: &str) -> Option<Option<OfferState>> {
    match code {
        "0" => Some(None),
        "1" => Some(Some(OfferState::AcceptedDefinitive)),
        "2" => Some(Some(OfferState::AcceptedPendingOtherChoices)),
        "3" => Some(Some(OfferState::Resigned)),
        _ => None,
    }
}

fn decode_flag(check: &mut FieldCheck, field: &'static str, raw: Option<&str>) -> bool {
    match raw.map(|value| value.trim().to_ascii_lowercase()) {
        None => false,
        Some(value) => match value.as_str() {
            "1" | "true" | "o" | "oui" => true,
            "0" | "false" | "n" | "non" => false,
            _ => {
                check.fail(field, format!("'{value}' is not a yes/no flag"));
                false
            }
        },
    }
}

/// Decodes a pushed admission event.
///
/// Returns `Ok(None)` when the candidate has not answered yet: there is
/// nothing to reconcile. A missing offer date defaults to `received_at`.
pub fn decode_push(
    payload: &PushAdmission,
    received_at: NaiveDateTime,
) -> Result<Option<AdmissionOffer>, MalformedInput> {
    let mut check = FieldCheck::default();

    let file_number = check.parse("codeCandidat", payload.code_candidat.as_deref(), |raw| {
        raw.parse::<u32>().ok().map(FileNumber)
    });
    let situation = check.parse(
        "codeSituation",
        payload.code_situation.as_deref(),
        decode_situation,
    );
    let last_name = check.require("nom", payload.nom.clone());
    let first_name = payload.prenom.clone().unwrap_or_default();
    let class = check.require(
        "codeFormationpsup",
        payload.code_formationpsup.as_deref().map(|code| ClassCode::new(code.trim())),
    );

    let birth_date = match payload.date_naissance.as_deref() {
        Some(raw) => {
            let parsed = parse_slash_date(raw);
            if parsed.is_none() {
                check.fail("dateNaissance", format!("cannot parse '{raw}'"));
            }
            parsed
        }
        None => None,
    };
    let responded_at = match payload.date_reponse.as_deref() {
        Some(raw) => {
            let parsed = parse_slash_datetime(raw);
            if parsed.is_none() {
                check.fail("dateReponse", format!("cannot parse '{raw}'"));
            }
            parsed
        }
        None => None,
    };
    let offered_at = match payload.date_proposition.as_deref() {
        Some(raw) => {
            let parsed = parse_slash_datetime(raw);
            if parsed.is_none() {
                check.fail("dateProposition", format!("cannot parse '{raw}'"));
            }
            parsed
        }
        None => Some(received_at),
    };
    let sex = match payload.sexe.as_deref() {
        Some(raw) => {
            let parsed = Sex::from_code(raw);
            if parsed.is_none() {
                check.fail("sexe", format!("unknown code '{raw}'"));
            }
            parsed
        }
        None => None,
    };

    let boarding = decode_flag(&mut check, "internat", payload.internat.as_deref());
    let gap_year = decode_flag(&mut check, "cesure", payload.cesure.as_deref());

    check.finish(file_number)?;

    let state = match situation {
        Some(Some(state)) => state,
        _ => return Ok(None),
    };

    let address = postal_address(payload);

    match (file_number, last_name, class, offered_at) {
        (Some(file_number), Some(last_name), Some(class), Some(offered_at)) => {
            Ok(Some(AdmissionOffer {
                file_number,
                last_name: last_name.trim().to_string(),
                first_name: first_name.trim().to_string(),
                birth_date,
                class,
                state,
                responded_at,
                offered_at,
                boarding,
                gap_year,
                contact: ContactDetails {
                    email: payload.mail.clone(),
                    phone: payload.telephone.clone(),
                    address,
                    sex,
                },
            }))
        }
        _ => Err(MalformedInput {
            file_number,
            fields: Vec::new(),
        }),
    }
}

fn postal_address(payload: &PushAdmission) -> Option<String> {
    let lines: Vec<String> = [&payload.adresse1, &payload.adresse2, &payload.adresse3]
        .into_iter()
        .flatten()
        .cloned()
        .collect();
    if lines.is_empty() && payload.code_postal.is_none() && payload.libelle_commune.is_none() {
        return None;
    }

    Some(format_postal_address(&PostalAddress {
        lines,
        postal_code: payload.code_postal.clone().unwrap_or_default(),
        city: payload.libelle_commune.clone().unwrap_or_default(),
        country: payload.libelle_pays.clone().unwrap_or_default(),
    }))
}
