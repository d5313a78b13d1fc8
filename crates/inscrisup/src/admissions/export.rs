//! Read-only projections handed to spreadsheets and letter merges.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::Write;

use super::catalog::ClassCode;
use super::domain::{ActionCategory, FileNumber};
use super::store::AdmissionStore;

/// One line of a class list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterRow {
    #[serde(rename = "Numéro")]
    pub file_number: FileNumber,
    #[serde(rename = "Civilité")]
    pub civility: String,
    #[serde(rename = "Nom")]
    pub last_name: String,
    #[serde(rename = "Prénom")]
    pub first_name: String,
    #[serde(rename = "Date de naissance")]
    pub birth_date: String,
    #[serde(rename = "Interne")]
    pub boarder: String,
    #[serde(rename = "Statut")]
    pub status: String,
}

/// One addressee for the enrollment-packet mail merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailingRow {
    #[serde(rename = "Numéro")]
    pub file_number: FileNumber,
    #[serde(rename = "Civilité")]
    pub civility: String,
    #[serde(rename = "Nom")]
    pub last_name: String,
    #[serde(rename = "Prénom")]
    pub first_name: String,
    #[serde(rename = "Adresse")]
    pub address: String,
    #[serde(rename = "Classe")]
    pub class: String,
    #[serde(rename = "Dossier internat")]
    pub boarding_packet: String,
}

fn yes_no(flag: bool) -> String {
    let label = if flag { "Oui" } else { "Non" };
    label.to_string()
}

fn format_birth_date(date: Option<NaiveDate>) -> String {
    date.map(|date| date.format("%d/%m/%Y").to_string())
        .unwrap_or_default()
}

/// Students with an active proposition in `class`, sorted by family name.
pub fn class_roster(store: &AdmissionStore, class: &ClassCode) -> Vec<RosterRow> {
    let mut rows: Vec<RosterRow> = store
        .active_in_class(class)
        .map(|(student, proposition)| RosterRow {
            file_number: student.file_number,
            civility: student.sex.map(|sex| sex.label()).unwrap_or_default().to_string(),
            last_name: student.last_name.clone(),
            first_name: student.first_name.clone(),
            birth_date: format_birth_date(student.birth_date),
            boarder: yes_no(proposition.boarding),
            status: proposition.status.label().to_string(),
        })
        .collect();
    rows.sort_by(|a, b| {
        a.last_name
            .cmp(&b.last_name)
            .then_with(|| a.first_name.cmp(&b.first_name))
            .then(a.file_number.cmp(&b.file_number))
    });
    rows
}

/// Students still waiting for an enrollment or boarding packet.
pub fn mailing_list(store: &AdmissionStore) -> Vec<MailingRow> {
    let waiting: BTreeSet<FileNumber> = store
        .actions()
        .iter()
        .filter(|action| action.is_todo() && action.category.is_mailing())
        .map(|action| action.student)
        .collect();

    waiting
        .into_iter()
        .filter_map(|file_number| {
            let student = store.student(file_number)?;
            let class = store
                .active_proposition(file_number)
                .map(|proposition| proposition.class.to_string())
                .unwrap_or_default();
            let boarding_packet = store
                .actions_for(file_number)
                .any(|a| a.is_todo() && a.category == ActionCategory::SendBoardingPacket);
            Some(MailingRow {
                file_number,
                civility: student.sex.map(|sex| sex.label()).unwrap_or_default().to_string(),
                last_name: student.last_name.clone(),
                first_name: student.first_name.clone(),
                address: student.address.clone(),
                class,
                boarding_packet: yes_no(boarding_packet),
            })
        })
        .collect()
}

/// Writes rows as CSV with a header line.
pub fn write_csv<T, W>(rows: &[T], writer: W) -> Result<(), csv::Error>
where
    T: Serialize,
    W: Write,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}
