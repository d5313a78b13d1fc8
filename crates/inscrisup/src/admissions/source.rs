use csv::{ByteRecord, StringRecord};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::catalog::ClassCode;
use super::domain::{FileNumber, OfferState, Sex};
use super::normalize::dates::parse_slash_date;
use super::normalize::scrape::empty_string_as_none;
use super::normalize::{
    format_postal_address, AddressRecord, FieldError, MalformedInput, PostalAddress, ScrapedRow,
};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("admission source unavailable for class {class}: {reason}")]
    Unavailable { class: ClassCode, reason: String },
}

/// One decoded line of an admission list. A line that cannot be decoded
/// costs that line only.
pub type ListRow = Result<ScrapedRow, MalformedInput>;

/// Where raw admission lists come from.
///
/// Implementations may block on I/O; callers fetch everything before
/// touching the store. A list that cannot be read at all is
/// [`SourceError::Unavailable`]; a bad line inside a readable list is not.
pub trait SourceFetcher: Send + Sync {
    /// Short label recorded in import-run summaries.
    fn kind(&self) -> &'static str;

    fn fetch_offers(
        &self,
        class: &ClassCode,
        state: OfferState,
    ) -> Result<Vec<ListRow>, SourceError>;

    fn fetch_address_file(
        &self,
        class: &ClassCode,
    ) -> Result<HashMap<FileNumber, AddressRecord>, SourceError>;
}

/// Reads the lists exported from the admissions website, one directory per class:
/// `accepted.csv`, `accepted-pending.csv`, `resigned.csv` and `addresses.csv`.
#[derive(Debug, Clone)]
pub struct CsvExportFetcher {
    root: PathBuf,
}

impl CsvExportFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn list_path(&self, class: &ClassCode, state: OfferState) -> PathBuf {
        let file = match state {
            OfferState::AcceptedDefinitive => "accepted.csv",
            OfferState::AcceptedPendingOtherChoices => "accepted-pending.csv",
            OfferState::Resigned => "resigned.csv",
        };
        self.root.join(class.as_str()).join(file)
    }

    fn open(&self, class: &ClassCode, path: &Path) -> Result<File, SourceError> {
        File::open(path).map_err(|err| SourceError::Unavailable {
            class: class.clone(),
            reason: format!("cannot open {}: {err}", path.display()),
        })
    }
}

impl SourceFetcher for CsvExportFetcher {
    fn kind(&self) -> &'static str {
        "csv-export"
    }

    fn fetch_offers(
        &self,
        class: &ClassCode,
        state: OfferState,
    ) -> Result<Vec<ListRow>, SourceError> {
        let path = self.list_path(class, state);
        let rows = read_records(class, &path, self.open(class, &path)?)?;
        debug!(class = %class, state = state.label(), rows = rows.len(), "admission list read");
        Ok(rows)
    }

    fn fetch_address_file(
        &self,
        class: &ClassCode,
    ) -> Result<HashMap<FileNumber, AddressRecord>, SourceError> {
        let path = self.root.join(class.as_str()).join("addresses.csv");
        let rows: Vec<Result<AddressRow, MalformedInput>> =
            read_records(class, &path, self.open(class, &path)?)?;

        let mut records = HashMap::new();
        for row in rows {
            let row = match row {
                Ok(row) => row,
                Err(err) => {
                    warn!(class = %class, error = %err, "address row skipped");
                    continue;
                }
            };
            match row.file_number() {
                Some(file_number) => {
                    records.insert(file_number, row.into_record());
                }
                None => warn!(class = %class, "address row without a readable file number"),
            }
        }
        Ok(records)
    }
}

/// Reads a list record by record. Only a missing header line or an I/O
/// failure makes the whole file unavailable.
fn read_records<T, R>(
    class: &ClassCode,
    path: &Path,
    reader: R,
) -> Result<Vec<Result<T, MalformedInput>>, SourceError>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|err| unreadable(class, path, err))?
        .clone();
    let file_column = headers.iter().position(|name| name == "Numéro");

    let mut rows = Vec::new();
    for record in csv_reader.byte_records() {
        let record = record.map_err(|err| unreadable(class, path, err))?;
        rows.push(decode_record(&headers, file_column, &record));
    }
    Ok(rows)
}

fn unreadable(class: &ClassCode, path: &Path, err: csv::Error) -> SourceError {
    SourceError::Unavailable {
        class: class.clone(),
        reason: format!("invalid CSV in {}: {err}", path.display()),
    }
}

fn decode_record<T>(
    headers: &StringRecord,
    file_column: Option<usize>,
    record: &ByteRecord,
) -> Result<T, MalformedInput>
where
    T: DeserializeOwned,
{
    let line = record.position().map(|pos| pos.line()).unwrap_or_default();
    let file_number = file_column
        .and_then(|column| record.get(column))
        .and_then(|cell| std::str::from_utf8(cell).ok())
        .and_then(|cell| cell.trim().parse::<u32>().ok())
        .map(FileNumber);

    if record.len() != headers.len() {
        return Err(malformed_record(
            file_number,
            format!(
                "line {line}: expected {} fields, found {}",
                headers.len(),
                record.len()
            ),
        ));
    }
    let record = StringRecord::from_byte_record(record.clone())
        .map_err(|err| malformed_record(file_number, format!("line {line}: {err}")))?;
    record
        .deserialize(Some(headers))
        .map_err(|err| malformed_record(file_number, format!("line {line}: {err}")))
}

fn malformed_record(file_number: Option<FileNumber>, problem: String) -> MalformedInput {
    MalformedInput {
        file_number,
        fields: vec![FieldError {
            field: "record",
            problem,
        }],
    }
}

#[derive(Debug, Deserialize)]
struct AddressRow {
    #[serde(rename = "Numéro", default, deserialize_with = "empty_string_as_none")]
    file_number: Option<String>,
    #[serde(rename = "Adresse 1", default, deserialize_with = "empty_string_as_none")]
    line1: Option<String>,
    #[serde(rename = "Adresse 2", default, deserialize_with = "empty_string_as_none")]
    line2: Option<String>,
    #[serde(rename = "Adresse 3", default, deserialize_with = "empty_string_as_none")]
    line3: Option<String>,
    #[serde(rename = "Code postal", default, deserialize_with = "empty_string_as_none")]
    postal_code: Option<String>,
    #[serde(rename = "Ville", default, deserialize_with = "empty_string_as_none")]
    city: Option<String>,
    #[serde(rename = "Pays", default, deserialize_with = "empty_string_as_none")]
    country: Option<String>,
    #[serde(rename = "Email", default, deserialize_with = "empty_string_as_none")]
    email: Option<String>,
    #[serde(rename = "Téléphone", default, deserialize_with = "empty_string_as_none")]
    phone: Option<String>,
    #[serde(rename = "Sexe", default, deserialize_with = "empty_string_as_none")]
    sex: Option<String>,
    #[serde(
        rename = "Date de naissance",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    birth_date: Option<String>,
}

impl AddressRow {
    fn file_number(&self) -> Option<FileNumber> {
        self.file_number
            .as_deref()
            .and_then(|raw| raw.parse::<u32>().ok())
            .map(FileNumber)
    }

    fn into_record(self) -> AddressRecord {
        let lines: Vec<String> = [self.line1, self.line2, self.line3]
            .into_iter()
            .flatten()
            .collect();
        let address = if lines.is_empty() && self.postal_code.is_none() && self.city.is_none() {
            None
        } else {
            Some(format_postal_address(&PostalAddress {
                lines,
                postal_code: self.postal_code.unwrap_or_default(),
                city: self.city.unwrap_or_default(),
                country: self.country.unwrap_or_default(),
            }))
        };

        AddressRecord {
            address,
            email: self.email,
            phone: self.phone,
            sex: self.sex.as_deref().and_then(Sex::from_code),
            birth_date: self.birth_date.as_deref().and_then(parse_slash_date),
        }
    }
}
