use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::catalog::ClassCode;

/// Admission-file number assigned by Parcoursup; primary key of a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileNumber(pub u32);

impl fmt::Display for FileNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arena index of a proposition inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropositionId(pub u64);

/// Arena index of an action inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Female => "Mme",
            Self::Male => "M.",
        }
    }

    /// Decodes the single-letter codes used by both admission sources.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "F" => Some(Self::Female),
            "M" | "H" => Some(Self::Male),
            _ => None,
        }
    }
}

/// The single internal vocabulary for what an admission signal says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OfferState {
    AcceptedDefinitive,
    AcceptedPendingOtherChoices,
    Resigned,
}

impl OfferState {
    pub const fn ordered() -> [Self; 3] {
        [
            Self::AcceptedDefinitive,
            Self::AcceptedPendingOtherChoices,
            Self::Resigned,
        ]
    }

    /// Deduplication rank: definitive beats pending beats resigned.
    pub const fn rank(self) -> u8 {
        match self {
            Self::AcceptedDefinitive => 2,
            Self::AcceptedPendingOtherChoices => 1,
            Self::Resigned => 0,
        }
    }

    pub const fn accepted_status(self) -> Option<PropositionStatus> {
        match self {
            Self::AcceptedDefinitive => Some(PropositionStatus::Definitive),
            Self::AcceptedPendingOtherChoices => Some(PropositionStatus::PendingOtherChoices),
            Self::Resigned => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::AcceptedDefinitive => "accepted-definitive",
            Self::AcceptedPendingOtherChoices => "accepted-pending-other-choices",
            Self::Resigned => "resigned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropositionStatus {
    Definitive,
    PendingOtherChoices,
}

impl PropositionStatus {
    pub const fn rank(self) -> u8 {
        match self {
            Self::Definitive => 1,
            Self::PendingOtherChoices => 0,
        }
    }

    pub fn is_upgrade_from(self, previous: Self) -> bool {
        self.rank() > previous.rank()
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Definitive => "Definitive acceptance",
            Self::PendingOtherChoices => "Other choices pending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub file_number: FileNumber,
    pub last_name: String,
    pub first_name: String,
    pub birth_date: Option<NaiveDate>,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub sex: Option<Sex>,
    pub current_proposition: Option<PropositionId>,
}

impl Student {
    pub fn from_offer(offer: &AdmissionOffer) -> Self {
        let mut student = Self {
            file_number: offer.file_number,
            last_name: offer.last_name.clone(),
            first_name: offer.first_name.clone(),
            birth_date: None,
            email: String::new(),
            phone: String::new(),
            address: String::new(),
            sex: None,
            current_proposition: None,
        };
        student.refresh_contact(offer);
        student
    }

    /// Overwrites identity and contact fields the offer actually carries.
    pub fn refresh_contact(&mut self, offer: &AdmissionOffer) {
        if !offer.last_name.is_empty() {
            self.last_name = offer.last_name.clone();
        }
        if !offer.first_name.is_empty() {
            self.first_name = offer.first_name.clone();
        }
        if offer.birth_date.is_some() {
            self.birth_date = offer.birth_date;
        }

        let contact = &offer.contact;
        if let Some(email) = &contact.email {
            self.email = email.clone();
        }
        if let Some(phone) = &contact.phone {
            self.phone = phone.clone();
        }
        if let Some(address) = &contact.address {
            self.address = address.clone();
        }
        if contact.sex.is_some() {
            self.sex = contact.sex;
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposition {
    pub id: PropositionId,
    pub student: FileNumber,
    pub class: ClassCode,
    pub offered_at: NaiveDateTime,
    pub resigned_at: Option<NaiveDateTime>,
    pub boarding: bool,
    pub gap_year: bool,
    pub status: PropositionStatus,
    pub supersedes: Option<PropositionId>,
    pub superseded_by: Option<PropositionId>,
    pub registration_complete: bool,
}

impl Proposition {
    /// Neither superseded nor resigned.
    pub fn is_active(&self) -> bool {
        self.superseded_by.is_none() && self.resigned_at.is_none()
    }

    /// Class and boarding are what make two offers materially different.
    pub fn same_placement(&self, offer: &AdmissionOffer) -> bool {
        self.class == offer.class && self.boarding == offer.boarding
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionCategory {
    SendPacket,
    SendBoardingPacket,
    Register,
    RequestDocuments,
    Resignation,
    GapYearReview,
}

impl ActionCategory {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SendPacket => "Send enrollment packet",
            Self::SendBoardingPacket => "Send boarding-school packet",
            Self::Register => "Administrative registration",
            Self::RequestDocuments => "Request missing documents",
            Self::Resignation => "Record resignation",
            Self::GapYearReview => "Review gap-year request",
        }
    }

    pub const fn is_mailing(self) -> bool {
        matches!(self, Self::SendPacket | Self::SendBoardingPacket)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionState {
    Todo,
    Done,
    NotApplicable,
    Cancelled,
}

impl ActionState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Todo => "To do",
            Self::Done => "Done",
            Self::NotApplicable => "Nothing to do",
            Self::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub proposition: PropositionId,
    pub student: FileNumber,
    pub category: ActionCategory,
    pub scheduled_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub state: ActionState,
    pub note: String,
}

impl Action {
    pub fn is_todo(&self) -> bool {
        self.state == ActionState::Todo
    }
}

/// Contact fields an admission source may or may not provide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub sex: Option<Sex>,
}

/// Canonical, validated form of one external admission signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionOffer {
    pub file_number: FileNumber,
    pub last_name: String,
    pub first_name: String,
    pub birth_date: Option<NaiveDate>,
    pub class: ClassCode,
    pub state: OfferState,
    pub responded_at: Option<NaiveDateTime>,
    pub offered_at: NaiveDateTime,
    pub boarding: bool,
    pub gap_year: bool,
    pub contact: ContactDetails,
}

impl AdmissionOffer {
    /// Timestamp a resignation takes effect: the candidate's answer when known.
    pub fn resignation_at(&self) -> NaiveDateTime {
        self.responded_at.unwrap_or(self.offered_at)
    }
}
