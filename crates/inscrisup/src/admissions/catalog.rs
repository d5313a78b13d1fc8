use serde::{Deserialize, Serialize};
use std::fmt;

use super::domain::PropositionStatus;
use super::store::AdmissionStore;

/// Parcoursup code of a class/section offered by the school.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassCode(pub String);

impl ClassCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassConfig {
    pub code: ClassCode,
    pub name: String,
    pub capacity: u16,
    pub overbooking: u16,
}

impl ClassConfig {
    pub fn admission_target(&self) -> u32 {
        u32::from(self.capacity) + u32::from(self.overbooking)
    }
}

/// Classes this school recruits into, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct ClassCatalog {
    classes: Vec<ClassConfig>,
}

impl ClassCatalog {
    pub fn new(classes: Vec<ClassConfig>) -> Self {
        Self { classes }
    }

    pub fn get(&self, code: &ClassCode) -> Option<&ClassConfig> {
        self.classes.iter().find(|class| &class.code == code)
    }

    pub fn contains(&self, code: &ClassCode) -> bool {
        self.get(code).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassConfig> {
        self.classes.iter()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Active propositions per class, split by acceptance status.
    pub fn overview(&self, store: &AdmissionStore) -> Vec<ClassOverview> {
        self.classes
            .iter()
            .map(|class| {
                let mut overview = ClassOverview {
                    code: class.code.clone(),
                    name: class.name.clone(),
                    admission_target: class.admission_target(),
                    definitive: 0,
                    pending_other_choices: 0,
                    boarders: 0,
                };
                for (_, proposition) in store.active_in_class(&class.code) {
                    match proposition.status {
                        PropositionStatus::Definitive => overview.definitive += 1,
                        PropositionStatus::PendingOtherChoices => {
                            overview.pending_other_choices += 1
                        }
                    }
                    if proposition.boarding {
                        overview.boarders += 1;
                    }
                }
                overview
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassOverview {
    pub code: ClassCode,
    pub name: String,
    pub admission_target: u32,
    pub definitive: usize,
    pub pending_other_choices: usize,
    pub boarders: usize,
}

impl ClassOverview {
    pub fn admitted(&self) -> usize {
        self.definitive + self.pending_other_choices
    }
}
