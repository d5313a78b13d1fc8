//! Inbound admission events pushed by the platform, one JSON object per call.

mod router;

pub use router::{push_router, PUSH_ROUTE};

use axum::http::StatusCode;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::domain::AdmissionOffer;
use super::normalize::{decode_push, MalformedInput, PushAdmission};
use super::reconcile::{ReconcileError, ReconciliationEngine, ReconciliationResult};
use super::store::{AdmissionRepository, RepositoryError};
use crate::config::PushCredentials;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid credentials")]
    Authentication,
    #[error(transparent)]
    Malformed(#[from] MalformedInput),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl PushError {
    pub fn status(&self) -> StatusCode {
        match self {
            PushError::Authentication => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body returned to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReply {
    pub retour: String,
    pub message: String,
}

impl PushReply {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            retour: "OK".to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn nok(message: impl Into<String>) -> Self {
        Self {
            retour: "NOK".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResponse {
    pub status: StatusCode,
    pub reply: PushReply,
}

/// Durable trace of one inbound call, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushLogEntry {
    pub received_at: NaiveDateTime,
    pub source_ip: Option<String>,
    pub status: u16,
    pub retour: String,
    pub message: String,
    /// Raw payload with the password masked.
    pub payload: String,
}

struct PushTrace {
    received_at: NaiveDateTime,
    source_ip: Option<String>,
    payload: String,
}

impl PushTrace {
    fn entry(&self, response: &PushResponse) -> PushLogEntry {
        PushLogEntry {
            received_at: self.received_at,
            source_ip: self.source_ip.clone(),
            status: response.status.as_u16(),
            retour: response.reply.retour.clone(),
            message: response.reply.message.clone(),
            payload: self.payload.clone(),
        }
    }
}

fn accepted(result: Option<&ReconciliationResult>) -> PushResponse {
    let reply = match result {
        Some(result) => PushReply::ok(format!(
            "{} {}",
            result.file_number,
            result.outcome.label()
        )),
        None => PushReply::ok("no answer yet"),
    };
    PushResponse {
        status: StatusCode::OK,
        reply,
    }
}

pub struct PushService<R> {
    repository: Arc<R>,
    engine: Arc<ReconciliationEngine>,
    credentials: Option<PushCredentials>,
}

impl<R> PushService<R>
where
    R: AdmissionRepository + 'static,
{
    /// Without credentials every call is refused.
    pub fn new(
        repository: Arc<R>,
        engine: Arc<ReconciliationEngine>,
        credentials: Option<PushCredentials>,
    ) -> Self {
        Self {
            repository,
            engine,
            credentials,
        }
    }

    /// Processes one call and logs it, whatever the outcome.
    ///
    /// An accepted call applies the offer and records its log entry in the
    /// same transaction; a rejected call only records the log entry.
    pub fn handle(
        &self,
        source_ip: Option<IpAddr>,
        body: &[u8],
        received_at: NaiveDateTime,
    ) -> PushResponse {
        let trace = PushTrace {
            received_at,
            source_ip: source_ip.map(|ip| ip.to_string()),
            payload: redact_payload(body),
        };

        let committed = self.decode(body, received_at).and_then(|offer| {
            self.repository.transaction(|store| {
                let result = match &offer {
                    Some(offer) => Some(self.engine.apply_offer(store, offer)?),
                    None => None,
                };
                let response = accepted(result.as_ref());
                store.record_push(trace.entry(&response));
                Ok::<_, PushError>((response, result))
            })
        });

        let err = match committed {
            Ok((response, result)) => {
                if let Some(result) = result {
                    info!(
                        student = %result.file_number,
                        outcome = result.outcome.label(),
                        "push applied"
                    );
                }
                return response;
            }
            Err(err) => err,
        };

        warn!(source_ip = ?source_ip, error = %err, "push rejected");
        let response = PushResponse {
            status: err.status(),
            reply: PushReply::nok(err.to_string()),
        };
        let logged = self.repository.transaction(|store| {
            store.record_push(trace.entry(&response));
            Ok::<_, RepositoryError>(())
        });
        match logged {
            Ok(()) => response,
            Err(err) => {
                error!(error = %err, "push log could not be written");
                PushResponse {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    reply: PushReply::nok(err.to_string()),
                }
            }
        }
    }

    fn decode(
        &self,
        body: &[u8],
        received_at: NaiveDateTime,
    ) -> Result<Option<AdmissionOffer>, PushError> {
        let payload: PushAdmission = serde_json::from_slice(body)?;
        self.authenticate(&payload)?;
        Ok(decode_push(&payload, received_at)?)
    }

    fn authenticate(&self, payload: &PushAdmission) -> Result<(), PushError> {
        match (&self.credentials, &payload.identifiant) {
            (Some(expected), Some(given))
                if expected.login == given.login && expected.password == given.pwd =>
            {
                Ok(())
            }
            _ => Err(PushError::Authentication),
        }
    }
}

fn redact_payload(body: &[u8]) -> String {
    let Ok(mut value) = serde_json::from_slice::<Value>(body) else {
        return mask_raw_password(&String::from_utf8_lossy(body));
    };

    if let Some(object) = value.as_object_mut() {
        for key in ["identifiant", "indentifiant"] {
            if let Some(Value::Object(credentials)) = object.get_mut(key) {
                if credentials.contains_key("pwd") {
                    credentials.insert("pwd".to_string(), Value::String("***".to_string()));
                }
            }
        }
    }
    value.to_string()
}

/// Masks every `pwd` value in a body that could not be parsed, up to the next
/// field separator.
fn mask_raw_password(raw: &str) -> String {
    const KEY: &str = "pwd";
    let mut masked = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find(KEY) {
        let (before, after) = rest.split_at(start + KEY.len());
        masked.push_str(before);

        let value_start = after
            .find(|c: char| !matches!(c, '"' | '\'' | ':' | '=' | ' ' | '\t'))
            .unwrap_or(after.len());
        let (separator, value) = after.split_at(value_start);
        masked.push_str(separator);

        let value_end = value
            .find(|c: char| matches!(c, ',' | '}' | '&' | '\n' | '\r'))
            .unwrap_or(value.len());
        if value_end > 0 {
            masked.push_str("***");
        }
        rest = &value[value_end..];
    }
    masked.push_str(rest);
    masked
}
