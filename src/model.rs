//! Domain types shared by the workflow and its collaborators.
//!
//! Inbound events keep their raw field map next to the typed fields because
//! templates merge arbitrary event fields, not only the ones the workflow reads.
use crate::error::ErrorKind;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const FIELD_PERSON_NAME: &str = "Navn";
pub const FIELD_NATIONAL_ID: &str = "FødselsOgPersonnummer";
pub const FIELD_RESPONSIBLE_EMAIL: &str = "DinEpostadresse";
pub const FIELD_UNIT: &str = "Enhet";
pub const FIELD_EMPLOYMENT_LANGUAGE: &str = "ArbeidsavtaleLanguage";

/// Merge field added before rendering documents that reference the case.
pub const FIELD_CASE_NUMBER: &str = "p360_case_number";
/// Merge field carrying the render date.
pub const FIELD_DATE: &str = "date";

/// Access group guarding every personnel case of a unit.
pub fn personnel_access_group(unit: &str) -> String {
    format!("{unit} Personalmapper")
}

/// Title of the public personnel case for one employee in one unit.
pub fn personnel_case_title(person_name: &str, unit: &str) -> String {
    format!("Personalmappe offentlig - {person_name} - {unit}")
}

fn required_str(fields: &Map<String, Value>, key: &str) -> Result<String> {
    let value = fields
        .get(key)
        .ok_or_else(|| anyhow!("missing required field {key:?}"))?;
    let text = value
        .as_str()
        .ok_or_else(|| anyhow!("field {key:?} must be a string"))?
        .trim();
    if text.is_empty() {
        return Err(anyhow!("field {key:?} must be non-empty"));
    }
    Ok(text.to_string())
}

/// A new employee to provision.
#[derive(Debug, Clone, PartialEq)]
pub struct OnboardingEvent {
    pub person_name: String,
    pub national_id: String,
    pub responsible_email: String,
    pub unit: String,
    pub employment_language: String,
    pub fields: Map<String, Value>,
}

impl OnboardingEvent {
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self> {
        Ok(Self {
            person_name: required_str(&fields, FIELD_PERSON_NAME)?,
            national_id: required_str(&fields, FIELD_NATIONAL_ID)?,
            responsible_email: required_str(&fields, FIELD_RESPONSIBLE_EMAIL)?,
            unit: required_str(&fields, FIELD_UNIT)?,
            employment_language: required_str(&fields, FIELD_EMPLOYMENT_LANGUAGE)?,
            fields,
        })
    }

    pub fn access_group(&self) -> String {
        personnel_access_group(&self.unit)
    }

    pub fn case_title(&self) -> String {
        personnel_case_title(&self.person_name, &self.unit)
    }
}

/// A salary change for an employee who already has a personnel case.
#[derive(Debug, Clone, PartialEq)]
pub struct SalaryChangeEvent {
    pub person_name: String,
    pub national_id: String,
    pub unit: String,
    pub fields: Map<String, Value>,
}

impl SalaryChangeEvent {
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self> {
        Ok(Self {
            person_name: required_str(&fields, FIELD_PERSON_NAME)?,
            national_id: required_str(&fields, FIELD_NATIONAL_ID)?,
            unit: required_str(&fields, FIELD_UNIT)?,
            fields,
        })
    }

    pub fn access_group(&self) -> String {
        personnel_access_group(&self.unit)
    }
}

/// Wire envelope as delivered by the transport.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum Envelope {
    Onboarding(Map<String, Value>),
    SalaryChange(Map<String, Value>),
}

/// A validated inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum HrEvent {
    Onboarding(OnboardingEvent),
    SalaryChange(SalaryChangeEvent),
}

impl HrEvent {
    /// Parse and validate one JSON envelope.
    pub fn parse(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text).context("parse event envelope")?;
        match envelope {
            Envelope::Onboarding(fields) => OnboardingEvent::from_fields(fields)
                .map(Self::Onboarding)
                .context("invalid onboarding event"),
            Envelope::SalaryChange(fields) => SalaryChangeEvent::from_fields(fields)
                .map(Self::SalaryChange)
                .context("invalid salary_change event"),
        }
    }

    pub fn person_name(&self) -> &str {
        match self {
            Self::Onboarding(event) => &event.person_name,
            Self::SalaryChange(event) => &event.person_name,
        }
    }

    /// Raw merge fields as delivered.
    pub fn fields(&self) -> &Map<String, Value> {
        match self {
            Self::Onboarding(event) => &event.fields,
            Self::SalaryChange(event) => &event.fields,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Onboarding(_) => "onboarding",
            Self::SalaryChange(_) => "salary_change",
        }
    }
}

/// A contact person in the case store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub email: String,
    pub recno: i64,
}

/// Responsible person attached to a case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsiblePerson {
    pub email: String,
    pub recno: i64,
}

/// A case as reported by the case store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRecord {
    pub case_number: String,
    pub recno: i64,
    pub access_group: Option<String>,
    pub responsible: Option<ResponsiblePerson>,
}

/// How cases are looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseFilter {
    Title(String),
    NationalId {
        national_id: String,
        access_group: String,
    },
}

impl std::fmt::Display for CaseFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Title(title) => write!(f, "case titled {title:?}"),
            Self::NationalId { access_group, .. } => {
                write!(f, "case for national id in access group {access_group:?}")
            }
        }
    }
}

/// Payload for creating a personnel case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCase {
    pub title: String,
    pub responsible_recno: i64,
    pub access_group: String,
    pub national_id: String,
}

/// Extra contact attached to a new document folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderContact {
    pub recno: i64,
    pub role: u32,
}

/// Identifies a document folder under a case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFolderRef {
    pub recno: i64,
    pub document_number: String,
}

/// Payload for creating a document folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocumentFolder {
    pub title: String,
    pub category: u32,
    pub status: u32,
    pub case_number: String,
    pub responsible_recno: i64,
    pub access_group: String,
    pub access_code: Option<u32>,
    pub paragraph: Option<String>,
    pub contacts: Vec<FolderContact>,
}

/// A rendered file ready for upload. `data` is base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub title: String,
    pub format: String,
    pub data: String,
}

/// Payload of a success notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseNotice {
    #[serde(rename = "executive_officer")]
    pub responsible_email: String,
    #[serde(rename = "p360_case_subject")]
    pub person_name: String,
    #[serde(rename = "p360_recno")]
    pub case_recno: i64,
    #[serde(rename = "p360_case_number")]
    pub case_number: String,
    pub web_link: String,
}

/// Payload of an error notification.
///
/// Without `email_recipient` the notification service falls back to its
/// default error recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_recipient: Option<String>,
}

/// Outcome event published once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Notification {
    #[serde(rename = "p360caseCreated")]
    CaseCreated(CaseNotice),
    #[serde(rename = "p360lonnsmeldingCreated")]
    SalaryNoticeCreated(CaseNotice),
    #[serde(rename = "error")]
    Error(ErrorNotice),
}

impl Notification {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::CaseCreated(_) => "p360caseCreated",
            Self::SalaryNoticeCreated(_) => "p360lonnsmeldingCreated",
            Self::Error(_) => "error",
        }
    }
}

/// Result of one workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Succeeded {
        case_number: String,
        case_recno: i64,
    },
    Failed {
        kind: ErrorKind,
        message: String,
        email_recipient: Option<String>,
    },
}

impl WorkflowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Link into the case-management web client for a case.
pub fn case_web_link(web_base_uri: &str, case_recno: i64) -> String {
    format!("{web_base_uri}?recno={case_recno}&module=Case&subtype=2")
}
