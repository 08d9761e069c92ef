//! Idempotent provisioning workflow.
//!
//! A [`Provisioner`] borrows its three collaborators and runs one event to
//! completion. Remote calls within a run are strictly ordered; the first
//! failure aborts the run. Every run publishes exactly one notification, a
//! success shape or an error, never both.
//!
//! Idempotence rests on [`find_or_create`]: cases and document folders are
//! looked up first and only created on confirmed absence, so replaying an
//! event against a store that already holds its results creates nothing.
use crate::config::WorkflowSettings;
use crate::error::{ErrorKind, WorkflowError, WorkflowResult};
use crate::model::{
    DocumentFolderRef, ErrorNotice, HrEvent, NewDocumentFolder, Notification, RenderedDocument,
    WorkflowOutcome,
};
use crate::notify::Notifier;
use crate::render::{encode_document, write_result_copy, DocumentRenderer};
use crate::store::CaseStore;
use crate::util::file_slug;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::path::Path;

mod onboarding;
mod salary;

/// How [`find_or_create`] obtained its entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<T> {
    Found(T),
    Created(T),
}

impl<T> Resolved<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Found(value) | Self::Created(value) => value,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Return the single entity `lookup` yields, or create it when there is none.
///
/// More than one candidate is an [`WorkflowError::AmbiguousMatch`] naming
/// `what`; `create` is never called in that case.
pub fn find_or_create<T>(
    what: &str,
    lookup: impl FnOnce() -> WorkflowResult<Vec<T>>,
    create: impl FnOnce() -> WorkflowResult<T>,
) -> WorkflowResult<Resolved<T>> {
    let mut candidates = lookup()?;
    match candidates.len() {
        0 => create().map(Resolved::Created),
        1 => Ok(Resolved::Found(candidates.remove(0))),
        count => Err(WorkflowError::AmbiguousMatch {
            what: what.to_string(),
            count,
        }),
    }
}

/// Like [`find_or_create`] for lookups that may not create: zero is `NotFound`.
pub fn expect_unique<T>(
    what: &str,
    lookup: impl FnOnce() -> WorkflowResult<Vec<T>>,
) -> WorkflowResult<T> {
    let mut candidates = lookup()?;
    match candidates.len() {
        0 => Err(WorkflowError::not_found(what)),
        1 => Ok(candidates.remove(0)),
        count => Err(WorkflowError::AmbiguousMatch {
            what: what.to_string(),
            count,
        }),
    }
}

/// Document to render: template, merge data and naming.
struct DocumentSpec<'d> {
    template: &'d Path,
    data: &'d Map<String, Value>,
    title: String,
    file_stem: &'static str,
    national_id: &'d str,
}

pub struct Provisioner<'a> {
    store: &'a dyn CaseStore,
    renderer: &'a dyn DocumentRenderer,
    notifier: &'a dyn Notifier,
    settings: &'a WorkflowSettings,
    today: Option<NaiveDate>,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        store: &'a dyn CaseStore,
        renderer: &'a dyn DocumentRenderer,
        notifier: &'a dyn Notifier,
        settings: &'a WorkflowSettings,
    ) -> Self {
        Self {
            store,
            renderer,
            notifier,
            settings,
            today: None,
        }
    }

    /// Pin the render date instead of reading the local clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn run(&self, event: &HrEvent) -> WorkflowOutcome {
        match event {
            HrEvent::Onboarding(event) => self.run_onboarding(event),
            HrEvent::SalaryChange(event) => self.run_salary_change(event),
        }
    }

    fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Find-or-create the folder `title` under a case using its folder profile.
    fn resolve_folder(
        &self,
        title: &str,
        case_number: &str,
        responsible_recno: i64,
        access_group: &str,
    ) -> WorkflowResult<DocumentFolderRef> {
        let profile = self
            .settings
            .folder_profile(title)
            .ok_or_else(|| WorkflowError::not_found(format!("folder profile for {title:?}")))?;
        let what = format!("document folder {title:?} in case {case_number}");
        let resolved = find_or_create(
            &what,
            || self.store.find_document_folders(title, case_number),
            || {
                self.store.create_document_folder(&NewDocumentFolder {
                    title: title.to_string(),
                    category: profile.category,
                    status: profile.status,
                    case_number: case_number.to_string(),
                    responsible_recno,
                    access_group: access_group.to_string(),
                    access_code: profile.access_code,
                    paragraph: profile.paragraph.clone(),
                    contacts: profile.contacts.clone(),
                })
            },
        )?;
        let created = resolved.was_created();
        let folder = resolved.into_inner();
        tracing::info!(
            title,
            case_number,
            document_number = %folder.document_number,
            recno = folder.recno,
            created,
            "document folder resolved"
        );
        Ok(folder)
    }

    fn render_document(&self, spec: DocumentSpec<'_>) -> WorkflowResult<RenderedDocument> {
        let bytes = self.renderer.render(spec.template, spec.data)?;
        if let Some(result_dir) = &self.settings.templates.result_dir {
            let file_name = format!(
                "generated_{}_{}_{}",
                spec.file_stem,
                file_slug(spec.national_id),
                self.today().format("%Y-%m-%d")
            );
            let path = write_result_copy(result_dir, &file_name, spec.template, &bytes)?;
            tracing::debug!(path = %path.display(), "rendered copy written");
        }
        tracing::info!(
            title = %spec.title,
            template = %spec.template.display(),
            bytes = bytes.len(),
            "document rendered"
        );
        Ok(encode_document(&spec.title, spec.template, &bytes))
    }

    fn upload(
        &self,
        folder: &DocumentFolderRef,
        document: &RenderedDocument,
    ) -> WorkflowResult<()> {
        let stored = self.store.upload_file(&folder.document_number, document)?;
        tracing::info!(
            title = %document.title,
            document_number = %stored.document_number,
            "document uploaded"
        );
        Ok(())
    }

    fn publish_success(
        &self,
        notification: Notification,
        case_number: String,
        case_recno: i64,
    ) -> WorkflowOutcome {
        match self.notifier.publish(&notification) {
            Ok(()) => WorkflowOutcome::Succeeded {
                case_number,
                case_recno,
            },
            Err(err) => {
                tracing::error!(error = %err, case_number, "provisioning done but not reported");
                WorkflowOutcome::Failed {
                    kind: ErrorKind::Publish,
                    message: err.to_string(),
                    email_recipient: None,
                }
            }
        }
    }

    fn publish_failure(
        &self,
        err: WorkflowError,
        message: String,
        email_recipient: Option<String>,
    ) -> WorkflowOutcome {
        tracing::error!(
            error = %err,
            kind = ?err.kind(),
            has_recipient = email_recipient.is_some(),
            "provisioning failed; emitting error notification"
        );
        let notification = Notification::Error(ErrorNotice {
            message: message.clone(),
            email_recipient: email_recipient.clone(),
        });
        if let Err(publish_err) = self.notifier.publish(&notification) {
            tracing::error!(error = %publish_err, "error notification could not be published");
        }
        WorkflowOutcome::Failed {
            kind: err.kind(),
            message,
            email_recipient,
        }
    }
}
