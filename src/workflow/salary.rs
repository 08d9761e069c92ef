use super::{expect_unique, DocumentSpec, Provisioner};
use crate::config::TITLE_SALARY_NOTICE;
use crate::error::{WorkflowError, WorkflowResult};
use crate::model::{
    case_web_link, CaseFilter, CaseNotice, CaseRecord, Notification, RenderedDocument,
    ResponsiblePerson, SalaryChangeEvent, WorkflowOutcome,
};

/// Existing personnel case together with its responsible person.
struct PersonnelCase {
    record: CaseRecord,
    responsible: ResponsiblePerson,
}

impl Provisioner<'_> {
    pub fn run_salary_change(&self, event: &SalaryChangeEvent) -> WorkflowOutcome {
        let span = tracing::info_span!("salary_change", person = %event.person_name);
        let _entered = span.enter();
        let failure_message = format!(
            "Noe gikk galt ved opprettelse av melding til Lønn for {}.",
            event.person_name
        );

        // Until the case is known there is no responsible person to notify.
        let prepared = self.render_salary_notice(event).and_then(|document| {
            let case = self.resolve_personnel_case(event)?;
            Ok((document, case))
        });
        let (document, case) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => return self.publish_failure(err, failure_message, None),
        };

        match self.file_salary_notice(&case, &document) {
            Ok(()) => {
                let notification = Notification::SalaryNoticeCreated(CaseNotice {
                    responsible_email: case.responsible.email.clone(),
                    person_name: event.person_name.clone(),
                    case_recno: case.record.recno,
                    case_number: case.record.case_number.clone(),
                    web_link: case_web_link(&self.settings.web_base_uri, case.record.recno),
                });
                self.publish_success(notification, case.record.case_number, case.record.recno)
            }
            Err(err) => {
                self.publish_failure(err, failure_message, Some(case.responsible.email))
            }
        }
    }

    fn render_salary_notice(&self, event: &SalaryChangeEvent) -> WorkflowResult<RenderedDocument> {
        self.render_document(DocumentSpec {
            template: &self.settings.templates.salary_notice,
            data: &event.fields,
            title: format!("{TITLE_SALARY_NOTICE} for {}", event.person_name),
            file_stem: "lonnsmelding",
            national_id: &event.national_id,
        })
    }

    /// The employee's case in the unit's access group. Never creates one.
    fn resolve_personnel_case(&self, event: &SalaryChangeEvent) -> WorkflowResult<PersonnelCase> {
        let access_group = event.access_group();
        let filter = CaseFilter::NationalId {
            national_id: event.national_id.clone(),
            access_group: access_group.clone(),
        };
        let record = expect_unique(&filter.to_string(), || {
            let candidates = self.store.find_cases(&filter)?;
            let total = candidates.len();
            let matching = candidates
                .into_iter()
                .filter(|case| case.access_group.as_deref() == Some(access_group.as_str()))
                .collect::<Vec<_>>();
            tracing::debug!(total, matching = matching.len(), "case candidates filtered");
            Ok(matching)
        })?;
        let responsible = record.responsible.clone().ok_or_else(|| {
            WorkflowError::not_found(format!(
                "responsible person on case {}",
                record.case_number
            ))
        })?;
        tracing::info!(
            case_number = %record.case_number,
            recno = record.recno,
            "existing personnel case found"
        );
        Ok(PersonnelCase {
            record,
            responsible,
        })
    }

    fn file_salary_notice(
        &self,
        case: &PersonnelCase,
        document: &RenderedDocument,
    ) -> WorkflowResult<()> {
        let access_group = case
            .record
            .access_group
            .as_deref()
            .unwrap_or_default();
        let folder = self.resolve_folder(
            TITLE_SALARY_NOTICE,
            &case.record.case_number,
            case.responsible.recno,
            access_group,
        )?;
        self.upload(&folder, document)
    }
}
