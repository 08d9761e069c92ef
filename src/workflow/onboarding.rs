use super::{expect_unique, find_or_create, DocumentSpec, Provisioner};
use crate::config::{TITLE_COLLECTIVE_BARGAINING, TITLE_EMPLOYMENT_TERMS, TITLE_WELCOME_LETTER};
use crate::error::WorkflowResult;
use crate::model::{
    case_web_link, CaseFilter, CaseNotice, CaseRecord, NewCase, Notification, OnboardingEvent,
    WorkflowOutcome, FIELD_CASE_NUMBER, FIELD_DATE,
};
use serde_json::Value;

impl Provisioner<'_> {
    pub fn run_onboarding(&self, event: &OnboardingEvent) -> WorkflowOutcome {
        let span = tracing::info_span!("onboarding", person = %event.person_name);
        let _entered = span.enter();

        match self.onboard(event) {
            Ok(case) => {
                let notification = Notification::CaseCreated(CaseNotice {
                    responsible_email: event.responsible_email.clone(),
                    person_name: event.person_name.clone(),
                    case_recno: case.recno,
                    case_number: case.case_number.clone(),
                    web_link: case_web_link(&self.settings.web_base_uri, case.recno),
                });
                self.publish_success(notification, case.case_number, case.recno)
            }
            Err(err) => self.publish_failure(
                err,
                format!(
                    "Noe gikk galt ved opprettelse av ny personalmappe for {}.",
                    event.person_name
                ),
                Some(event.responsible_email.clone()),
            ),
        }
    }

    fn onboard(&self, event: &OnboardingEvent) -> WorkflowResult<CaseRecord> {
        let access_group = event.access_group();

        let contact = expect_unique(
            &format!("contact with email {}", event.responsible_email),
            || self.store.find_contacts_by_email(&event.responsible_email),
        )?;
        tracing::info!(
            email = %contact.email,
            recno = contact.recno,
            "responsible person resolved"
        );

        let filter = CaseFilter::Title(event.case_title());
        let resolved = find_or_create(
            &filter.to_string(),
            || self.store.find_cases(&filter),
            || {
                self.store.create_case(&NewCase {
                    title: event.case_title(),
                    responsible_recno: contact.recno,
                    access_group: access_group.clone(),
                    national_id: event.national_id.clone(),
                })
            },
        )?;
        let created = resolved.was_created();
        let case = resolved.into_inner();
        tracing::info!(
            case_number = %case.case_number,
            recno = case.recno,
            created,
            "personnel case resolved"
        );

        let welcome_folder = self.resolve_folder(
            TITLE_WELCOME_LETTER,
            &case.case_number,
            contact.recno,
            &access_group,
        )?;
        let terms_folder = self.resolve_folder(
            TITLE_EMPLOYMENT_TERMS,
            &case.case_number,
            contact.recno,
            &access_group,
        )?;
        let bargaining_folder = self.resolve_folder(
            TITLE_COLLECTIVE_BARGAINING,
            &case.case_number,
            contact.recno,
            &access_group,
        )?;

        let mut enriched = event.fields.clone();
        enriched.insert(
            FIELD_CASE_NUMBER.to_string(),
            Value::String(case.case_number.clone()),
        );
        enriched.insert(
            FIELD_DATE.to_string(),
            Value::String(self.today().format("%d.%m.%Y").to_string()),
        );

        let templates = &self.settings.templates;
        let terms = self.render_document(DocumentSpec {
            template: templates.employment_terms(&event.employment_language),
            data: &event.fields,
            title: format!("{TITLE_EMPLOYMENT_TERMS} for {}", event.person_name),
            file_stem: "arbeidsavtale",
            national_id: &event.national_id,
        })?;
        let bargaining = self.render_document(DocumentSpec {
            template: &templates.collective_bargaining,
            data: &enriched,
            title: format!("{TITLE_COLLECTIVE_BARGAINING} for {}", event.person_name),
            file_stem: "hovedtariffavtale",
            national_id: &event.national_id,
        })?;
        let welcome = self.render_document(DocumentSpec {
            template: &templates.welcome_letter,
            data: &enriched,
            title: format!("{TITLE_WELCOME_LETTER} for {}", event.person_name),
            file_stem: "welcome_letter",
            national_id: &event.national_id,
        })?;

        self.upload(&terms_folder, &terms)?;
        self.upload(&bargaining_folder, &bargaining)?;
        self.upload(&welcome_folder, &welcome)?;

        Ok(case)
    }
}
