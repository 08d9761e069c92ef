//! In-memory case store for tests.
//!
//! Mirrors the remote lookup semantics (national-id lookups ignore the access
//! group) and records every call in order.
use super::CaseStore;
use crate::error::{WorkflowError, WorkflowResult};
use crate::model::{
    CaseFilter, CaseRecord, Contact, DocumentFolderRef, NewCase, NewDocumentFolder,
    RenderedDocument, ResponsiblePerson,
};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct StoredCase {
    pub title: String,
    pub national_id: String,
    pub record: CaseRecord,
}

#[derive(Debug, Clone)]
pub struct StoredFolder {
    pub case_number: String,
    pub title: String,
    pub folder: DocumentFolderRef,
    pub created_with: Option<NewDocumentFolder>,
}

#[derive(Debug, Default)]
struct State {
    contacts: Vec<Contact>,
    cases: Vec<StoredCase>,
    folders: Vec<StoredFolder>,
    uploads: Vec<(String, RenderedDocument)>,
    calls: Vec<String>,
    next_recno: i64,
    fail_on: Option<&'static str>,
}

#[derive(Debug, Default)]
pub struct MemoryCaseStore {
    state: Mutex<State>,
}

impl MemoryCaseStore {
    pub fn new() -> Self {
        let store = Self::default();
        store.lock().next_recno = 200_000;
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("memory store lock poisoned")
    }

    pub fn add_contact(&self, email: &str, recno: i64) {
        self.lock().contacts.push(Contact {
            email: email.to_string(),
            recno,
        });
    }

    /// Seed an existing case, e.g. one created by an earlier onboarding run.
    pub fn add_case(
        &self,
        title: &str,
        national_id: &str,
        access_group: &str,
        responsible: Option<ResponsiblePerson>,
    ) -> CaseRecord {
        let mut state = self.lock();
        let recno = state.allocate_recno();
        let record = CaseRecord {
            case_number: format!("24/{:05}", state.cases.len() + 1),
            recno,
            access_group: Some(access_group.to_string()),
            responsible,
        };
        state.cases.push(StoredCase {
            title: title.to_string(),
            national_id: national_id.to_string(),
            record: record.clone(),
        });
        record
    }

    pub fn add_folder(&self, case_number: &str, title: &str) -> DocumentFolderRef {
        let mut state = self.lock();
        state.insert_folder(case_number, title, None)
    }

    /// Make the named operation fail with a remote error.
    pub fn fail_on(&self, operation: &'static str) {
        self.lock().fail_on = Some(operation);
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.as_str() == operation)
            .count()
    }

    pub fn cases(&self) -> Vec<StoredCase> {
        self.lock().cases.clone()
    }

    pub fn folders(&self) -> Vec<StoredFolder> {
        self.lock().folders.clone()
    }

    pub fn uploads(&self) -> Vec<(String, RenderedDocument)> {
        self.lock().uploads.clone()
    }
}

impl State {
    fn allocate_recno(&mut self) -> i64 {
        self.next_recno += 1;
        self.next_recno
    }

    fn enter(&mut self, operation: &'static str) -> WorkflowResult<()> {
        self.calls.push(operation.to_string());
        if self.fail_on == Some(operation) {
            return Err(WorkflowError::remote(operation, "injected failure"));
        }
        Ok(())
    }

    fn insert_folder(
        &mut self,
        case_number: &str,
        title: &str,
        created_with: Option<NewDocumentFolder>,
    ) -> DocumentFolderRef {
        let recno = self.allocate_recno();
        let folder = DocumentFolderRef {
            recno,
            document_number: format!("{case_number}-{}", self.folders.len() + 1),
        };
        self.folders.push(StoredFolder {
            case_number: case_number.to_string(),
            title: title.to_string(),
            folder: folder.clone(),
            created_with,
        });
        folder
    }
}

impl CaseStore for MemoryCaseStore {
    fn find_contacts_by_email(&self, email: &str) -> WorkflowResult<Vec<Contact>> {
        let mut state = self.lock();
        state.enter("find_contacts_by_email")?;
        Ok(state
            .contacts
            .iter()
            .filter(|contact| contact.email == email)
            .cloned()
            .collect())
    }

    fn find_cases(&self, filter: &CaseFilter) -> WorkflowResult<Vec<CaseRecord>> {
        let mut state = self.lock();
        state.enter("find_cases")?;
        Ok(state
            .cases
            .iter()
            .filter(|case| match filter {
                CaseFilter::Title(title) => &case.title == title,
                CaseFilter::NationalId { national_id, .. } => &case.national_id == national_id,
            })
            .map(|case| case.record.clone())
            .collect())
    }

    fn create_case(&self, case: &NewCase) -> WorkflowResult<CaseRecord> {
        let mut state = self.lock();
        state.enter("create_case")?;
        let recno = state.allocate_recno();
        let record = CaseRecord {
            case_number: format!("24/{:05}", state.cases.len() + 1),
            recno,
            access_group: Some(case.access_group.clone()),
            responsible: None,
        };
        state.cases.push(StoredCase {
            title: case.title.clone(),
            national_id: case.national_id.clone(),
            record: record.clone(),
        });
        Ok(record)
    }

    fn find_document_folders(
        &self,
        title: &str,
        case_number: &str,
    ) -> WorkflowResult<Vec<DocumentFolderRef>> {
        let mut state = self.lock();
        state.enter("find_document_folders")?;
        Ok(state
            .folders
            .iter()
            .filter(|stored| stored.title == title && stored.case_number == case_number)
            .map(|stored| stored.folder.clone())
            .collect())
    }

    fn create_document_folder(
        &self,
        folder: &NewDocumentFolder,
    ) -> WorkflowResult<DocumentFolderRef> {
        let mut state = self.lock();
        state.enter("create_document_folder")?;
        Ok(state.insert_folder(&folder.case_number, &folder.title, Some(folder.clone())))
    }

    fn upload_file(
        &self,
        document_number: &str,
        document: &RenderedDocument,
    ) -> WorkflowResult<DocumentFolderRef> {
        let mut state = self.lock();
        state
            .enter("upload_file")
            .map_err(|err| WorkflowError::Upload {
                document_number: document_number.to_string(),
                message: err.to_string(),
            })?;
        let folder = state
            .folders
            .iter()
            .find(|stored| stored.folder.document_number == document_number)
            .map(|stored| stored.folder.clone())
            .ok_or_else(|| WorkflowError::Upload {
                document_number: document_number.to_string(),
                message: "no such document".to_string(),
            })?;
        state
            .uploads
            .push((document_number.to_string(), document.clone()));
        Ok(folder)
    }
}
