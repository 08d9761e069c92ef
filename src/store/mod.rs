//! Case store seam.
//!
//! One trait method per remote operation. Implementations report transport and
//! application failures alike as [`WorkflowError`]; uploads fail with
//! [`WorkflowError::Upload`].
use crate::error::WorkflowResult;
use crate::model::{
    CaseFilter, CaseRecord, Contact, DocumentFolderRef, NewCase, NewDocumentFolder,
    RenderedDocument,
};

#[cfg(test)]
pub mod memory;
pub mod p360;

pub use p360::P360Client;

/// Remote case/records-management system.
pub trait CaseStore: Send + Sync {
    /// Contacts registered with `email`. The workflow enforces uniqueness.
    fn find_contacts_by_email(&self, email: &str) -> WorkflowResult<Vec<Contact>>;

    /// Cases matching `filter`. For [`CaseFilter::NationalId`] the store may
    /// return cases from every access group; callers filter further.
    fn find_cases(&self, filter: &CaseFilter) -> WorkflowResult<Vec<CaseRecord>>;

    fn create_case(&self, case: &NewCase) -> WorkflowResult<CaseRecord>;

    /// Document folders titled `title` under the case `case_number`.
    fn find_document_folders(
        &self,
        title: &str,
        case_number: &str,
    ) -> WorkflowResult<Vec<DocumentFolderRef>>;

    fn create_document_folder(&self, folder: &NewDocumentFolder)
        -> WorkflowResult<DocumentFolderRef>;

    /// Attach `document` as a new file on the folder `document_number`.
    fn upload_file(
        &self,
        document_number: &str,
        document: &RenderedDocument,
    ) -> WorkflowResult<DocumentFolderRef>;
}
