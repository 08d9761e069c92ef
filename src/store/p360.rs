//! Blocking HTTP client for the Public 360 SIF JSON API.
//!
//! Every operation is `POST {base}/{Service}/{Operation}?authkey={key}` with a
//! body of `{"parameter": {...}}`. A reply counts as successful only when the
//! status is 200 and the body says `"Successful": true`.
use super::CaseStore;
use crate::config::CaseStoreConfig;
use crate::error::{WorkflowError, WorkflowResult};
use crate::model::{
    CaseFilter, CaseRecord, Contact, DocumentFolderRef, NewCase, NewDocumentFolder,
    RenderedDocument, ResponsiblePerson,
};
use crate::util::truncate_string;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

const GET_CONTACT_PERSONS: &str = "ContactService/GetContactPersons";
const GET_CASES: &str = "CaseService/GetCases";
const CREATE_CASE: &str = "CaseService/CreateCase";
const GET_DOCUMENTS: &str = "DocumentService/GetDocuments";
const CREATE_DOCUMENT: &str = "DocumentService/CreateDocument";
const UPDATE_DOCUMENT: &str = "DocumentService/UpdateDocument";

/// Archive code shared by all personnel cases.
const PERSONNEL_ARCHIVE_CODE: &str = "221";
const PERSONNEL_ARCHIVE_TYPE: &str = "Felles arkivnøkkel for statsforvaltning";
const NATIONAL_ID_ARCHIVE_TYPE: &str = "Fødselsnr/student";

const LOG_BODY_BYTES: usize = 2_000;

pub struct P360Client {
    agent: ureq::Agent,
    base_uri: String,
    api_key: String,
    sub_archive: String,
}

impl P360Client {
    pub fn new(config: &CaseStoreConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.http_timeout_secs)))
            .http_status_as_error(false)
            .build();
        tracing::info!(
            base_uri = %config.api_base_uri,
            timeout_secs = config.http_timeout_secs,
            "case store client ready"
        );
        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            base_uri: config.api_base_uri.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            sub_archive: config.sub_archive.clone(),
        }
    }

    fn call(&self, operation: &'static str, parameter: Value) -> WorkflowResult<Value> {
        // The key travels in the query string, so the URL is never logged.
        let url = format!("{}/{}", self.base_uri, operation);
        let body = json!({ "parameter": parameter });
        tracing::debug!(
            operation,
            body = %truncate_string(&body.to_string(), LOG_BODY_BYTES),
            "case store request"
        );

        let start = Instant::now();
        let mut response = self
            .agent
            .post(&url)
            .query("authkey", &self.api_key)
            .send_json(&body)
            .map_err(|err| WorkflowError::remote(operation, err))?;
        let status = response.status().as_u16();
        let elapsed_ms = start.elapsed().as_millis();
        tracing::info!(operation, status, elapsed_ms, "case store call complete");

        if status != 200 {
            return Err(WorkflowError::remote(
                operation,
                format!("unexpected status {status}"),
            ));
        }
        let reply: Value = response
            .body_mut()
            .read_json()
            .map_err(|err| WorkflowError::remote(operation, format!("decode reply: {err}")))?;
        tracing::debug!(
            operation,
            reply = %truncate_string(&reply.to_string(), LOG_BODY_BYTES),
            "case store reply"
        );
        check_successful(operation, reply)
    }
}

impl CaseStore for P360Client {
    fn find_contacts_by_email(&self, email: &str) -> WorkflowResult<Vec<Contact>> {
        let reply = self.call(GET_CONTACT_PERSONS, json!({ "Email": email }))?;
        parse_contacts(GET_CONTACT_PERSONS, &reply)
    }

    fn find_cases(&self, filter: &CaseFilter) -> WorkflowResult<Vec<CaseRecord>> {
        let reply = self.call(GET_CASES, case_filter_parameter(filter))?;
        parse_cases(GET_CASES, &reply)
    }

    fn create_case(&self, case: &NewCase) -> WorkflowResult<CaseRecord> {
        let reply = self.call(CREATE_CASE, create_case_parameter(case, &self.sub_archive))?;
        Ok(CaseRecord {
            case_number: string_field(CREATE_CASE, &reply, "CaseNumber")?,
            recno: recno_field(CREATE_CASE, &reply, "Recno")?,
            access_group: Some(case.access_group.clone()),
            responsible: None,
        })
    }

    fn find_document_folders(
        &self,
        title: &str,
        case_number: &str,
    ) -> WorkflowResult<Vec<DocumentFolderRef>> {
        let reply = self.call(
            GET_DOCUMENTS,
            json!({ "CaseNumber": case_number, "Title": title }),
        )?;
        array_field(GET_DOCUMENTS, &reply, "Documents")?
            .iter()
            .map(|document| document_ref(GET_DOCUMENTS, document))
            .collect()
    }

    fn create_document_folder(
        &self,
        folder: &NewDocumentFolder,
    ) -> WorkflowResult<DocumentFolderRef> {
        let reply = self.call(CREATE_DOCUMENT, create_document_parameter(folder))?;
        document_ref(CREATE_DOCUMENT, &reply)
    }

    fn upload_file(
        &self,
        document_number: &str,
        document: &RenderedDocument,
    ) -> WorkflowResult<DocumentFolderRef> {
        let as_upload_error = |err: WorkflowError| WorkflowError::Upload {
            document_number: document_number.to_string(),
            message: err.to_string(),
        };
        let reply = self
            .call(UPDATE_DOCUMENT, upload_parameter(document_number, document))
            .map_err(as_upload_error)?;
        document_ref(UPDATE_DOCUMENT, &reply).map_err(as_upload_error)
    }
}

fn check_successful(operation: &'static str, reply: Value) -> WorkflowResult<Value> {
    match reply.get("Successful").and_then(Value::as_bool) {
        Some(true) => Ok(reply),
        _ => {
            let detail = reply
                .get("ErrorMessage")
                .and_then(Value::as_str)
                .filter(|message| !message.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| truncate_string(&reply.to_string(), 500));
            Err(WorkflowError::remote(
                operation,
                format!("reported unsuccessful: {detail}"),
            ))
        }
    }
}

fn case_filter_parameter(filter: &CaseFilter) -> Value {
    match filter {
        CaseFilter::Title(title) => json!({ "Title": title }),
        CaseFilter::NationalId { national_id, .. } => json!({ "ArchiveCode": national_id }),
    }
}

fn create_case_parameter(case: &NewCase, sub_archive: &str) -> Value {
    json!({
        "Title": case.title,
        "ResponsiblePersonRecno": case.responsible_recno,
        "AccessGroup": case.access_group,
        "SubArchive": sub_archive,
        "ArchiveCodes": [
            {
                "ArchiveCode": PERSONNEL_ARCHIVE_CODE,
                "ArchiveType": PERSONNEL_ARCHIVE_TYPE,
                "Sort": 1
            },
            {
                "ArchiveCode": case.national_id,
                "ArchiveType": NATIONAL_ID_ARCHIVE_TYPE,
                "Sort": 2,
                "IsManualText": true
            }
        ]
    })
}

fn create_document_parameter(folder: &NewDocumentFolder) -> Value {
    let mut parameter = Map::new();
    parameter.insert("Title".into(), json!(folder.title));
    parameter.insert("Category".into(), json!(folder.category));
    parameter.insert("Status".into(), json!(folder.status));
    parameter.insert("CaseNumber".into(), json!(folder.case_number));
    parameter.insert(
        "ResponsiblePersonRecno".into(),
        json!(folder.responsible_recno),
    );
    parameter.insert("AccessGroup".into(), json!(folder.access_group));
    if let Some(code) = folder.access_code {
        parameter.insert("AccessCode".into(), json!(code));
    }
    if let Some(paragraph) = &folder.paragraph {
        parameter.insert("Paragraph".into(), json!(paragraph));
    }
    if !folder.contacts.is_empty() {
        let contacts = folder
            .contacts
            .iter()
            .map(|contact| json!({ "Recno": contact.recno, "Role": contact.role }))
            .collect::<Vec<_>>();
        parameter.insert("Contacts".into(), Value::Array(contacts));
    }
    Value::Object(parameter)
}

fn upload_parameter(document_number: &str, document: &RenderedDocument) -> Value {
    json!({
        "DocumentNumber": document_number,
        "Files": [{
            "Title": document.title,
            "Format": document.format,
            "Data": document.data
        }]
    })
}

fn parse_contacts(operation: &'static str, reply: &Value) -> WorkflowResult<Vec<Contact>> {
    array_field(operation, reply, "ContactPersons")?
        .iter()
        .map(|contact| -> WorkflowResult<Contact> {
            Ok(Contact {
                email: string_field(operation, contact, "Email")?,
                recno: recno_field(operation, contact, "Recno")?,
            })
        })
        .collect()
}

fn parse_cases(operation: &'static str, reply: &Value) -> WorkflowResult<Vec<CaseRecord>> {
    array_field(operation, reply, "Cases")?
        .iter()
        .map(|case| -> WorkflowResult<CaseRecord> {
            let responsible = match case.get("ResponsiblePerson") {
                Some(person) if person.is_object() => {
                    let email = person.get("Email").and_then(Value::as_str);
                    let recno = person.get("Recno").and_then(as_recno);
                    match (email, recno) {
                        (Some(email), Some(recno)) if !email.is_empty() => {
                            Some(ResponsiblePerson {
                                email: email.to_string(),
                                recno,
                            })
                        }
                        _ => None,
                    }
                }
                _ => None,
            };
            Ok(CaseRecord {
                case_number: string_field(operation, case, "CaseNumber")?,
                recno: recno_field(operation, case, "Recno")?,
                access_group: case
                    .get("AccessGroup")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                responsible,
            })
        })
        .collect()
}

fn document_ref(operation: &'static str, value: &Value) -> WorkflowResult<DocumentFolderRef> {
    Ok(DocumentFolderRef {
        recno: recno_field(operation, value, "Recno")?,
        document_number: string_field(operation, value, "DocumentNumber")?,
    })
}

fn array_field<'v>(
    operation: &'static str,
    value: &'v Value,
    key: &str,
) -> WorkflowResult<&'v Vec<Value>> {
    match value.get(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Null) | None => Err(WorkflowError::remote(
            operation,
            format!("reply is missing {key}"),
        )),
        Some(_) => Err(WorkflowError::remote(
            operation,
            format!("reply field {key} is not a list"),
        )),
    }
}

fn string_field(operation: &'static str, value: &Value, key: &str) -> WorkflowResult<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or_else(|| WorkflowError::remote(operation, format!("reply is missing {key}")))
}

fn recno_field(operation: &'static str, value: &Value, key: &str) -> WorkflowResult<i64> {
    value
        .get(key)
        .and_then(as_recno)
        .ok_or_else(|| WorkflowError::remote(operation, format!("reply has no numeric {key}")))
}

/// Recnos arrive as numbers, or as numeric strings from some endpoints.
fn as_recno(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::FolderContact;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    const API_KEY: &str = "s3cret&key";

    /// Read one request off `stream` and return its request line.
    fn read_request(stream: &TcpStream) -> String {
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
        let mut request_line = String::new();
        reader
            .read_line(&mut request_line)
            .expect("read request line");
        let mut content_length = 0;
        let mut chunked = false;
        loop {
            let mut header = String::new();
            reader.read_line(&mut header).expect("read header");
            let header = header.trim_end().to_ascii_lowercase();
            if header.is_empty() {
                break;
            }
            if let Some(value) = header.strip_prefix("content-length:") {
                content_length = value.trim().parse().expect("content length");
            }
            if header.starts_with("transfer-encoding:") && header.contains("chunked") {
                chunked = true;
            }
        }
        if chunked {
            loop {
                let mut size = String::new();
                reader.read_line(&mut size).expect("read chunk size");
                let size = usize::from_str_radix(size.trim(), 16).expect("chunk size");
                let mut chunk = vec![0; size + 2];
                reader.read_exact(&mut chunk).expect("read chunk");
                if size == 0 {
                    break;
                }
            }
        } else {
            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).expect("read body");
        }
        request_line.trim_end().to_string()
    }

    /// Answer one connection per canned response, in order.
    fn canned_server(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let base_uri = format!("http://{}", listener.local_addr().expect("local addr"));
        let handle = thread::spawn(move || {
            responses
                .into_iter()
                .map(|response| {
                    let (mut stream, _) = listener.accept().expect("accept");
                    let request_line = read_request(&stream);
                    stream
                        .write_all(response.as_bytes())
                        .expect("write response");
                    request_line
                })
                .collect()
        });
        (base_uri, handle)
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn client(base_uri: &str) -> P360Client {
        P360Client::new(&CaseStoreConfig {
            api_base_uri: base_uri.to_string(),
            api_key: Some(API_KEY.to_string()),
            http_timeout_secs: 5,
            sub_archive: "100001".to_string(),
        })
    }

    #[test]
    fn http_failures_are_remote_failures_without_the_key() {
        let (base_uri, server) = canned_server(vec![
            http_response("500 Internal Server Error", ""),
            http_response("200 OK", "not json!"),
        ]);
        let client = client(&base_uri);

        let status_err = client
            .find_contacts_by_email("leder@example.no")
            .expect_err("status 500 must fail");
        assert_eq!(status_err.kind(), ErrorKind::RemoteCall);
        assert!(status_err.to_string().contains("500"), "{status_err}");
        assert!(!status_err.to_string().contains(API_KEY));

        let decode_err = client
            .find_contacts_by_email("leder@example.no")
            .expect_err("non-JSON body must fail");
        assert_eq!(decode_err.kind(), ErrorKind::RemoteCall);
        assert!(decode_err.to_string().contains("decode reply"), "{decode_err}");
        assert!(!decode_err.to_string().contains(API_KEY));

        let request_lines = server.join().expect("server thread");
        for line in &request_lines {
            assert!(
                line.starts_with("POST /ContactService/GetContactPersons?authkey="),
                "{line}"
            );
            assert!(line.contains("s3cret%26key"), "{line}");
        }
    }

    #[test]
    fn connection_failure_is_a_remote_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let base_uri = format!("http://{}", listener.local_addr().expect("local addr"));
        drop(listener);

        let err = client(&base_uri)
            .find_cases(&CaseFilter::Title("Personalmappe".to_string()))
            .expect_err("nothing listens");
        assert_eq!(err.kind(), ErrorKind::RemoteCall);
        assert!(err.to_string().starts_with(GET_CASES), "{err}");
    }

    #[test]
    fn successful_reply_is_parsed() {
        let body = json!({
            "Successful": true,
            "ContactPersons": [{"Email": "leder@example.no", "Recno": 4242}]
        });
        let (base_uri, server) = canned_server(vec![http_response("200 OK", &body.to_string())]);

        let contacts = client(&base_uri)
            .find_contacts_by_email("leder@example.no")
            .expect("contacts");

        assert_eq!(
            contacts,
            vec![Contact {
                email: "leder@example.no".to_string(),
                recno: 4242
            }]
        );
        server.join().expect("server thread");
    }

    #[test]
    fn unsuccessful_reply_is_a_remote_failure() {
        let reply = json!({"Successful": false, "ErrorMessage": "Access denied"});
        let err = check_successful(GET_CASES, reply).expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::RemoteCall);
        assert!(err.to_string().contains("Access denied"));
    }

    #[test]
    fn reply_without_flag_is_a_remote_failure() {
        assert!(check_successful(GET_CASES, json!({"Cases": []})).is_err());
    }

    #[test]
    fn parses_cases_with_and_without_responsible_person() {
        let reply = json!({
            "Successful": true,
            "Cases": [
                {
                    "Recno": 200_001,
                    "CaseNumber": "24/00001",
                    "AccessGroup": "HR Personalmapper",
                    "ResponsiblePerson": {"Email": "leder@example.no", "Recno": "4242"}
                },
                {"Recno": 200_002, "CaseNumber": "24/00002"}
            ]
        });
        let cases = parse_cases(GET_CASES, &reply).expect("parse cases");
        assert_eq!(cases.len(), 2);
        assert_eq!(
            cases[0].responsible,
            Some(ResponsiblePerson {
                email: "leder@example.no".to_string(),
                recno: 4242
            })
        );
        assert_eq!(cases[0].access_group.as_deref(), Some("HR Personalmapper"));
        assert_eq!(cases[1].responsible, None);
    }

    #[test]
    fn missing_list_is_an_error_not_an_empty_result() {
        let err = parse_contacts(GET_CONTACT_PERSONS, &json!({"Successful": true}))
            .expect_err("missing list must fail");
        assert!(err.to_string().contains("ContactPersons"));
    }

    #[test]
    fn national_id_filter_queries_by_archive_code() {
        let filter = CaseFilter::NationalId {
            national_id: "01017012345".to_string(),
            access_group: "HR Personalmapper".to_string(),
        };
        assert_eq!(
            case_filter_parameter(&filter),
            json!({"ArchiveCode": "01017012345"})
        );
    }

    #[test]
    fn create_case_carries_both_archive_codes() {
        let case = NewCase {
            title: "Personalmappe offentlig - Kari - HR".to_string(),
            responsible_recno: 4242,
            access_group: "HR Personalmapper".to_string(),
            national_id: "01017012345".to_string(),
        };
        let parameter = create_case_parameter(&case, "100001");
        assert_eq!(parameter["SubArchive"], "100001");
        assert_eq!(parameter["ArchiveCodes"][0]["ArchiveCode"], "221");
        assert_eq!(parameter["ArchiveCodes"][1]["ArchiveCode"], "01017012345");
        assert_eq!(parameter["ArchiveCodes"][1]["IsManualText"], true);
    }

    #[test]
    fn document_parameter_omits_unset_optional_fields() {
        let mut folder = NewDocumentFolder {
            title: "Velkomstbrev".to_string(),
            category: 111,
            status: 1,
            case_number: "24/00001".to_string(),
            responsible_recno: 4242,
            access_group: "HR Personalmapper".to_string(),
            access_code: None,
            paragraph: None,
            contacts: Vec::new(),
        };
        let plain = create_document_parameter(&folder);
        assert!(plain.get("AccessCode").is_none());
        assert!(plain.get("Contacts").is_none());

        folder.access_code = Some(18);
        folder.paragraph = Some("Offl § 26 femte ledd".to_string());
        folder.contacts = vec![FolderContact {
            recno: 315_998,
            role: 6,
        }];
        let full = create_document_parameter(&folder);
        assert_eq!(full["AccessCode"], 18);
        assert_eq!(full["Contacts"], json!([{"Recno": 315_998, "Role": 6}]));
    }
}
