//! Document rendering.
//!
//! Templates are UTF-8 text files with `{{Field}}` placeholders that are
//! replaced by the matching merge value. Every placeholder must resolve;
//! a template that leaves one unresolved is a render failure.
use crate::error::{WorkflowError, WorkflowResult};
use crate::model::RenderedDocument;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Merges event data into a template.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, template: &Path, data: &Map<String, Value>) -> WorkflowResult<Vec<u8>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateRenderer;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder pattern is valid")
    })
}

fn render_error(template: &Path, message: impl Into<String>) -> WorkflowError {
    WorkflowError::Render {
        template: template.display().to_string(),
        message: message.into(),
    }
}

fn merge_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Replace every placeholder in `text`; returns the unresolved field names on failure.
pub fn merge_placeholders(
    text: &str,
    data: &Map<String, Value>,
) -> Result<String, BTreeSet<String>> {
    let mut missing = BTreeSet::new();
    let merged = placeholder_regex().replace_all(text, |caps: &regex::Captures| {
        let key = &caps[1];
        match data.get(key) {
            Some(value) => merge_text(value),
            None => {
                missing.insert(key.to_string());
                String::new()
            }
        }
    });
    if missing.is_empty() {
        Ok(merged.into_owned())
    } else {
        Err(missing)
    }
}

impl DocumentRenderer for TemplateRenderer {
    fn render(&self, template: &Path, data: &Map<String, Value>) -> WorkflowResult<Vec<u8>> {
        let bytes = fs::read(template)
            .map_err(|err| render_error(template, format!("read template: {err}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| render_error(template, "template is not UTF-8 text"))?;
        let merged = merge_placeholders(&text, data).map_err(|missing| {
            let names = missing.into_iter().collect::<Vec<_>>().join(", ");
            render_error(template, format!("no merge value for {names}"))
        })?;
        Ok(merged.into_bytes())
    }
}

/// Format tag for uploads, taken from the template extension.
pub fn document_format(template: &Path) -> String {
    template
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "txt".to_string())
}

/// Wrap rendered bytes for upload.
pub fn encode_document(title: &str, template: &Path, bytes: &[u8]) -> RenderedDocument {
    RenderedDocument {
        title: title.to_string(),
        format: document_format(template),
        data: BASE64.encode(bytes),
    }
}

/// Keep a copy of a rendered document under `result_dir`.
pub fn write_result_copy(
    result_dir: &Path,
    file_name: &str,
    template: &Path,
    bytes: &[u8],
) -> WorkflowResult<PathBuf> {
    let path = result_dir.join(format!("{file_name}.{}", document_format(template)));
    fs::create_dir_all(result_dir)
        .and_then(|()| fs::write(&path, bytes))
        .map_err(|err| render_error(template, format!("write {}: {err}", path.display())))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn data() -> Map<String, Value> {
        json!({"Navn": "Kari Nordmann", "Stillingsprosent": 80, "Vikar": null})
            .as_object()
            .cloned()
            .expect("object")
    }

    #[test]
    fn merges_strings_numbers_and_nulls() {
        let merged = merge_placeholders("{{Navn}} ({{ Stillingsprosent }}%){{Vikar}}", &data())
            .expect("merge");
        assert_eq!(merged, "Kari Nordmann (80%)");
    }

    #[test]
    fn reports_every_unresolved_placeholder() {
        let missing = merge_placeholders("{{Navn}} {{date}} {{p360_case_number}}", &data())
            .expect_err("unresolved placeholders");
        assert_eq!(
            missing.into_iter().collect::<Vec<_>>(),
            vec!["date".to_string(), "p360_case_number".to_string()]
        );
    }

    #[test]
    fn missing_template_is_a_render_error() {
        let err = TemplateRenderer
            .render(Path::new("/nonexistent/Velkomstbrev.txt"), &data())
            .expect_err("missing template");
        assert_eq!(err.kind(), ErrorKind::Render);
        assert!(err.to_string().contains("Velkomstbrev.txt"));
    }

    #[test]
    fn renders_template_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let template = dir.path().join("Velkomstbrev.txt");
        fs::write(&template, "Velkommen, {{Navn}}!").expect("write template");
        let bytes = TemplateRenderer.render(&template, &data()).expect("render");
        assert_eq!(String::from_utf8(bytes).expect("utf8"), "Velkommen, Kari Nordmann!");
    }

    #[test]
    fn encodes_payload_as_base64_with_extension_format() {
        let document = encode_document("Velkomstbrev for Kari", Path::new("a/Velkomstbrev.DOCX"), b"hi");
        assert_eq!(document.format, "docx");
        assert_eq!(document.data, "aGk=");
    }

    #[test]
    fn result_copy_lands_in_result_dir() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let result_dir = dir.path().join("result");
        let path = write_result_copy(
            &result_dir,
            "generated_velkomstbrev_01017012345_2024-08-01",
            Path::new("Velkomstbrev.txt"),
            b"body",
        )
        .expect("write copy");
        assert_eq!(
            path,
            result_dir.join("generated_velkomstbrev_01017012345_2024-08-01.txt")
        );
        assert_eq!(fs::read(&path).expect("read copy"), b"body");
    }
}
