//! Worker configuration.
//!
//! The config is a single JSON file. It is loaded, normalized (folder profile
//! defaults, template paths relative to the config file, env overrides) and
//! validated before any event is processed.
use crate::model::FolderContact;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const CONFIG_PATH_ENV: &str = "CASEPROV_CONFIG";
pub const API_KEY_ENV: &str = "CASEPROV_API_KEY";

pub const TITLE_WELCOME_LETTER: &str = "Velkomstbrev";
pub const TITLE_EMPLOYMENT_TERMS: &str = "Arbeidsavtale";
pub const TITLE_COLLECTIVE_BARGAINING: &str = "Hovedtariffavtale";
pub const TITLE_SALARY_NOTICE: &str = "Melding til Lønn";

/// Category "outbound document".
pub const CATEGORY_OUTBOUND: u32 = 111;
/// Category "internal memo with follow-up".
pub const CATEGORY_INTERNAL_MEMO: u32 = 113;
/// Status "reserved".
pub const STATUS_RESERVED: u32 = 1;
/// Access code "UO", exempt from public disclosure.
pub const ACCESS_CODE_EXEMPT: u32 = 18;
pub const PARAGRAPH_EXEMPT: &str = "Offl § 26 femte ledd";
/// Payroll department contact that receives salary notices.
pub const PAYROLL_CONTACT_RECNO: i64 = 315_998;
/// Contact role "recipient".
pub const CONTACT_ROLE_RECIPIENT: u32 = 6;

const MASKED_SECRET: &str = "********";

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_sub_archive() -> String {
    "100001".to_string()
}

fn default_max_in_flight() -> usize {
    4
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    pub schema_version: u32,
    pub case_store: CaseStoreConfig,
    pub workflow: WorkflowSettings,
    pub notifications: NotifierConfig,
    #[serde(default)]
    pub worker: WorkerLimits,
}

/// Connection settings for the case-management API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseStoreConfig {
    pub api_base_uri: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_sub_archive")]
    pub sub_archive: String,
}

/// Everything the provisioning workflow reads besides its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowSettings {
    pub web_base_uri: String,
    pub templates: TemplateSet,
    /// Folder creation attributes keyed by folder title.
    #[serde(default)]
    pub folders: BTreeMap<String, FolderProfile>,
}

impl WorkflowSettings {
    pub fn folder_profile(&self, title: &str) -> Option<&FolderProfile> {
        self.folders.get(title)
    }
}

/// Template files per document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateSet {
    pub employment_terms_norwegian: PathBuf,
    pub employment_terms_english: PathBuf,
    pub collective_bargaining: PathBuf,
    pub welcome_letter: PathBuf,
    pub salary_notice: PathBuf,
    /// When set, every rendered document is also written here.
    #[serde(default)]
    pub result_dir: Option<PathBuf>,
}

impl TemplateSet {
    /// Employment terms template for the language named in the event.
    pub fn employment_terms(&self, language: &str) -> &Path {
        if language.trim().eq_ignore_ascii_case("engelsk") {
            &self.employment_terms_english
        } else {
            &self.employment_terms_norwegian
        }
    }

    fn paths_mut(&mut self) -> [&mut PathBuf; 5] {
        [
            &mut self.employment_terms_norwegian,
            &mut self.employment_terms_english,
            &mut self.collective_bargaining,
            &mut self.welcome_letter,
            &mut self.salary_notice,
        ]
    }
}

/// Creation attributes for one class of document folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FolderProfile {
    pub category: u32,
    pub status: u32,
    #[serde(default)]
    pub access_code: Option<u32>,
    #[serde(default)]
    pub paragraph: Option<String>,
    #[serde(default)]
    pub contacts: Vec<FolderContact>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// One JSON line per notification on stdout.
    Stdout,
    /// POST each notification to a webhook.
    Http { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerLimits {
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Folder profiles used when the config does not override them.
pub fn default_folder_profiles() -> BTreeMap<String, FolderProfile> {
    let outbound = FolderProfile {
        category: CATEGORY_OUTBOUND,
        status: STATUS_RESERVED,
        access_code: None,
        paragraph: None,
        contacts: Vec::new(),
    };
    let mut profiles = BTreeMap::new();
    profiles.insert(TITLE_WELCOME_LETTER.to_string(), outbound.clone());
    profiles.insert(
        TITLE_EMPLOYMENT_TERMS.to_string(),
        FolderProfile {
            access_code: Some(ACCESS_CODE_EXEMPT),
            paragraph: Some(PARAGRAPH_EXEMPT.to_string()),
            ..outbound.clone()
        },
    );
    profiles.insert(TITLE_COLLECTIVE_BARGAINING.to_string(), outbound);
    profiles.insert(
        TITLE_SALARY_NOTICE.to_string(),
        FolderProfile {
            category: CATEGORY_INTERNAL_MEMO,
            status: STATUS_RESERVED,
            access_code: Some(ACCESS_CODE_EXEMPT),
            paragraph: Some(PARAGRAPH_EXEMPT.to_string()),
            contacts: vec![FolderContact {
                recno: PAYROLL_CONTACT_RECNO,
                role: CONTACT_ROLE_RECIPIENT,
            }],
        },
    );
    profiles
}

/// Config written by `check-config --stub`.
pub fn default_config() -> WorkerConfig {
    WorkerConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        case_store: CaseStoreConfig {
            api_base_uri: "https://p360.example.no/SI.WS.Core/SIF/Biz/v2".to_string(),
            api_key: None,
            http_timeout_secs: default_http_timeout_secs(),
            sub_archive: default_sub_archive(),
        },
        workflow: WorkflowSettings {
            web_base_uri: "https://p360.example.no/locator/DMS/Case/Details".to_string(),
            templates: TemplateSet {
                employment_terms_norwegian: PathBuf::from("templates/Arbeidsavtale_norsk.txt"),
                employment_terms_english: PathBuf::from("templates/Arbeidsavtale_engelsk.txt"),
                collective_bargaining: PathBuf::from("templates/Hovedtariffavtale.txt"),
                welcome_letter: PathBuf::from("templates/Velkomstbrev.txt"),
                salary_notice: PathBuf::from("templates/Lonnsmelding.txt"),
                result_dir: None,
            },
            folders: default_folder_profiles(),
        },
        notifications: NotifierConfig::Stdout,
        worker: WorkerLimits::default(),
    }
}

pub fn config_stub() -> Result<String> {
    serde_json::to_string_pretty(&default_config()).context("serialize config stub")
}

/// Resolve the config path: explicit flag, then env, then the user config dir.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let config_dir = dirs::config_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("cannot determine config directory; pass --config"))?;
    Ok(config_dir.join("caseprov").join("config.json"))
}

/// Load, normalize and validate the config at `path`.
pub fn load_config(path: &Path) -> Result<WorkerConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let mut config: WorkerConfig =
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    let api_key_override = std::env::var(API_KEY_ENV).ok();
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    normalize_config(&mut config, base_dir, api_key_override);
    validate_config(&config)?;
    Ok(config)
}

/// Fill folder defaults, resolve relative paths and apply the API key override.
pub fn normalize_config(config: &mut WorkerConfig, base_dir: &Path, api_key: Option<String>) {
    if let Some(key) = api_key.filter(|key| !key.trim().is_empty()) {
        config.case_store.api_key = Some(key);
    }
    for (title, profile) in default_folder_profiles() {
        config.workflow.folders.entry(title).or_insert(profile);
    }
    let templates = &mut config.workflow.templates;
    for path in templates.paths_mut() {
        if path.is_relative() {
            *path = base_dir.join(&*path);
        }
    }
    if let Some(dir) = templates.result_dir.as_mut() {
        if dir.is_relative() {
            *dir = base_dir.join(&*dir);
        }
    }
    config.case_store.api_base_uri = config
        .case_store
        .api_base_uri
        .trim_end_matches('/')
        .to_string();
}

pub fn validate_config(config: &WorkerConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    validate_http_uri(&config.case_store.api_base_uri, "case_store.api_base_uri")?;
    validate_http_uri(&config.workflow.web_base_uri, "workflow.web_base_uri")?;
    match config.case_store.api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => {}
        _ => {
            return Err(anyhow!(
                "case_store.api_key is missing (set it in the config or {API_KEY_ENV})"
            ))
        }
    }
    if config.case_store.http_timeout_secs == 0 {
        return Err(anyhow!("case_store.http_timeout_secs must be positive"));
    }
    if config.worker.max_in_flight == 0 {
        return Err(anyhow!("worker.max_in_flight must be at least 1"));
    }
    if let NotifierConfig::Http { url } = &config.notifications {
        validate_http_uri(url, "notifications.url")?;
    }
    for title in [
        TITLE_WELCOME_LETTER,
        TITLE_EMPLOYMENT_TERMS,
        TITLE_COLLECTIVE_BARGAINING,
        TITLE_SALARY_NOTICE,
    ] {
        let profile = config
            .workflow
            .folder_profile(title)
            .ok_or_else(|| anyhow!("workflow.folders is missing a profile for {title:?}"))?;
        if profile.category == 0 || profile.status == 0 {
            return Err(anyhow!(
                "folder profile {title:?} needs non-zero category and status"
            ));
        }
    }
    Ok(())
}

fn validate_http_uri(value: &str, label: &str) -> Result<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(anyhow!("{label} must be non-empty"));
    }
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(anyhow!("{label} must be an http(s) URI (got {value:?})"));
    }
    Ok(())
}

/// Copy of the config that is safe to print.
pub fn redacted(config: &WorkerConfig) -> WorkerConfig {
    let mut copy = config.clone();
    if copy.case_store.api_key.is_some() {
        copy.case_store.api_key = Some(MASKED_SECRET.to_string());
    }
    copy
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
