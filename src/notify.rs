//! Outcome notification publishers.
use crate::config::NotifierConfig;
use crate::error::{WorkflowError, WorkflowResult};
use crate::model::Notification;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

pub trait Notifier: Send + Sync {
    fn publish(&self, notification: &Notification) -> WorkflowResult<()>;
}

fn publish_error(message: impl std::fmt::Display) -> WorkflowError {
    WorkflowError::Publish {
        message: message.to_string(),
    }
}

/// POSTs each notification as JSON to a webhook.
pub struct HttpNotifier {
    agent: ureq::Agent,
    url: String,
}

impl HttpNotifier {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            url: url.to_string(),
        }
    }
}

impl Notifier for HttpNotifier {
    fn publish(&self, notification: &Notification) -> WorkflowResult<()> {
        let response = self
            .agent
            .post(&self.url)
            .send_json(notification)
            .map_err(publish_error)?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(publish_error(format!(
                "webhook answered status {status}"
            )));
        }
        tracing::info!(event = notification.event_name(), status, "notification published");
        Ok(())
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesNotifier {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesNotifier {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl Notifier for JsonLinesNotifier {
    fn publish(&self, notification: &Notification) -> WorkflowResult<()> {
        let line = serde_json::to_string(notification).map_err(publish_error)?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| publish_error("notification writer lock poisoned"))?;
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .map_err(publish_error)?;
        tracing::info!(event = notification.event_name(), "notification published");
        Ok(())
    }
}

pub fn notifier_from_config(config: &NotifierConfig, timeout: Duration) -> Box<dyn Notifier> {
    match config {
        NotifierConfig::Stdout => Box::new(JsonLinesNotifier::stdout()),
        NotifierConfig::Http { url } => Box::new(HttpNotifier::new(url, timeout)),
    }
}

/// Keeps every published notification; optionally refuses to publish.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    published: Mutex<Vec<Notification>>,
    fail: bool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn published(&self) -> Vec<Notification> {
        self.published.lock().expect("recorder lock").clone()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn publish(&self, notification: &Notification) -> WorkflowResult<()> {
        self.published
            .lock()
            .expect("recorder lock")
            .push(notification.clone());
        if self.fail {
            return Err(publish_error("recorder refuses to publish"));
        }
        Ok(())
    }
}
