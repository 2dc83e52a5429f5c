//! Notification transports and the reachability collaborator.
//!
//! Transports receive a fully composed [`Notification`] and either deliver
//! it or say why not. Nothing here retries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use thiserror::Error;
use tracing::{info, warn};

use km_record::{write_atomic, RecordError};
use km_report::Notification;

use crate::config::NotifyConfig;

/// Why a notification was not delivered.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// No transport is configured.
    #[error("no notification transport configured")]
    NotConfigured,

    /// The envelope could not be encoded.
    #[error("could not encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    /// The outbox directory could not be written.
    #[error("outbox write failed: {0}")]
    Outbox(#[source] RecordError),

    /// The remote endpoint refused or could not be reached.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Delivers notifications over some external channel.
pub trait Notifier: Send + Sync {
    fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Transport name for logs.
    fn name(&self) -> &'static str;
}

/// Supplies the public URL at which the monitor can be reached.
pub trait Reachability: Send + Sync {
    fn public_url(&self) -> Option<String>;
}

/// A fixed public URL, typically from configuration.
#[derive(Debug, Clone)]
pub struct StaticUrl(pub Option<String>);

impl Reachability for StaticUrl {
    fn public_url(&self) -> Option<String> {
        self.0.clone().filter(|u| !u.trim().is_empty())
    }
}

/// Fails every delivery with [`NotifyError::NotConfigured`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn deliver(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Err(NotifyError::NotConfigured)
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Writes each notification as one JSON envelope into a directory.
///
/// A separate mailer (or a human) picks envelopes up from there.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    dir: PathBuf,
}

impl OutboxNotifier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn envelope_path(&self) -> PathBuf {
        let stamp = Local::now().format("%Y%m%dT%H%M%S%.3f");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        self.dir.join(format!("{stamp}-{}.json", &suffix[..8]))
    }
}

impl Notifier for OutboxNotifier {
    fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let json = serde_json::to_vec_pretty(notification)?;
        let path = self.envelope_path();
        write_atomic(&path, &json).map_err(NotifyError::Outbox)?;
        info!(
            path = %path.display(),
            recipients = notification.to.len(),
            attachments = notification.attachments.len(),
            "notification written to outbox"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "outbox"
    }
}

/// POSTs each notification envelope as JSON to an HTTP endpoint.
#[cfg(feature = "webhook")]
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    timeout: std::time::Duration,
}

#[cfg(feature = "webhook")]
impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: std::time::Duration::from_secs(30),
        }
    }
}

#[cfg(feature = "webhook")]
impl Notifier for WebhookNotifier {
    fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let body = serde_json::to_string(notification)?;
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        match agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(resp) => {
                info!(url = %self.url, status = resp.status(), "notification posted");
                Ok(())
            }
            Err(ureq::Error::Status(code, _)) => {
                Err(NotifyError::Delivery(format!("{} returned HTTP {code}", self.url)))
            }
            Err(e) => Err(NotifyError::Delivery(e.to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Pick the transport named by configuration.
///
/// A webhook wins over an outbox. With neither, deliveries fail with
/// [`NotifyError::NotConfigured`].
pub fn notifier_from_config(config: &NotifyConfig) -> Arc<dyn Notifier> {
    if let Some(url) = config.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
        #[cfg(feature = "webhook")]
        {
            return Arc::new(WebhookNotifier::new(url));
        }
        #[cfg(not(feature = "webhook"))]
        warn!(url, "webhook_url configured but km was built without the webhook feature");
    }
    match &config.outbox_dir {
        Some(dir) => Arc::new(OutboxNotifier::new(dir.clone())),
        None => Arc::new(NullNotifier),
    }
}

/// Recipient list from a comma separated string: whitespace stripped,
/// empty entries dropped.
pub fn parse_destinations(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.chars().filter(|c| !c.is_whitespace()).collect::<String>())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn note() -> Notification {
        Notification {
            subject: "[kiln start] 2024/03/05 14:07".into(),
            from: "Kiln Monitor".into(),
            to: vec!["a@example.org".into()],
            body: "hello".into(),
            attachments: vec![],
        }
    }

    #[test]
    fn destinations_are_trimmed_and_filtered() {
        assert_eq!(
            parse_destinations(" a@x.org, b@y.org,,  ,c @z.org"),
            vec!["a@x.org", "b@y.org", "c@z.org"]
        );
        assert!(parse_destinations("").is_empty());
        assert!(parse_destinations(" , ").is_empty());
    }

    #[test]
    fn outbox_writes_envelope() {
        let dir = tempdir().unwrap();
        let outbox = OutboxNotifier::new(dir.path().join("outbox"));
        outbox.deliver(&note()).unwrap();
        outbox.deliver(&note()).unwrap();

        let files: Vec<_> = std::fs::read_dir(outbox.dir()).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(files.len(), 2);
        let back: Notification =
            serde_json::from_slice(&std::fs::read(&files[0]).unwrap()).unwrap();
        assert_eq!(back, note());
    }

    #[test]
    fn null_notifier_reports_not_configured() {
        assert!(matches!(NullNotifier.deliver(&note()), Err(NotifyError::NotConfigured)));
    }

    #[test]
    fn transport_follows_config() {
        let mut cfg = NotifyConfig::default();
        assert_eq!(notifier_from_config(&cfg).name(), "none");
        cfg.outbox_dir = Some(PathBuf::from("/tmp/outbox"));
        assert_eq!(notifier_from_config(&cfg).name(), "outbox");
    }

    #[test]
    fn static_url_ignores_blank() {
        assert_eq!(StaticUrl(Some("  ".into())).public_url(), None);
        assert_eq!(StaticUrl(None).public_url(), None);
        assert_eq!(
            StaticUrl(Some("https://kiln.example.net".into())).public_url().as_deref(),
            Some("https://kiln.example.net")
        );
    }
}
