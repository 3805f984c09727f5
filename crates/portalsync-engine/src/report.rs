//! Run reporting: per-service diagnostic logs, the batch summary log, and
//! success/failure notifications.
//!
//! Log writes are best effort. A reporting failure is traced and never fails
//! the service it describes.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::types::NotificationConfig;
use crate::result::{PipelineResult, RecordedRun};

/// `MM_DD_YYYY` for the current local date.
#[must_use]
pub fn today_stamp() -> String {
    chrono::Local::now().format("%m_%d_%Y").to_string()
}

/// `"{h} hours, {m} minutes, {s} seconds"`.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours} hours, {minutes} minutes, {seconds} seconds")
}

/// Append-only, timestamped text log.
#[derive(Debug, Clone)]
pub struct ServiceLog {
    path: PathBuf,
}

impl ServiceLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&self, message: impl AsRef<str>) {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let written = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "[{stamp}] {}", message.as_ref()));
        if let Err(e) = written {
            tracing::warn!(log = %self.path.display(), error = %e, "Failed to write log line");
        }
    }

    /// Full log contents, empty if the log was never written.
    #[must_use]
    pub fn contents(&self) -> String {
        std::fs::read_to_string(&self.path).unwrap_or_default()
    }
}

/// An outgoing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub from: Option<String>,
    pub recipients: Vec<String>,
    pub body: String,
}

/// Delivers notifications.
pub trait Notifier: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the notification could not be delivered.
    fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Writes each notification as a message file into an outbox directory for
/// a mail relay to pick up.
pub struct OutboxNotifier {
    dir: PathBuf,
    sequence: AtomicUsize,
}

impl OutboxNotifier {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sequence: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn slug(subject: &str) -> String {
    let mut out = String::with_capacity(subject.len());
    for c in subject.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

impl Notifier for OutboxNotifier {
    fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        use anyhow::Context as _;

        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("cannot create outbox {}", self.dir.display()))?;
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let path = self
            .dir
            .join(format!("{seq:03}_{}.txt", slug(&notification.subject)));

        let mut message = String::new();
        if let Some(from) = &notification.from {
            writeln!(message, "From: {from}")?;
        }
        writeln!(message, "To: {}", notification.recipients.join(", "))?;
        writeln!(message, "Subject: {}", notification.subject)?;
        writeln!(message)?;
        message.push_str(&notification.body);

        std::fs::write(&path, message)
            .with_context(|| format!("cannot write {}", path.display()))?;
        tracing::info!(subject = notification.subject, path = %path.display(), "Notification queued");
        Ok(())
    }
}

/// Labels shown in notification subjects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLabels {
    pub portal: String,
    pub folder: String,
}

/// Collects run outcomes into logs and notifications.
pub struct RunReporter {
    labels: ReportLabels,
    date_stamp: String,
    service_log_dir: PathBuf,
    summary: ServiceLog,
    notifications: NotificationConfig,
    notifier: Arc<dyn Notifier>,
}

impl RunReporter {
    #[must_use]
    pub fn new(
        labels: ReportLabels,
        date_stamp: impl Into<String>,
        log_dir: &Path,
        service_log_dir: impl Into<PathBuf>,
        notifications: NotificationConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let date_stamp = date_stamp.into();
        let summary = ServiceLog::new(log_dir.join(format!("portalsync_{date_stamp}.log")));
        Self {
            labels,
            date_stamp,
            service_log_dir: service_log_dir.into(),
            summary,
            notifications,
            notifier,
        }
    }

    #[must_use]
    pub fn summary_log(&self) -> &ServiceLog {
        &self.summary
    }

    /// Fresh diagnostic log for one service.
    #[must_use]
    pub fn service_log(&self, service_name: &str) -> ServiceLog {
        let path = self
            .service_log_dir
            .join(format!("{service_name}_{}.txt", self.date_stamp));
        // A previous run on the same day leaves a log behind; start over.
        let _ = std::fs::remove_file(&path);
        ServiceLog::new(path)
    }

    pub fn summary(&self, message: impl AsRef<str>) {
        tracing::info!("{}", message.as_ref());
        self.summary.line(message);
    }

    /// Record a finished service run in its own log and the summary.
    pub fn record_run(&self, recorded: &RecordedRun) {
        let run = &recorded.run;
        let runtime = format_elapsed(run.elapsed);
        let log = ServiceLog::new(&recorded.log);
        log.line(format!("Result: {}", run.code));
        log.line(format!("Runtime: {runtime}"));
        self.summary(format!(
            "{} ({}) finished with {} in {runtime}",
            run.name, run.kind, run.code
        ));
    }

    #[must_use]
    pub fn success_notification(&self, result: &PipelineResult) -> Option<Notification> {
        if result.succeeded.is_empty() {
            return None;
        }
        let mut body = String::new();
        for recorded in &result.succeeded {
            let _ = writeln!(body, "==== {} ({}) ====", recorded.run.name, recorded.run.kind);
            body.push_str(&ServiceLog::new(&recorded.log).contents());
            body.push('\n');
        }
        Some(Notification {
            subject: format!("SUCCESS: {} | [{}]", self.labels.portal, self.labels.folder),
            from: self.notifications.from.clone(),
            recipients: self.notifications.success_recipients.clone(),
            body,
        })
    }

    #[must_use]
    pub fn failure_notifications(&self, result: &PipelineResult) -> Vec<Notification> {
        let failed_runs = result.failed.iter().map(|recorded| {
            (
                recorded.run.name.clone(),
                ServiceLog::new(&recorded.log).contents(),
            )
        });
        let invalid = result.invalid_definitions.iter().map(|invalid| {
            let name = invalid
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            (
                name,
                format!("{}\n{}\n", invalid.path.display(), invalid.error),
            )
        });
        failed_runs
            .chain(invalid)
            .map(|(name, body)| Notification {
                subject: format!(
                    "FAIL: {} | {name} [{}]",
                    self.labels.portal, self.labels.folder
                ),
                from: self.notifications.from.clone(),
                recipients: self.notifications.failure_recipients.clone(),
                body,
            })
            .collect()
    }

    /// Send every notification the result calls for. Returns how many were
    /// delivered.
    pub fn notify(&self, result: &PipelineResult) -> usize {
        let mut sent = 0;
        let notifications = self
            .success_notification(result)
            .into_iter()
            .chain(self.failure_notifications(result));
        for notification in notifications {
            match self.notifier.send(&notification) {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!(
                    subject = notification.subject,
                    error = format!("{e:#}"),
                    "Failed to send notification"
                ),
            }
        }
        sent
    }

    /// Close out the batch summary.
    pub fn finish(&self, result: &PipelineResult) {
        self.summary(format!(
            "Batch complete: {} succeeded, {} failed, {} invalid definition(s) in {}",
            result.succeeded.len(),
            result.failed.len(),
            result.invalid_definitions.len(),
            format_elapsed(result.elapsed)
        ));
    }
}
