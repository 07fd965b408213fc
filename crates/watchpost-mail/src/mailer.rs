//! The mail value and the transport trait.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

/// Errors from a mail transport.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail has no recipients")]
    NoRecipients,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write message to {program}: {source}")]
    Write {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// One alert or recovery notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMail {
    pub from: Option<String>,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl AlertMail {
    /// Render headers and body as a plain-text message.
    pub fn render(&self) -> String {
        let mut message = String::new();
        if let Some(from) = &self.from {
            message.push_str(&format!("From: {from}\n"));
        }
        message.push_str(&format!("To: {}\n", self.to.join(", ")));
        message.push_str(&format!("Subject: {}\n", header_line(&self.subject)));
        message.push_str("Content-Type: text/plain; charset=utf-8\n");
        message.push('\n');
        message.push_str(&self.body);
        if !self.body.ends_with('\n') {
            message.push('\n');
        }
        message
    }
}

/// Headers must stay on a single line.
fn header_line(value: &str) -> String {
    value.lines().map(str::trim).collect::<Vec<_>>().join(" ")
}

/// A mail transport.
pub trait Mailer: Send + Sync {
    fn deliver(&self, mail: &AlertMail) -> Result<(), MailError>;
}

impl<M: Mailer + ?Sized> Mailer for Arc<M> {
    fn deliver(&self, mail: &AlertMail) -> Result<(), MailError> {
        (**self).deliver(mail)
    }
}

/// Writes mails to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn deliver(&self, mail: &AlertMail) -> Result<(), MailError> {
        info!(
            to = %mail.to.join(", "),
            subject = %mail.subject,
            "alert mail (not sent)\n{}",
            mail.body
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mail() -> AlertMail {
        AlertMail {
            from: Some("watchpost@example.com".to_string()),
            to: vec!["ops@example.com".to_string(), "dev@example.com".to_string()],
            subject: "Watcher failed: disk full".to_string(),
            body: "[t] disk full\n".to_string(),
        }
    }

    #[test]
    fn render_includes_headers_and_body() {
        let rendered = test_mail().render();
        assert!(rendered.starts_with("From: watchpost@example.com\n"));
        assert!(rendered.contains("To: ops@example.com, dev@example.com\n"));
        assert!(rendered.contains("Subject: Watcher failed: disk full\n"));
        assert!(rendered.ends_with("\n\n[t] disk full\n"));
    }

    #[test]
    fn render_without_sender_omits_from_header() {
        let mail = AlertMail {
            from: None,
            ..test_mail()
        };
        assert!(!mail.render().contains("From:"));
    }

    #[test]
    fn multiline_subject_is_folded() {
        let mail = AlertMail {
            subject: "first\nsecond".to_string(),
            ..test_mail()
        };
        assert!(mail.render().contains("Subject: first second\n"));
    }

    #[test]
    fn log_mailer_always_succeeds() {
        assert!(LogMailer.deliver(&test_mail()).is_ok());
    }
}
