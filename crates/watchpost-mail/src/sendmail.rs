//! Delivery through a local `sendmail -t` compatible binary.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::mailer::{AlertMail, MailError, Mailer};

/// Pipes rendered messages into `sendmail -t`, which reads the recipients
/// from the headers.
#[derive(Debug, Clone)]
pub struct SendmailMailer {
    program: PathBuf,
}

impl SendmailMailer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl Default for SendmailMailer {
    fn default() -> Self {
        Self::new("/usr/sbin/sendmail")
    }
}

impl Mailer for SendmailMailer {
    fn deliver(&self, mail: &AlertMail) -> Result<(), MailError> {
        if mail.to.is_empty() {
            return Err(MailError::NoRecipients);
        }

        let mut child = Command::new(&self.program)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| MailError::Spawn {
                program: self.program_name(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(source) = stdin.write_all(mail.render().as_bytes()) {
                drop(stdin);
                // Reap the child before reporting the failed write.
                let _ = child.kill();
                let _ = child.wait();
                return Err(MailError::Write {
                    program: self.program_name(),
                    source,
                });
            }
        }

        let output = child.wait_with_output().map_err(|source| MailError::Write {
            program: self.program_name(),
            source,
        })?;

        if !output.status.success() {
            return Err(MailError::Exit {
                program: self.program_name(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(to = %mail.to.join(", "), subject = %mail.subject, "alert mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mail() -> AlertMail {
        AlertMail {
            from: None,
            to: vec!["ops@example.com".to_string()],
            subject: "Watcher failed".to_string(),
            body: "body".to_string(),
        }
    }

    #[test]
    fn empty_recipients_are_rejected() {
        let mail = AlertMail {
            to: Vec::new(),
            ..test_mail()
        };
        let err = SendmailMailer::default().deliver(&mail).unwrap_err();
        assert!(matches!(err, MailError::NoRecipients));
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let mailer = SendmailMailer::new("/nonexistent/watchpost-sendmail");
        let err = mailer.deliver(&test_mail()).unwrap_err();
        assert!(matches!(err, MailError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn message_is_piped_to_the_program() {
        // `cat` consumes stdin and exits 0, which stands in for sendmail.
        let mailer = SendmailMailer::new("cat");
        assert!(mailer.deliver(&test_mail()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_reported() {
        // `false` may exit before the message is written.
        let mailer = SendmailMailer::new("false");
        let err = mailer.deliver(&test_mail()).unwrap_err();
        assert!(matches!(err, MailError::Exit { .. } | MailError::Write { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn failed_write_reaps_the_program() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::{Duration, Instant};

        // Closes stdin without reading and would otherwise linger for a minute.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("stubborn-sendmail");
        std::fs::write(&script, "#!/bin/sh\nexec 0<&-\nexec sleep 60\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mail = AlertMail {
            body: "x".repeat(4 * 1024 * 1024),
            ..test_mail()
        };
        let started = Instant::now();
        let err = SendmailMailer::new(&script).deliver(&mail).unwrap_err();

        assert!(matches!(err, MailError::Write { .. }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
