//! watchpost-mail: alert mail delivery.
//!
//! Watchers hand an [`AlertMail`] to a [`Mailer`] whenever their alert state
//! flips. Delivery is best-effort: callers log a [`MailError`] and move on.
//!
//! Two transports are provided:
//! - [`LogMailer`] writes the mail to the log (dry runs, no transport configured)
//! - [`SendmailMailer`] pipes the rendered message into `sendmail -t`

pub mod mailer;
pub mod sendmail;

pub use mailer::{AlertMail, LogMailer, MailError, Mailer};
pub use sendmail::SendmailMailer;
