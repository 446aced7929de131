// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::app::config::GlobalSettings;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

const SUBJECT_TAG: &str = "[RANGER]";

struct MailerInner {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

/// Outbound mail for significant events. Unconfigured or broken mail never
/// blocks the strategy: send degrades to a log line.
pub struct Mailer {
    inner: Option<MailerInner>,
}

fn relay_host(service: &str) -> String {
    match service.to_lowercase().as_str() {
        "gmail" => "smtp.gmail.com".to_string(),
        "outlook" | "hotmail" => "smtp-mail.outlook.com".to_string(),
        "yahoo" => "smtp.mail.yahoo.com".to_string(),
        host => host.to_string(),
    }
}

impl Mailer {
    pub fn from_settings(settings: &GlobalSettings) -> Self {
        let (Some(user), Some(pass), Some(to)) = (
            settings.email_user.clone(),
            settings.email_pass.clone(),
            settings.email_to.clone(),
        ) else {
            tracing::info!(target: "strategy", "Mail alerts disabled (EMAIL_* not set)");
            return Self { inner: None };
        };

        let service = settings
            .email_service
            .clone()
            .unwrap_or_else(|| "gmail".to_string());
        let (Ok(from), Ok(to)) = (user.parse::<Mailbox>(), to.parse::<Mailbox>()) else {
            tracing::warn!(target: "strategy", "Invalid EMAIL_USER/EMAIL_TO, mail alerts disabled");
            return Self { inner: None };
        };
        let transport = match AsyncSmtpTransport::<Tokio1Executor>::relay(&relay_host(&service)) {
            Ok(builder) => builder.credentials(Credentials::new(user, pass)).build(),
            Err(e) => {
                tracing::warn!(target: "strategy", error = %e, "SMTP relay setup failed, mail alerts disabled");
                return Self { inner: None };
            }
        };
        Self {
            inner: Some(MailerInner { transport, from, to }),
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub async fn send(&self, subject: &str, body: &str) {
        let Some(inner) = &self.inner else {
            tracing::info!(target: "strategy", subject, "Alert (mail disabled): {body}");
            return;
        };
        let message = Message::builder()
            .from(inner.from.clone())
            .to(inner.to.clone())
            .subject(format!("{SUBJECT_TAG} {subject}"))
            .body(body.to_string());
        match message {
            Ok(message) => {
                if let Err(e) = inner.transport.send(message).await {
                    tracing::warn!(target: "strategy", error = %e, subject, "Alert mail failed");
                }
            }
            Err(e) => {
                tracing::warn!(target: "strategy", error = %e, subject, "Alert mail could not be built");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_services_map_to_relays() {
        assert_eq!(relay_host("gmail"), "smtp.gmail.com");
        assert_eq!(relay_host("Outlook"), "smtp-mail.outlook.com");
        assert_eq!(relay_host("smtp.fastmail.com"), "smtp.fastmail.com");
    }

    #[tokio::test]
    async fn disabled_mailer_send_is_a_noop() {
        Mailer::disabled().send("test", "body").await;
    }
}
