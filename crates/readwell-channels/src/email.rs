//! SMTP digest email sender (async lettre).

use std::str::FromStr;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use readwell_core::config::EmailConfig;
use readwell_core::{NotificationTarget, ReadwellError, Result};
use readwell_scheduler::{DailyDigest, DispatchError, EmailSender};

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpTls {
    /// Plain connection.
    None,
    /// Upgrade with STARTTLS (required).
    StartTls,
    /// Implicit TLS from the first byte.
    Tls,
}

impl FromStr for SmtpTls {
    type Err = ReadwellError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(SmtpTls::None),
            "starttls" | "" => Ok(SmtpTls::StartTls),
            "tls" => Ok(SmtpTls::Tls),
            other => Err(ReadwellError::Config(format!("unknown smtp_tls '{other}'"))),
        }
    }
}

pub struct SmtpDigestSender {
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpDigestSender {
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        let from: Mailbox = config
            .smtp_from
            .parse()
            .map_err(|e| ReadwellError::Config(format!("invalid smtp_from: {e}")))?;

        let host = config.smtp_host.as_str();
        let builder = match config.smtp_tls.parse::<SmtpTls>()? {
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| ReadwellError::Config(format!("SMTP relay: {e}")))?,
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| ReadwellError::Config(format!("SMTP relay: {e}")))?,
        }
        .port(config.smtp_port);

        let builder = if config.smtp_username.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
        };

        tracing::debug!("📧 SMTP sender configured for {host}:{}", config.smtp_port);
        Ok(Self {
            from,
            mailer: builder.build(),
        })
    }

    /// The multipart (text + HTML) message for one digest.
    pub fn build_message(&self, to: &str, digest: &DailyDigest) -> std::result::Result<Message, DispatchError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| DispatchError::Invalid(format!("invalid recipient '{to}': {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(digest.subject())
            .multipart(MultiPart::alternative_plain_html(
                digest.render_text(),
                digest.render_html(),
            ))
            .map_err(|e| DispatchError::Invalid(format!("build email: {e}")))
    }
}

#[async_trait]
impl EmailSender for SmtpDigestSender {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send_digest(
        &self,
        target: &NotificationTarget,
        digest: &DailyDigest,
    ) -> std::result::Result<(), DispatchError> {
        let to = target.notification_email();
        let message = self.build_message(to, digest)?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| DispatchError::Transport(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Digest sent to user {} ({to})", target.user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tls: &str) -> EmailConfig {
        EmailConfig {
            provider: "smtp".into(),
            smtp_host: "localhost".into(),
            smtp_from: "Readwell <noreply@example.com>".into(),
            smtp_tls: tls.into(),
            ..Default::default()
        }
    }

    fn digest() -> DailyDigest {
        DailyDigest {
            user_name: "Ada".into(),
            entries: Vec::new(),
            overdue_count: 0,
            dashboard_url: "https://h/dashboard".into(),
            settings_url: "https://h/account".into(),
        }
    }

    #[test]
    fn test_tls_modes() {
        assert_eq!("none".parse::<SmtpTls>().unwrap(), SmtpTls::None);
        assert_eq!("STARTTLS".parse::<SmtpTls>().unwrap(), SmtpTls::StartTls);
        assert_eq!("tls".parse::<SmtpTls>().unwrap(), SmtpTls::Tls);
        assert!("ssl3".parse::<SmtpTls>().is_err());
    }

    #[tokio::test]
    async fn test_rejects_bad_from_address() {
        let mut cfg = config("none");
        cfg.smtp_from = "not an address".into();
        assert!(SmtpDigestSender::from_config(&cfg).is_err());
    }

    #[tokio::test]
    async fn test_builds_multipart_digest() {
        let sender = SmtpDigestSender::from_config(&config("none")).unwrap();
        let message = sender.build_message("ada@example.com", &digest()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Your readings for today"));
        assert!(raw.contains("To: ada@example.com"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/html"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_not_a_transport_error() {
        let sender = SmtpDigestSender::from_config(&config("none")).unwrap();
        let err = sender.build_message("nope", &digest()).unwrap_err();
        assert!(matches!(err, DispatchError::Invalid(_)));
    }
}
