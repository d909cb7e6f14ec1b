//! services/api/src/adapters/mailer.rs
//!
//! Implementations of the `OtpMailer` port: SMTP delivery via `lettre`, and a
//! log-only fallback for development setups without an SMTP relay.

use async_trait::async_trait;
use chat_core::domain::OtpPurpose;
use chat_core::ports::{OtpMailer, PortError, PortResult};
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info, warn};

use crate::config::SmtpConfig;

fn subject_for(purpose: OtpPurpose) -> &'static str {
    match purpose {
        OtpPurpose::Registration => "Your registration code",
        OtpPurpose::Reset => "Your password reset code",
    }
}

fn body_for(code: &str, purpose: OtpPurpose) -> String {
    let action = match purpose {
        OtpPurpose::Registration => "finish creating your account",
        OtpPurpose::Reset => "reset your password",
    };
    format!(
        "Use the code {} to {}.\n\nThe code expires in 10 minutes. If you did not ask for it, ignore this email.\n",
        code, action
    )
}

//=========================================================================================
// SMTP Mailer
//=========================================================================================

/// Sends passcodes through an authenticated SMTP relay.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, lettre::transport::smtp::Error> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());

        // Port 465 speaks TLS from the first byte; everything else upgrades with STARTTLS.
        let builder = if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        };
        let transport = builder.port(config.port).credentials(credentials).build();

        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl OtpMailer for SmtpMailer {
    async fn send_otp(&self, email: &str, code: &str, purpose: OtpPurpose) -> PortResult<()> {
        let from = self.from_address.parse().map_err(|_| {
            PortError::Unexpected(format!("Invalid sender address {}", self.from_address))
        })?;
        let to = email
            .parse()
            .map_err(|_| PortError::Validation("Invalid email address".to_string()))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject_for(purpose))
            .header(ContentType::TEXT_PLAIN)
            .body(body_for(code, purpose))
            .map_err(|e| PortError::Unexpected(format!("Failed to build email: {}", e)))?;

        self.transport.send(message).await.map_err(|e| {
            warn!(error = %e, "SMTP delivery failed");
            PortError::Unexpected(format!("Failed to send email: {}", e))
        })?;

        info!(purpose = purpose.as_str(), "OTP email sent");
        Ok(())
    }
}

//=========================================================================================
// Log Mailer
//=========================================================================================

/// Logs instead of sending. Used when no SMTP host is set; the code itself
/// only appears at `debug`.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl OtpMailer for LogMailer {
    async fn send_otp(&self, email: &str, code: &str, purpose: OtpPurpose) -> PortResult<()> {
        info!(%email, purpose = purpose.as_str(), "SMTP not configured; OTP not emailed");
        debug!(%email, %code, "Undelivered OTP");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing::Level;
    use tracing_subscriber::fmt::MakeWriter;

    #[test]
    fn body_mentions_code_and_purpose() {
        let body = body_for("123456", OtpPurpose::Reset);
        assert!(body.contains("123456"));
        assert!(body.contains("reset your password"));
        assert_ne!(
            subject_for(OtpPurpose::Registration),
            subject_for(OtpPurpose::Reset)
        );
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    async fn log_mailer_output(level: Level) -> String {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(captured.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        LogMailer
            .send_otp("a@example.com", "654321", OtpPurpose::Registration)
            .await
            .unwrap();
        captured.text()
    }

    #[tokio::test]
    async fn log_mailer_keeps_the_code_out_of_info_logs() {
        let info = log_mailer_output(Level::INFO).await;
        assert!(info.contains("a@example.com"));
        assert!(!info.contains("654321"));

        let debug = log_mailer_output(Level::DEBUG).await;
        assert!(debug.contains("654321"));
    }
}
