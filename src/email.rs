use axum::async_trait;
use tracing::info;

/// Outbound mail delivery, kept behind a trait so tests can record
/// messages instead of sending them.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, to: &str, reset_link: &str) -> anyhow::Result<()>;
}

/// Default mailer: hands the message off to the operator via structured
/// logs. Swap in an SMTP/API-backed implementation behind the same trait
/// when a real provider is wired up.
#[derive(Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, to: &str, reset_link: &str) -> anyhow::Result<()> {
        info!(%to, %reset_link, "password reset email dispatched");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingMailer;
    use super::*;

    #[tokio::test]
    async fn recording_mailer_captures_recipient_and_link() {
        let mailer = RecordingMailer::default();
        mailer
            .send_password_reset("a@x.com", "http://localhost:8080/auth/resetPassword/tok")
            .await
            .unwrap();
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "a@x.com");
        assert!(sent[0].1.contains("/auth/resetPassword/"));
    }
}
