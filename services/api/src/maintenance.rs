//! services/api/src/maintenance.rs
//!
//! Background housekeeping that runs for the lifetime of the server.

use chat_core::AccountService;
use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often expired one-time passcodes are purged.
pub const OTP_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Spawns the OTP sweeper. The first sweep runs immediately, then once per
/// `interval`, until `token` is cancelled.
pub fn spawn_otp_sweeper(
    accounts: AccountService,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => match accounts.sweep_expired_otps(Utc::now()).await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "Swept expired one-time passcodes"),
                    Err(e) => warn!("OTP sweep failed: {}", e),
                },
            }
        }
        info!("OTP sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::domain::{OneTimePasscode, OtpPurpose};
    use chat_core::memory::{InMemoryDatabase, RecordingMailer};
    use chat_core::ports::DatabaseService;
    use std::sync::Arc;
    use uuid::Uuid;

    fn otp(email: &str, expired_hours_ago: i64) -> OneTimePasscode {
        let now = Utc::now();
        OneTimePasscode {
            id: Uuid::new_v4(),
            email: email.to_string(),
            code: "123456".to_string(),
            expires_at: now - chrono::Duration::hours(expired_hours_ago),
            is_verified: false,
            purpose: OtpPurpose::Registration,
            created_at: now - chrono::Duration::hours(expired_hours_ago + 1),
        }
    }

    #[tokio::test]
    async fn sweeper_purges_stale_passcodes_and_stops_on_cancel() {
        let db = Arc::new(InMemoryDatabase::new());
        db.save_otp(otp("old@example.com", 48)).await.unwrap();
        db.save_otp(otp("recent@example.com", 1)).await.unwrap();
        let accounts = AccountService::new(db.clone(), Arc::new(RecordingMailer::default()));

        let token = CancellationToken::new();
        let handle = spawn_otp_sweeper(accounts, Duration::from_secs(3600), token.clone());

        for _ in 0..100 {
            if db.otp_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(db.otp_count(), 1);
        assert!(db.otps_for("old@example.com").is_empty());

        token.cancel();
        handle.await.unwrap();
    }
}
