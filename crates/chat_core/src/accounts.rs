//! crates/chat_core/src/accounts.rs
//!
//! Account lifecycle: one-time passcodes, signup, password reset and profile updates.
//! Password hashing happens at the web boundary; this module only ever sees hashes.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use crate::domain::{NewUser, OneTimePasscode, OtpPurpose, ProfileUpdate, User, UserCredentials};
use crate::ports::{DatabaseService, OtpMailer, PortError, PortResult};

/// How long an issued passcode stays valid.
pub const OTP_TTL_MINUTES: i64 = 10;
/// Passcodes whose expiry is older than this are removed by the sweep.
pub const OTP_RETENTION_HOURS: i64 = 24;

#[derive(Clone)]
pub struct AccountService {
    db: Arc<dyn DatabaseService>,
    mailer: Arc<dyn OtpMailer>,
}

impl AccountService {
    pub fn new(db: Arc<dyn DatabaseService>, mailer: Arc<dyn OtpMailer>) -> Self {
        Self { db, mailer }
    }

    //=====================================================================================
    // One-time passcodes
    //=====================================================================================

    /// Issues a fresh passcode for `(email, purpose)` and mails it.
    ///
    /// Registration codes require an unused email, reset codes an existing account.
    pub async fn request_otp(&self, email: &str, purpose: OtpPurpose) -> PortResult<()> {
        let email = normalize_email(email)?;

        let existing = match self.db.get_user_by_email(&email).await {
            Ok(user) => Some(user),
            Err(PortError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        match (purpose, existing) {
            (OtpPurpose::Registration, Some(_)) => {
                return Err(PortError::Conflict("Email already registered".to_string()))
            }
            (OtpPurpose::Reset, None) => {
                return Err(PortError::NotFound(
                    "No account found with this email".to_string(),
                ))
            }
            _ => {}
        }

        let now = Utc::now();
        let otp = OneTimePasscode {
            id: Uuid::new_v4(),
            email: email.clone(),
            code: generate_code(),
            expires_at: now + Duration::minutes(OTP_TTL_MINUTES),
            is_verified: false,
            purpose,
            created_at: now,
        };
        let code = otp.code.clone();
        self.db.save_otp(otp).await?;
        self.mailer.send_otp(&email, &code, purpose).await?;

        info!(purpose = purpose.as_str(), "issued one-time passcode");
        Ok(())
    }

    /// Marks the most recent unexpired matching passcode as verified.
    pub async fn verify_otp(&self, email: &str, code: &str, purpose: OtpPurpose) -> PortResult<()> {
        let email = normalize_email(email)?;
        let otp = self
            .db
            .find_latest_otp(&email, code.trim(), purpose, Utc::now())
            .await?
            .ok_or_else(|| PortError::Validation("Invalid or expired OTP".to_string()))?;

        self.db.mark_otp_verified(otp.id).await
    }

    /// Removes passcodes that expired more than `OTP_RETENTION_HOURS` before `now`.
    pub async fn sweep_expired_otps(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let cutoff = now - Duration::hours(OTP_RETENTION_HOURS);
        self.db.delete_otps_expired_before(cutoff).await
    }

    //=====================================================================================
    // Signup, login, reset
    //=====================================================================================

    /// Creates a verified account. Needs a verified, unexpired registration passcode
    /// for the email, which is consumed on success.
    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        hashed_password: String,
    ) -> PortResult<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(PortError::Validation("Username is required".to_string()));
        }
        let email = normalize_email(email)?;

        if self.db.user_exists(username, &email).await? {
            return Err(PortError::Conflict(
                "Username or email already exists".to_string(),
            ));
        }

        self.db
            .find_verified_otp(&email, OtpPurpose::Registration, None, Utc::now())
            .await?
            .ok_or_else(|| PortError::Validation("OTP not verified or expired".to_string()))?;

        let user = self
            .db
            .create_user(NewUser {
                username: username.to_string(),
                email: email.clone(),
                hashed_password,
            })
            .await?;
        self.db.delete_otps(&email, OtpPurpose::Registration).await?;

        info!(user_id = %user.user_id, "registered new user");
        Ok(user)
    }

    /// Loads the credentials for a username-or-email login. Unverified accounts
    /// are reported exactly like missing ones.
    pub async fn credentials_for_login(&self, login: &str) -> PortResult<UserCredentials> {
        let not_found = || PortError::NotFound("User not found or not verified".to_string());
        let credentials = match self.db.get_credentials_by_login(login.trim()).await {
            Ok(credentials) => credentials,
            Err(PortError::NotFound(_)) => return Err(not_found()),
            Err(e) => return Err(e),
        };
        if !credentials.user.is_verified {
            return Err(not_found());
        }
        Ok(credentials)
    }

    /// Replaces the password of the account behind `email`, consuming a verified
    /// reset passcode carrying `code`.
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        hashed_password: &str,
    ) -> PortResult<()> {
        let email = normalize_email(email)?;
        self.db
            .find_verified_otp(&email, OtpPurpose::Reset, Some(code.trim()), Utc::now())
            .await?
            .ok_or_else(|| PortError::Validation("Invalid or expired OTP".to_string()))?;

        let user = self.db.get_user_by_email(&email).await?;
        self.db.update_password(user.user_id, hashed_password).await?;
        self.db.delete_otps(&email, OtpPurpose::Reset).await?;

        info!(user_id = %user.user_id, "password reset");
        Ok(())
    }

    //=====================================================================================
    // Profiles & user lookup
    //=====================================================================================

    pub async fn complete_profile(&self, user_id: Uuid, profile: ProfileUpdate) -> PortResult<User> {
        self.db.complete_profile(user_id, profile).await
    }

    pub async fn skip_profile_prompt(&self, user_id: Uuid) -> PortResult<()> {
        self.db.mark_profile_prompt_seen(user_id).await
    }

    pub async fn user(&self, user_id: Uuid) -> PortResult<User> {
        self.db.get_user_by_id(user_id).await
    }

    pub async fn user_by_username(&self, username: &str) -> PortResult<User> {
        self.db.get_user_by_username(username).await
    }

    pub async fn list_users_except(&self, user_id: Uuid) -> PortResult<Vec<User>> {
        self.db.list_users_except(user_id).await
    }
}

fn normalize_email(email: &str) -> PortResult<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(PortError::Validation("A valid email is required".to_string()));
    }
    Ok(email)
}

/// A uniformly random six-digit code.
fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryDatabase, RecordingMailer};

    fn service() -> (Arc<InMemoryDatabase>, Arc<RecordingMailer>, AccountService) {
        let db = Arc::new(InMemoryDatabase::new());
        let mailer = Arc::new(RecordingMailer::default());
        let accounts = AccountService::new(db.clone(), mailer.clone());
        (db, mailer, accounts)
    }

    #[test]
    fn generated_codes_have_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn request_otp_mails_the_stored_code() {
        let (_db, mailer, accounts) = service();

        accounts
            .request_otp("New@Example.com", OtpPurpose::Registration)
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "new@example.com");
        accounts
            .verify_otp("new@example.com", &sent[0].1, OtpPurpose::Registration)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reset_otp_requires_existing_account() {
        let (_db, mailer, accounts) = service();
        assert!(matches!(
            accounts.request_otp("nobody@example.com", OtpPurpose::Reset).await,
            Err(PortError::NotFound(_))
        ));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn verify_rejects_code_for_other_purpose() {
        let (_db, mailer, accounts) = service();
        accounts
            .request_otp("a@example.com", OtpPurpose::Registration)
            .await
            .unwrap();
        let code = mailer.last_code().unwrap();

        assert!(matches!(
            accounts.verify_otp("a@example.com", &code, OtpPurpose::Reset).await,
            Err(PortError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn expired_code_cannot_be_verified() {
        let (db, _mailer, accounts) = service();
        let now = Utc::now();
        db.save_otp(OneTimePasscode {
            id: Uuid::new_v4(),
            email: "late@example.com".to_string(),
            code: "123456".to_string(),
            expires_at: now - Duration::minutes(1),
            is_verified: false,
            purpose: OtpPurpose::Registration,
            created_at: now - Duration::minutes(11),
        })
        .await
        .unwrap();

        assert!(matches!(
            accounts
                .verify_otp("late@example.com", "123456", OtpPurpose::Registration)
                .await,
            Err(PortError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn signup_twice_conflicts() {
        let (_db, mailer, accounts) = service();
        accounts
            .request_otp("dup@example.com", OtpPurpose::Registration)
            .await
            .unwrap();
        let code = mailer.last_code().unwrap();
        accounts
            .verify_otp("dup@example.com", &code, OtpPurpose::Registration)
            .await
            .unwrap();
        accounts
            .signup("dup", "dup@example.com", "hash".to_string())
            .await
            .unwrap();

        assert!(matches!(
            accounts
                .signup("dup", "other@example.com", "hash".to_string())
                .await,
            Err(PortError::Conflict(_))
        ));
        assert!(matches!(
            accounts
                .request_otp("dup@example.com", OtpPurpose::Registration)
                .await,
            Err(PortError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn sweep_only_removes_long_expired_codes() {
        let (db, _mailer, accounts) = service();
        let now = Utc::now();
        for (email, expired_hours_ago) in [("old@example.com", 25), ("recent@example.com", 1)] {
            db.save_otp(OneTimePasscode {
                id: Uuid::new_v4(),
                email: email.to_string(),
                code: "111111".to_string(),
                expires_at: now - Duration::hours(expired_hours_ago),
                is_verified: false,
                purpose: OtpPurpose::Registration,
                created_at: now - Duration::hours(expired_hours_ago) - Duration::minutes(10),
            })
            .await
            .unwrap();
        }

        assert_eq!(accounts.sweep_expired_otps(now).await.unwrap(), 1);
        assert_eq!(db.otp_count(), 1);
    }

    #[tokio::test]
    async fn unverified_accounts_cannot_log_in() {
        let (db, _mailer, accounts) = service();
        db.create_user(NewUser {
            username: "ghost".to_string(),
            email: "ghost@example.com".to_string(),
            hashed_password: "hash".to_string(),
        })
        .await
        .unwrap();
        db.set_verified("ghost", false);

        assert!(matches!(
            accounts.credentials_for_login("ghost").await,
            Err(PortError::NotFound(_))
        ));
    }
}
