pub(crate) use crate::auth::dto::{Claims, JwtKeys};
use crate::auth::dto::{PublicUser, SignUpRequest};
use crate::auth::error::AuthError;
use crate::auth::repo;
use crate::auth::repo_types::User;
use crate::config::{JwtConfig, PasswordPolicy};
use crate::state::AppState;
use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use regex::Regex;
use std::time::Duration;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const RESET_TOKEN_LEN: usize = 48;

/// Returned by forgot-password on every path so responses cannot be used
/// to probe which emails have accounts.
pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If that email belongs to an account, a reset link has been sent.";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn check_password_policy(policy: &PasswordPolicy, plain: &str) -> Result<(), AuthError> {
    if plain.chars().count() < policy.min_length {
        return Err(AuthError::BadRequest(format!(
            "Password must be at least {} characters long",
            policy.min_length
        )));
    }
    if policy.require_digit && !plain.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::BadRequest(
            "Password must contain at least one digit".into(),
        ));
    }
    Ok(())
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Cryptographically random single-use token for password-reset links.
pub(crate) fn generate_reset_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(RESET_TOKEN_LEN)
        .map(char::from)
        .collect()
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            ttl: Duration::from_secs((ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    pub fn sign(&self, user_id: Uuid, admin: bool) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            admin,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

/// Create a user from the sign-up payload. Email is normalized to
/// lowercase before the uniqueness checks so casing cannot bypass them.
pub async fn sign_up(state: &AppState, mut payload: SignUpRequest) -> Result<PublicUser, AuthError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AuthError::BadRequest("Invalid email".into()));
    }
    check_password_policy(&state.config.password, &payload.password)?;

    // Fast pre-check; the unique index still catches a concurrent racer.
    if User::find_active_by_email(&state.db, &payload.email)
        .await
        .map_err(AuthError::Internal)?
        .is_some()
    {
        warn!(email = %payload.email, "email already registered");
        return Err(AuthError::EmailTaken);
    }

    let hash = hash_password(&payload.password).map_err(AuthError::Internal)?;

    let user = match User::create(&state.db, &payload.email, &payload.nickname, &hash).await {
        Ok(u) => u,
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            warn!(email = %payload.email, "email already registered (insert race)");
            return Err(AuthError::EmailTaken);
        }
        Err(e) => return Err(AuthError::Internal(e.into())),
    };

    info!(user_id = %user.id, email = %user.email, "user signed up");
    Ok(user.into())
}

/// Verify credentials and issue a session token for an active user.
pub async fn sign_in(state: &AppState, email: &str, password: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AuthError::BadRequest("Invalid email".into()));
    }

    // Soft-deleted users don't match the active lookup, so they cannot
    // sign in even with the right password.
    let user = User::find_active_by_email(&state.db, &email)
        .await
        .map_err(AuthError::Internal)?
        .ok_or_else(|| {
            warn!(email = %email, "sign-in unknown or deleted email");
            AuthError::InvalidCredentials
        })?;

    let ok = verify_password(password, &user.password_hash).map_err(AuthError::Internal)?;
    if !ok {
        warn!(email = %email, user_id = %user.id, "sign-in invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(user.id, user.is_admin).map_err(AuthError::Internal)?;

    info!(user_id = %user.id, email = %user.email, "user signed in");
    Ok(token)
}

pub async fn change_password(
    state: &AppState,
    email: &str,
    old_password: &str,
    new_password: &str,
) -> Result<(), AuthError> {
    let email = email.trim().to_lowercase();

    let user = User::find_active_by_email(&state.db, &email)
        .await
        .map_err(AuthError::Internal)?
        .ok_or(AuthError::UserNotFound)?;

    let ok = verify_password(old_password, &user.password_hash).map_err(AuthError::Internal)?;
    if !ok {
        warn!(user_id = %user.id, "change-password wrong old password");
        return Err(AuthError::InvalidCredentials);
    }

    check_password_policy(&state.config.password, new_password)?;

    let hash = hash_password(new_password).map_err(AuthError::Internal)?;
    User::update_password_hash(&state.db, user.id, &hash)
        .await
        .map_err(AuthError::Internal)?;

    info!(user_id = %user.id, "password changed");
    Ok(())
}

/// Issue a reset token and mail the link. Returns Ok on the unknown-email
/// path too; only malformed input and infrastructure failures error out.
pub async fn forgot_password(state: &AppState, email: &str) -> Result<(), AuthError> {
    let email = email.trim().to_lowercase();

    if !is_valid_email(&email) {
        return Err(AuthError::BadRequest("Invalid email".into()));
    }

    let user = match User::find_active_by_email(&state.db, &email)
        .await
        .map_err(AuthError::Internal)?
    {
        Some(u) => u,
        None => {
            // Same outcome as the happy path: no account enumeration.
            info!("forgot-password for unknown email");
            return Ok(());
        }
    };

    let token = generate_reset_token();
    let expires_at = OffsetDateTime::now_utc()
        + TimeDuration::minutes(state.config.reset_token_ttl_minutes);
    repo::create_reset_token(&state.db, user.id, &token, expires_at)
        .await
        .map_err(AuthError::Internal)?;

    let reset_link = format!("{}/auth/resetPassword/{}", state.config.base_url, token);
    state
        .mailer
        .send_password_reset(&user.email, &reset_link)
        .await
        .map_err(AuthError::Internal)?;

    info!(user_id = %user.id, "reset token issued");
    Ok(())
}

pub async fn reset_password(
    state: &AppState,
    token: &str,
    new_password: &str,
) -> Result<(), AuthError> {
    // Policy check before the token is consumed, so a weak password does
    // not burn the one-shot token.
    check_password_policy(&state.config.password, new_password)?;

    let user_id = repo::consume_reset_token(&state.db, token)
        .await
        .map_err(AuthError::Internal)?
        .ok_or_else(|| AuthError::BadRequest("Invalid or expired reset token".into()))?;

    let hash = hash_password(new_password).map_err(AuthError::Internal)?;
    User::update_password_hash(&state.db, user_id, &hash)
        .await
        .map_err(AuthError::Internal)?;

    info!(user_id = %user_id, "password reset");
    Ok(())
}

/// Extracts and validates the bearer token, yielding the caller's id.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header".to_string(),
            ))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or((
            StatusCode::UNAUTHORIZED,
            "Invalid Authorization header".to_string(),
        ))?;

        let claims = match keys.verify(token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired token");
                return Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid or expired token".to_string(),
                ));
            }
        };

        Ok(AuthUser(claims.sub))
    }
}

#[cfg(test)]
mod password_tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn hash_is_not_the_plaintext() {
        let password = "Secr3t!pass";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!hash.contains(password));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn policy_enforces_min_length_and_digit() {
        let policy = PasswordPolicy {
            min_length: 8,
            require_digit: true,
        };
        assert!(check_password_policy(&policy, "l0ngenough").is_ok());
        assert!(check_password_policy(&policy, "sh0rt").is_err());
        assert!(check_password_policy(&policy, "nodigitshere").is_err());

        let lax = PasswordPolicy {
            min_length: 4,
            require_digit: false,
        };
        assert!(check_password_policy(&lax, "abcd").is_ok());
    }

    #[test]
    fn reset_tokens_are_long_random_and_alphanumeric() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_eq!(a.chars().count(), RESET_TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}

#[cfg(test)]
mod email_tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("user.name+tag@sub.example.org"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email("@x.com"));
    }
}

#[cfg(test)]
mod jwt_tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        let state = AppState::fake();
        JwtKeys::from_ref(&state)
    }

    #[tokio::test]
    async fn sign_and_verify_session_token() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign(user_id, false).expect("sign");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert!(!claims.admin);
    }

    #[tokio::test]
    async fn token_expires_exactly_one_ttl_after_issuance() {
        let keys = make_keys();
        let token = keys.sign(Uuid::new_v4(), false).expect("sign");
        let claims = keys.verify(&token).expect("verify token");
        // fake() config uses a 60-minute TTL
        assert_eq!(claims.exp - claims.iat, 60 * 60);
    }

    #[tokio::test]
    async fn admin_flag_survives_the_roundtrip() {
        let keys = make_keys();
        let token = keys.sign(Uuid::new_v4(), true).expect("sign");
        let claims = keys.verify(&token).expect("verify token");
        assert!(claims.admin);
    }

    #[tokio::test]
    async fn verify_rejects_a_tampered_token() {
        let keys = make_keys();
        let mut token = keys.sign(Uuid::new_v4(), false).expect("sign");
        token.push('x');
        assert!(keys.verify(&token).is_err());
    }

    #[tokio::test]
    async fn verify_rejects_a_foreign_secret() {
        let keys = make_keys();
        let other = JwtKeys {
            encoding: EncodingKey::from_secret(b"another-secret"),
            decoding: DecodingKey::from_secret(b"another-secret"),
            issuer: keys.issuer.clone(),
            audience: keys.audience.clone(),
            ttl: keys.ttl,
        };
        let token = other.sign(Uuid::new_v4(), false).expect("sign");
        assert!(keys.verify(&token).is_err());
    }
}

// Invariants the schema enforces (partial unique index, conditional
// token delete) only show up against a live database. #[sqlx::test]
// provisions a fresh database per test and applies ./migrations.
#[cfg(all(test, feature = "db-tests"))]
mod db_tests {
    use super::*;
    use crate::auth::dto::SignUpRequest;
    use crate::config::AppConfig;
    use crate::email::testing::RecordingMailer;
    use sqlx::PgPool;
    use std::sync::Arc;

    fn make_state(db: PgPool) -> AppState {
        AppState {
            db,
            config: Arc::new(AppConfig {
                database_url: String::new(),
                jwt: JwtConfig {
                    secret: "test-secret".into(),
                    issuer: "test-issuer".into(),
                    audience: "test-aud".into(),
                    ttl_minutes: 60,
                },
                password: PasswordPolicy {
                    min_length: 8,
                    require_digit: true,
                },
                reset_token_ttl_minutes: 60,
                base_url: "http://localhost:8080".into(),
            }),
            mailer: Arc::new(RecordingMailer::default()),
        }
    }

    fn signup(email: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.into(),
            password: "s3cretpass".into(),
            nickname: "nick".into(),
        }
    }

    #[sqlx::test]
    async fn duplicate_active_email_insert_hits_the_unique_index(pool: PgPool) {
        let hash = hash_password("s3cretpass").unwrap();
        User::create(&pool, "a@x.com", "a", &hash).await.unwrap();
        let err = User::create(&pool, "a@x.com", "b", &hash)
            .await
            .unwrap_err();
        match err {
            sqlx::Error::Database(db_err) => assert!(db_err.is_unique_violation()),
            other => panic!("expected a unique violation, got {other:?}"),
        }
    }

    #[sqlx::test]
    async fn duplicate_sign_up_reports_the_email_as_taken(pool: PgPool) {
        let state = make_state(pool);
        sign_up(&state, signup("a@x.com")).await.unwrap();
        let err = sign_up(&state, signup("a@x.com")).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(matches!(err, AuthError::EmailTaken));
    }

    #[sqlx::test]
    async fn soft_deleted_user_cannot_sign_in(pool: PgPool) {
        let state = make_state(pool);
        let user = sign_up(&state, signup("a@x.com")).await.unwrap();
        sign_in(&state, "a@x.com", "s3cretpass").await.unwrap();

        crate::users::repo::soft_delete(&state.db, user.id)
            .await
            .unwrap()
            .expect("user should exist");

        // Right password, deleted account
        let err = sign_in(&state, "a@x.com", "s3cretpass").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[sqlx::test]
    async fn soft_deleted_email_can_be_registered_again(pool: PgPool) {
        let state = make_state(pool);
        let user = sign_up(&state, signup("a@x.com")).await.unwrap();
        crate::users::repo::soft_delete(&state.db, user.id)
            .await
            .unwrap()
            .expect("user should exist");

        // The partial index only covers active rows
        sign_up(&state, signup("a@x.com")).await.unwrap();
    }

    #[sqlx::test]
    async fn reset_token_is_consumed_exactly_once(pool: PgPool) {
        let state = make_state(pool);
        let user = sign_up(&state, signup("a@x.com")).await.unwrap();

        let token = generate_reset_token();
        let expires_at = OffsetDateTime::now_utc() + TimeDuration::minutes(60);
        repo::create_reset_token(&state.db, user.id, &token, expires_at)
            .await
            .unwrap();

        reset_password(&state, &token, "n3wpassword").await.unwrap();
        sign_in(&state, "a@x.com", "n3wpassword").await.unwrap();

        // Second use of the same token must be rejected
        let err = reset_password(&state, &token, "an0therpass")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(_)));
    }

    #[sqlx::test]
    async fn expired_reset_token_is_rejected(pool: PgPool) {
        let state = make_state(pool);
        let user = sign_up(&state, signup("a@x.com")).await.unwrap();

        let token = generate_reset_token();
        let expires_at = OffsetDateTime::now_utc() - TimeDuration::minutes(1);
        repo::create_reset_token(&state.db, user.id, &token, expires_at)
            .await
            .unwrap();

        let err = reset_password(&state, &token, "n3wpassword")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(_)));
        sign_in(&state, "a@x.com", "s3cretpass").await.unwrap();
    }
}
