use serde::Deserialize;

/// Profile fields a user may change after sign-up. Credentials go
/// through the auth endpoints instead.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub nickname: Option<String>,
}
