//! Login payloads and session state.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use crate::http::payload;
use crate::types::{ErrorInfo, ErrorKind};

/// Abort Coordinator key shared by every login attempt.
pub const LOGIN_OPERATION: &str = "auth:login";

/// Login form as sent to the backend.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember_me: Option<bool>,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            otp: None,
            remember_me: None,
        }
    }

    pub fn with_otp(mut self, otp: impl Into<String>) -> Self {
        self.otp = Some(otp.into());
        self
    }

    pub fn remember_me(mut self, remember: bool) -> Self {
        self.remember_me = Some(remember);
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("otp", &self.otp.as_ref().map(|_| "<redacted>"))
            .field("remember_me", &self.remember_me)
            .finish()
    }
}

/// Validated login outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginData {
    pub user: Option<Value>,
    pub token: Option<String>,
    /// Second factor required; no token was issued.
    #[serde(default)]
    pub requires_otp: bool,
}

/// Where the login state machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoginState {
    Idle = 0,
    /// Request sent, no response yet.
    InFlight = 1,
    /// Response received, body being read and classified.
    Settling = 2,
}

impl From<u8> for LoginState {
    fn from(value: u8) -> Self {
        match value {
            1 => LoginState::InFlight,
            2 => LoginState::Settling,
            _ => LoginState::Idle,
        }
    }
}

/// In-memory authenticated session.
#[derive(Clone)]
pub struct Session {
    pub token: String,
    pub user: Option<Value>,
    pub established_at: Instant,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("established_at", &self.established_at)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    success: Option<bool>,
    user: Option<Value>,
    token: Option<String>,
    #[serde(default, alias = "requireOTP", alias = "requiresOtp")]
    require_otp: bool,
}

/// Validate a 2xx login body against the expected success shape.
pub fn decode_login(body: Value, status: u16) -> Result<LoginData, ErrorInfo> {
    if !body.is_object() {
        return Err(ErrorInfo::new(
            ErrorKind::MalformedPayload,
            "login response is not a JSON object",
        ));
    }
    let rejection = payload::server_message(&body);
    let response: LoginResponse = serde_json::from_value(body).map_err(|e| {
        ErrorInfo::new(
            ErrorKind::MalformedPayload,
            format!("unexpected login response shape: {e}"),
        )
    })?;

    if response.success == Some(false) {
        let message = rejection.unwrap_or_else(|| "login rejected".to_string());
        return Err(ErrorInfo::http(status, message));
    }

    if response.require_otp {
        return Ok(LoginData {
            user: response.user,
            token: None,
            requires_otp: true,
        });
    }

    match (response.user, response.token) {
        (Some(user), Some(token)) if !token.is_empty() => Ok(LoginData {
            user: Some(user),
            token: Some(token),
            requires_otp: false,
        }),
        _ => Err(ErrorInfo::new(
            ErrorKind::MalformedPayload,
            "login response is missing user or token",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_credentials_wire_shape() {
        let creds = Credentials::new("a@b.com", "pw").remember_me(true);
        assert_eq!(
            serde_json::to_value(&creds).unwrap(),
            json!({"email": "a@b.com", "password": "pw", "rememberMe": true})
        );
        assert!(!format!("{creds:?}").contains("pw\""));
    }

    #[test]
    fn test_decode_success() {
        let data = decode_login(json!({"success": true, "user": {"id": 7}, "token": "t0k"}), 200).unwrap();
        assert_eq!(data.token.as_deref(), Some("t0k"));
        assert_eq!(data.user, Some(json!({"id": 7})));
        assert!(!data.requires_otp);
    }

    #[test]
    fn test_decode_requires_otp() {
        let data = decode_login(json!({"success": true, "requireOTP": true}), 200).unwrap();
        assert!(data.requires_otp);
        assert!(data.token.is_none());
    }

    #[test]
    fn test_decode_rejections() {
        let err = decode_login(json!({"success": false, "error": "Account locked"}), 200).unwrap_err();
        assert_eq!(err.kind, ErrorKind::HttpStatus);
        assert_eq!(err.message, "Account locked");

        let err = decode_login(json!({"success": true}), 200).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedPayload);

        let err = decode_login(json!([1, 2]), 200).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedPayload);

        let err = decode_login(json!({"token": 42, "user": {}}), 200).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedPayload);
    }

    #[test]
    fn test_login_state_roundtrip() {
        for state in [LoginState::Idle, LoginState::InFlight, LoginState::Settling] {
            assert_eq!(LoginState::from(state as u8), state);
        }
        assert_eq!(LoginState::from(99), LoginState::Idle);
    }
}
