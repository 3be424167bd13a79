use crate::{
    KomariError, KomariResult,
    auth::application::{
        request::login_request::LoginRequest, response::login_response::LoginResponse,
    },
    core::{
        domain::value_object::{KomariPassword, KomariUsername, SessionToken, TwoFactorCode},
        infrastructure::api_client::{ApiClient, unwrap_envelope},
    },
};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{info, warn};

/// Exchanges credentials for a session token via `POST /api/login`.
pub struct LoginService {
    username: KomariUsername,
    password: KomariPassword,
    two_factor_code: Option<TwoFactorCode>,
}

impl LoginService {
    pub fn new(
        username: KomariUsername,
        password: KomariPassword,
        two_factor_code: Option<TwoFactorCode>,
    ) -> Self {
        Self {
            username,
            password,
            two_factor_code,
        }
    }

    /// Logs in and stores the returned session token on `api`.
    ///
    /// # Errors
    /// - `KomariError::Authentication` for rejected credentials or second factor
    /// - `KomariError::Api` for other error envelopes
    /// - `KomariError::Connection` if the backend is unreachable or the
    ///   response cannot be parsed
    pub async fn execute(&self, api: &ApiClient) -> KomariResult<SessionToken> {
        let request = self.build_login_request();
        let (status, body) = api.post("login", &request).await?;

        match status {
            StatusCode::OK => {
                let token = self.handle_successful_login(status, body)?;
                api.set_session(token.clone()).await;
                info!(username = self.username.as_str(), "Logged in");
                Ok(token)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(username = self.username.as_str(), "Login rejected");
                Err(KomariError::Authentication(error_message(
                    &body,
                    "Invalid credentials provided",
                )))
            }
            StatusCode::NOT_FOUND => Err(KomariError::Connection(
                "Login endpoint not found".to_string(),
            )),
            status => Err(KomariError::Api {
                status: Some(status.as_u16()),
                message: error_message(&body, "Unexpected login response"),
            }),
        }
    }

    fn build_login_request(&self) -> LoginRequest {
        LoginRequest {
            username: self.username.as_str().to_string(),
            password: self.password.as_str().to_string(),
            two_factor_code: self
                .two_factor_code
                .as_ref()
                .map(|code| code.as_str().to_string()),
        }
    }

    fn handle_successful_login(
        &self,
        status: StatusCode,
        body: Value,
    ) -> KomariResult<SessionToken> {
        if body.get("set-cookie").is_none() {
            // The backend answers 200 with an error envelope for a wrong 2FA code.
            unwrap_envelope::<Value>(status, body)?;
            return Err(KomariError::Authentication(
                "Login response carries no session".to_string(),
            ));
        }

        let login_response: LoginResponse = serde_json::from_value(body).map_err(|e| {
            KomariError::Connection(format!("Failed to parse login response: {}", e))
        })?;
        Ok(SessionToken::new(login_response.set_cookie.session_token)?)
    }
}

fn error_message(body: &Value, fallback: &str) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
