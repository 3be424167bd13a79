use serde::Serialize;

#[derive(Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(rename = "2fa_code", skip_serializing_if = "Option::is_none")]
    pub two_factor_code: Option<String>,
}
