use serde::Deserialize;

#[derive(Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "set-cookie")]
    pub set_cookie: LoginResponseCookie,
}

#[derive(Deserialize)]
pub struct LoginResponseCookie {
    pub session_token: String,
}
