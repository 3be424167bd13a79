mod credentials;
mod komari_url;
pub mod serde_helpers;
mod session_token;

pub use credentials::{KomariPassword, KomariUsername, TwoFactorCode};
pub use komari_url::KomariUrl;
pub use session_token::SessionToken;

// Re-export validation functions for internal use
pub(crate) use komari_url::validate_url;
