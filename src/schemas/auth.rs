use serde::{Deserialize, Serialize};

use crate::schemas::user::UserResponse;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenPair {
    pub(crate) access_token: String,
    pub(crate) refresh_token: String,
    pub(crate) token_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthResponse {
    pub(crate) user: UserResponse,
    #[serde(flatten)]
    pub(crate) tokens: TokenPair,
}

/// Refresh accepts the token either from the httpOnly cookie or from the
/// body for non-browser clients.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RefreshRequest {
    #[serde(default)]
    #[serde(alias = "refreshToken")]
    pub(crate) refresh_token: Option<String>,
}
