use std::collections::HashMap;

use serde::Serialize;

pub(crate) mod attempt;
pub(crate) mod auth;
pub(crate) mod question;
pub(crate) mod test;
pub(crate) mod user;

/// Uniform response envelope. `data` and `meta` are dropped from the JSON
/// when absent so plain acknowledgements stay small.
#[derive(Debug, Serialize)]
pub(crate) struct ApiResponse<T: Serialize> {
    pub(crate) success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) meta: Option<PageMeta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Self {
        Self { success: true, message: None, data: Some(data), meta: None }
    }

    pub(crate) fn with_message(message: impl Into<String>, data: T) -> Self {
        Self { success: true, message: Some(message.into()), data: Some(data), meta: None }
    }

    pub(crate) fn page(data: T, meta: PageMeta) -> Self {
        Self { success: true, message: None, data: Some(data), meta: Some(meta) }
    }
}

impl ApiResponse<()> {
    pub(crate) fn message_only(message: impl Into<String>) -> Self {
        Self { success: true, message: Some(message.into()), data: None, meta: None }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct PageMeta {
    pub(crate) total: i64,
    pub(crate) page: i64,
    pub(crate) limit: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: String,
    pub(crate) status: String,
    pub(crate) components: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    pub(crate) message: String,
    pub(crate) version: String,
}
