pub(crate) mod ai_questions;
pub(crate) mod documents;
pub(crate) mod oauth;
