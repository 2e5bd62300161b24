pub(crate) mod attempts;
pub(crate) mod questions;
pub(crate) mod refresh_tokens;
pub(crate) mod users;
