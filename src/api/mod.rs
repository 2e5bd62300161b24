pub(crate) mod analytics;
pub(crate) mod attempts;
pub(crate) mod auth;
pub(crate) mod cookies;
pub(crate) mod errors;
#[cfg(test)]
mod flow_tests;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod oauth;
pub(crate) mod pagination;
pub(crate) mod questions;
pub(crate) mod router;
pub(crate) mod users;
