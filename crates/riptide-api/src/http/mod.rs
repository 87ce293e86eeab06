//! HTTP surface: routing, middleware and handlers.

pub(crate) mod auth;
pub(crate) mod constants;
pub(crate) mod errors;
pub(crate) mod health;
pub(crate) mod push;
pub mod router;
pub(crate) mod sessions;
