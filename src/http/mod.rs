//! HTTP layer.
//!
//! One axum router with a single fallback handler: routes live in the
//! current site snapshot as data, so the router itself never changes when
//! the site is rebuilt.  Requests under a Git passthrough prefix are
//! delegated to the smart HTTP endpoints in [`git_http`].

pub mod git_http;
pub mod handler;
