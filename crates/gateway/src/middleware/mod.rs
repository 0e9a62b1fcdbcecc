//! Admission pipeline middleware
//!
//! Protected routes run `auth` then `rate_limit`; every route is wrapped by
//! `track` so each terminal outcome is recorded exactly once.

pub mod auth;
pub mod rate_limit;
pub mod track;

pub use auth::auth_middleware;
pub use rate_limit::rate_limit_middleware;
pub use track::track_middleware;
