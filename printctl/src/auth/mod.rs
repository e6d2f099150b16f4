//! Student identification.
//!
//! Token verification is owned by the upstream gateway. It forwards the authenticated student's
//! UUID in a trusted header (see [`crate::config::ProxyHeaderAuthConfig`]), which the
//! [`current_student::CurrentStudent`] extractor reads. Other services authenticate with a
//! shared secret ([`api_key`]).

pub mod api_key;
pub mod current_student;

pub use current_student::CurrentStudent;
