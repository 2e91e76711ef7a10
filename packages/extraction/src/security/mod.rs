//! Security utilities: credential redaction and (via `traits::crawler`) SSRF protection.

pub mod credentials;

pub use credentials::{AICredentials, SecretString};
