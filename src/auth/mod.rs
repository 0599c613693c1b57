//! Authentication and session-control core.
//!
//! - [`token`] mints HS256 access credentials and opaque refresh credentials.
//! - [`guard`] verifies access credentials and enforces role [`role::Policy`]s.
//! - [`rate_limit`] throttles sensitive operations per caller.
//! - [`session`] orchestrates login, refresh and operator administration.

pub mod audit;
pub mod bootstrap;
pub mod error;
pub mod guard;
pub mod operator;
pub mod password;
pub mod rate_limit;
pub mod role;
pub mod session;
pub mod token;

pub use self::error::AuthError;
pub use self::role::Role;
