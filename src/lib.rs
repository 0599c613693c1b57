//! # Backoffice (operator authentication and session control)
//!
//! `backoffice` authenticates back-office operators and controls what they may
//! do once signed in.
//!
//! ## Credentials
//!
//! A successful login returns two credentials:
//!
//! - **Access token:** an HS256 JWT carrying the operator id, username and role.
//!   It is stateless and expires after 7 days by default.
//! - **Refresh token:** 32 random bytes, valid for 30 days by default. Only its
//!   SHA-256 digest is stored, one per operator. Every refresh rotates it, and a
//!   rotated token can never be replayed.
//!
//! Changing or resetting a password revokes the operator's refresh token. Access
//! tokens already handed out stay valid until they expire.
//!
//! ## Roles
//!
//! Operators are either `admin` or `superadmin`. Only superadmins manage other
//! operators; no one can delete themselves or a superadmin. A superadmin is
//! seeded at startup from `BACKOFFICE_ADMIN_USERNAME`/`BACKOFFICE_ADMIN_PASSWORD`.
//!
//! ## Abuse protection
//!
//! Login attempts are limited per username (5 per 15 minutes), password
//! changes per address (3 per hour), and every route per address (200 per 15
//! minutes). Rejections are `429` with `Retry-After`.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
