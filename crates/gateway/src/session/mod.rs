// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device session authority: issue, validate, refresh, and revoke the signed
//! tokens devices use after login.
//!
//! Tokens are bearer JWTs, so validation could be stateless. But "log out",
//! "rotate on compromise", and the concurrent-session cap all need a
//! revocation authority, which is why session state exists. The token's
//! session binding is what gets checked, so state is O(sessions), not
//! O(tokens).

pub mod authority;
pub mod persist;
pub mod token;

use serde::{Deserialize, Serialize};

/// Which of the two tokens a credential is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Signed token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (authenticated device/user) id.
    pub sub: String,
    pub device_id: String,
    /// Session id the token is bound to.
    pub sid: String,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Terminated,
}

/// Why a session was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Logout,
    ConcurrentLimitExceeded,
    Revoked,
}

/// A server-side session record. Instants are epoch seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub subject_id: String,
    pub device_id: String,
    pub remote_addr: String,
    pub user_agent: String,
    pub created_at: i64,
    pub last_activity: i64,
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
    pub state: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<TerminationReason>,
}

/// Active-session summary returned by `list`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub device_id: String,
    pub remote_addr: String,
    pub user_agent: String,
    pub created_at: i64,
    pub last_activity: i64,
    pub refresh_expires_at: i64,
}

/// Credential validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("token expired")]
    Expired,
    #[error("token malformed")]
    Malformed,
    #[error("token revoked")]
    Revoked,
    #[error("session inactive")]
    SessionInactive,
    #[error("token signed with rotated key, refresh required")]
    NeedsRefresh,
    #[error("token error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Machine-readable reason string for the API envelope.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Malformed => "malformed",
            Self::Revoked => "revoked",
            Self::SessionInactive => "session_inactive",
            Self::NeedsRefresh => "needs_refresh",
            Self::Internal(_) => "internal",
        }
    }
}
