// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session authority: owns session state and the signing keys.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::state::epoch_secs;

use super::persist::PersistedSessions;
use super::token::TokenKeys;
use super::{
    AuthError, Session, SessionStatus, SessionSummary, TerminationReason, TokenClaims, TokenKind,
};

/// Tokens handed out at login.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedTokens {
    pub access: String,
    pub refresh: String,
    pub session_id: String,
    pub access_ttl_secs: u64,
}

/// A fresh access token minted from a refresh token.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RefreshedAccess {
    pub access: String,
    pub access_ttl_secs: u64,
}

/// Issues, validates, refreshes, and revokes device sessions.
pub struct SessionAuthority {
    sessions: RwLock<HashMap<String, Session>>,
    keys: TokenKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    max_concurrent: usize,
    /// Snapshot path. `None` disables persistence (tests).
    persist_path: Option<PathBuf>,
}

impl SessionAuthority {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            TokenKeys::new(
                &config.token_secret,
                config.token_secret_previous.as_deref(),
                config.key_grace(),
            ),
            config.access_ttl(),
            config.refresh_ttl(),
            config.max_concurrent_sessions,
            Some(config.resolved_state_dir().join("sessions.json")),
        )
    }

    pub fn new(
        keys: TokenKeys,
        access_ttl: Duration,
        refresh_ttl: Duration,
        max_concurrent: usize,
        persist_path: Option<PathBuf>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            keys,
            access_ttl,
            refresh_ttl,
            max_concurrent: max_concurrent.max(1),
            persist_path,
        }
    }

    /// Load a persisted snapshot, dropping sessions whose refresh window has
    /// already passed.
    pub async fn load_persisted(&self, persisted: PersistedSessions) {
        let now = epoch_secs();
        let mut sessions = self.sessions.write().await;
        for (id, session) in persisted.sessions {
            if session.refresh_expires_at > now {
                sessions.insert(id, session);
            }
        }
    }

    /// Create a session and sign its token pair. Enforces the per-subject
    /// concurrency cap by terminating the oldest active session.
    pub async fn issue(
        &self,
        subject_id: &str,
        device_id: &str,
        remote_addr: &str,
        user_agent: &str,
    ) -> Result<IssuedTokens, AuthError> {
        let now = epoch_secs();
        let session_id = uuid::Uuid::new_v4().to_string();
        let access_exp = now + self.access_ttl.as_secs() as i64;
        let refresh_exp = now + self.refresh_ttl.as_secs() as i64;

        let access = self.keys.sign(&TokenClaims {
            sub: subject_id.to_owned(),
            device_id: device_id.to_owned(),
            sid: session_id.clone(),
            kind: TokenKind::Access,
            iat: now,
            exp: access_exp,
        })?;
        let refresh = self.keys.sign(&TokenClaims {
            sub: subject_id.to_owned(),
            device_id: device_id.to_owned(),
            sid: session_id.clone(),
            kind: TokenKind::Refresh,
            iat: now,
            exp: refresh_exp,
        })?;

        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(
                session_id.clone(),
                Session {
                    session_id: session_id.clone(),
                    subject_id: subject_id.to_owned(),
                    device_id: device_id.to_owned(),
                    remote_addr: remote_addr.to_owned(),
                    user_agent: user_agent.to_owned(),
                    created_at: now,
                    last_activity: now,
                    access_expires_at: access_exp,
                    refresh_expires_at: refresh_exp,
                    state: SessionStatus::Active,
                    termination_reason: None,
                },
            );

            // Cap enforcement is atomic with the insert: both happen under
            // the same write lock.
            loop {
                let mut active: Vec<(i64, String)> = sessions
                    .values()
                    .filter(|s| s.subject_id == subject_id && s.state == SessionStatus::Active)
                    .map(|s| (s.created_at, s.session_id.clone()))
                    .collect();
                if active.len() <= self.max_concurrent {
                    break;
                }
                active.sort();
                let (_, oldest_id) = active.remove(0);
                if let Some(oldest) = sessions.get_mut(&oldest_id) {
                    oldest.state = SessionStatus::Terminated;
                    oldest.termination_reason =
                        Some(TerminationReason::ConcurrentLimitExceeded);
                    tracing::info!(
                        subject_id,
                        session_id = %oldest_id,
                        "terminated oldest session over concurrency cap"
                    );
                }
            }

            self.save_snapshot(&sessions);
        }

        tracing::info!(subject_id, device_id, session_id = %session_id, "session issued");
        Ok(IssuedTokens {
            access,
            refresh,
            session_id,
            access_ttl_secs: self.access_ttl.as_secs(),
        })
    }

    /// Validate a token of the given kind against its session binding. On
    /// success the session's last-activity timestamp is touched.
    pub async fn validate(&self, token: &str, kind: TokenKind) -> Result<TokenClaims, AuthError> {
        let now = epoch_secs();
        let claims = self.keys.verify(token, now)?;
        if claims.kind != kind {
            return Err(AuthError::Malformed);
        }

        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&claims.sid) {
            None => Err(AuthError::Revoked),
            Some(session) if session.state == SessionStatus::Terminated => {
                Err(AuthError::SessionInactive)
            }
            Some(session) => {
                session.last_activity = now;
                Ok(claims)
            }
        }
    }

    /// Mint a new access token bound to the same session. Refresh expiry is
    /// not extended.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedAccess, AuthError> {
        let claims = self.validate(refresh_token, TokenKind::Refresh).await?;
        let now = epoch_secs();
        let access_exp = now + self.access_ttl.as_secs() as i64;

        let access = self.keys.sign(&TokenClaims {
            sub: claims.sub,
            device_id: claims.device_id,
            sid: claims.sid.clone(),
            kind: TokenKind::Access,
            iat: now,
            exp: access_exp,
        })?;

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&claims.sid) {
            session.access_expires_at = access_exp;
            session.last_activity = now;
        }
        self.save_snapshot(&sessions);

        Ok(RefreshedAccess { access, access_ttl_secs: self.access_ttl.as_secs() })
    }

    /// Terminate a session. Returns false if the session id is unknown.
    pub async fn terminate(&self, session_id: &str, reason: TerminationReason) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };
        if session.state == SessionStatus::Active {
            session.state = SessionStatus::Terminated;
            session.termination_reason = Some(reason);
            tracing::info!(session_id, ?reason, "session terminated");
        }
        self.save_snapshot(&sessions);
        true
    }

    /// Currently-active sessions for a subject, oldest first.
    pub async fn list(&self, subject_id: &str) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .filter(|s| s.subject_id == subject_id && s.state == SessionStatus::Active)
            .map(|s| SessionSummary {
                session_id: s.session_id.clone(),
                device_id: s.device_id.clone(),
                remote_addr: s.remote_addr.clone(),
                user_agent: s.user_agent.clone(),
                created_at: s.created_at,
                last_activity: s.last_activity,
                refresh_expires_at: s.refresh_expires_at,
            })
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    /// Drop sessions whose refresh window has passed. Terminated sessions are
    /// kept until then so their tokens keep failing as `session_inactive`
    /// rather than `revoked`.
    pub async fn sweep(&self) -> usize {
        let now = epoch_secs();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.refresh_expires_at > now);
        let removed = before - sessions.len();
        if removed > 0 {
            self.save_snapshot(&sessions);
        }
        removed
    }

    fn save_snapshot(&self, sessions: &HashMap<String, Session>) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let snapshot = PersistedSessions { sessions: sessions.clone() };
        if let Err(e) = super::persist::save(path, &snapshot) {
            tracing::warn!(err = %e, "failed to persist sessions");
        }
    }
}

/// Spawn the periodic session retention sweep.
pub fn spawn_session_sweeper(authority: Arc<SessionAuthority>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(Duration::from_secs(3600));
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            let removed = authority.sweep().await;
            if removed > 0 {
                tracing::debug!(removed, "swept expired sessions");
            }
        }
    });
}

#[cfg(test)]
#[path = "authority_tests.rs"]
mod tests;
