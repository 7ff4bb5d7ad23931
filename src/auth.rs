//! Login sessions.
//!
//! A successful login creates a server-side session referenced by the
//! `scout_sid` cookie. With "remember me" a signed `user_token` cookie is
//! also issued; it re-creates a session after a server restart.
//! Token layout: `<user>_<nonce>_<sig>` where `sig` is a SHA-256 over the
//! server secret, the user id and the nonce.

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    fmt::Write as _,
    sync::{Arc, PoisonError, RwLock},
};
use tracing::{debug, info};

use crate::config::GameConfig;

pub const SESSION_COOKIE: &str = "scout_sid";
pub const REMEMBER_COOKIE: &str = "user_token";
pub const SESSION_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
}

impl SessionUser {
    pub fn guest() -> Self {
        Self {
            id: "guest".into(),
            name: "Guest User".into(),
        }
    }
}

#[derive(Debug)]
struct Session {
    user: SessionUser,
    expires: DateTime<Utc>,
}

/// In-memory session table plus the key used to sign remember-me tokens.
#[derive(Clone)]
pub struct SessionStore {
    secret: Arc<Vec<u8>>,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Random secret; remember-me tokens do not survive a restart.
    pub fn new() -> Self {
        let mut secret = vec![0u8; 32];
        rand::rng().fill(&mut secret[..]);
        Self::with_secret(&secret)
    }

    /// Fixed secret (e.g. from `SCOUT_SESSION_SECRET`) so tokens outlive restarts.
    pub fn with_secret(secret: &[u8]) -> Self {
        Self {
            secret: Arc::new(secret.to_vec()),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn create(&self, user: SessionUser) -> String {
        let sid = random_hex(16);
        let now = Utc::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, s| s.expires > now);
        sessions.insert(
            sid.clone(),
            Session {
                user,
                expires: now + Duration::days(SESSION_DAYS),
            },
        );
        sid
    }

    pub fn get(&self, sid: &str) -> Option<SessionUser> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(sid)
            .filter(|s| s.expires > Utc::now())
            .map(|s| s.user.clone())
    }

    pub fn remove(&self, sid: &str) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(sid);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sign(&self, user: &str, nonce: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret[..]);
        hasher.update([0u8]);
        hasher.update(user.as_bytes());
        hasher.update([0u8]);
        hasher.update(nonce.as_bytes());
        to_hex(&hasher.finalize())
    }

    pub fn issue_remember_token(&self, user_id: &str) -> String {
        let nonce = random_hex(16);
        let sig = self.sign(user_id, &nonce);
        format!("{user_id}_{nonce}_{sig}")
    }

    /// User id carried by a correctly signed token.
    pub fn verify_remember_token(&self, token: &str) -> Option<String> {
        let mut parts = token.rsplitn(3, '_');
        let sig = parts.next()?;
        let nonce = parts.next()?;
        let user = parts.next()?;
        if user.is_empty() || nonce.is_empty() {
            return None;
        }
        let expected = self.sign(user, nonce);
        constant_time_eq(expected.as_bytes(), sig.as_bytes()).then(|| user.to_string())
    }
}

/// Byte comparison whose running time does not depend on where the inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill(&mut bytes[..]);
    to_hex(&bytes)
}

/// Value of one cookie from the request headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

pub fn session_cookie(sid: &str) -> String {
    format!(
        "{SESSION_COOKIE}={sid}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_DAYS * 86_400
    )
}

pub fn remember_cookie(token: &str) -> String {
    format!(
        "{REMEMBER_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_DAYS * 86_400
    )
}

pub fn expired_cookie(name: &str) -> String {
    format!("{name}=; Path=/; HttpOnly; Max-Age=0")
}

/// Configured user whose password matches.
pub fn check_credentials(cfg: &GameConfig, username: &str, password: &str) -> Option<SessionUser> {
    let entry = cfg.users.get(username)?;
    if entry.password != password {
        return None;
    }
    let name = if entry.name.is_empty() {
        username.to_string()
    } else {
        entry.name.clone()
    };
    Some(SessionUser {
        id: username.to_string(),
        name,
    })
}

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Existing session, or guest when login is disabled.
    Session(SessionUser),
    /// Session re-created from a remember-me token; the new id must be sent back.
    Restored { user: SessionUser, sid: String },
    Anonymous,
}

pub fn resolve(cfg: &GameConfig, store: &SessionStore, headers: &HeaderMap) -> Resolution {
    if !cfg.server.require_login {
        return Resolution::Session(SessionUser::guest());
    }

    if let Some(user) = cookie_value(headers, SESSION_COOKIE).and_then(|sid| store.get(sid)) {
        return Resolution::Session(user);
    }

    let Some(token) = cookie_value(headers, REMEMBER_COOKIE) else {
        return Resolution::Anonymous;
    };
    let Some(user_id) = store.verify_remember_token(token) else {
        debug!(target: "auth", "rejected remember-me token");
        return Resolution::Anonymous;
    };
    let Some(entry) = cfg.users.get(&user_id) else {
        return Resolution::Anonymous;
    };

    let user = SessionUser {
        name: if entry.name.is_empty() {
            user_id.clone()
        } else {
            entry.name.clone()
        },
        id: user_id,
    };
    let sid = store.create(user.clone());
    info!(target: "auth", user = %user.id, "session restored from remember-me token");
    Resolution::Restored { user, sid }
}
