// crates/aqualab-api/src/auth.rs
// ============================================================================
// Module: Identity Resolution
// Description: Bearer token decoding, caching, and role confirmation.
// Purpose: Turn an Authorization header into a confirmed caller identity.
// Dependencies: aqualab-config, aqualab-core, base64, serde_json
// ============================================================================

//! ## Overview
//! Tokens are JWTs issued by the user service. Signatures are not verified
//! here; trust is delegated to the issuer and to a role confirmation against
//! the user directory. Resolved identities are cached by raw token string in
//! an injected [`TokenCache`] so repeated requests skip the directory call.
//! Revocation evicts a token immediately.
//! Security posture: headers and claims are untrusted input; every failure
//! is fail-closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use aqualab_config::RoleConfirmation;
use aqualab_core::Identity;
use aqualab_core::Permission;
use aqualab_core::RoleClaim;
use aqualab_core::Timestamp;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::directory::DirectoryError;
use crate::directory::UserDirectory;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of the Authorization header.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identity resolution failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing, invalid, expired, or unconfirmed credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// The role confirmation call could not be completed.
    #[error("identity confirmation unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// SECTION: Claims
// ============================================================================

/// Claims carried in the token payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// User identifier.
    #[serde(rename = "userId", alias = "id", default)]
    pub user_id: Option<Value>,
    /// Document number, string or numeric.
    #[serde(default)]
    pub documento: Option<Value>,
    /// Display name.
    #[serde(default)]
    pub nombre: Option<String>,
    /// Role in either upstream shape.
    pub rol: RoleClaim,
    /// Permission tokens.
    #[serde(default)]
    pub permisos: Option<Vec<String>>,
    /// Expiry in seconds since the epoch.
    #[serde(default)]
    pub exp: Option<i64>,
}

impl TokenClaims {
    /// Decodes the payload segment of a JWT.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] when the token is not three
    /// dot-separated segments or the payload is not base64url JSON.
    pub fn decode(token: &str) -> Result<Self, AuthError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [_, payload, _] = segments.as_slice() else {
            return Err(invalid_token());
        };
        let bytes =
            URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).map_err(|_| invalid_token())?;
        serde_json::from_slice(&bytes).map_err(|_| invalid_token())
    }

    /// Returns the expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.exp.map(|seconds| Timestamp::from_unix_millis(seconds.saturating_mul(1000)))
    }

    /// Builds an identity from the claims.
    ///
    /// Permissions come from `permisos` when present (unknown tokens are
    /// ignored), otherwise from the role table.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] when the user id or document is
    /// missing or the role is unknown.
    pub fn into_identity(self) -> Result<Identity, AuthError> {
        let role = self.rol.normalize().map_err(|err| AuthError::Unauthenticated(err.to_string()))?;
        let user_id = self
            .user_id
            .as_ref()
            .and_then(scalar_text)
            .filter(|id| !id.is_empty())
            .ok_or_else(invalid_token)?;
        let document = self
            .documento
            .as_ref()
            .and_then(scalar_text)
            .filter(|document| !document.is_empty())
            .ok_or_else(invalid_token)?;
        let expires_at = self.expires_at();
        let mut identity = Identity::with_role_permissions(user_id, document, role);
        if let Some(tokens) = &self.permisos {
            identity.permissions =
                tokens.iter().filter_map(|token| Permission::parse(token)).collect();
        }
        identity.name = self.nombre.filter(|name| !name.trim().is_empty());
        identity.expires_at = expires_at;
        Ok(identity)
    }
}

/// Generic rejection for malformed tokens.
fn invalid_token() -> AuthError {
    AuthError::Unauthenticated("invalid token".to_string())
}

/// Renders a string or number claim as text.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Extracts the token from a `Bearer` Authorization header.
///
/// # Errors
///
/// Returns [`AuthError::Unauthenticated`] when the header is absent,
/// oversized, or not a bearer credential.
pub fn parse_bearer_token(auth_header: Option<&str>) -> Result<String, AuthError> {
    let header = auth_header
        .ok_or_else(|| AuthError::Unauthenticated("missing authorization token".to_string()))?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::Unauthenticated("authorization header too large".to_string()));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Unauthenticated("missing authorization token".to_string()));
    }
    Ok(token.to_string())
}

// ============================================================================
// SECTION: Token Cache
// ============================================================================

/// Cache of resolved identities keyed by raw token.
pub trait TokenCache: Send + Sync {
    /// Returns the cached identity when still fresh at `now`.
    fn get(&self, token: &str, now: Timestamp) -> Option<Identity>;

    /// Caches `identity` for `token`.
    fn insert(&self, token: &str, identity: &Identity, now: Timestamp);

    /// Evicts `token`.
    fn revoke(&self, token: &str);

    /// Evicts every token.
    fn clear(&self);
}

/// Cached identity with its eviction time.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Resolved identity.
    identity: Identity,
    /// First instant at which the entry is stale.
    expires_at: Timestamp,
}

/// Bounded in-memory token cache.
///
/// # Invariants
/// - Entries never outlive their token's own expiry.
/// - At most `max_entries` entries are retained.
pub struct InMemoryTokenCache {
    /// Time-to-live in milliseconds; zero disables caching.
    ttl_ms: i64,
    /// Maximum retained entries.
    max_entries: usize,
    /// Entries by token.
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryTokenCache {
    /// Creates a cache with the given TTL and capacity.
    #[must_use]
    pub fn new(ttl_secs: u64, max_entries: usize) -> Self {
        Self {
            ttl_ms: i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX),
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or_default()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenCache for InMemoryTokenCache {
    fn get(&self, token: &str, now: Timestamp) -> Option<Identity> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(token) {
            Some(entry) if entry.expires_at > now => Some(entry.identity.clone()),
            Some(_) => {
                entries.remove(token);
                None
            }
            None => None,
        }
    }

    fn insert(&self, token: &str, identity: &Identity, now: Timestamp) {
        if self.ttl_ms == 0 || self.max_entries == 0 {
            return;
        }
        let mut expires_at =
            Timestamp::from_unix_millis(now.as_unix_millis().saturating_add(self.ttl_ms));
        if let Some(token_expiry) = identity.expires_at {
            expires_at = expires_at.min(token_expiry);
        }
        if expires_at <= now {
            return;
        }
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if !entries.contains_key(token) && entries.len() >= self.max_entries {
            entries.retain(|_, entry| entry.expires_at > now);
            while entries.len() >= self.max_entries {
                let Some(victim) = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(key, _)| key.clone())
                else {
                    break;
                };
                entries.remove(&victim);
            }
        }
        entries.insert(
            token.to_string(),
            CacheEntry {
                identity: identity.clone(),
                expires_at,
            },
        );
    }

    fn revoke(&self, token: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(token);
        }
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct Caller {
    /// Resolved identity.
    pub identity: Identity,
    /// Raw bearer token, forwarded to the user directory.
    pub token: String,
}

/// Resolves bearer tokens into confirmed identities.
#[derive(Clone)]
pub struct IdentityResolver {
    /// Resolved identity cache.
    cache: Arc<dyn TokenCache>,
    /// User directory used for role confirmation.
    directory: Arc<dyn UserDirectory>,
    /// Confirmation mode.
    confirmation: RoleConfirmation,
}

impl IdentityResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(
        cache: Arc<dyn TokenCache>,
        directory: Arc<dyn UserDirectory>,
        confirmation: RoleConfirmation,
    ) -> Self {
        Self {
            cache,
            directory,
            confirmation,
        }
    }

    /// Resolves the Authorization header into a caller.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] when the token is absent,
    /// undecodable, expired, or not confirmed by the directory, and
    /// [`AuthError::Unavailable`] when the directory cannot be reached.
    pub async fn resolve(
        &self,
        auth_header: Option<&str>,
        now: Timestamp,
    ) -> Result<Caller, AuthError> {
        let token = parse_bearer_token(auth_header)?;
        if let Some(identity) = self.cache.get(&token, now) {
            return Ok(Caller {
                identity,
                token,
            });
        }
        let identity = TokenClaims::decode(&token)?.into_identity()?;
        if identity.expires_at.is_some_and(|expiry| expiry <= now) {
            return Err(AuthError::Unauthenticated("token expired".to_string()));
        }
        if self.confirmation == RoleConfirmation::Directory {
            match self.directory.confirm_user(&identity.user_id, identity.role, &token).await {
                Ok(true) => {}
                Ok(false) | Err(DirectoryError::Rejected(_)) => {
                    return Err(AuthError::Unauthenticated("user not authorized".to_string()));
                }
                Err(DirectoryError::Unavailable(message)) => {
                    return Err(AuthError::Unavailable(message));
                }
            }
        }
        self.cache.insert(&token, &identity, now);
        Ok(Caller {
            identity,
            token,
        })
    }

    /// Evicts `token` from the cache.
    pub fn revoke(&self, token: &str) {
        self.cache.revoke(token);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use std::sync::Arc;

    use aqualab_config::RoleConfirmation;
    use aqualab_core::DirectoryUser;
    use aqualab_core::Identity;
    use aqualab_core::Permission;
    use aqualab_core::Role;
    use aqualab_core::Timestamp;
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::Value;
    use serde_json::json;

    use super::AuthError;
    use super::IdentityResolver;
    use super::InMemoryTokenCache;
    use super::TokenCache;
    use super::TokenClaims;
    use super::parse_bearer_token;
    use crate::directory::StaticUserDirectory;
    use crate::directory::UserDirectory;

    const NOW_MS: i64 = 1_709_280_000_000;

    fn now() -> Timestamp {
        Timestamp::from_unix_millis(NOW_MS)
    }

    fn token(claims: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        format!("{header}.{payload}.c2lnbmF0dXJl")
    }

    fn technician_claims() -> Value {
        json!({
            "userId": "u-3003",
            "documento": "3003",
            "nombre": "Tecnico",
            "rol": {"name": "Laboratorista"},
            "exp": NOW_MS / 1000 + 3600
        })
    }

    fn directory() -> Arc<StaticUserDirectory> {
        Arc::new(StaticUserDirectory::new(vec![DirectoryUser {
            id: "u-3003".to_string(),
            document: "3003".to_string(),
            name: None,
            email: None,
            role: Role::Laboratorista,
        }]))
    }

    fn resolver(
        directory: Arc<StaticUserDirectory>,
        cache: Arc<InMemoryTokenCache>,
    ) -> IdentityResolver {
        IdentityResolver::new(cache, directory, RoleConfirmation::Directory)
    }

    #[test]
    fn bearer_header_is_parsed_case_insensitively() {
        assert_eq!(parse_bearer_token(Some("bearer abc")).unwrap(), "abc");
        assert!(parse_bearer_token(None).is_err());
        assert!(parse_bearer_token(Some("Basic abc")).is_err());
        assert!(parse_bearer_token(Some("Bearer ")).is_err());
        let oversized = format!("Bearer {}", "a".repeat(9 * 1024));
        assert!(parse_bearer_token(Some(&oversized)).is_err());
    }

    #[test]
    fn claims_fall_back_to_role_permissions() {
        let claims = TokenClaims::decode(&token(&technician_claims())).unwrap();
        let identity = claims.into_identity().unwrap();
        assert_eq!(identity.role, Role::Laboratorista);
        assert_eq!(identity.name.as_deref(), Some("Tecnico"));
        assert!(identity.permissions.contains(&Permission::VerificarResultados));
        assert_eq!(identity.expires_at.unwrap().as_unix_millis(), NOW_MS + 3_600_000);
    }

    #[test]
    fn explicit_permission_claims_win_and_unknown_tokens_are_dropped() {
        let claims = json!({
            "userId": 9,
            "documento": 1001,
            "rol": "administrador",
            "permisos": ["ver_muestras", "volar"]
        });
        let identity = TokenClaims::decode(&token(&claims)).unwrap().into_identity().unwrap();
        assert_eq!(identity.user_id, "9");
        assert_eq!(identity.document, "1001");
        assert_eq!(identity.permissions.len(), 1);
        assert!(identity.permissions.contains(&Permission::VerMuestras));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(TokenClaims::decode("abc").is_err());
        assert!(TokenClaims::decode("a.!!!.c").is_err());
        let unknown_role = json!({"userId": "u1", "documento": "1", "rol": "auditor"});
        assert!(TokenClaims::decode(&token(&unknown_role)).unwrap().into_identity().is_err());
        let no_document = json!({"userId": "u1", "rol": "cliente"});
        assert!(TokenClaims::decode(&token(&no_document)).unwrap().into_identity().is_err());
    }

    #[test]
    fn cache_honors_ttl_and_token_expiry() {
        let cache = InMemoryTokenCache::new(300, 10);
        let mut identity = Identity::with_role_permissions("u1", "1", Role::Cliente);
        cache.insert("long", &identity, now());
        assert!(cache.get("long", Timestamp::from_unix_millis(NOW_MS + 299_000)).is_some());
        assert!(cache.get("long", Timestamp::from_unix_millis(NOW_MS + 300_000)).is_none());

        identity.expires_at = Some(Timestamp::from_unix_millis(NOW_MS + 10_000));
        cache.insert("short", &identity, now());
        assert!(cache.get("short", Timestamp::from_unix_millis(NOW_MS + 10_000)).is_none());
    }

    #[test]
    fn cache_evicts_soonest_expiring_when_full() {
        let cache = InMemoryTokenCache::new(300, 2);
        let mut identity = Identity::with_role_permissions("u1", "1", Role::Cliente);
        identity.expires_at = Some(Timestamp::from_unix_millis(NOW_MS + 5_000));
        cache.insert("soon", &identity, now());
        identity.expires_at = None;
        cache.insert("later", &identity, now());
        cache.insert("newest", &identity, now());
        assert_eq!(cache.len(), 2);
        assert!(cache.get("soon", now()).is_none());
        assert!(cache.get("later", now()).is_some());
        assert!(cache.get("newest", now()).is_some());
    }

    #[test]
    fn zero_ttl_disables_caching() {
        let cache = InMemoryTokenCache::new(0, 10);
        cache.insert("t", &Identity::with_role_permissions("u1", "1", Role::Cliente), now());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn resolver_confirms_then_serves_from_cache() {
        let directory = directory();
        let cache = Arc::new(InMemoryTokenCache::new(300, 10));
        let resolver = resolver(Arc::clone(&directory), Arc::clone(&cache));
        let bearer = token(&technician_claims());
        let header = format!("Bearer {bearer}");

        let caller = resolver.resolve(Some(&header), now()).await.unwrap();
        assert_eq!(caller.identity.document, "3003");
        assert_eq!(caller.token, bearer);
        assert_eq!(cache.len(), 1);

        resolver.revoke(&bearer);
        assert!(cache.is_empty());
        directory.revoke_token(&bearer).await.unwrap();
        let err = resolver.resolve(Some(&header), now()).await.unwrap_err();
        assert!(
            matches!(err, AuthError::Unauthenticated(message) if message == "user not authorized")
        );
    }

    #[tokio::test]
    async fn resolver_rejects_expired_and_unconfirmed_tokens() {
        let resolver = resolver(directory(), Arc::new(InMemoryTokenCache::new(300, 10)));
        let mut claims = technician_claims();
        claims["exp"] = json!(NOW_MS / 1000 - 1);
        let header = format!("Bearer {}", token(&claims));
        let err = resolver.resolve(Some(&header), now()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated(message) if message == "token expired"));

        let stranger = json!({"userId": "u-9", "documento": "9", "rol": "laboratorista"});
        let header = format!("Bearer {}", token(&stranger));
        let err = resolver.resolve(Some(&header), now()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn unavailable_directory_is_not_an_authentication_failure() {
        let resolver = IdentityResolver::new(
            Arc::new(InMemoryTokenCache::new(300, 10)),
            Arc::new(StaticUserDirectory::unavailable()),
            RoleConfirmation::Directory,
        );
        let header = format!("Bearer {}", token(&technician_claims()));
        let err = resolver.resolve(Some(&header), now()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unavailable(_)));

        let claims_only = IdentityResolver::new(
            Arc::new(InMemoryTokenCache::new(300, 10)),
            Arc::new(StaticUserDirectory::unavailable()),
            RoleConfirmation::Claims,
        );
        assert!(claims_only.resolve(Some(&header), now()).await.is_ok());
    }
}
