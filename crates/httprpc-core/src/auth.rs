//! Authentication challenges: server trust and HTTP basic auth.
//!
//! The [`Transport`](crate::transport::Transport) consults an
//! [`AuthChallengeHandler`] at two points:
//! - once when it is built, to decide whether the base URL's host may present
//!   a certificate that platform validation would reject (self-signed
//!   development servers);
//! - whenever a request is answered with `401` and a `Basic` challenge, to
//!   pick the credential for the next attempt.
//!
//! Credentials are session-scoped at most. Nothing here writes to durable
//! storage.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;
use url::Url;

/// How long a credential that was accepted by the server is remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persistence {
    /// Used for the current request only.
    None,
    /// Remembered for the lifetime of the proxy's transport.
    #[default]
    ForSession,
}

/// A user name and password for basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    user: String,
    password: String,
    persistence: Persistence,
}

impl Credential {
    /// Create a session-scoped credential.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            persistence: Persistence::ForSession,
        }
    }

    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn persistence(&self) -> Persistence {
        self.persistence
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("persistence", &self.persistence)
            .finish()
    }
}

/// The server-side scope a basic-auth challenge applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtectionSpace {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Realm from the challenge. `None` when the server sent none.
    pub realm: Option<String>,
}

impl ProtectionSpace {
    pub fn new(
        scheme: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        realm: Option<&str>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
            realm: realm.map(str::to_string),
        }
    }

    /// Build the protection space for a request URL and a
    /// `WWW-Authenticate` header value.
    ///
    /// Returns `None` unless the header carries a `Basic` challenge.
    pub fn from_challenge(url: &Url, www_authenticate: &str) -> Option<Self> {
        let realm = parse_basic_challenge(www_authenticate)?;
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some(Self::new(url.scheme(), host, port, realm.as_deref()))
    }

    /// The same space without its realm.
    fn without_realm(&self) -> Self {
        Self {
            realm: None,
            ..self.clone()
        }
    }
}

/// Parse a `WWW-Authenticate` value.
///
/// Returns `Some(realm)` for a `Basic` challenge (the realm itself may be
/// absent) and `None` for any other scheme.
pub fn parse_basic_challenge(header: &str) -> Option<Option<String>> {
    let header = header.trim();
    let (scheme, params) = match header.split_once(char::is_whitespace) {
        Some((scheme, params)) => (scheme, params.trim()),
        None => (header, ""),
    };

    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let realm = params.split(',').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("realm") {
            return None;
        }
        Some(value.trim().trim_matches('"').to_string())
    });

    Some(realm)
}

/// Policy for certificates that platform validation would reject.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrustPolicy {
    /// Always use platform validation.
    #[default]
    PlatformDefault,
    /// Accept whatever the server presents. Development only.
    AcceptAny,
    /// Accept whatever the listed hosts present.
    AcceptHosts(Vec<String>),
}

/// A TLS server-trust evaluation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTrustChallenge {
    pub host: String,
    pub port: u16,
}

/// Answer to a [`ServerTrustChallenge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDisposition {
    /// Trust the certificate the server presents.
    AcceptPresented,
    /// Fall back to platform validation.
    PerformDefaultHandling,
}

/// A basic-auth challenge raised by a `401` response.
#[derive(Debug, Clone)]
pub struct OriginChallenge {
    pub protection_space: ProtectionSpace,
    /// Credential that was just rejected, or the stored credential for this
    /// space on the first round.
    pub proposed_credential: Option<Credential>,
    /// Number of rejected credentials so far in this invocation.
    pub previous_failure_count: u32,
}

/// Answer to an [`OriginChallenge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeDisposition {
    /// Retry the request with this credential.
    UseCredential(Credential),
    /// Stop answering; the `401` is reported to the caller.
    PerformDefaultHandling,
}

/// Capability the transport invokes when a challenge arrives.
pub trait AuthChallengeHandler: Send + Sync {
    fn resolve_server_trust(&self, challenge: &ServerTrustChallenge) -> TrustDisposition;

    fn resolve_origin_challenge(&self, challenge: &OriginChallenge) -> ChallengeDisposition;
}

/// Process-wide credential configuration.
///
/// Built once before the first call and read concurrently afterwards; it is
/// shared behind an `Arc` and has no interior mutability.
#[derive(Debug, Clone, Default)]
pub struct CredentialContext {
    trust_policy: TrustPolicy,
    credential: Option<Credential>,
    stored: HashMap<ProtectionSpace, Credential>,
}

impl CredentialContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trust_policy(mut self, policy: TrustPolicy) -> Self {
        self.trust_policy = policy;
        self
    }

    /// Credential substituted when a challenge cannot be answered with the
    /// proposed one.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Default credential for a protection space. It is proposed on the first
    /// challenge for that space. A space without a realm matches any realm on
    /// the same scheme, host and port.
    pub fn with_stored_credential(mut self, space: ProtectionSpace, credential: Credential) -> Self {
        self.stored.insert(space, credential);
        self
    }

    pub fn trust_policy(&self) -> &TrustPolicy {
        &self.trust_policy
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn stored_credential(&self, space: &ProtectionSpace) -> Option<&Credential> {
        self.stored
            .get(space)
            .or_else(|| self.stored.get(&space.without_realm()))
    }

    /// Check whether a host's presented certificate should be accepted.
    pub fn trusts_host(&self, host: &str) -> bool {
        match &self.trust_policy {
            TrustPolicy::PlatformDefault => false,
            TrustPolicy::AcceptAny => true,
            TrustPolicy::AcceptHosts(hosts) => hosts.iter().any(|h| h.eq_ignore_ascii_case(host)),
        }
    }
}

/// Challenge handler driven by a [`CredentialContext`].
///
/// Origin challenges are answered at most once per distinct credential:
/// a proposed credential is reused on the first round, the configured
/// credential is substituted on the first or second round unless it is the
/// one that just failed, and anything after that falls through to default
/// handling.
#[derive(Debug, Clone)]
pub struct DefaultChallengeHandler {
    context: Arc<CredentialContext>,
}

impl DefaultChallengeHandler {
    pub fn new(context: Arc<CredentialContext>) -> Self {
        Self { context }
    }
}

impl AuthChallengeHandler for DefaultChallengeHandler {
    fn resolve_server_trust(&self, challenge: &ServerTrustChallenge) -> TrustDisposition {
        if self.context.trusts_host(&challenge.host) {
            TrustDisposition::AcceptPresented
        } else {
            TrustDisposition::PerformDefaultHandling
        }
    }

    fn resolve_origin_challenge(&self, challenge: &OriginChallenge) -> ChallengeDisposition {
        if challenge.previous_failure_count == 0 {
            if let Some(proposed) = &challenge.proposed_credential {
                debug!(
                    "Reusing proposed credential for user '{}'",
                    proposed.user()
                );
                return ChallengeDisposition::UseCredential(proposed.clone());
            }
        }

        if challenge.previous_failure_count <= 1 {
            if let Some(configured) = self.context.credential() {
                if challenge.proposed_credential.as_ref() != Some(configured) {
                    debug!(
                        "Substituting configured credential for user '{}'",
                        configured.user()
                    );
                    return ChallengeDisposition::UseCredential(
                        configured.clone().with_persistence(Persistence::ForSession),
                    );
                }
            }
        }

        ChallengeDisposition::PerformDefaultHandling
    }
}

/// Credentials accepted during this session, per protection space.
#[derive(Debug, Default)]
pub(crate) struct SessionCredentials {
    inner: RwLock<HashMap<ProtectionSpace, Credential>>,
}

impl SessionCredentials {
    pub(crate) fn get(&self, space: &ProtectionSpace) -> Option<Credential> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(space).cloned()
    }

    /// Remember a credential the server accepted, if its persistence allows.
    pub(crate) fn remember(&self, space: ProtectionSpace, credential: &Credential) {
        if credential.persistence() != Persistence::ForSession {
            return;
        }
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.insert(space, credential.clone());
    }

    pub(crate) fn forget(&self, space: &ProtectionSpace) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.remove(space);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> ProtectionSpace {
        ProtectionSpace::new("https", "localhost", 8443, Some("tomcat"))
    }

    fn handler(context: CredentialContext) -> DefaultChallengeHandler {
        DefaultChallengeHandler::new(Arc::new(context))
    }

    fn challenge(proposed: Option<Credential>, failures: u32) -> OriginChallenge {
        OriginChallenge {
            protection_space: space(),
            proposed_credential: proposed,
            previous_failure_count: failures,
        }
    }

    #[test]
    fn test_parse_basic_challenge() {
        assert_eq!(
            parse_basic_challenge(r#"Basic realm="tomcat""#),
            Some(Some("tomcat".to_string()))
        );
        assert_eq!(
            parse_basic_challenge(r#"basic charset="UTF-8", realm="my realm""#),
            Some(Some("my realm".to_string()))
        );
        assert_eq!(parse_basic_challenge("Basic"), Some(None));
        assert_eq!(parse_basic_challenge(r#"Digest realm="x", nonce="y""#), None);
        assert_eq!(parse_basic_challenge("Bearer"), None);
    }

    #[test]
    fn test_protection_space_from_challenge() {
        let url = Url::parse("https://localhost:8443/httprpc-server-test/test/getUserName").unwrap();
        let space = ProtectionSpace::from_challenge(&url, r#"Basic realm="tomcat""#).unwrap();
        assert_eq!(space, self::space());

        let url = Url::parse("http://example.com/rpc/add").unwrap();
        let space = ProtectionSpace::from_challenge(&url, "Basic").unwrap();
        assert_eq!(space.port, 80);
        assert_eq!(space.realm, None);

        assert!(ProtectionSpace::from_challenge(&url, "Negotiate").is_none());
    }

    #[test]
    fn test_credential_debug_redacts_password() {
        let debug = format!("{:?}", Credential::new("tomcat", "secret"));
        assert!(debug.contains("tomcat"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_server_trust_policy() {
        let challenge = ServerTrustChallenge {
            host: "localhost".into(),
            port: 8443,
        };

        let default = handler(CredentialContext::new());
        assert_eq!(
            default.resolve_server_trust(&challenge),
            TrustDisposition::PerformDefaultHandling
        );

        let any = handler(CredentialContext::new().with_trust_policy(TrustPolicy::AcceptAny));
        assert_eq!(
            any.resolve_server_trust(&challenge),
            TrustDisposition::AcceptPresented
        );

        let hosts = handler(
            CredentialContext::new()
                .with_trust_policy(TrustPolicy::AcceptHosts(vec!["LOCALHOST".into()])),
        );
        assert_eq!(
            hosts.resolve_server_trust(&challenge),
            TrustDisposition::AcceptPresented
        );
        let other = ServerTrustChallenge {
            host: "example.com".into(),
            port: 443,
        };
        assert_eq!(
            hosts.resolve_server_trust(&other),
            TrustDisposition::PerformDefaultHandling
        );
    }

    #[test]
    fn test_proposed_credential_reused_on_first_round() {
        let stored = Credential::new("tomcatx", "tomcat");
        let configured = Credential::new("tomcat", "tomcat");
        let handler = handler(CredentialContext::new().with_credential(configured));

        assert_eq!(
            handler.resolve_origin_challenge(&challenge(Some(stored.clone()), 0)),
            ChallengeDisposition::UseCredential(stored)
        );
    }

    #[test]
    fn test_configured_credential_substituted_after_failure() {
        let stored = Credential::new("tomcatx", "tomcat");
        let configured = Credential::new("tomcat", "tomcat");
        let handler = handler(CredentialContext::new().with_credential(configured.clone()));

        assert_eq!(
            handler.resolve_origin_challenge(&challenge(Some(stored), 1)),
            ChallengeDisposition::UseCredential(configured.clone())
        );
        assert_eq!(
            handler.resolve_origin_challenge(&challenge(None, 0)),
            ChallengeDisposition::UseCredential(configured)
        );
    }

    #[test]
    fn test_failed_configured_credential_falls_through() {
        let configured = Credential::new("tomcat", "wrong");
        let handler = handler(CredentialContext::new().with_credential(configured.clone()));

        assert_eq!(
            handler.resolve_origin_challenge(&challenge(Some(configured), 1)),
            ChallengeDisposition::PerformDefaultHandling
        );
        assert_eq!(
            handler.resolve_origin_challenge(&challenge(None, 2)),
            ChallengeDisposition::PerformDefaultHandling
        );
    }

    #[test]
    fn test_no_credentials_falls_through() {
        let stored = Credential::new("tomcatx", "tomcat");
        let handler = handler(CredentialContext::new());

        assert_eq!(
            handler.resolve_origin_challenge(&challenge(None, 0)),
            ChallengeDisposition::PerformDefaultHandling
        );
        assert_eq!(
            handler.resolve_origin_challenge(&challenge(Some(stored), 1)),
            ChallengeDisposition::PerformDefaultHandling
        );
    }

    #[test]
    fn test_stored_credential_lookup() {
        let wildcard = ProtectionSpace::new("https", "localhost", 8443, None);
        let context = CredentialContext::new()
            .with_stored_credential(wildcard, Credential::new("any", "realm"));
        assert_eq!(
            context.stored_credential(&space()).map(Credential::user),
            Some("any")
        );

        let context = context.with_stored_credential(space(), Credential::new("exact", "realm"));
        assert_eq!(
            context.stored_credential(&space()).map(Credential::user),
            Some("exact")
        );

        let elsewhere = ProtectionSpace::new("https", "example.com", 443, Some("tomcat"));
        assert!(context.stored_credential(&elsewhere).is_none());
    }

    #[test]
    fn test_session_credentials_respect_persistence() {
        let session = SessionCredentials::default();
        session.remember(
            space(),
            &Credential::new("once", "pw").with_persistence(Persistence::None),
        );
        assert!(session.get(&space()).is_none());

        session.remember(space(), &Credential::new("tomcat", "tomcat"));
        assert_eq!(session.get(&space()).unwrap().user(), "tomcat");

        session.forget(&space());
        assert!(session.get(&space()).is_none());
    }
}
