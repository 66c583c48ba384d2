//! HTTP transport for procedure calls.
//!
//! Provides a wrapper around reqwest with:
//! - A fixed number of request slots (additional requests wait for a slot)
//! - Basic-auth challenge handling through an [`AuthChallengeHandler`]
//! - An explicit server-trust decision for the base URL's host
//! - Caching disabled on every request

use crate::auth::{
    AuthChallengeHandler, ChallengeDisposition, Credential, CredentialContext, OriginChallenge,
    ProtectionSpace, ServerTrustChallenge, SessionCredentials, TrustDisposition,
};
use crate::config::{ProxyConfig, TransportConfig};
use crate::encoder::EncodedBody;
use crate::error::{Result, RpcError};
use bytes::Bytes;
use reqwest::header::{
    ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE, PRAGMA, WWW_AUTHENTICATE,
};
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Executes encoded requests against `{base_url}/{procedure}`.
pub struct Transport {
    client: Client,
    base_url: Url,
    permits: Arc<Semaphore>,
    max_concurrent_requests: usize,
    context: Arc<CredentialContext>,
    handler: Arc<dyn AuthChallengeHandler>,
    session: SessionCredentials,
    accept_language: String,
    default_timeout: Option<Duration>,
}

impl Transport {
    /// Create a transport for a base URL.
    ///
    /// For `https` base URLs the handler's server-trust decision for the host
    /// is taken here and applies to every connection the transport opens.
    pub fn new(
        base_url: Url,
        config: &ProxyConfig,
        context: Arc<CredentialContext>,
        handler: Arc<dyn AuthChallengeHandler>,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;

        if config.max_concurrent_requests == 0 {
            return Err(RpcError::Config {
                message: "max_concurrent_requests must be at least 1".to_string(),
            });
        }

        let mut builder = Client::builder().user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        if base_url.scheme() == "https" {
            let challenge = ServerTrustChallenge {
                host: base_url.host_str().unwrap_or_default().to_string(),
                port: base_url.port_or_known_default().unwrap_or(443),
            };
            match handler.resolve_server_trust(&challenge) {
                TrustDisposition::AcceptPresented => {
                    warn!(
                        "Accepting any certificate presented by {}:{} (server trust override)",
                        challenge.host, challenge.port
                    );
                    builder = builder.danger_accept_invalid_certs(true);
                }
                TrustDisposition::PerformDefaultHandling => {
                    debug!(
                        "Using platform certificate validation for {}:{}",
                        challenge.host, challenge.port
                    );
                }
            }
        }

        let client = builder.build().map_err(|e| RpcError::Config {
            message: format!("Failed to create HTTP client: {}", e),
        })?;

        Ok(Self {
            client,
            base_url,
            permits: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            max_concurrent_requests: config.max_concurrent_requests,
            context,
            handler,
            session: SessionCredentials::default(),
            accept_language: config.accept_language.clone(),
            default_timeout: config.request_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn max_concurrent_requests(&self) -> usize {
        self.max_concurrent_requests
    }

    /// Number of request slots currently free.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Compose the endpoint URL for a procedure.
    pub fn endpoint(&self, procedure: &str) -> Result<Url> {
        validate_procedure_name(procedure)?;
        self.base_url
            .join(procedure)
            .map_err(|e| RpcError::Validation {
                field: "procedure".to_string(),
                message: format!("'{}' does not form a valid URL: {}", procedure, e),
            })
    }

    /// Execute a call and return the terminal response.
    ///
    /// `encode` produces the request body once a request slot is held, so
    /// queued calls keep no attachment files open. A streamed body cannot be
    /// replayed, so each authentication retry encodes a fresh one.
    ///
    /// `timeout` (or the transport default) bounds the whole call, including
    /// the wait for a request slot and every challenge round.
    pub async fn execute<F>(
        &self,
        procedure: &str,
        encode: F,
        timeout: Option<Duration>,
    ) -> Result<RawResponse>
    where
        F: FnMut() -> Result<EncodedBody>,
    {
        let url = self.endpoint(procedure)?;

        match timeout.or(self.default_timeout) {
            Some(limit) => tokio::time::timeout(limit, self.exchange(&url, encode))
                .await
                .map_err(|_| {
                    debug!("{} timed out after {:?}", url, limit);
                    RpcError::Timeout(limit)
                })?,
            None => self.exchange(&url, encode).await,
        }
    }

    async fn exchange<F>(
        &self,
        url: &Url,
        mut encode: F,
    ) -> Result<RawResponse>
    where
        F: FnMut() -> Result<EncodedBody>,
    {
        let _permit = self.permits.acquire().await.map_err(|_| RpcError::Transport {
            message: "Request pool has been shut down".to_string(),
            source: None,
        })?;

        let mut credential: Option<Credential> = None;
        let mut challenged_space: Option<ProtectionSpace> = None;
        let mut previous_failure_count = 0u32;
        let mut rounds = 0u32;

        loop {
            let body = encode()?;
            let response = self
                .send(url, body, credential.as_ref())
                .await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                if let (Some(space), Some(accepted)) = (challenged_space, credential.as_ref()) {
                    self.session.remember(space, accepted);
                }
                return read_response(response, url).await;
            }

            let space = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .and_then(|header| ProtectionSpace::from_challenge(url, header));

            let Some(space) = space else {
                debug!("{} answered 401 without a basic challenge", url);
                return read_response(response, url).await;
            };

            if let Some(rejected) = &credential {
                previous_failure_count += 1;
                if self.session.get(&space).as_ref() == Some(rejected) {
                    self.session.forget(&space);
                }
            }

            if rounds >= TransportConfig::MAX_CHALLENGE_ROUNDS {
                warn!(
                    "Giving up on {} after {} authentication rounds",
                    url, rounds
                );
                return read_response(response, url).await;
            }
            rounds += 1;

            let proposed_credential = credential
                .clone()
                .or_else(|| self.session.get(&space))
                .or_else(|| self.context.stored_credential(&space).cloned());

            let challenge = OriginChallenge {
                protection_space: space.clone(),
                proposed_credential,
                previous_failure_count,
            };

            debug!(
                "Basic challenge from {}:{} realm {:?} (previous failures: {})",
                space.host, space.port, space.realm, previous_failure_count
            );

            match self.handler.resolve_origin_challenge(&challenge) {
                ChallengeDisposition::UseCredential(next) => {
                    credential = Some(next);
                    challenged_space = Some(space);
                }
                ChallengeDisposition::PerformDefaultHandling => {
                    debug!("Challenge for {} left unanswered", url);
                    return read_response(response, url).await;
                }
            }
        }
    }

    async fn send(
        &self,
        url: &Url,
        body: EncodedBody,
        credential: Option<&Credential>,
    ) -> Result<Response> {
        let mut request = self
            .client
            .post(url.clone())
            .header(ACCEPT_LANGUAGE, self.accept_language.as_str())
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache");

        if let Some(credential) = credential {
            request = request.basic_auth(credential.user(), Some(credential.password()));
        }

        request = match body {
            EncodedBody::Form(text) => request
                .header(CONTENT_TYPE, crate::encoder::FORM_CONTENT_TYPE)
                .body(text),
            EncodedBody::Multipart(form) => request.multipart(form),
        };

        debug!("POST {}", url);

        request
            .send()
            .await
            .map_err(|e| transport_error(url, e))
    }
}

async fn read_response(response: Response, url: &Url) -> Result<RawResponse> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = response
        .bytes()
        .await
        .map_err(|e| transport_error(url, e))?;

    debug!("{} answered {} ({} bytes)", url, status, body.len());

    Ok(RawResponse {
        status,
        content_type,
        body,
    })
}

fn transport_error(url: &Url, err: reqwest::Error) -> RpcError {
    RpcError::Transport {
        message: format!("POST {} failed: {}", url, err),
        source: Some(err),
    }
}

/// Check a base URL and make sure its path ends with `/` so procedure names
/// resolve beneath it.
pub fn normalize_base_url(mut url: Url) -> Result<Url> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RpcError::Config {
            message: format!("Unsupported base URL scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(RpcError::Config {
            message: format!("Base URL has no host: {}", url),
        });
    }

    url.set_query(None);
    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Check that a procedure name is usable as a relative path.
pub fn validate_procedure_name(name: &str) -> Result<()> {
    let invalid = |message: &str| RpcError::Validation {
        field: "procedure".to_string(),
        message: message.to_string(),
    };

    if name.trim().is_empty() {
        return Err(invalid("procedure name must not be empty"));
    }
    if name.starts_with('/') || name.contains("://") {
        return Err(invalid("procedure name must be a relative path"));
    }
    if name.contains(['?', '#']) {
        return Err(invalid("procedure name must not contain '?' or '#'"));
    }
    if name.split('/').any(|segment| segment == "..") {
        return Err(invalid("procedure name must not leave the base path"));
    }
    Ok(())
}
