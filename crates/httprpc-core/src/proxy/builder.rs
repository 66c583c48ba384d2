//! Builder for configuring a ServiceProxy.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use url::Url;

use super::dispatch::{ResultDispatcher, SerialDispatcher};
use super::{ProxyInner, ServiceProxy};
use crate::auth::{
    AuthChallengeHandler, Credential, CredentialContext, DefaultChallengeHandler, TrustPolicy,
};
use crate::config::ProxyConfig;
use crate::error::{Result, RpcError};
use crate::transport::Transport;

/// Builder for configuring a [`ServiceProxy`].
///
/// # Example
///
/// ```rust,ignore
/// use httprpc::{Credential, ServiceProxy, TrustPolicy};
///
/// let proxy = ServiceProxy::builder("https://localhost:8443/httprpc-server-test/test/")
///     .trust_policy(TrustPolicy::AcceptHosts(vec!["localhost".into()]))
///     .credential(Credential::new("tomcat", "tomcat"))
///     .max_concurrent_requests(10)
///     .build()?;
/// ```
pub struct ServiceProxyBuilder {
    base_url: String,
    config: ProxyConfig,
    context: CredentialContext,
    handler: Option<Arc<dyn AuthChallengeHandler>>,
    dispatcher: Option<Arc<dyn ResultDispatcher>>,
}

impl ServiceProxyBuilder {
    /// Create a new builder for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            config: ProxyConfig::default(),
            context: CredentialContext::default(),
            handler: None,
            dispatcher: None,
        }
    }

    /// Replace the whole proxy configuration.
    pub fn config(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    /// Maximum number of requests in flight at once.
    ///
    /// Default: `10`
    pub fn max_concurrent_requests(mut self, limit: usize) -> Self {
        self.config.max_concurrent_requests = limit;
        self
    }

    /// Default per-call timeout.
    ///
    /// Default: none (calls wait for the server indefinitely)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Override the `Accept-Language` header derived from the process locale.
    pub fn accept_language(mut self, language: impl Into<String>) -> Self {
        self.config.accept_language = language.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Replace the whole credential context.
    pub fn credential_context(mut self, context: CredentialContext) -> Self {
        self.context = context;
        self
    }

    /// Credential used to answer basic-auth challenges.
    pub fn credential(mut self, credential: Credential) -> Self {
        self.context = self.context.with_credential(credential);
        self
    }

    /// Policy for certificates that platform validation would reject.
    pub fn trust_policy(mut self, policy: TrustPolicy) -> Self {
        self.context = self.context.with_trust_policy(policy);
        self
    }

    /// Install a custom challenge handler in place of
    /// [`DefaultChallengeHandler`].
    pub fn challenge_handler(mut self, handler: Arc<dyn AuthChallengeHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Install a custom callback delivery context in place of
    /// [`SerialDispatcher`].
    pub fn dispatcher(mut self, dispatcher: Arc<dyn ResultDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Build the proxy.
    ///
    /// Must be called from within a Tokio runtime; invocations are spawned
    /// onto that runtime.
    pub fn build(self) -> Result<ServiceProxy> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RpcError::Config {
            message: "ServiceProxy must be built inside a Tokio runtime".to_string(),
        })?;

        let base_url = Url::parse(&self.base_url).map_err(|e| RpcError::Config {
            message: format!("Invalid base URL '{}': {}", self.base_url, e),
        })?;

        let context = Arc::new(self.context);
        let handler = match self.handler {
            Some(handler) => handler,
            None => Arc::new(DefaultChallengeHandler::new(context.clone())),
        };

        let transport = Transport::new(base_url, &self.config, context, handler)?;

        let dispatcher: Arc<dyn ResultDispatcher> = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => Arc::new(SerialDispatcher::new()?),
        };

        info!(
            "HTTP-RPC proxy for {} ({} request slots)",
            transport.base_url(),
            transport.max_concurrent_requests()
        );

        Ok(ServiceProxy {
            inner: Arc::new(ProxyInner {
                transport,
                dispatcher,
                runtime,
                next_id: AtomicU64::new(1),
            }),
        })
    }
}
