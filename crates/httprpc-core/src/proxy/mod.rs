//! The invocation facade.
//!
//! A [`ServiceProxy`] turns a procedure name plus arguments and attachments
//! into one HTTP exchange against `base URL + procedure name` and hands back
//! the decoded outcome. Results arrive either by awaiting [`ServiceProxy::call`]
//! or through a callback passed to [`ServiceProxy::invoke`], which runs exactly
//! once in the proxy's delivery context.

mod builder;
mod dispatch;

pub use builder::ServiceProxyBuilder;
pub use dispatch::{InlineDispatcher, Job, ResultDispatcher, SerialDispatcher};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};
use url::Url;

use crate::arguments::Arguments;
use crate::attachment::{Attachment, Attachments};
use crate::decoder;
use crate::encoder;
use crate::error::{Result, RpcError};
use crate::transport::{self, Transport};
use crate::value::Value;

/// Client for one HTTP-RPC service.
///
/// Cheap to clone; clones share the request pool, the session credentials
/// and the delivery context.
#[derive(Clone)]
pub struct ServiceProxy {
    inner: Arc<ProxyInner>,
}

struct ProxyInner {
    transport: Transport,
    dispatcher: Arc<dyn ResultDispatcher>,
    runtime: Handle,
    next_id: AtomicU64,
}

impl ServiceProxy {
    /// Start configuring a proxy for a base URL.
    pub fn builder(base_url: impl Into<String>) -> ServiceProxyBuilder {
        ServiceProxyBuilder::new(base_url)
    }

    /// Create a proxy with default settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        ServiceProxyBuilder::new(base_url).build()
    }

    /// Base URL procedures are resolved against (always ends with `/`).
    pub fn base_url(&self) -> &Url {
        self.inner.transport.base_url()
    }

    pub fn max_concurrent_requests(&self) -> usize {
        self.inner.transport.max_concurrent_requests()
    }

    /// Number of request slots currently free.
    pub fn available_slots(&self) -> usize {
        self.inner.transport.available_slots()
    }

    /// Start building a single invocation.
    pub fn request(&self, procedure: impl Into<String>) -> InvocationBuilder {
        InvocationBuilder {
            proxy: self.clone(),
            procedure: procedure.into(),
            arguments: Arguments::new(),
            attachments: Attachments::new(),
            timeout: None,
        }
    }

    /// Invoke a procedure and wait for its outcome.
    ///
    /// `Ok(None)` means the procedure produced no value; `Ok(Some(Value::Null))`
    /// means it explicitly returned null.
    pub async fn call(
        &self,
        procedure: &str,
        arguments: &Arguments,
        attachments: &Attachments,
    ) -> Result<Option<Value>> {
        self.inner
            .execute(procedure, arguments, attachments, None)
            .await
    }

    /// Invoke a procedure and deliver its outcome to `callback`.
    ///
    /// Returns immediately. The callback runs exactly once, in the proxy's
    /// delivery context, whether the call succeeds or fails.
    pub fn invoke<F>(
        &self,
        procedure: impl Into<String>,
        arguments: Arguments,
        attachments: Attachments,
        callback: F,
    ) where
        F: FnOnce(Result<Option<Value>>) + Send + 'static,
    {
        self.inner
            .clone()
            .spawn(procedure.into(), arguments, attachments, None, callback);
    }
}

impl ProxyInner {
    fn spawn<F>(
        self: Arc<Self>,
        procedure: String,
        arguments: Arguments,
        attachments: Attachments,
        timeout: Option<Duration>,
        callback: F,
    ) where
        F: FnOnce(Result<Option<Value>>) + Send + 'static,
    {
        let delivery = Delivery {
            callback: Some(callback),
            dispatcher: self.dispatcher.clone(),
        };

        let runtime = self.runtime.clone();
        runtime.spawn(async move {
            let result = self
                .execute(&procedure, &arguments, &attachments, timeout)
                .await;
            delivery.deliver(result);
        });
    }

    async fn execute(
        &self,
        procedure: &str,
        arguments: &Arguments,
        attachments: &Attachments,
        timeout: Option<Duration>,
    ) -> Result<Option<Value>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        transport::validate_procedure_name(procedure)?;

        debug!(
            "Invocation #{} {} ({} arguments, {} attachments)",
            id,
            procedure,
            arguments.len(),
            attachments.len()
        );

        // Encoding runs once a request slot is held and fails before any
        // request is issued.
        let response = self
            .transport
            .execute(
                procedure,
                || encoder::encode(arguments, attachments),
                timeout,
            )
            .await;

        let outcome = response.and_then(|raw| {
            decoder::decode_response(raw.status, raw.content_type.as_deref(), &raw.body)
        });

        match &outcome {
            Ok(Some(value)) => debug!("Invocation #{} returned {}", id, value.type_name()),
            Ok(None) => debug!("Invocation #{} returned no value", id),
            Err(e) => debug!("Invocation #{} failed: {}", id, e),
        }

        outcome
    }
}

/// Owns an invocation's callback until it has been handed to the dispatcher.
///
/// If the invocation task is dropped before finishing (runtime shutdown,
/// panic) the callback still runs once, with a transport error.
struct Delivery<F>
where
    F: FnOnce(Result<Option<Value>>) + Send + 'static,
{
    callback: Option<F>,
    dispatcher: Arc<dyn ResultDispatcher>,
}

impl<F> Delivery<F>
where
    F: FnOnce(Result<Option<Value>>) + Send + 'static,
{
    fn deliver(mut self, result: Result<Option<Value>>) {
        if let Some(callback) = self.callback.take() {
            self.dispatcher.dispatch(Box::new(move || callback(result)));
        }
    }
}

impl<F> Drop for Delivery<F>
where
    F: FnOnce(Result<Option<Value>>) + Send + 'static,
{
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            warn!("Invocation abandoned before completion");
            let error = RpcError::Transport {
                message: "invocation abandoned before completion".to_string(),
                source: None,
            };
            self.dispatcher
                .dispatch(Box::new(move || callback(Err(error))));
        }
    }
}

/// A single invocation being assembled.
///
/// ```rust,ignore
/// let sum = proxy
///     .request("add")
///     .argument("a", 2)
///     .argument("b", 4)
///     .call()
///     .await?;
/// ```
#[must_use = "an invocation does nothing until call() or submit() is used"]
pub struct InvocationBuilder {
    proxy: ServiceProxy,
    procedure: String,
    arguments: Arguments,
    attachments: Attachments,
    timeout: Option<Duration>,
}

impl InvocationBuilder {
    /// Set a named argument, replacing any earlier value for the name.
    pub fn argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name, value);
        self
    }

    /// Set every argument at once.
    pub fn arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = arguments;
        self
    }

    /// Add an attachment under a parameter name. Repeated names accumulate.
    pub fn attach(mut self, name: impl Into<String>, attachment: Attachment) -> Self {
        self.attachments.add(name, attachment);
        self
    }

    /// Time limit for this call, overriding the proxy default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run the invocation and wait for its outcome.
    pub async fn call(self) -> Result<Option<Value>> {
        self.proxy
            .inner
            .execute(
                &self.procedure,
                &self.arguments,
                &self.attachments,
                self.timeout,
            )
            .await
    }

    /// Run the invocation in the background and deliver the outcome to
    /// `callback` in the proxy's delivery context.
    pub fn submit<F>(self, callback: F)
    where
        F: FnOnce(Result<Option<Value>>) + Send + 'static,
    {
        self.proxy.inner.clone().spawn(
            self.procedure,
            self.arguments,
            self.attachments,
            self.timeout,
            callback,
        );
    }
}
