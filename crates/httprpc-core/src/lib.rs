//! HTTP-RPC client - invoke remote procedures over plain HTTP.
//!
//! A procedure is addressed by name relative to a base URL. Arguments travel
//! as form fields (or multipart parts when files are attached) and results come
//! back as JSON, decoded into the dynamic [`Value`] model.
//!
//! # Example
//!
//! ```rust,ignore
//! use httprpc::{Arguments, Attachments, ServiceProxy};
//!
//! #[tokio::main]
//! async fn main() -> httprpc::Result<()> {
//!     let proxy = ServiceProxy::new("http://localhost:8080/httprpc-server-test/test/")?;
//!
//!     let args = Arguments::new().with("a", 2).with("b", 4);
//!     let sum = proxy.call("add", &args, &Attachments::new()).await?;
//!     println!("2 + 4 = {:?}", sum);
//!
//!     // Callback style; runs once on the proxy's delivery thread
//!     proxy.invoke("getVoid", Arguments::new(), Attachments::new(), |result| {
//!         assert!(matches!(result, Ok(None)));
//!     });
//!
//!     Ok(())
//! }
//! ```

pub mod arguments;
pub mod attachment;
pub mod auth;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod proxy;
pub mod transport;
pub mod value;

// Re-export commonly used types
pub use arguments::Arguments;
pub use attachment::{Attachment, AttachmentSource, Attachments};
pub use auth::{
    AuthChallengeHandler, ChallengeDisposition, Credential, CredentialContext,
    DefaultChallengeHandler, OriginChallenge, Persistence, ProtectionSpace, ServerTrustChallenge,
    TrustDisposition, TrustPolicy,
};
pub use config::{ProxyConfig, TransportConfig};
pub use encoder::EncodedBody;
pub use error::{ErrorKind, Result, RpcError};
pub use proxy::{
    InlineDispatcher, InvocationBuilder, ResultDispatcher, SerialDispatcher, ServiceProxy,
    ServiceProxyBuilder,
};
pub use value::{Number, Value};
