//! Provider layer for grounded chat completions.
//!
//! Wire payloads for an Azure OpenAI deployment configured with an Azure AI
//! Search data source, credential resolution, transport and dispatch seams.
//!
//! ```rust
//! use gprovider::{ChatCompletionRequest, WireMessage, WireRole};
//!
//! let request = ChatCompletionRequest {
//!     model: None,
//!     messages: vec![WireMessage::new(WireRole::User, "hello")],
//!     temperature: 0.1,
//!     stream: false,
//!     data_sources: Vec::new(),
//! };
//! assert!(request.validate().is_ok());
//! ```

mod credentials;
mod dispatch;
mod error;
#[cfg(feature = "http-transport")]
mod identity;
mod sse;
mod stream;
mod transport;
mod wire;

pub mod prelude;

pub type ProviderFuture<'a, T> = gcommon::BoxFuture<'a, T>;

pub use credentials::{
    AccessToken, ProviderAuth, ProviderCredential, SecretString, StaticTokenSource, TokenSource,
};
pub use dispatch::{AzureOpenAiClient, ChatDispatch};
pub use error::{ProviderError, ProviderErrorKind};
#[cfg(feature = "http-transport")]
pub use identity::{COGNITIVE_SERVICES_RESOURCE, ManagedIdentityTokenSource};
pub use sse::{SseDecoder, SseEvent};
pub use stream::{ChunkStream, VecChunkStream};
#[cfg(feature = "http-transport")]
pub use transport::AzureOpenAiHttpTransport;
pub use transport::ChatTransport;
pub use wire::{
    AzureSearchParameters, ChatCompletion, ChatCompletionChunk, ChatCompletionRequest,
    ChunkChoice, CompletionChoice, CompletionUsage, DataSource, EmbeddingDependency,
    FieldsMapping, QueryType, ReplyMessage, SearchAuthentication, WireMessage, WireRole,
};
