//! Common `gprovider` imports for downstream crates.

pub use crate::{
    AzureOpenAiClient, ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatDispatch,
    ChatTransport, ChunkStream, ProviderAuth, ProviderCredential, ProviderError,
    ProviderErrorKind, ProviderFuture, SecretString, TokenSource, VecChunkStream,
};
pub use gcommon::BoxFuture;
