//! Provider dispatch seam consumed by chat sessions.

use std::sync::Arc;

use crate::{
    ChatCompletion, ChatCompletionRequest, ChatTransport, ChunkStream, ProviderCredential,
    ProviderError, ProviderFuture,
};

/// Sends one prepared chat-completion request to the hosted model.
pub trait ChatDispatch: Send + Sync {
    fn complete<'a>(
        &'a self,
        request: ChatCompletionRequest,
    ) -> ProviderFuture<'a, Result<ChatCompletion, ProviderError>>;

    fn stream<'a>(
        &'a self,
        request: ChatCompletionRequest,
    ) -> ProviderFuture<'a, Result<ChunkStream<'a>, ProviderError>>;
}

/// Azure OpenAI client: resolves credentials per call and hands the request to a transport.
#[derive(Clone)]
pub struct AzureOpenAiClient {
    credential: ProviderCredential,
    transport: Arc<dyn ChatTransport>,
}

impl AzureOpenAiClient {
    pub fn new(credential: ProviderCredential, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            credential,
            transport,
        }
    }

    pub fn credential(&self) -> &ProviderCredential {
        &self.credential
    }
}

impl ChatDispatch for AzureOpenAiClient {
    fn complete<'a>(
        &'a self,
        request: ChatCompletionRequest,
    ) -> ProviderFuture<'a, Result<ChatCompletion, ProviderError>> {
        Box::pin(async move {
            request.validate()?;
            if request.stream {
                return Err(ProviderError::invalid_request(
                    "use stream for streamed requests",
                ));
            }

            let auth = self.credential.resolve().await?;
            self.transport.complete(request, auth).await
        })
    }

    fn stream<'a>(
        &'a self,
        request: ChatCompletionRequest,
    ) -> ProviderFuture<'a, Result<ChunkStream<'a>, ProviderError>> {
        Box::pin(async move {
            request.validate()?;
            if !request.stream {
                return Err(ProviderError::invalid_request(
                    "stream requires a request with stream enabled",
                ));
            }

            let auth = self.credential.resolve().await?;
            self.transport.stream(request, auth).await
        })
    }
}

impl std::fmt::Debug for AzureOpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiClient")
            .field("credential", &self.credential)
            .field("transport", &self.transport)
            .finish()
    }
}
