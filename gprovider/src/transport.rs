//! Chat transport seam and the reqwest-based Azure OpenAI implementation.

use crate::{ChatCompletion, ChatCompletionRequest, ChunkStream, ProviderAuth, ProviderError, ProviderFuture};

pub trait ChatTransport: Send + Sync + std::fmt::Debug {
    fn complete<'a>(
        &'a self,
        request: ChatCompletionRequest,
        auth: ProviderAuth,
    ) -> ProviderFuture<'a, Result<ChatCompletion, ProviderError>>;

    fn stream<'a>(
        &'a self,
        request: ChatCompletionRequest,
        auth: ProviderAuth,
    ) -> ProviderFuture<'a, Result<ChunkStream<'a>, ProviderError>>;
}

#[cfg(feature = "http-transport")]
pub use http::AzureOpenAiHttpTransport;

#[cfg(feature = "http-transport")]
mod http {
    use async_stream::try_stream;
    use futures_util::StreamExt;
    use reqwest::{Client, Response};

    use crate::sse::{SseDecoder, SseEvent};
    use crate::wire::extract_error_message;
    use crate::{
        ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChunkStream, ProviderAuth,
        ProviderError, ProviderFuture,
    };

    use super::ChatTransport;

    pub const DEFAULT_API_VERSION: &str = "2024-02-01";

    #[derive(Debug, Clone)]
    pub struct AzureOpenAiHttpTransport {
        client: Client,
        endpoint: String,
        deployment: String,
        api_version: String,
    }

    impl AzureOpenAiHttpTransport {
        pub fn new(
            client: Client,
            endpoint: impl Into<String>,
            deployment: impl Into<String>,
        ) -> Self {
            Self {
                client,
                endpoint: endpoint.into(),
                deployment: deployment.into(),
                api_version: DEFAULT_API_VERSION.to_string(),
            }
        }

        pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
            self.api_version = api_version.into();
            self
        }

        pub fn deployment(&self) -> &str {
            &self.deployment
        }

        pub(crate) fn completions_url(&self) -> String {
            format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.endpoint.trim_end_matches('/'),
                self.deployment,
                self.api_version
            )
        }

        async fn send(
            &self,
            request: &ChatCompletionRequest,
            auth: &ProviderAuth,
        ) -> Result<Response, ProviderError> {
            let builder = self.client.post(self.completions_url()).json(request);
            let builder = match auth {
                ProviderAuth::ApiKey(key) => builder.header("api-key", key.expose()),
                ProviderAuth::Bearer(token) => builder.bearer_auth(token.expose()),
            };

            let response = builder.send().await.map_err(|err| {
                if err.is_timeout() {
                    ProviderError::timeout(err.to_string())
                } else {
                    ProviderError::transport(err.to_string())
                }
            })?;

            if !response.status().is_success() {
                return Err(Self::parse_error(response).await);
            }

            Ok(response)
        }

        async fn parse_error(response: Response) -> ProviderError {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(&body)
                .unwrap_or_else(|| format!("chat completion failed with status {status}"));

            ProviderError::from_status(status.as_u16(), message)
        }
    }

    impl ChatTransport for AzureOpenAiHttpTransport {
        fn complete<'a>(
            &'a self,
            request: ChatCompletionRequest,
            auth: ProviderAuth,
        ) -> ProviderFuture<'a, Result<ChatCompletion, ProviderError>> {
            Box::pin(async move {
                let response = self.send(&request, &auth).await?;
                let body = response
                    .bytes()
                    .await
                    .map_err(|err| ProviderError::transport(err.to_string()))?;

                Ok(serde_json::from_slice::<ChatCompletion>(&body)?)
            })
        }

        fn stream<'a>(
            &'a self,
            request: ChatCompletionRequest,
            auth: ProviderAuth,
        ) -> ProviderFuture<'a, Result<ChunkStream<'a>, ProviderError>> {
            Box::pin(async move {
                let response = self.send(&request, &auth).await?;

                let stream = try_stream! {
                    let mut body = response.bytes_stream();
                    let mut decoder = SseDecoder::new();

                    while let Some(item) = body.next().await {
                        let bytes = item.map_err(|err| ProviderError::transport(err.to_string()))?;
                        decoder.push(&bytes);

                        while let Some(event) = decoder
                            .next_event()
                            .map_err(|err| ProviderError::invalid_response(err.to_string()))?
                        {
                            match event {
                                SseEvent::Data(payload) => {
                                    let chunk: ChatCompletionChunk = serde_json::from_str(&payload)?;
                                    yield chunk;
                                }
                                SseEvent::Done => break,
                            }
                        }

                        if decoder.is_finished() {
                            break;
                        }
                    }

                    decoder.finish();
                    while let Some(SseEvent::Data(payload)) = decoder
                        .next_event()
                        .map_err(|err| ProviderError::invalid_response(err.to_string()))?
                    {
                        let chunk: ChatCompletionChunk = serde_json::from_str(&payload)?;
                        yield chunk;
                    }
                };

                Ok(Box::pin(stream) as ChunkStream<'a>)
            })
        }
    }

}
