//! Streamed chunk contracts and an in-memory chunk stream.
//!
//! ```rust
//! use gprovider::{ChunkStream, VecChunkStream};
//!
//! let stream = VecChunkStream::new(Vec::new());
//! let _boxed: ChunkStream<'static> = Box::pin(stream);
//! ```

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::{ChatCompletionChunk, ProviderError};

/// Provider chunk stream.
///
/// - Chunks arrive in the order the provider sent them.
/// - An `Err` item ends the useful part of the stream; chunks already yielded stay valid.
/// - Once the stream yields `None`, it must not yield additional items.
pub type ChunkStream<'a> =
    Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, ProviderError>> + Send + 'a>>;

#[derive(Debug)]
pub struct VecChunkStream {
    chunks: VecDeque<Result<ChatCompletionChunk, ProviderError>>,
    polled: usize,
}

impl VecChunkStream {
    pub fn new(chunks: Vec<Result<ChatCompletionChunk, ProviderError>>) -> Self {
        Self {
            chunks: chunks.into(),
            polled: 0,
        }
    }

    /// Number of items handed out so far.
    pub fn polled(&self) -> usize {
        self.polled
    }
}

impl Stream for VecChunkStream {
    type Item = Result<ChatCompletionChunk, ProviderError>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let next = self.chunks.pop_front();
        if next.is_some() {
            self.polled += 1;
        }

        Poll::Ready(next)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.chunks.len(), Some(self.chunks.len()))
    }
}
