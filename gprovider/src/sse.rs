//! Incremental decoder for the provider's server-sent event stream.

/// One decoded `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Buffers raw body bytes and yields complete `data:` lines as they close.
///
/// Bytes are buffered before UTF-8 decoding so multi-byte characters split
/// across network reads survive intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        if !self.finished {
            self.buffer.extend_from_slice(bytes);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Marks the end of the body. A trailing line without a final newline
    /// becomes decodable by [`next_event`](Self::next_event).
    pub fn finish(&mut self) {
        if !self.finished && !self.buffer.is_empty() {
            self.buffer.push(b'\n');
        }
    }

    /// Returns the next complete event, skipping comments, blank lines and
    /// non-data fields. `Done` is returned once and ends decoding.
    pub fn next_event(&mut self) -> Result<Option<SseEvent>, std::str::Utf8Error> {
        while !self.finished {
            let Some(newline_index) = self.buffer.iter().position(|byte| *byte == b'\n') else {
                return Ok(None);
            };

            let raw = self.buffer.drain(..=newline_index).collect::<Vec<_>>();
            let line = std::str::from_utf8(&raw)?.trim();

            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };

            let payload = payload.trim();
            if payload == "[DONE]" {
                self.finished = true;
                self.buffer.clear();
                return Ok(Some(SseEvent::Done));
            }

            if payload.is_empty() {
                continue;
            }

            return Ok(Some(SseEvent::Data(payload.to_string())));
        }

        Ok(None)
    }
}
