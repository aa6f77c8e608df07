//! Normalization of provider replies into the stable caller-facing schema.
//!
//! Complete responses and streamed chunks share one output shape; only the key holding the
//! payload differs (`message` or `delta`). Citation enrichment is best-effort: each derived
//! field is computed independently and simply left out when it cannot be derived.
//!
//! ```rust
//! use gchat::{ProviderReply, normalize};
//! use gprovider::ChatCompletionChunk;
//!
//! let chunk: ChatCompletionChunk = serde_json::from_str(
//!     r#"{"id":"c1","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"Hi"}}]}"#,
//! )
//! .expect("chunk should parse");
//!
//! let normalized = normalize(ProviderReply::Chunk(chunk));
//! let value = serde_json::to_value(&normalized).expect("serializes");
//! assert_eq!(value["choices"][0]["delta"]["content"], "Hi");
//! ```

use gprovider::{
    ChatCompletion, ChatCompletionChunk, ChunkChoice, CompletionChoice, CompletionUsage,
    ReplyMessage,
};
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

const PAGES_MARKER: &str = "_pages_";

/// One raw provider reply unit.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderReply {
    Complete(ChatCompletion),
    Chunk(ChatCompletionChunk),
}

impl From<ChatCompletion> for ProviderReply {
    fn from(value: ChatCompletion) -> Self {
        Self::Complete(value)
    }
}

impl From<ChatCompletionChunk> for ProviderReply {
    fn from(value: ChatCompletionChunk) -> Self {
        Self::Chunk(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    pub choices: Vec<NormalizedChoice>,
    pub created: u64,
    pub id: String,
    pub model: String,
    pub object: Option<String>,
    pub system_fingerprint: Option<String>,
    pub usage: NormalizedUsage,
}

/// Token counters; each one is present only when the provider reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NormalizedUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedChoice {
    pub finish_reason: Option<String>,
    pub index: u32,
    pub end_turn: Option<bool>,
    #[serde(flatten)]
    pub payload: ChoicePayload,
}

/// Choice payload, serialized under `message` for complete replies and `delta` for chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChoicePayload {
    Message(PayloadFields),
    Delta(PayloadFields),
}

impl ChoicePayload {
    pub fn fields(&self) -> &PayloadFields {
        match self {
            Self::Message(fields) | Self::Delta(fields) => fields,
        }
    }

    pub fn is_delta(&self) -> bool {
        matches!(self, Self::Delta(_))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PayloadFields {
    pub refusal: Option<String>,
    pub role: Option<String>,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ChatContext>,
}

/// Provider-attached grounding context.
///
/// `Enriched` covers an object carrying a `citations` array; anything else is kept as-is
/// in `Raw`, with a string `intent` still parsed when possible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContext {
    Enriched(EnrichedContext),
    Raw(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedContext {
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub intent: Option<Value>,
    pub citations: Vec<CitationEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CitationEntry {
    Document(Citation),
    Other(Value),
}

/// A citation object. Any JSON object deserializes; a derived key whose value has an
/// unexpected type stays in `fields` instead of failing the whole citation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Citation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storageaccount_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storageaccount_container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storageaccount_blob: Option<String>,
    /// Provider-supplied fields, passed through untouched.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Citation {
    pub fn filepath(&self) -> Option<&str> {
        self.fields.get("filepath").and_then(Value::as_str)
    }

    pub fn url(&self) -> Option<&str> {
        self.fields.get("url").and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for Citation {
    fn from(mut fields: Map<String, Value>) -> Self {
        Self {
            pages: take_field(&mut fields, "pages"),
            storageaccount_name: take_field(&mut fields, "storageaccount_name"),
            storageaccount_container: take_field(&mut fields, "storageaccount_container"),
            storageaccount_blob: take_field(&mut fields, "storageaccount_blob"),
            fields,
        }
    }
}

/// Removes `key` only when its value deserializes as `T`.
fn take_field<T: DeserializeOwned>(fields: &mut Map<String, Value>, key: &str) -> Option<T> {
    let parsed = T::deserialize(fields.get(key)?).ok()?;
    fields.remove(key);
    Some(parsed)
}

/// Keeps an explicit JSON `null` as `Some(Value::Null)`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Converts one provider reply into the normalized schema.
pub fn normalize(reply: ProviderReply) -> NormalizedResponse {
    match reply {
        ProviderReply::Complete(completion) => NormalizedResponse {
            choices: completion
                .choices
                .into_iter()
                .map(normalize_complete_choice)
                .collect(),
            created: completion.created,
            id: completion.id,
            model: completion.model,
            object: completion.object,
            system_fingerprint: completion.system_fingerprint,
            usage: normalize_usage(completion.usage),
        },
        ProviderReply::Chunk(chunk) => NormalizedResponse {
            choices: chunk.choices.into_iter().map(normalize_chunk_choice).collect(),
            created: chunk.created,
            id: chunk.id,
            model: chunk.model,
            object: chunk.object,
            system_fingerprint: chunk.system_fingerprint,
            usage: normalize_usage(chunk.usage),
        },
    }
}

fn normalize_usage(usage: Option<CompletionUsage>) -> NormalizedUsage {
    let usage = usage.unwrap_or_default();
    NormalizedUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    }
}

fn normalize_complete_choice(choice: CompletionChoice) -> NormalizedChoice {
    NormalizedChoice {
        finish_reason: choice.finish_reason,
        index: choice.index,
        end_turn: choice.message.end_turn,
        payload: ChoicePayload::Message(payload_fields(choice.message)),
    }
}

fn normalize_chunk_choice(choice: ChunkChoice) -> NormalizedChoice {
    NormalizedChoice {
        finish_reason: choice.finish_reason,
        index: choice.index,
        end_turn: choice.end_turn,
        payload: ChoicePayload::Delta(payload_fields(choice.delta)),
    }
}

fn payload_fields(message: ReplyMessage) -> PayloadFields {
    PayloadFields {
        refusal: message.refusal,
        role: message.role,
        content: message.content,
        context: message.context.map(enrich_context),
    }
}

/// Parses a string `intent` and enriches every object in a `citations` array.
pub fn enrich_context(context: Value) -> ChatContext {
    let Value::Object(mut map) = context else {
        return ChatContext::Raw(context);
    };

    let intent = map.remove("intent").map(parse_intent);

    match map.remove("citations") {
        Some(Value::Array(items)) => ChatContext::Enriched(EnrichedContext {
            intent,
            citations: items.into_iter().map(enrich_citation).collect(),
            extra: map,
        }),
        citations => {
            if let Some(intent) = intent {
                map.insert("intent".to_string(), intent);
            }
            if let Some(citations) = citations {
                map.insert("citations".to_string(), citations);
            }
            ChatContext::Raw(Value::Object(map))
        }
    }
}

fn parse_intent(intent: Value) -> Value {
    match &intent {
        Value::String(text) => serde_json::from_str(text).unwrap_or(intent),
        _ => intent,
    }
}

fn enrich_citation(entry: Value) -> CitationEntry {
    let Value::Object(fields) = entry else {
        return CitationEntry::Other(entry);
    };

    let mut citation = Citation::from(fields);

    if let Some(pages) = citation.filepath().map(extract_pages) {
        citation.fields.remove("pages");
        citation.pages = Some(pages);
    }

    if let Some(location) = citation.url().and_then(StorageLocation::from_url) {
        for key in [
            "storageaccount_name",
            "storageaccount_container",
            "storageaccount_blob",
        ] {
            citation.fields.remove(key);
        }
        citation.storageaccount_name = Some(location.account);
        citation.storageaccount_container = Some(location.container);
        citation.storageaccount_blob = Some(location.blob);
    }

    CitationEntry::Document(citation)
}

/// Collects the digits following every `_pages_` marker, left to right.
pub fn extract_pages(filepath: &str) -> Vec<String> {
    let mut pages = Vec::new();
    let mut rest = filepath;

    while let Some(position) = rest.find(PAGES_MARKER) {
        let after = &rest[position + PAGES_MARKER.len()..];
        let digits = after
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(after.len());

        if digits > 0 {
            pages.push(after[..digits].to_string());
            rest = &after[digits..];
        } else {
            // The marker starts with '_', so the next candidate may begin one byte later.
            rest = &rest[position + 1..];
        }
    }

    pages
}

/// Storage coordinates derived from a blob URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    pub account: String,
    pub container: String,
    pub blob: String,
}

impl StorageLocation {
    /// `scheme://account.host/container/blob...`, with query and fragment dropped from the blob.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.get(..4)?;
        if !scheme.eq_ignore_ascii_case("http") {
            return None;
        }

        let segments: Vec<&str> = url.split('/').collect();
        if segments.len() < 4 {
            return None;
        }

        let account = segments[2].split('.').next().unwrap_or_default();
        let remainder = segments[4..].join("/");
        let remainder = remainder.split('?').next().unwrap_or_default();
        let remainder = remainder.split('#').next().unwrap_or_default();

        Some(Self {
            account: account.to_string(),
            container: segments[3].to_string(),
            blob: percent_decode_str(remainder).decode_utf8_lossy().into_owned(),
        })
    }
}
