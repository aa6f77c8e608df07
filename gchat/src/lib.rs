//! Search-grounded chat over an Azure OpenAI deployment.
//!
//! A [`ChatSession`] turns conversation turns into a provider request scoped by a role
//! filter, dispatches it and normalizes the reply (or every streamed chunk) into one stable
//! schema.
//!
//! ```rust
//! use gchat::{ChatTurn, RequestContext, SearchConfig, build_request};
//!
//! let search = SearchConfig::new("https://search.example.net").expect("endpoint");
//! let context = RequestContext::new("You answer from documents.", 0.1, "");
//! let request = build_request(&search, &context, &[ChatTurn::user("hello")], false);
//!
//! assert_eq!(request.messages.len(), 2);
//! assert_eq!(request.data_sources.len(), 1);
//! ```

mod error;
mod hooks;
mod normalize;
mod request;
mod role;
mod session;
mod types;

pub mod prelude {
    pub use crate::{
        ChatContext, ChatError, ChatErrorKind, ChatHooks, ChatOperation, ChatRole, ChatSession,
        ChatStream, ChatTurn, Citation, NormalizedResponse, OutputFormat, ProviderReply,
        RequestContext, Role, RoleRegistry, SearchConfig, StreamItem,
    };
    pub use gcommon::TraceId;
    pub use gprovider::{ChatDispatch, ProviderError};
}

pub use error::{ChatError, ChatErrorKind};
pub use hooks::{ChatHooks, ChatOperation, NoopChatHooks};
pub use normalize::{
    ChatContext, ChoicePayload, Citation, CitationEntry, EnrichedContext, NormalizedChoice,
    NormalizedResponse, NormalizedUsage, PayloadFields, ProviderReply, StorageLocation,
    enrich_context, extract_pages, normalize,
};
pub use request::{
    DEFAULT_EMBEDDING_DEPLOYMENT, DEFAULT_INDEX_NAME, FILEPATH_FIELD, ROLE_INFORMATION,
    RequestContext, SearchConfig, TOP_N_DOCUMENTS, build_request,
};
pub use role::{
    DEFAULT_ROLE, DEFAULT_ROLE_DESCRIPTION, METADATA_PATH_FIELD, Role, RoleRegistry,
    search_filter,
};
pub use session::{
    ChatSession, ChatStream, DEFAULT_SYSTEM_MESSAGE, DEFAULT_TEMPERATURE, SessionConfig,
    StreamItem,
};
pub use types::{ChatRequestBody, ChatRole, ChatTurn, OutputFormat, TurnPayload};
pub use gcommon::TraceId;
