//! Provider request construction for search-grounded completions.

use gcommon::TraceId;
use gprovider::{
    AzureSearchParameters, ChatCompletionRequest, DataSource, EmbeddingDependency, FieldsMapping,
    QueryType, SearchAuthentication, SecretString, WireMessage, WireRole,
};

use crate::role::{METADATA_PATH_FIELD, search_filter};
use crate::{ChatError, ChatTurn, Role};

pub const DEFAULT_INDEX_NAME: &str = "documents";
pub const DEFAULT_EMBEDDING_DEPLOYMENT: &str = "text-embedding-ada-002";
pub const TOP_N_DOCUMENTS: u32 = 5;
pub const ROLE_INFORMATION: &str =
    "You must generate citation based on the retrieved information.";
pub const FILEPATH_FIELD: &str = "chunk_id";

/// Static retrieval settings shared by every request of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    endpoint: String,
    index_name: String,
    semantic_configuration: Option<String>,
    embedding_deployment: String,
    api_key: Option<SecretString>,
}

impl SearchConfig {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ChatError> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(ChatError::configuration("search endpoint is required"));
        }

        Ok(Self {
            endpoint,
            index_name: DEFAULT_INDEX_NAME.to_string(),
            semantic_configuration: None,
            embedding_deployment: DEFAULT_EMBEDDING_DEPLOYMENT.to_string(),
            api_key: None,
        })
    }

    /// Blank names keep the default index.
    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        let index_name = index_name.into();
        if !index_name.is_empty() {
            self.index_name = index_name;
        }
        self
    }

    pub fn with_semantic_configuration(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.semantic_configuration = (!name.is_empty()).then_some(name);
        self
    }

    pub fn with_embedding_deployment(mut self, deployment: impl Into<String>) -> Self {
        let deployment = deployment.into();
        if !deployment.is_empty() {
            self.embedding_deployment = deployment;
        }
        self
    }

    /// An empty key selects managed-identity authentication.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key
            .filter(|key| !key.is_empty())
            .map(SecretString::new);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn semantic_configuration(&self) -> String {
        match &self.semantic_configuration {
            Some(name) => name.clone(),
            None => format!("{}-semantic-configuration", self.index_name),
        }
    }

    pub fn embedding_deployment(&self) -> &str {
        &self.embedding_deployment
    }

    pub fn uses_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn authentication(&self) -> SearchAuthentication {
        match &self.api_key {
            Some(key) => SearchAuthentication::ApiKey { key: key.clone() },
            None => SearchAuthentication::SystemAssignedManagedIdentity,
        }
    }

    /// Builds the single data source attached to one request.
    pub fn data_source(&self, filter: &str) -> DataSource {
        DataSource::AzureSearch(AzureSearchParameters {
            endpoint: self.endpoint.clone(),
            index_name: self.index_name.clone(),
            top_n_documents: TOP_N_DOCUMENTS,
            role_information: ROLE_INFORMATION.to_string(),
            fields_mapping: FieldsMapping {
                filepath_field: FILEPATH_FIELD.to_string(),
                url_field: METADATA_PATH_FIELD.to_string(),
            },
            embedding_dependency: EmbeddingDependency::DeploymentName {
                deployment_name: self.embedding_deployment.clone(),
            },
            query_type: QueryType::VectorSemanticHybrid,
            semantic_configuration: self.semantic_configuration(),
            authentication: self.authentication(),
            filter: (!filter.is_empty()).then(|| filter.to_string()),
        })
    }
}

/// Immutable snapshot of the settings one request is built from.
///
/// A shared session hands each caller its own context, so a role filter applied for one
/// request never reaches another.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    system_message: String,
    temperature: f32,
    filter: String,
    trace_id: Option<TraceId>,
}

impl RequestContext {
    pub fn new(system_message: impl Into<String>, temperature: f32, filter: impl Into<String>) -> Self {
        Self {
            system_message: system_message.into(),
            temperature,
            filter: filter.into(),
            trace_id: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_role_filter(self, role: &Role, storage_base_url: &str) -> Self {
        let filter = search_filter(role, storage_base_url);
        self.with_filter(filter)
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<TraceId>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }
}

/// Assembles the provider payload: the system message, the turns verbatim and one data source.
pub fn build_request(
    search: &SearchConfig,
    context: &RequestContext,
    turns: &[ChatTurn],
    streamed: bool,
) -> ChatCompletionRequest {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(WireMessage::new(WireRole::System, context.system_message()));
    messages.extend(turns.iter().map(ChatTurn::to_wire));

    ChatCompletionRequest {
        model: None,
        messages,
        temperature: context.temperature(),
        stream: streamed,
        data_sources: vec![search.data_source(context.filter())],
    }
}
