use reqwest::Method;
use tracing::debug;

use crate::client::{ApiClient, ApiResult, StreamSession};
use crate::transport::OutboundCall;
use crate::types::{Event, Include, InputItemList, Request, Response};
use crate::Result;

const RESPONSES_PATH: &str = "v1/responses";

/// Typed access to the `v1/responses` endpoints.
#[derive(Debug, Clone)]
pub struct ResponsesApi {
    client: ApiClient,
}

impl ResponsesApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Build from `OPENAI_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ApiClient::from_env()?))
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Create a model response and wait for it.
    ///
    /// The request's `stream` flag is forced off.
    pub async fn create(&self, request: &Request) -> Result<ApiResult<Response>> {
        let request = Request {
            stream: Some(false),
            ..request.clone()
        };
        debug!(model = request.model.as_str(), "creating response");
        let call = self.client.call(Method::POST, RESPONSES_PATH)?.json(&request)?;
        self.client.send(call).await
    }

    /// Create a model response and stream its events as they are generated.
    ///
    /// The request's `stream` flag is forced on.
    pub async fn stream(&self, request: &Request) -> Result<StreamSession<Event>> {
        let request = Request {
            stream: Some(true),
            ..request.clone()
        };
        debug!(model = request.model.as_str(), "streaming response");
        let call = self.client.call(Method::POST, RESPONSES_PATH)?.json(&request)?;
        self.client.stream(call).await
    }

    /// Retrieve a stored response.
    pub async fn get(&self, id: &str, include: &[Include]) -> Result<ApiResult<Response>> {
        let call = with_include(self.response_call(Method::GET, id)?, include);
        self.client.send(call).await
    }

    /// Resume streaming a background response, optionally after a given event
    /// sequence number.
    pub async fn stream_by_id(
        &self,
        id: &str,
        starting_after: Option<u64>,
        include: &[Include],
    ) -> Result<StreamSession<Event>> {
        let mut call = self.response_call(Method::GET, id)?.query("stream", "true");
        if let Some(sequence_number) = starting_after {
            call = call.query("starting_after", &sequence_number.to_string());
        }
        let call = with_include(call, include);
        self.client.stream(call).await
    }

    /// Cancel a background response.
    pub async fn cancel(&self, id: &str) -> Result<()> {
        let call = self.response_call(Method::POST, id)?.segment("cancel");
        self.client.send_empty(call).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let call = self.response_call(Method::DELETE, id)?;
        self.client.send_empty(call).await
    }

    /// List the input items a response was created from.
    pub async fn list_input_items(&self, id: &str) -> Result<ApiResult<InputItemList>> {
        let call = self.response_call(Method::GET, id)?.segment("input_items");
        self.client.send(call).await
    }

    /// `v1/responses/{id}`, with the id as a single escaped segment.
    fn response_call(&self, method: Method, id: &str) -> Result<OutboundCall> {
        Ok(self.client.call(method, RESPONSES_PATH)?.segment(id))
    }
}


fn with_include(call: OutboundCall, include: &[Include]) -> OutboundCall {
    include
        .iter()
        .fold(call, |call, item| call.query("include", item.as_str()))
}
