use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use std::sync::Arc;
use url::Url;

use crate::client::core::ApiClient;
use crate::interceptors::{Interceptor, InterceptorChain};
use crate::transport::{HttpConfig, HttpTransport, Transport};
use crate::{Error, ErrorContext, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/";

/// Builder for [`ApiClient`].
///
/// The interceptor list is fixed once `build` is called.
pub struct ApiClientBuilder {
    base_url: Option<String>,
    auth_token: Option<String>,
    organization: Option<String>,
    project: Option<String>,
    headers: Vec<(String, String)>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    transport: Option<Arc<dyn Transport>>,
    http_config: Option<HttpConfig>,
}

impl ApiClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            auth_token: None,
            organization: None,
            project: None,
            headers: Vec::new(),
            interceptors: Vec::new(),
            transport: None,
            http_config: None,
        }
    }

    /// Seed the builder from the environment:
    /// - `OPENAI_API_KEY`
    /// - `OPENAI_BASE_URL`
    /// - `OPENAI_ORG_ID`
    /// - `OPENAI_PROJECT_ID`
    ///
    /// The HTTP settings come from [`HttpConfig::from_env`].
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|s| !s.trim().is_empty());
        Self {
            base_url: var("OPENAI_BASE_URL"),
            auth_token: var("OPENAI_API_KEY"),
            organization: var("OPENAI_ORG_ID"),
            project: var("OPENAI_PROJECT_ID"),
            http_config: Some(HttpConfig::from_env()),
            ..Self::new()
        }
    }

    /// Override the base URL (defaults to `https://api.openai.com/`).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Bearer token sent as `Authorization`.
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Add a default header sent with every call.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Register an interceptor. Hooks run in registration order.
    pub fn interceptor<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Replace the HTTP transport (mostly for tests and custom stacks).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Settings for the default HTTP transport. Ignored when a transport is supplied.
    pub fn http_config(mut self, config: HttpConfig) -> Self {
        self.http_config = Some(config);
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let base_url = parse_base_url(self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            insert_header(&mut headers, name, value)?;
        }
        if let Some(token) = &self.auth_token {
            insert_header(&mut headers, AUTHORIZATION.as_str(), &format!("Bearer {}", token))?;
        }
        if let Some(organization) = &self.organization {
            insert_header(&mut headers, "OpenAI-Organization", organization)?;
        }
        if let Some(project) = &self.project {
            insert_header(&mut headers, "OpenAI-Project", project)?;
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let config = self.http_config.unwrap_or_default();
                Arc::new(HttpTransport::new(&config)?) as Arc<dyn Transport>
            }
        };

        Ok(ApiClient {
            base_url,
            headers,
            transport,
            interceptors: InterceptorChain::new(self.interceptors),
        })
    }
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse and normalize the base URL so relative paths join beneath it.
fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|e| {
        Error::configuration_with_context(
            format!("invalid base url: {}", e),
            ErrorContext::new()
                .with_field_path("base_url")
                .with_details(raw.to_string())
                .with_source("client_builder"),
        )
    })?;
    if url.cannot_be_a_base() {
        return Err(Error::configuration_with_context(
            "base url cannot carry paths",
            ErrorContext::new()
                .with_field_path("base_url")
                .with_details(raw.to_string())
                .with_source("client_builder"),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let context = || {
        ErrorContext::new()
            .with_field_path(format!("headers.{}", name))
            .with_source("client_builder")
    };
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
        Error::configuration_with_context(format!("invalid header name: {}", e), context())
    })?;
    let header_value = HeaderValue::from_str(value).map_err(|e| {
        Error::configuration_with_context(format!("invalid header value: {}", e), context())
    })?;
    headers.insert(header_name, header_value);
    Ok(())
}
