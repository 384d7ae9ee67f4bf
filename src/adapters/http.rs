use crate::domain::model::Project;
use crate::domain::ports::{ConfigProvider, ProjectStore};
use crate::utils::error::{ProjectError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// `ProjectStore` backed by the project-store REST API under `/jtui`.
#[derive(Debug, Clone)]
pub struct HttpProjectStore {
    client: Client,
    base_url: Url,
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl HttpProjectStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| ProjectError::InvalidConfigValueError {
            field: "store.base_url".to_string(),
            value: base_url.to_string(),
            reason: format!("Invalid URL format: {}", e),
        })?;

        Ok(Self {
            client: Client::new(),
            base_url,
            headers: Vec::new(),
            timeout: None,
        })
    }

    pub fn from_config<C: ConfigProvider>(config: &C) -> Result<Self> {
        let mut store = Self::new(config.base_url())?;
        for (name, value) in config.headers() {
            store = store.with_header(name, value);
        }
        if let Some(seconds) = config.timeout_seconds() {
            store = store.with_timeout(Duration::from_secs(seconds));
        }
        Ok(store)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `{base}/jtui/{segments...}`, every segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProjectError::InvalidConfigValueError {
                field: "store.base_url".to_string(),
                value: self.base_url.to_string(),
                reason: "URL cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(std::iter::once("jtui").chain(segments.iter().copied()));
        Ok(url)
    }

    fn project_endpoint(&self, experiment_id: &str, pipeline: &str, rest: &[&str]) -> Result<Url> {
        let mut segments = vec!["experiments", experiment_id, "projects", pipeline];
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut request = self.client.request(method, url);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        request
    }

    /// Sends the request and unwraps the `{ "data": ... }` envelope.
    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().await?;
        let status = response.status();
        tracing::debug!("store responded with {}", status);

        let body = response.bytes().await?;

        if status.is_success() {
            if body.is_empty() {
                return Ok(Value::Null);
            }
            return match serde_json::from_slice::<Value>(&body)? {
                Value::Object(mut envelope) => match envelope.remove("data") {
                    Some(data) => Ok(data),
                    None => Ok(Value::Object(envelope)),
                },
                payload => Ok(payload),
            };
        }

        let message = serde_json::from_slice::<Value>(&body).ok().and_then(|b| {
            b.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        match message {
            Some(message) => Err(ProjectError::Store { message }),
            None => Err(ProjectError::UnrecognizedResponse {
                status: status.as_u16(),
            }),
        }
    }

    async fn submit(&self, method: Method, url: Url, document: &str) -> Result<Value> {
        tracing::debug!("{} {} ({} bytes of YAML)", method, url, document.len());
        self.send(self.request(method, url).json(&json!({ "project": document })))
            .await
    }
}

#[async_trait]
impl ProjectStore for HttpProjectStore {
    async fn get_project(&self, experiment_id: &str, pipeline: &str) -> Result<String> {
        let url = self.project_endpoint(experiment_id, pipeline, &[])?;
        tracing::debug!("GET {}", url);

        match self.send(self.request(Method::GET, url)).await? {
            Value::String(document) => Ok(document),
            Value::Null => Err(ProjectError::MalformedDocument {
                message: format!("store returned no document for '{}'", pipeline),
            }),
            structured => Ok(serde_yaml::to_string(&structured)?),
        }
    }

    async fn save_project(&self, experiment_id: &str, pipeline: &str, document: &str) -> Result<Value> {
        let url = self.project_endpoint(experiment_id, pipeline, &[])?;
        self.submit(Method::PUT, url, document).await
    }

    async fn check_project(&self, experiment_id: &str, pipeline: &str, document: &str) -> Result<Value> {
        let url = self.project_endpoint(experiment_id, pipeline, &["check"])?;
        self.submit(Method::POST, url, document).await
    }

    async fn get_available_channels(&self, experiment_id: &str) -> Result<Value> {
        let url = self.endpoint(&["experiments", experiment_id, "channels"])?;
        tracing::debug!("GET {}", url);
        self.send(self.request(Method::GET, url)).await
    }

    async fn get_module_figure(
        &self,
        experiment_id: &str,
        pipeline: &str,
        module: &str,
        job_id: u64,
    ) -> Result<Value> {
        let job = job_id.to_string();
        let url = self.project_endpoint(experiment_id, pipeline, &["figures", module, "jobs", &job])?;
        tracing::debug!("GET {}", url);
        self.send(self.request(Method::GET, url)).await
    }

    async fn create_joblist(&self, experiment_id: &str, pipeline: &str, snapshot: &Project) -> Result<Value> {
        let url = self.project_endpoint(experiment_id, pipeline, &["joblist"])?;
        // Jobs are built from the saved project, so nothing of it is sent.
        tracing::debug!("POST {} ({} configured layer(s))", url, snapshot.layers().len());
        self.send(self.request(Method::POST, url).json(&json!({}))).await
    }
}
