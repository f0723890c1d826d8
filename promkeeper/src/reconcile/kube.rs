//! Minimal Kubernetes REST client.
//!
//! Covers what the reconciler and the rule-object publisher need: namespaced
//! get/create/replace/delete and line-delimited JSON watch streams.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;
use tracing::debug;

use super::remote::{ObjectStore, ResourceKind, WatchEvent, WatchSource, WatchedResource};
use crate::config::settings::KubernetesSettings;
use crate::utils::http_client::install_rustls_provider;
use crate::{Error, Result};

pub struct KubeClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl KubeClient {
    pub fn new(client: Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Client for the configured API server. Only the connect phase has a
    /// timeout since watches are long-lived.
    pub fn from_settings(settings: &KubernetesSettings) -> Result<Self> {
        install_rustls_provider();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("promkeeper/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build Kubernetes client: {}", e)))?;
        Ok(Self::new(
            client,
            &settings.api_url,
            settings.resolve_token(),
        ))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn object_path(kind: ResourceKind, namespace: &str, name: &str) -> String {
        format!("{}/{}", kind.collection_path(namespace), name)
    }

    async fn check(response: Response, kind: ResourceKind, name: &str) -> Result<Response> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::RemoteNotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::RemoteApi {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn json(response: Response, kind: ResourceKind, name: &str) -> Result<Value> {
        Ok(Self::check(response, kind, name).await?.json().await?)
    }
}

#[async_trait]
impl ObjectStore for KubeClient {
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Value> {
        let response = self
            .request(Method::GET, &Self::object_path(kind, namespace, name))
            .send()
            .await?;
        Self::json(response, kind, name).await
    }

    async fn create(&self, kind: ResourceKind, namespace: &str, body: &Value) -> Result<Value> {
        let name = body
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let response = self
            .request(Method::POST, &kind.collection_path(namespace))
            .json(body)
            .send()
            .await?;
        Self::json(response, kind, &name).await
    }

    async fn replace(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        body: &Value,
    ) -> Result<Value> {
        let response = self
            .request(Method::PUT, &Self::object_path(kind, namespace, name))
            .json(body)
            .send()
            .await?;
        Self::json(response, kind, name).await
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &Self::object_path(kind, namespace, name))
            .send()
            .await?;
        Self::check(response, kind, name).await?;
        Ok(())
    }
}

#[async_trait]
impl WatchSource for KubeClient {
    async fn watch(
        &self,
        resource: &WatchedResource,
        namespace: &str,
    ) -> Result<BoxStream<'static, Result<WatchEvent>>> {
        let kind = resource.kind();
        let mut query = vec![("watch", "true")];
        if let Some(selector) = resource.label_selector() {
            query.push(("labelSelector", selector));
        }

        let response = self
            .request(Method::GET, &kind.collection_path(namespace))
            .query(&query)
            .send()
            .await?;
        let response = Self::check(response, kind, &resource.to_string()).await?;
        debug!(%resource, %namespace, "Watch stream opened");

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let lines = StreamReader::new(body).lines();

        let events = stream::unfold(lines, |mut lines| async move {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        let event = serde_json::from_str::<WatchEvent>(&line).map_err(Error::from);
                        return Some((event, lines));
                    }
                    Ok(None) => return None,
                    Err(e) => return Some((Err(Error::Io(e)), lines)),
                }
            }
        });

        Ok(events.boxed())
    }
}
