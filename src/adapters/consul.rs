//! Consul catalog lookups and agent registration over its HTTP API.

use crate::ports::resolver::{ResolverError, ServiceInstance, ServiceResolver};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogService {
    service_name: String,
    #[serde(default)]
    service_address: String,
    #[serde(default)]
    address: String,
    service_port: u16,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Registration<'a> {
    #[serde(rename = "ID")]
    id: String,
    name: &'a str,
    address: &'a str,
    port: u16,
    tags: &'a [String],
}

/// Catalog entries fall back to the node address when the service has none.
fn instances_from_catalog(entries: Vec<CatalogService>) -> Vec<ServiceInstance> {
    entries
        .into_iter()
        .map(|entry| {
            let address = if entry.service_address.is_empty() {
                entry.address
            } else {
                entry.service_address
            };
            ServiceInstance::new(entry.service_name, address, entry.service_port)
        })
        .collect()
}

#[derive(Clone, Debug)]
pub struct ConsulResolver {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl ConsulResolver {
    pub fn new(base_url: impl Into<String>, credentials: Option<(String, String)>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ResolverError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ResolverError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResolverError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ServiceResolver for ConsulResolver {
    async fn resolve(&self, name: &str, tag: &str) -> Result<Vec<ServiceInstance>, ResolverError> {
        let url = format!("{}/v1/catalog/service/{}", self.base_url, name);
        let mut request = self.client.get(&url);
        if !tag.is_empty() {
            request = request.query(&[("tag", tag)]);
        }

        let entries: Vec<CatalogService> = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| ResolverError::Request(e.to_string()))?;
        debug!(service = name, tag, found = entries.len(), "catalog lookup");
        Ok(instances_from_catalog(entries))
    }

    async fn register(
        &self,
        instance: &ServiceInstance,
        tags: &[String],
    ) -> Result<(), ResolverError> {
        let registration = Registration {
            id: format!("{}-{}-{}", instance.name, instance.address, instance.port),
            name: &instance.name,
            address: &instance.address,
            port: instance.port,
            tags,
        };
        let url = format!("{}/v1/agent/service/register", self.base_url);
        self.send(self.client.put(&url).json(&registration)).await?;
        info!(service = %instance.name, endpoint = %instance.endpoint(), "registered with consul");
        Ok(())
    }
}
