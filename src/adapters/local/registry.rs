use crate::ports::resolver::{ResolverError, ServiceInstance, ServiceResolver, TRANSFORMER_TAG};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    instance: ServiceInstance,
    tags: Vec<String>,
}

/// Fixed name -> address table, for setups without a service registry.
#[derive(Debug, Default)]
pub struct StaticResolver {
    entries: RwLock<HashMap<String, Vec<Entry>>>,
}

impl StaticResolver {
    /// Parse `name=host:port` pairs separated by commas. Entries are tagged as transformers.
    pub fn parse(table: &str) -> Result<Self, ResolverError> {
        let mut entries: HashMap<String, Vec<Entry>> = HashMap::new();
        for pair in table.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let invalid = || ResolverError::Request(format!("invalid service entry {:?}", pair));
            let (name, address) = pair.split_once('=').ok_or_else(invalid)?;
            let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
            let port = port.parse::<u16>().map_err(|_| invalid())?;
            entries.entry(name.to_string()).or_default().push(Entry {
                instance: ServiceInstance::new(name, host, port),
                tags: vec![TRANSFORMER_TAG.to_string()],
            });
        }
        Ok(Self {
            entries: RwLock::new(entries),
        })
    }
}

#[async_trait]
impl ServiceResolver for StaticResolver {
    async fn resolve(&self, name: &str, tag: &str) -> Result<Vec<ServiceInstance>, ResolverError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(name)
            .map(|list| {
                list.iter()
                    .filter(|e| tag.is_empty() || e.tags.iter().any(|t| t == tag))
                    .map(|e| e.instance.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn register(
        &self,
        instance: &ServiceInstance,
        tags: &[String],
    ) -> Result<(), ResolverError> {
        let mut entries = self.entries.write().await;
        let list = entries.entry(instance.name.clone()).or_default();
        list.retain(|e| e.instance != *instance);
        list.push(Entry {
            instance: instance.clone(),
            tags: tags.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parse_table() {
        let resolver =
            StaticResolver::parse("flip=127.0.0.1:50051, gray=transformer-gray:50052").unwrap();

        let flip = resolver.resolve("flip", TRANSFORMER_TAG).await.unwrap();
        assert_eq!(flip, vec![ServiceInstance::new("flip", "127.0.0.1", 50051)]);
        assert_eq!(flip[0].endpoint(), "http://127.0.0.1:50051");

        let gray = resolver.resolve("gray", "").await.unwrap();
        assert_eq!(gray[0].address, "transformer-gray");
        assert!(resolver.resolve("sepia", TRANSFORMER_TAG).await.unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(StaticResolver::parse("flip").is_err());
        assert!(StaticResolver::parse("flip=localhost").is_err());
        assert!(StaticResolver::parse("flip=localhost:http").is_err());
        assert!(StaticResolver::parse("").is_ok());
    }

    #[tokio::test]
    async fn test_register_filters_by_tag() {
        let resolver = StaticResolver::default();
        let api = ServiceInstance::new("api", "10.0.0.1", 8080);
        resolver.register(&api, &["http".to_string()]).await.unwrap();
        resolver.register(&api, &["http".to_string()]).await.unwrap();

        assert!(resolver.resolve("api", TRANSFORMER_TAG).await.unwrap().is_empty());
        assert_eq!(resolver.resolve("api", "http").await.unwrap(), vec![api]);
    }
}
