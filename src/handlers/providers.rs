//! Provider discovery endpoints
//!
//! - `GET /providers` - List registered backend providers
//! - `GET /providers/{id}` - Get one provider by id or alias

use axum::{Json, extract::Path, http::StatusCode};
use serde::Serialize;

use crate::plugin::{ProviderMetadata, global_registry};

/// Provider information for discovery
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    /// Provider identifier (e.g., "elevenlabs")
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub version: String,
    /// Provider features, sorted
    pub features: Vec<String>,
    pub aliases: Vec<String>,
    pub required_config: Vec<String>,
    pub optional_config: Vec<String>,
}

impl From<ProviderMetadata> for ProviderInfo {
    fn from(metadata: ProviderMetadata) -> Self {
        let mut features: Vec<String> = metadata.features.into_iter().collect();
        features.sort();
        Self {
            id: metadata.name,
            display_name: metadata.display_name,
            description: metadata.description,
            version: metadata.version,
            features,
            aliases: metadata.aliases,
            required_config: metadata.required_config_keys,
            optional_config: metadata.optional_config_keys,
        }
    }
}

/// Response for GET /providers
#[derive(Debug, Serialize)]
pub struct ProviderListResponse {
    pub providers: Vec<ProviderInfo>,
    pub total_count: usize,
}

/// List all registered backend providers
pub async fn list_providers() -> Json<ProviderListResponse> {
    let registry = global_registry();
    let providers: Vec<ProviderInfo> = registry
        .get_backend_provider_names()
        .into_iter()
        .filter_map(|name| registry.get_backend_metadata(&name))
        .map(ProviderInfo::from)
        .collect();

    Json(ProviderListResponse {
        total_count: providers.len(),
        providers,
    })
}

/// Get a specific provider by id or alias
pub async fn get_provider(Path(id): Path<String>) -> Result<Json<ProviderInfo>, StatusCode> {
    global_registry()
        .get_backend_metadata(&id)
        .map(|metadata| Json(ProviderInfo::from(metadata)))
        .ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_providers_includes_elevenlabs() {
        let Json(response) = list_providers().await;
        assert_eq!(response.total_count, response.providers.len());
        let elevenlabs = response
            .providers
            .iter()
            .find(|p| p.id == "elevenlabs")
            .unwrap();
        assert!(elevenlabs.aliases.contains(&"11labs".to_string()));
        assert!(elevenlabs.required_config.contains(&"agent_id".to_string()));
    }

    #[tokio::test]
    async fn test_get_provider_by_alias() {
        let Json(info) = get_provider(Path("11labs".to_string())).await.unwrap();
        assert_eq!(info.id, "elevenlabs");
    }

    #[tokio::test]
    async fn test_get_unknown_provider() {
        let result = get_provider(Path("nope".to_string())).await;
        assert_eq!(result.unwrap_err(), StatusCode::NOT_FOUND);
    }
}
