//! Remote model-registry client, used by a queue worker to fetch a model
//! archive it cannot read from a local, in-process registry.

use reqwest::Client;

use crate::error::RegistryError;

/// HTTP client for `MODEL_REGISTRY_SERVICE`, speaking the same `/models`
/// surface described in §6.
pub struct ModelRegistryHttpClient {
    base_url: String,
    http: Client,
}

impl ModelRegistryHttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: Client::new(),
        }
    }

    pub async fn get(&self, name: &str) -> Result<Vec<u8>, RegistryError> {
        let url = format!("{}/models/{name}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RegistryError::InvalidArchive(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        let bytes = response
            .error_for_status()
            .map_err(|e| RegistryError::InvalidArchive(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| RegistryError::InvalidArchive(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    pub async fn list(&self) -> Result<Vec<String>, RegistryError> {
        let url = format!("{}/models", self.base_url);
        let response: ModelsListResponse = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RegistryError::InvalidArchive(e.to_string()))?
            .error_for_status()
            .map_err(|e| RegistryError::InvalidArchive(e.to_string()))?
            .json()
            .await
            .map_err(|e| RegistryError::InvalidArchive(e.to_string()))?;
        Ok(response.models)
    }
}

#[derive(serde::Deserialize)]
struct ModelsListResponse {
    models: Vec<String>,
}
