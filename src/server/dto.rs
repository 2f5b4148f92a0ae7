use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct GenerateKeyRequest {
    pub role: String,
    #[serde(default)]
    pub database_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateKeyResponse {
    pub id: String,
    /// The bearer. Returned only here.
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePermissionRequest {
    pub key_id: String,
    #[serde(default)]
    pub database_id: Option<String>,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct CanQuery {
    pub key_id: String,
    #[serde(default)]
    pub database_id: Option<String>,
    pub operation: String,
}

#[derive(Debug, Serialize)]
pub struct CanResponse {
    pub allowed: bool,
}
