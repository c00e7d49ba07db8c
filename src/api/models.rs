use serde::Serialize;

/// GET /version 响应
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
}

/// POST /command 响应
#[derive(Serialize)]
pub struct CommandResponse {
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}
