use std::collections::HashSet;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::app::catalog::CatalogSpec;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    pub server: ServerConfig,
    /// 集群成员列表，用于解析本进程的 serverType
    #[serde(default)]
    pub cluster: Vec<ServerInfo>,
    /// 设置存储的初始内容
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub handlers: CatalogSpec,
    #[serde(default)]
    pub remotes: CatalogSpec,
    /// 前端连接器的初始黑名单
    #[serde(default)]
    pub blacklist: Vec<String>,
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub eval: EvalConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.server.id.trim().is_empty() {
            anyhow::bail!("server.id must not be empty");
        }
        if self.server.server_type.trim().is_empty() {
            anyhow::bail!("server.type must not be empty");
        }
        let mut seen = HashSet::new();
        for member in &self.cluster {
            if !seen.insert(member.id.as_str()) {
                anyhow::bail!("duplicate cluster member id '{}'", member.id);
            }
        }
        if self.eval.max_steps == 0 {
            anyhow::bail!("eval.max_steps must be greater than 0");
        }
        if !self.blacklist.is_empty() && !self.server.frontend {
            tracing::warn!("blacklist configured on a backend server, ignored");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 本进程身份
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub server_type: String,
    /// 是否直接接受客户端连接
    #[serde(default)]
    pub frontend: bool,
}

/// 集群成员描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: String,
    #[serde(rename = "serverType", alias = "type")]
    pub server_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub frontend: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    pub port: u16,
    pub secret: Option<String>,
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvalConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

fn default_max_steps() -> usize {
    10_000
}
