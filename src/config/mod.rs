pub mod types;

use anyhow::{Context, Result};
use std::path::Path;

pub use types::{ApiConfig, Config, EvalConfig, LogConfig, ServerConfig, ServerInfo};

pub fn load_config(path: &str) -> Result<Config> {
    let content = load_config_content(path)?;
    let config: Config =
        serde_yml::from_str(&content).with_context(|| format!("failed to parse {}", path))?;
    config.validate()?;
    Ok(config)
}

pub fn load_config_content(path: &str) -> Result<String> {
    let raw = std::fs::read_to_string(Path::new(path))
        .with_context(|| format!("failed to read {}", path))?;
    Ok(expand_env_vars(&raw))
}

/// 展开 `${VAR}`、`${VAR:-default}` 与 `$VAR`，未定义的变量替换为空
pub fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'{') {
            chars.next();
            let mut expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                expr.push(c);
            }
            let (name, default) = match expr.split_once(":-") {
                Some((n, d)) => (n, Some(d)),
                None => (expr.as_str(), None),
            };
            match (std::env::var(name), default) {
                (Ok(val), Some(d)) if val.is_empty() => out.push_str(d),
                (Ok(val), _) => out.push_str(&val),
                (Err(_), Some(d)) => out.push_str(d),
                (Err(_), None) => {}
            }
        } else {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                out.push('$');
            } else if let Ok(val) = std::env::var(&name) {
                out.push_str(&val);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
server:
  id: connector-server-1
  type: connector
  frontend: true
cluster:
  - id: connector-server-1
    type: connector
    host: 127.0.0.1
    port: 4050
    frontend: true
  - id: chat-server-1
    type: chat
settings:
  env: development
  connectorConfig:
    heartbeat: 3
handlers:
  entryHandler:
    handler: [entry, onUserLeave]
remotes:
  connector:
    sessionRemote: [kick, bind]
eval:
  max_steps: 500
"#;

    #[test]
    fn parse_sample_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let cfg = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.id, "connector-server-1");
        assert!(cfg.server.frontend);
        assert_eq!(cfg.cluster.len(), 2);
        assert_eq!(cfg.cluster[1].server_type, "chat");
        assert_eq!(cfg.settings["env"], "development");
        assert_eq!(cfg.handlers["entryHandler"]["handler"].len(), 2);
        assert_eq!(cfg.eval.max_steps, 500);
        assert_eq!(cfg.log.level, "info");
        assert!(cfg.api.is_none());
    }

    #[test]
    fn duplicate_cluster_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.yaml");
        std::fs::write(
            &path,
            "server: {id: a, type: t}\ncluster:\n  - {id: a, type: t}\n  - {id: a, type: t}\n",
        )
        .unwrap();
        let err = load_config(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn env_vars_expand_with_defaults() {
        std::env::set_var("ADMIN_TEST_SERVER_ID", "area-1");
        let out = expand_env_vars("id: ${ADMIN_TEST_SERVER_ID}, t: ${ADMIN_TEST_UNSET:-area}, p: $ADMIN_TEST_SERVER_ID, c: 5$");
        assert_eq!(out, "id: area-1, t: area, p: area-1, c: 5$");
        std::env::remove_var("ADMIN_TEST_SERVER_ID");
    }
}
