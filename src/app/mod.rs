pub mod catalog;
pub mod connector;
pub mod context;
pub mod lifecycle;
pub mod registry;
pub mod settings;
pub mod tracker;

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::command::Dispatcher;
use crate::config::Config;

use catalog::{HandlerCatalog, ProxyCatalog};
use connector::Connector;
use context::AppContext;
use lifecycle::{CronRegistry, ProcessLifecycle};
use registry::{CONNECTION, CONNECTOR, PROXY, SERVER};
use settings::SettingsStore;
use tracker::ConnectionTracker;

pub struct App {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let shutdown = CancellationToken::new();
        let ctx = Arc::new(AppContext::new(
            config.server.clone(),
            config.cluster.clone(),
            SettingsStore::from_json(&config.settings),
            Arc::new(ProcessLifecycle::new(shutdown.clone())),
            Arc::new(CronRegistry::default()),
        ));

        ctx.components().register(
            CONNECTION,
            Arc::new(ConnectionTracker::new(config.server.id.clone())),
        );
        if config.server.frontend {
            ctx.components()
                .register(CONNECTOR, Arc::new(Connector::new(config.blacklist.clone())));
        }
        if !config.handlers.is_empty() {
            ctx.components()
                .register(SERVER, Arc::new(HandlerCatalog::new(&config.handlers)));
        }
        if !config.remotes.is_empty() {
            ctx.components()
                .register(PROXY, Arc::new(ProxyCatalog::new(&config.remotes)));
        }
        info!(
            server_id = ctx.server_id(),
            components = ctx.components().len(),
            settings = ctx.settings().len(),
            "admin context ready"
        );

        let dispatcher = Arc::new(Dispatcher::new(ctx, &config.eval));
        Ok(Self {
            config,
            dispatcher,
            shutdown,
        })
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// 启动 HTTP 通道并等待 `stop` 命令或 Ctrl-C
    pub async fn run(self) -> Result<()> {
        info!(server_id = self.config.server.id.as_str(), "admin channel started");
        let api = match &self.config.api {
            Some(api) => Some(crate::api::start(api, self.dispatcher.clone())?),
            None => None,
        };

        tokio::select! {
            _ = self.shutdown.cancelled() => {
                info!("stop command received, shutting down");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
            }
        }

        if let Some(handle) = api {
            handle.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(frontend: bool) -> Config {
        let yaml = format!(
            r#"
server:
  id: connector-1
  type: connector
  frontend: {}
cluster:
  - id: connector-1
    type: connector
handlers:
  connector:
    entryHandler: [entry]
blacklist: ["10.0.0.9"]
"#,
            frontend
        );
        serde_yml::from_str(&yaml).unwrap()
    }

    #[test]
    fn frontend_registers_connector() {
        let app = App::new(config(true)).unwrap();
        let ctx = app.dispatcher().context().clone();
        let keys = ctx.components().keys();
        assert!(keys.contains(&CONNECTOR.to_string()));
        assert!(keys.contains(&SERVER.to_string()));
        assert!(!keys.contains(&PROXY.to_string()));
        let connector = ctx.components().get(CONNECTOR).unwrap();
        assert!(connector.blacklist().unwrap().contains("10.0.0.9"));
    }

    #[test]
    fn backend_has_no_connector() {
        let app = App::new(config(false)).unwrap();
        let keys = app.dispatcher().context().components().keys();
        assert!(!keys.contains(&CONNECTOR.to_string()));
        assert!(keys.contains(&CONNECTION.to_string()));
    }

    #[test]
    fn stop_command_cancels_token() {
        let app = App::new(config(false)).unwrap();
        let token = app.shutdown_token();
        app.dispatcher().dispatch(r#"{"command":"stop"}"#);
        assert!(token.is_cancelled());
    }
}
