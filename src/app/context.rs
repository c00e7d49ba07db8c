//! 管理通道访问宿主进程的唯一入口
//!
//! 分发器、自省收集器和求值器共用同一个 `AppContext`。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::common::{AdminError, Setting};
use crate::config::{ServerConfig, ServerInfo};

use super::lifecycle::{CronScheduler, Lifecycle};
use super::registry::ComponentRegistry;
use super::settings::SettingsStore;

/// `stop` 命令写入的保留标记
pub const STOP_FLAG: &str = "__stopFlag__";

pub struct AppContext {
    server: ServerConfig,
    cluster: Vec<ServerInfo>,
    settings: SettingsStore,
    components: ComponentRegistry,
    lifecycle: Arc<dyn Lifecycle>,
    crons: Arc<dyn CronScheduler>,
    started: Instant,
}

impl AppContext {
    pub fn new(
        server: ServerConfig,
        cluster: Vec<ServerInfo>,
        settings: SettingsStore,
        lifecycle: Arc<dyn Lifecycle>,
        crons: Arc<dyn CronScheduler>,
    ) -> Self {
        Self {
            server,
            cluster,
            settings,
            components: ComponentRegistry::new(),
            lifecycle,
            crons,
            started: Instant::now(),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server.id
    }

    pub fn server_type(&self) -> &str {
        &self.server.server_type
    }

    pub fn is_frontend(&self) -> bool {
        self.server.frontend
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn get(&self, key: &str) -> Option<Setting> {
        self.settings.get(key)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Setting>) {
        self.settings.set(key, value);
    }

    pub fn enable(&self, feature: &str) {
        self.settings.set(feature, Value::Bool(true));
    }

    pub fn disable(&self, feature: &str) {
        self.settings.set(feature, Value::Bool(false));
    }

    pub fn enabled(&self, feature: &str) -> bool {
        self.settings.is_enabled(feature)
    }

    pub fn server_by_id(&self, id: &str) -> Option<&ServerInfo> {
        self.cluster.iter().find(|s| s.id == id)
    }

    pub fn servers(&self) -> &[ServerInfo] {
        &self.cluster
    }

    /// 通过集群列表查出本进程的 serverType
    pub fn resolve_self_type(&self) -> Result<&str, AdminError> {
        self.server_by_id(&self.server.id)
            .map(|s| s.server_type.as_str())
            .ok_or_else(|| AdminError::Lookup(self.server.id.clone()))
    }

    pub fn request_stop(&self) {
        self.settings.set(STOP_FLAG, Value::Bool(true));
        self.lifecycle.request_stop();
    }

    pub fn terminate(&self, code: i32) {
        self.lifecycle.terminate(code);
    }

    pub fn add_crons(&self, crons: Vec<Value>) {
        self.crons.add_crons(crons);
    }

    pub fn remove_crons(&self, crons: Vec<Value>) {
        self.crons.remove_crons(crons);
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::app::lifecycle::CronRegistry;
    use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

    #[derive(Default)]
    pub(crate) struct RecordingLifecycle {
        pub stopped: AtomicBool,
        pub exit_code: AtomicI32,
    }

    impl Lifecycle for RecordingLifecycle {
        fn request_stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }

        fn terminate(&self, code: i32) {
            self.exit_code.store(code, Ordering::SeqCst);
        }
    }

    pub(crate) fn server(id: &str, server_type: &str, frontend: bool) -> ServerInfo {
        ServerInfo {
            id: id.to_string(),
            server_type: server_type.to_string(),
            host: None,
            port: None,
            frontend,
        }
    }

    pub(crate) fn test_context(frontend: bool) -> AppContext {
        AppContext::new(
            ServerConfig {
                id: "connector-1".into(),
                server_type: "connector".into(),
                frontend,
            },
            vec![
                server("connector-1", "connector", frontend),
                server("chat-1", "chat", false),
            ],
            SettingsStore::new(),
            Arc::new(RecordingLifecycle::default()),
            Arc::new(CronRegistry::default()),
        )
    }

    #[test]
    fn resolves_own_type_from_cluster() {
        let ctx = test_context(true);
        assert_eq!(ctx.resolve_self_type().unwrap(), "connector");
        assert_eq!(ctx.server_by_id("chat-1").unwrap().server_type, "chat");
        assert!(ctx.server_by_id("gate-1").is_none());
    }

    #[test]
    fn missing_self_entry_is_lookup_failure() {
        let ctx = AppContext::new(
            ServerConfig {
                id: "ghost".into(),
                server_type: "chat".into(),
                frontend: false,
            },
            vec![server("chat-1", "chat", false)],
            SettingsStore::new(),
            Arc::new(RecordingLifecycle::default()),
            Arc::new(CronRegistry::default()),
        );
        let err = ctx.resolve_self_type().unwrap_err();
        assert!(matches!(err, AdminError::Lookup(ref id) if id == "ghost"));
    }

    #[test]
    fn stop_sets_flag_and_signals() {
        let lifecycle = Arc::new(RecordingLifecycle::default());
        let ctx = AppContext::new(
            ServerConfig {
                id: "a".into(),
                server_type: "t".into(),
                frontend: false,
            },
            Vec::new(),
            SettingsStore::new(),
            lifecycle.clone(),
            Arc::new(CronRegistry::default()),
        );
        ctx.request_stop();
        assert!(ctx.enabled(STOP_FLAG));
        assert!(lifecycle.stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn features_toggle() {
        let ctx = test_context(false);
        assert!(!ctx.enabled("rpcDebug"));
        ctx.enable("rpcDebug");
        assert!(ctx.enabled("rpcDebug"));
        ctx.disable("rpcDebug");
        assert!(!ctx.enabled("rpcDebug"));
    }
}
