//! 宿主进程的生命周期与定时任务变更接口

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 停止 / 强制退出
pub trait Lifecycle: Send + Sync {
    /// 请求优雅关闭，不等待关闭完成
    fn request_stop(&self);

    /// 立即终止进程
    fn terminate(&self, code: i32);
}

/// 定时任务注册（只负责增删，不负责执行）
pub trait CronScheduler: Send + Sync {
    fn add_crons(&self, crons: Vec<Value>);
    fn remove_crons(&self, crons: Vec<Value>);
}

/// 基于 CancellationToken 的默认实现
pub struct ProcessLifecycle {
    shutdown: CancellationToken,
}

impl ProcessLifecycle {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }

    pub fn token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

impl Lifecycle for ProcessLifecycle {
    fn request_stop(&self) {
        info!("graceful shutdown requested");
        self.shutdown.cancel();
    }

    fn terminate(&self, code: i32) {
        std::process::exit(code);
    }
}

/// 按 `id` 索引的定时任务表
#[derive(Default)]
pub struct CronRegistry {
    jobs: Mutex<BTreeMap<String, Value>>,
}

fn cron_id(cron: &Value) -> Option<String> {
    match cron.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl CronRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<Value> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }
}

impl CronScheduler for CronRegistry {
    fn add_crons(&self, crons: Vec<Value>) {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        for cron in crons {
            match cron_id(&cron) {
                // 同 id 覆盖
                Some(id) => {
                    jobs.insert(id, cron);
                }
                None => warn!(cron = %cron, "cron without id ignored"),
            }
        }
    }

    fn remove_crons(&self, crons: Vec<Value>) {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        for cron in crons {
            if let Some(id) = cron_id(&cron) {
                if jobs.remove(&id).is_none() {
                    warn!(id = id.as_str(), "remove unknown cron");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stop_cancels_token() {
        let lifecycle = ProcessLifecycle::new(CancellationToken::new());
        let token = lifecycle.token();
        assert!(!token.is_cancelled());
        lifecycle.request_stop();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cron_add_replace_remove() {
        let crons = CronRegistry::new();
        crons.add_crons(vec![json!({"id": 1, "time": "0 * * * * *", "action": "a.b"})]);
        crons.add_crons(vec![json!({"id": "1", "time": "5 * * * * *", "action": "a.b"})]);
        crons.add_crons(vec![json!({"time": "noid"})]);
        assert_eq!(crons.jobs().len(), 1);
        assert_eq!(crons.jobs()[0]["time"], "5 * * * * *");

        crons.remove_crons(vec![json!({"id": 1})]);
        assert!(!crons.contains("1"));
    }
}
