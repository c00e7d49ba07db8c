use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::registry::Component;

/// 已登录会话信息
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInfo {
    pub uid: String,
    pub address: String,
    pub login_time: u64,
}

/// 连接统计快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatistics {
    pub server_id: String,
    pub total_conn_count: u64,
    pub logined_count: usize,
    pub logined_list: Vec<LoginInfo>,
}

/// 连接跟踪器，注册为 `__connection__`
pub struct ConnectionTracker {
    server_id: String,
    total: AtomicU64,
    logined: RwLock<HashMap<String, LoginInfo>>,
}

impl ConnectionTracker {
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            total: AtomicU64::new(0),
            logined: RwLock::new(HashMap::new()),
        }
    }

    /// 开始跟踪一个连接，返回 ConnectionGuard
    pub fn track(&self) -> ConnectionGuard<'_> {
        let n = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(total = n, "connection tracked");
        ConnectionGuard { tracker: self }
    }

    /// 记录会话登录，同一 uid 重复登录覆盖旧记录
    pub fn login(&self, uid: &str, address: &str) {
        let login_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let info = LoginInfo {
            uid: uid.to_string(),
            address: address.to_string(),
            login_time,
        };
        self.logined
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uid.to_string(), info);
    }

    pub fn logout(&self, uid: &str) -> bool {
        self.logined
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uid)
            .is_some()
    }

    pub fn total_connections(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// 获取统计快照
    pub fn snapshot(&self) -> ConnectionStatistics {
        let logined = self.logined.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<LoginInfo> = logined.values().cloned().collect();
        list.sort_by(|a, b| a.uid.cmp(&b.uid));
        ConnectionStatistics {
            server_id: self.server_id.clone(),
            total_conn_count: self.total.load(Ordering::Relaxed),
            logined_count: logined.len(),
            logined_list: list,
        }
    }
}

impl Component for ConnectionTracker {
    fn statistics(&self) -> Option<Value> {
        serde_json::to_value(self.snapshot()).ok()
    }
}

/// 连接守卫，Drop 时计数减一
pub struct ConnectionGuard<'a> {
    tracker: &'a ConnectionTracker,
}

impl<'a> Drop for ConnectionGuard<'a> {
    fn drop(&mut self) {
        self.tracker.total.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_counts_live_connections() {
        let tracker = ConnectionTracker::new("connector-1");
        let a = tracker.track();
        let b = tracker.track();
        assert_eq!(tracker.total_connections(), 2);
        drop(a);
        assert_eq!(tracker.total_connections(), 1);
        drop(b);
        assert_eq!(tracker.total_connections(), 0);
    }

    #[test]
    fn statistics_report_logins() {
        let tracker = ConnectionTracker::new("connector-1");
        let _g = tracker.track();
        tracker.login("bob", "10.0.0.2:5000");
        tracker.login("alice", "10.0.0.1:5000");
        tracker.login("alice", "10.0.0.1:5001");

        let stats = tracker.statistics().unwrap();
        assert_eq!(stats["serverId"], "connector-1");
        assert_eq!(stats["totalConnCount"], 1);
        assert_eq!(stats["loginedCount"], 2);
        assert_eq!(stats["loginedList"][0]["uid"], "alice");
        assert_eq!(stats["loginedList"][0]["address"], "10.0.0.1:5001");

        assert!(tracker.logout("bob"));
        assert!(!tracker.logout("bob"));
        assert_eq!(tracker.snapshot().logined_count, 1);
    }
}
