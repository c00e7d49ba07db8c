use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;

use crate::common::Setting;

/// 进程内设置存储（key → 任意值）
///
/// 唯一的写入路径是 `set`；`show` 与 `get` 只做只读访问。
pub struct SettingsStore {
    entries: RwLock<BTreeMap<String, Setting>>,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// 从配置中的 JSON 映射初始化
    pub fn from_json(initial: &serde_json::Map<String, Value>) -> Self {
        let store = Self::new();
        for (k, v) in initial {
            store.set(k.clone(), v.clone());
        }
        store
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Setting>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<Setting> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// 布尔开关，非布尔或缺失视为关闭
    pub fn is_enabled(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Setting::Json(Value::Bool(true))))
    }

    /// 按 key 顺序复制全部条目
    pub fn snapshot(&self) -> Vec<(String, Setting)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
