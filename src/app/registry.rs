//! 组件注册表
//!
//! 宿主进程把各个子系统以 `__name__` 形式的 key 注册进来。自省只通过
//! `Component` 上的能力查询接口读取数据，从不反射或遍历组件内部。

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use regex::Regex;
use serde_json::Value;

use super::connector::Blacklist;

/// 连接统计组件
pub const CONNECTION: &str = "__connection__";
/// 远程调用代理组件
pub const PROXY: &str = "__proxy__";
/// 请求处理服务组件
pub const SERVER: &str = "__server__";
/// 前端连接器组件（持有黑名单）
pub const CONNECTOR: &str = "__connector__";

static COMPONENT_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^__(\w+)__$").unwrap());

/// 代理或处理器对象上的一个成员
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    /// 可远程调用的方法
    Function,
    /// 普通字段，自省时忽略
    Field(Value),
}

impl Member {
    pub fn is_function(&self) -> bool {
        matches!(self, Member::Function)
    }
}

pub type MemberTable = BTreeMap<String, Member>;

/// serverType → namespace → member
pub type ProxyTable = BTreeMap<String, BTreeMap<String, MemberTable>>;

/// namespace → sub-namespace → member
pub type HandlerTable = BTreeMap<String, BTreeMap<String, MemberTable>>;

/// 组件的能力查询接口，未提供的能力返回 None
pub trait Component: Send + Sync {
    /// 实时统计信息
    fn statistics(&self) -> Option<Value> {
        None
    }

    /// 已发现的远程调用代理
    fn remote_proxies(&self) -> Option<ProxyTable> {
        None
    }

    /// 已注册的请求处理器
    fn request_handlers(&self) -> Option<HandlerTable> {
        None
    }

    /// 连接黑名单
    fn blacklist(&self) -> Option<&Blacklist> {
        None
    }
}

/// 组件注册表
pub struct ComponentRegistry {
    components: RwLock<BTreeMap<String, Arc<dyn Component>>>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            components: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn register(&self, key: impl Into<String>, component: Arc<dyn Component>) {
        self.components
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), component);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Component>> {
        self.components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// 从注册 key 中剥离 `__` 包裹得到展示名；不符合格式时返回 None
pub fn display_name(key: &str) -> Option<&str> {
    COMPONENT_KEY
        .captures(key)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stats;

    impl Component for Stats {
        fn statistics(&self) -> Option<Value> {
            Some(serde_json::json!({"total": 1}))
        }
    }

    #[test]
    fn display_name_strips_marker() {
        assert_eq!(display_name("__foo__"), Some("foo"));
        assert_eq!(display_name("__connector__"), Some("connector"));
        assert_eq!(display_name("foo"), None);
        assert_eq!(display_name("__foo"), None);
        assert_eq!(display_name("__a-b__"), None);
    }

    #[test]
    fn register_and_query_capability() {
        let registry = ComponentRegistry::new();
        registry.register(CONNECTION, Arc::new(Stats));
        let c = registry.get(CONNECTION).unwrap();
        assert!(c.statistics().is_some());
        assert!(c.remote_proxies().is_none());
        assert!(c.blacklist().is_none());
        assert_eq!(registry.keys(), vec![CONNECTION.to_string()]);
    }
}
