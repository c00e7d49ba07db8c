//! 声明式的处理器 / 远程代理目录
//!
//! 真正的 RPC 与请求分发子系统不在本 crate 内，这里根据配置声明的
//! 方法名构造等价的能力视图，分别注册为 `__server__` 与 `__proxy__`。

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;

use super::registry::{Component, HandlerTable, Member, MemberTable, ProxyTable};

/// namespace → 子命名空间 → 方法名列表
pub type CatalogSpec = BTreeMap<String, BTreeMap<String, Vec<String>>>;

fn build_table(spec: &CatalogSpec) -> BTreeMap<String, BTreeMap<String, MemberTable>> {
    spec.iter()
        .map(|(outer, inner)| {
            let inner = inner
                .iter()
                .map(|(name, methods)| {
                    let members = methods
                        .iter()
                        .map(|m| (m.clone(), Member::Function))
                        .collect();
                    (name.clone(), members)
                })
                .collect();
            (outer.clone(), inner)
        })
        .collect()
}

fn insert_member(
    table: &mut BTreeMap<String, BTreeMap<String, MemberTable>>,
    outer: &str,
    inner: &str,
    name: &str,
    member: Member,
) {
    table
        .entry(outer.to_string())
        .or_default()
        .entry(inner.to_string())
        .or_default()
        .insert(name.to_string(), member);
}

/// 请求处理器目录（`__server__`）
pub struct HandlerCatalog {
    handlers: RwLock<HandlerTable>,
}

impl HandlerCatalog {
    pub fn new(spec: &CatalogSpec) -> Self {
        Self {
            handlers: RwLock::new(build_table(spec)),
        }
    }

    pub fn add_handler(&self, namespace: &str, handler: &str, method: &str) {
        let mut t = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        insert_member(&mut t, namespace, handler, method, Member::Function);
    }

    /// 处理器对象上的非方法字段，自省时不会出现
    pub fn add_field(&self, namespace: &str, handler: &str, name: &str, value: Value) {
        let mut t = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        insert_member(&mut t, namespace, handler, name, Member::Field(value));
    }
}

impl Component for HandlerCatalog {
    fn request_handlers(&self) -> Option<HandlerTable> {
        Some(self.handlers.read().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

/// 远程调用代理目录（`__proxy__`），按 serverType 分组
pub struct ProxyCatalog {
    proxies: RwLock<ProxyTable>,
}

impl ProxyCatalog {
    pub fn new(spec: &CatalogSpec) -> Self {
        Self {
            proxies: RwLock::new(build_table(spec)),
        }
    }

    pub fn add_remote(&self, server_type: &str, namespace: &str, method: &str) {
        let mut t = self.proxies.write().unwrap_or_else(PoisonError::into_inner);
        insert_member(&mut t, server_type, namespace, method, Member::Function);
    }

    pub fn add_field(&self, server_type: &str, namespace: &str, name: &str, value: Value) {
        let mut t = self.proxies.write().unwrap_or_else(PoisonError::into_inner);
        insert_member(&mut t, server_type, namespace, name, Member::Field(value));
    }
}

impl Component for ProxyCatalog {
    fn remote_proxies(&self) -> Option<ProxyTable> {
        let t = self.proxies.read().unwrap_or_else(PoisonError::into_inner);
        if t.is_empty() {
            None
        } else {
            Some(t.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> CatalogSpec {
        let mut inner = BTreeMap::new();
        inner.insert("chatHandler".to_string(), vec!["send".to_string()]);
        let mut spec = BTreeMap::new();
        spec.insert("chat".to_string(), inner);
        spec
    }

    #[test]
    fn handler_catalog_exposes_declared_methods() {
        let catalog = HandlerCatalog::new(&spec());
        catalog.add_field("chat", "chatHandler", "app", Value::Null);
        let table = catalog.request_handlers().unwrap();
        let members = &table["chat"]["chatHandler"];
        assert_eq!(members["send"], Member::Function);
        assert!(!members["app"].is_function());
    }

    #[test]
    fn empty_proxy_catalog_reports_nothing() {
        let catalog = ProxyCatalog::new(&CatalogSpec::new());
        assert!(catalog.remote_proxies().is_none());
        catalog.add_remote("chat", "chatRemote", "add");
        assert!(catalog.remote_proxies().unwrap()["chat"]["chatRemote"]["add"].is_function());
    }
}
