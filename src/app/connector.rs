use std::sync::{PoisonError, RwLock};

use tracing::debug;

use super::registry::Component;

/// 前端连接黑名单（IP 或正则文本）
#[derive(Default)]
pub struct Blacklist {
    entries: RwLock<Vec<String>>,
}

impl Blacklist {
    pub fn new(initial: Vec<String>) -> Self {
        Self {
            entries: RwLock::new(initial),
        }
    }

    /// 追加条目，保持给定顺序
    pub fn extend(&self, items: &[String]) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(items.iter().cloned());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|e| e == addr)
    }
}

/// 前端连接器组件，只在前端服务器上注册
pub struct Connector {
    blacklist: Blacklist,
}

impl Connector {
    pub fn new(blacklist: Vec<String>) -> Self {
        debug!(entries = blacklist.len(), "connector created");
        Self {
            blacklist: Blacklist::new(blacklist),
        }
    }
}

impl Component for Connector {
    fn blacklist(&self) -> Option<&Blacklist> {
        Some(&self.blacklist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_appends_in_order() {
        let connector = Connector::new(vec!["10.0.0.1".into()]);
        let bl = connector.blacklist().unwrap();
        bl.extend(&["10.0.0.2".into(), "10.0.0.3".into()]);
        assert_eq!(bl.entries(), vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        assert!(bl.contains("10.0.0.3"));
        assert!(!bl.contains("10.0.0.4"));
    }
}
