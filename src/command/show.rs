//! `show` 命令的自省快照
//!
//! 五个子报告各自独立构建，任何一个失败都只影响自身。

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::error;

use crate::app::context::AppContext;
use crate::app::registry::{display_name, MemberTable, CONNECTION, PROXY, SERVER};
use crate::common::value::{scalar_fields, to_json};

pub const NO_CONNECTION: &str = "no connection";
pub const NO_PROXY: &str = "no proxy loaded";
pub const NO_HANDLER: &str = "no handler loaded";
/// 设置中不可序列化的值在报告里的占位
pub const OPAQUE_SETTING: &str = "Object";

static RESERVED_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^__\w+__$").unwrap());
static CONFIG_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+Config$").unwrap());

pub fn collect(ctx: &AppContext) -> Value {
    json!({
        "connectionInfo": connection_info(ctx),
        "proxyInfo": proxy_info(ctx),
        "handlerInfo": handler_info(ctx),
        "componentInfo": component_info(ctx),
        "settingInfo": setting_info(ctx),
    })
}

pub fn connection_info(ctx: &AppContext) -> Value {
    let stats = ctx
        .components()
        .get(CONNECTION)
        .and_then(|c| c.statistics())
        .unwrap_or_else(|| Value::String(NO_CONNECTION.into()));
    json!({
        "serverId": ctx.server_id(),
        "connectionInfo": stats,
    })
}

/// 只保留可调用成员
fn callable(members: &MemberTable, out: &mut Map<String, Value>) {
    for (name, member) in members {
        if member.is_function() {
            out.insert(name.clone(), Value::String("function".into()));
        }
    }
}

pub fn proxy_info(ctx: &AppContext) -> Value {
    let Some(proxies) = ctx.components().get(PROXY).and_then(|c| c.remote_proxies()) else {
        return Value::String(NO_PROXY.into());
    };
    let server_type = match ctx.resolve_self_type() {
        Ok(t) => t,
        Err(e) => {
            error!(server_id = ctx.server_id(), error = %e, "proxy info degraded");
            return Value::Object(Map::new());
        }
    };

    let mut by_namespace = Map::new();
    if let Some(namespaces) = proxies.get(server_type) {
        for (ns, members) in namespaces {
            let mut rpcs = Map::new();
            callable(members, &mut rpcs);
            by_namespace.insert(ns.clone(), Value::Object(rpcs));
        }
    }
    let mut out = Map::new();
    out.insert(server_type.to_string(), Value::Object(by_namespace));
    Value::Object(out)
}

pub fn handler_info(ctx: &AppContext) -> Value {
    let Some(handlers) = ctx.components().get(SERVER).and_then(|c| c.request_handlers()) else {
        return Value::String(NO_HANDLER.into());
    };
    let server_type = match ctx.resolve_self_type() {
        Ok(t) => t,
        Err(e) => {
            error!(server_id = ctx.server_id(), error = %e, "handler info degraded");
            return Value::Object(Map::new());
        }
    };

    // 子命名空间一层被压平
    let mut by_namespace = Map::new();
    for (ns, subs) in &handlers {
        let mut methods = Map::new();
        for members in subs.values() {
            callable(members, &mut methods);
        }
        by_namespace.insert(ns.clone(), Value::Object(methods));
    }
    let mut out = Map::new();
    out.insert(server_type.to_string(), Value::Object(by_namespace));
    Value::Object(out)
}

pub fn component_info(ctx: &AppContext) -> Value {
    let mut out = Map::new();
    for key in ctx.components().keys() {
        let Some(name) = display_name(&key) else {
            continue;
        };
        let config = ctx.get(&format!("{}Config", name));
        out.insert(
            name.to_string(),
            Value::Object(scalar_fields(config.as_ref())),
        );
    }
    Value::Object(out)
}

pub fn setting_info(ctx: &AppContext) -> Value {
    let mut out = Map::new();
    for (key, setting) in ctx.settings().snapshot() {
        if RESERVED_KEY.is_match(&key) || CONFIG_KEY.is_match(&key) {
            continue;
        }
        let value = to_json(&setting).unwrap_or_else(|| Value::String(OPAQUE_SETTING.into()));
        out.insert(key, value);
    }
    Value::Object(out)
}
