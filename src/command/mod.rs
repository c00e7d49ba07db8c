//! 管理命令协议
//!
//! 运维端发送 `{ command, param?, script?, cron?, blacklist? }` 形式的 JSON，
//! 每条消息最多产生一个结果。

pub mod dispatcher;
pub mod show;

use serde::Deserialize;
use serde_json::Value;

pub use dispatcher::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandKind {
    Stop,
    Kill,
    AddCron,
    RemoveCron,
    Blacklist,
    Set,
    Get,
    Enable,
    Disable,
    Run,
    Exec,
    Show,
    #[default]
    #[serde(other)]
    Unknown,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Stop => "stop",
            CommandKind::Kill => "kill",
            CommandKind::AddCron => "addCron",
            CommandKind::RemoveCron => "removeCron",
            CommandKind::Blacklist => "blacklist",
            CommandKind::Set => "set",
            CommandKind::Get => "get",
            CommandKind::Enable => "enable",
            CommandKind::Disable => "disable",
            CommandKind::Run => "run",
            CommandKind::Exec => "exec",
            CommandKind::Show => "show",
            CommandKind::Unknown => "unknown",
        }
    }
}

/// 一条管理命令
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandEnvelope {
    #[serde(default)]
    pub command: CommandKind,
    #[serde(default)]
    pub param: Option<Value>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub cron: Option<Value>,
    #[serde(default)]
    pub blacklist: Option<Value>,
}

impl CommandEnvelope {
    /// `param.<field>` 优先，其次取顶层字段
    pub fn nested(&self, field: &str) -> Option<&Value> {
        self.param
            .as_ref()
            .and_then(|p| p.get(field))
            .or(match field {
                "cron" => self.cron.as_ref(),
                "blacklist" => self.blacklist.as_ref(),
                _ => None,
            })
    }

    /// `param` 的文本形式：字符串取原值，其余取 JSON 文本
    pub fn param_text(&self) -> Option<String> {
        match self.param.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// 命令执行结果
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    NoResponse,
    Text(String),
    Document { kind: String, body: Value },
}

impl CommandOutcome {
    /// 结果文本与类型标签；无结果时为 None
    pub fn into_parts(self) -> Option<(String, Option<String>)> {
        match self {
            CommandOutcome::NoResponse => None,
            CommandOutcome::Text(text) => Some((text, None)),
            CommandOutcome::Document { kind, body } => Some((body.to_string(), Some(kind))),
        }
    }
}

/// 结果回传通道，由会话层实现
pub trait ResultSink {
    fn send_result(&self, text: &str, kind: Option<&str>);
}

impl<F> ResultSink for F
where
    F: Fn(&str, Option<&str>),
{
    fn send_result(&self, text: &str, kind: Option<&str>) {
        self(text, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_known_and_unknown_commands() {
        let env: CommandEnvelope = serde_json::from_str(r#"{"command":"addCron"}"#).unwrap();
        assert_eq!(env.command, CommandKind::AddCron);
        let env: CommandEnvelope = serde_json::from_str(r#"{"command":"reboot"}"#).unwrap();
        assert_eq!(env.command, CommandKind::Unknown);
        let env: CommandEnvelope = serde_json::from_str("{}").unwrap();
        assert_eq!(env.command, CommandKind::Unknown);
    }

    #[test]
    fn nested_prefers_param() {
        let env: CommandEnvelope = serde_json::from_value(json!({
            "command": "addCron",
            "param": { "cron": { "id": 1 } },
            "cron": { "id": 2 }
        }))
        .unwrap();
        assert_eq!(env.nested("cron"), Some(&json!({ "id": 1 })));

        let env: CommandEnvelope =
            serde_json::from_value(json!({ "command": "addCron", "cron": { "id": 2 } })).unwrap();
        assert_eq!(env.nested("cron"), Some(&json!({ "id": 2 })));
    }

    #[test]
    fn param_text_forms() {
        let env: CommandEnvelope =
            serde_json::from_value(json!({ "command": "run", "param": "1+1" })).unwrap();
        assert_eq!(env.param_text().as_deref(), Some("1+1"));
        let env: CommandEnvelope =
            serde_json::from_value(json!({ "command": "get", "param": 5 })).unwrap();
        assert_eq!(env.param_text().as_deref(), Some("5"));
    }

    #[test]
    fn outcome_parts() {
        assert!(CommandOutcome::NoResponse.into_parts().is_none());
        let doc = CommandOutcome::Document {
            kind: "show".into(),
            body: json!({ "a": 1 }),
        };
        assert_eq!(
            doc.into_parts(),
            Some((r#"{"a":1}"#.to_string(), Some("show".to_string())))
        );
    }

    #[test]
    fn closures_are_sinks() {
        let seen = std::cell::RefCell::new(Vec::new());
        let sink = |text: &str, kind: Option<&str>| {
            seen.borrow_mut().push((text.to_string(), kind.map(str::to_string)));
        };
        sink.send_result("2", None);
        assert_eq!(seen.borrow().len(), 1);
    }
}
