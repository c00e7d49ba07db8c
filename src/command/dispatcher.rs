use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::app::context::AppContext;
use crate::app::registry::CONNECTOR;
use crate::common::value::{is_falsy, to_json};
use crate::common::AdminError;
use crate::config::EvalConfig;
use crate::eval::{Evaluator, Mode, Privilege};

use super::{show, CommandEnvelope, CommandKind, CommandOutcome, ResultSink};

/// 命令分发器：解码消息，路由到具体操作，最多产生一个结果
pub struct Dispatcher {
    ctx: Arc<AppContext>,
    evaluator: Evaluator,
}

impl Dispatcher {
    pub fn new(ctx: Arc<AppContext>, eval: &EvalConfig) -> Self {
        Self {
            ctx,
            evaluator: Evaluator::new(eval.max_steps),
        }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    /// 处理一条消息并通过 sink 回传结果
    pub fn handle(&self, raw: &str, sink: &dyn ResultSink) {
        if let Some((text, kind)) = self.dispatch(raw).into_parts() {
            sink.send_result(&text, kind.as_deref());
        }
    }

    pub fn dispatch(&self, raw: &str) -> CommandOutcome {
        let server_id = self.ctx.server_id();
        debug!(server_id, data = raw, "command received");

        let envelope = match decode(raw) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                warn!(server_id, "command data is null");
                return CommandOutcome::NoResponse;
            }
            Err(e) => {
                warn!(server_id, error = %e, kind = e.kind().as_str(), "command dropped");
                return CommandOutcome::NoResponse;
            }
        };

        match envelope.command {
            CommandKind::Stop => {
                info!(server_id, "server is stopped");
                self.ctx.request_stop();
                CommandOutcome::NoResponse
            }
            CommandKind::Kill => {
                info!(server_id, "server is forced killed");
                self.ctx.terminate(0);
                CommandOutcome::NoResponse
            }
            CommandKind::AddCron | CommandKind::RemoveCron => self.cron(&envelope),
            CommandKind::Blacklist => self.blacklist(&envelope),
            CommandKind::Set => self.set(&envelope),
            CommandKind::Get => self.get(&envelope),
            CommandKind::Enable | CommandKind::Disable => self.toggle(&envelope),
            CommandKind::Run => self.run(&envelope),
            CommandKind::Exec => self.exec(&envelope),
            CommandKind::Show => CommandOutcome::Document {
                kind: "show".into(),
                body: show::collect(&self.ctx),
            },
            CommandKind::Unknown => {
                debug!(server_id, data = raw, "unknown command");
                CommandOutcome::NoResponse
            }
        }
    }

    fn cron(&self, envelope: &CommandEnvelope) -> CommandOutcome {
        let cron = envelope.nested("cron").cloned().unwrap_or(Value::Null);
        info!(
            server_id = self.ctx.server_id(),
            command = envelope.command.as_str(),
            cron = %cron,
            "cron change"
        );
        if envelope.command == CommandKind::AddCron {
            self.ctx.add_crons(vec![cron]);
        } else {
            self.ctx.remove_crons(vec![cron]);
        }
        CommandOutcome::NoResponse
    }

    fn blacklist(&self, envelope: &CommandEnvelope) -> CommandOutcome {
        let server_id = self.ctx.server_id();
        if !self.ctx.is_frontend() {
            debug!(server_id, "blacklist ignored on backend server");
            return CommandOutcome::NoResponse;
        }
        let entries = blacklist_entries(envelope.nested("blacklist"));
        let Some(connector) = self.ctx.components().get(CONNECTOR) else {
            warn!(server_id, "no connector registered, blacklist ignored");
            return CommandOutcome::NoResponse;
        };
        match connector.blacklist() {
            Some(list) => {
                info!(server_id, entries = ?entries, "add blacklist");
                list.extend(&entries);
            }
            None => warn!(server_id, "connector has no blacklist"),
        }
        CommandOutcome::NoResponse
    }

    fn set(&self, envelope: &CommandEnvelope) -> CommandOutcome {
        let server_id = self.ctx.server_id();
        let param = envelope.param.as_ref();
        let Some(key) = param.and_then(|p| p.get("key")).map(key_text) else {
            warn!(server_id, "set without param.key");
            return CommandOutcome::NoResponse;
        };
        let value = param
            .and_then(|p| p.get("value"))
            .cloned()
            .unwrap_or(Value::Null);
        info!(server_id, key = %key, value = %value, "set");
        self.ctx.set(key, value);
        CommandOutcome::NoResponse
    }

    fn get(&self, envelope: &CommandEnvelope) -> CommandOutcome {
        let server_id = self.ctx.server_id();
        let key = envelope.param_text().unwrap_or_default();
        let text = match self.ctx.get(&key) {
            None => "undefined".to_string(),
            Some(setting) => match to_json(&setting) {
                None => {
                    debug!(
                        server_id,
                        error = %AdminError::Serialization(key.clone()),
                        "get"
                    );
                    "object".to_string()
                }
                Some(v) if is_falsy(&v) => "undefined".to_string(),
                Some(Value::String(s)) => s,
                Some(v) => v.to_string(),
            },
        };
        info!(server_id, key = %key, value = %text, "get");
        CommandOutcome::Text(text)
    }

    fn toggle(&self, envelope: &CommandEnvelope) -> CommandOutcome {
        let server_id = self.ctx.server_id();
        let Some(feature) = envelope.param_text() else {
            warn!(server_id, command = envelope.command.as_str(), "missing feature name");
            return CommandOutcome::NoResponse;
        };
        info!(server_id, command = envelope.command.as_str(), feature = %feature, "toggle feature");
        if envelope.command == CommandKind::Enable {
            self.ctx.enable(&feature);
        } else {
            self.ctx.disable(&feature);
        }
        CommandOutcome::NoResponse
    }

    fn run(&self, envelope: &CommandEnvelope) -> CommandOutcome {
        let source = envelope.param_text().unwrap_or_default();
        self.evaluate(&source, Mode::Expression, Privilege::Restricted, "run")
    }

    fn exec(&self, envelope: &CommandEnvelope) -> CommandOutcome {
        let source = envelope.script.clone().unwrap_or_default();
        self.evaluate(&source, Mode::Script, Privilege::Host, "exec")
    }

    fn evaluate(&self, source: &str, mode: Mode, privilege: Privilege, command: &str) -> CommandOutcome {
        let server_id = self.ctx.server_id();
        match self.evaluator.evaluate(&self.ctx, source, mode, privilege) {
            Ok(result) => {
                info!(server_id, command, source, result = %result, "evaluated");
                CommandOutcome::Text(result)
            }
            Err(e) => {
                let err = AdminError::Evaluation(e.to_string());
                error!(server_id, command, source, error = %err, "evaluation failed");
                CommandOutcome::Text(err.to_string())
            }
        }
    }
}

/// 空消息或 JSON `null` 返回 Ok(None)
fn decode(raw: &str) -> Result<Option<CommandEnvelope>, AdminError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(raw)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(value)?))
}

fn key_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 单个字符串或字符串数组
fn blacklist_entries(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items.iter().map(key_text).collect(),
        _ => Vec::new(),
    }
}
