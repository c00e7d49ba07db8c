//! 宿主绑定：`app`、`JSON` 以及主机权限下的 `os` / `fs` / `process` / `util`

use crate::app::context::AppContext;
use crate::app::registry::CONNECTION;
use crate::common::{Opaque, Setting};

use super::value::{Builtin, HostObject, Value};
use super::{Privilege, ScriptError};

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn str_arg(args: &[Value], i: usize, what: &str) -> Result<String, ScriptError> {
    match args.get(i) {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_display()),
        None => Err(ScriptError::Type(format!("{} requires an argument", what))),
    }
}

fn host_failure(what: &str, e: std::io::Error) -> ScriptError {
    ScriptError::Host(format!("{}: {}", what, e))
}

/// 把脚本值写回设置存储；函数、宿主绑定等存为不透明对象
fn to_setting(v: &Value) -> Setting {
    match v.to_json() {
        Some(j) => Setting::Json(j),
        None => Setting::Opaque(Opaque::new(v.type_of(), v.inspect())),
    }
}

fn object(fields: Vec<(&str, Value)>) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

/// 读取宿主对象属性，未知属性为 undefined
pub(super) fn property(ctx: &AppContext, obj: HostObject, name: &str) -> Value {
    match (obj, name) {
        (HostObject::App, "processId") | (HostObject::App, "serverId") => {
            Value::Str(ctx.server_id().to_string())
        }
        (HostObject::App, "serverType") => Value::Str(ctx.server_type().to_string()),
        (HostObject::App, "frontend") => Value::Bool(ctx.is_frontend()),
        (HostObject::App, "settings") => Value::Object(
            ctx.settings()
                .snapshot()
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_setting(v)))
                .collect(),
        ),
        (HostObject::App, "components") => Value::Array(
            ctx.components()
                .keys()
                .into_iter()
                .map(Value::Str)
                .collect(),
        ),
        (HostObject::Os, "eol") => Value::Str(if cfg!(windows) { "\r\n" } else { "\n" }.into()),
        (HostObject::Process, "pid") => Value::Number(f64::from(std::process::id())),
        (HostObject::Process, "platform") => Value::Str(std::env::consts::OS.into()),
        _ => Value::Undefined,
    }
}

pub(super) fn call_method(
    ctx: &AppContext,
    obj: HostObject,
    name: &str,
    args: &[Value],
) -> Result<Value, ScriptError> {
    match obj {
        HostObject::App => app_method(ctx, name, args),
        HostObject::Json => json_method(name, args),
        HostObject::Os => os_method(name),
        HostObject::Fs => fs_method(name, args),
        HostObject::Process => process_method(ctx, name, args),
        HostObject::Util => util_method(name, args),
    }
    .unwrap_or_else(|| {
        Err(ScriptError::Type(format!(
            "{}.{} is not a function",
            obj.name(),
            name
        )))
    })
}

fn app_method(ctx: &AppContext, name: &str, args: &[Value]) -> Option<Result<Value, ScriptError>> {
    let result = match name {
        "get" => str_arg(args, 0, "app.get").map(|key| {
            ctx.get(&key)
                .map(|s| Value::from_setting(&s))
                .unwrap_or(Value::Undefined)
        }),
        "set" => str_arg(args, 0, "app.set").map(|key| {
            ctx.set(key, to_setting(&arg(args, 1)));
            Value::Host(HostObject::App)
        }),
        "enable" => str_arg(args, 0, "app.enable").map(|key| {
            ctx.enable(&key);
            Value::Undefined
        }),
        "disable" => str_arg(args, 0, "app.disable").map(|key| {
            ctx.disable(&key);
            Value::Undefined
        }),
        "enabled" => str_arg(args, 0, "app.enabled").map(|key| Value::Bool(ctx.enabled(&key))),
        "disabled" => {
            str_arg(args, 0, "app.disabled").map(|key| Value::Bool(!ctx.enabled(&key)))
        }
        "isFrontend" => Ok(Value::Bool(ctx.is_frontend())),
        "isBackend" => Ok(Value::Bool(!ctx.is_frontend())),
        "getServerById" => str_arg(args, 0, "app.getServerById").map(|id| {
            ctx.server_by_id(&id)
                .and_then(|s| serde_json::to_value(s).ok())
                .map(|j| Value::from_json(&j))
                .unwrap_or(Value::Undefined)
        }),
        "getServers" => Ok(Value::Array(
            ctx.servers()
                .iter()
                .filter_map(|s| serde_json::to_value(s).ok())
                .map(|j| Value::from_json(&j))
                .collect(),
        )),
        "statistics" => {
            let key = match args.first() {
                Some(v) => v.to_display(),
                None => CONNECTION.to_string(),
            };
            Ok(ctx
                .components()
                .get(&key)
                .and_then(|c| c.statistics())
                .map(|j| Value::from_json(&j))
                .unwrap_or(Value::Undefined))
        }
        "uptime" => Ok(Value::Number(ctx.uptime().as_secs_f64())),
        _ => return None,
    };
    Some(result)
}

fn json_method(name: &str, args: &[Value]) -> Option<Result<Value, ScriptError>> {
    let result = match name {
        "stringify" => match arg(args, 0) {
            Value::Undefined => Ok(Value::Undefined),
            v => v
                .to_json()
                .map(|j| Value::Str(j.to_string()))
                .ok_or_else(|| ScriptError::Type("value is not JSON serializable".into())),
        },
        "parse" => str_arg(args, 0, "JSON.parse").and_then(|s| {
            serde_json::from_str::<serde_json::Value>(&s)
                .map(|j| Value::from_json(&j))
                .map_err(|e| ScriptError::Syntax {
                    line: e.line(),
                    column: e.column(),
                    message: format!("invalid JSON: {}", e),
                })
        }),
        _ => return None,
    };
    Some(result)
}

fn os_method(name: &str) -> Option<Result<Value, ScriptError>> {
    let v = match name {
        "platform" => Value::Str(std::env::consts::OS.into()),
        "arch" => Value::Str(std::env::consts::ARCH.into()),
        "tmpdir" => Value::Str(std::env::temp_dir().display().to_string()),
        "home" => std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map(Value::Str)
            .unwrap_or(Value::Undefined),
        "cpus" => Value::Number(
            std::thread::available_parallelism()
                .map(|n| n.get() as f64)
                .unwrap_or(1.0),
        ),
        _ => return None,
    };
    Some(Ok(v))
}

fn fs_method(name: &str, args: &[Value]) -> Option<Result<Value, ScriptError>> {
    let result = match name {
        "read" => str_arg(args, 0, "fs.read").and_then(|path| {
            std::fs::read_to_string(&path)
                .map(Value::Str)
                .map_err(|e| host_failure(&path, e))
        }),
        "exists" => {
            str_arg(args, 0, "fs.exists").map(|path| Value::Bool(std::path::Path::new(&path).exists()))
        }
        "list" => str_arg(args, 0, "fs.list").and_then(|path| {
            let entries = std::fs::read_dir(&path).map_err(|e| host_failure(&path, e))?;
            let mut names: Vec<String> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            Ok(Value::Array(names.into_iter().map(Value::Str).collect()))
        }),
        "write" => str_arg(args, 0, "fs.write").and_then(|path| {
            let data = arg(args, 1).to_display();
            std::fs::write(&path, data)
                .map(|_| Value::Undefined)
                .map_err(|e| host_failure(&path, e))
        }),
        "stat" => str_arg(args, 0, "fs.stat").and_then(|path| {
            let meta = std::fs::metadata(&path).map_err(|e| host_failure(&path, e))?;
            Ok(object(vec![
                ("size", Value::Number(meta.len() as f64)),
                ("isFile", Value::Bool(meta.is_file())),
                ("isDirectory", Value::Bool(meta.is_dir())),
            ]))
        }),
        _ => return None,
    };
    Some(result)
}

fn process_method(ctx: &AppContext, name: &str, args: &[Value]) -> Option<Result<Value, ScriptError>> {
    let result = match name {
        "cwd" => std::env::current_dir()
            .map(|p| Value::Str(p.display().to_string()))
            .map_err(|e| host_failure("cwd", e)),
        "env" => str_arg(args, 0, "process.env").map(|key| {
            std::env::var(&key)
                .map(Value::Str)
                .unwrap_or(Value::Undefined)
        }),
        "args" => Ok(Value::Array(std::env::args().map(Value::Str).collect())),
        "uptime" => Ok(Value::Number(ctx.uptime().as_secs_f64())),
        _ => return None,
    };
    Some(result)
}

fn util_method(name: &str, args: &[Value]) -> Option<Result<Value, ScriptError>> {
    let result = match name {
        "inspect" => Ok(Value::Str(arg(args, 0).inspect())),
        "format" => Ok(Value::Str(format(args))),
        _ => return None,
    };
    Some(result)
}

/// `%s` / `%d` / `%j` / `%%` 占位，多余参数以空格追加
fn format(args: &[Value]) -> String {
    let Some(first) = args.first() else {
        return String::new();
    };
    let Value::Str(fmt) = first else {
        return args
            .iter()
            .map(Value::inspect)
            .collect::<Vec<_>>()
            .join(" ");
    };

    let mut rest = args[1..].iter();
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some(spec @ ('s' | 'd' | 'j')) => {
                chars.next();
                match rest.next() {
                    Some(v) => out.push_str(&match spec {
                        's' => v.to_display(),
                        'd' => super::value::format_number(v.to_number()),
                        _ => v
                            .to_json()
                            .map(|j| j.to_string())
                            .unwrap_or_else(|| "[Circular]".into()),
                    }),
                    None => {
                        out.push('%');
                        out.push(spec);
                    }
                }
            }
            _ => out.push('%'),
        }
    }
    for v in rest {
        out.push(' ');
        out.push_str(&v.to_display());
    }
    out
}

/// 全局函数调用
pub(super) fn call_builtin(
    builtin: Builtin,
    args: &[Value],
    privilege: Privilege,
) -> Result<Value, ScriptError> {
    match builtin {
        Builtin::Require => {
            let name = str_arg(args, 0, "require")?;
            let module = match name.as_str() {
                "os" => HostObject::Os,
                "fs" => HostObject::Fs,
                "process" => HostObject::Process,
                "util" => HostObject::Util,
                _ => {
                    return Err(ScriptError::Host(format!(
                        "cannot find module '{}'",
                        name
                    )))
                }
            };
            if privilege.allows(module) {
                Ok(Value::Host(module))
            } else {
                Err(ScriptError::Host(format!(
                    "module '{}' is not available at {} privilege",
                    name,
                    privilege.as_str()
                )))
            }
        }
        Builtin::Error => Ok(Value::Error(match args.first() {
            Some(v) => v.to_display(),
            None => String::new(),
        })),
        Builtin::String => Ok(Value::Str(arg(args, 0).to_display())),
        Builtin::Number => Ok(Value::Number(arg(args, 0).to_number())),
        Builtin::Keys => match arg(args, 0) {
            Value::Object(map) => Ok(Value::Array(map.into_keys().map(Value::Str).collect())),
            Value::Array(items) => Ok(Value::Array(
                (0..items.len()).map(|i| Value::Str(i.to_string())).collect(),
            )),
            other => Err(ScriptError::Type(format!(
                "cannot list keys of {}",
                other.type_of()
            ))),
        },
    }
}

/// 普通值上的方法
pub(super) fn value_method(recv: &Value, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    let v = match (recv, name) {
        (Value::Str(s), "toUpperCase") => Value::Str(s.to_uppercase()),
        (Value::Str(s), "toLowerCase") => Value::Str(s.to_lowercase()),
        (Value::Str(s), "trim") => Value::Str(s.trim().to_string()),
        (Value::Str(s), "includes") => Value::Bool(s.contains(&arg(args, 0).to_display())),
        (Value::Str(s), "startsWith") => Value::Bool(s.starts_with(&arg(args, 0).to_display())),
        (Value::Str(s), "endsWith") => Value::Bool(s.ends_with(&arg(args, 0).to_display())),
        (Value::Str(s), "split") => {
            let sep = arg(args, 0).to_display();
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::Str(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(|p| Value::Str(p.to_string())).collect()
            };
            Value::Array(parts)
        }
        (Value::Array(items), "join") => {
            let sep = match args.first() {
                Some(v) => v.to_display(),
                None => ",".to_string(),
            };
            Value::Str(
                items
                    .iter()
                    .map(Value::to_display)
                    .collect::<Vec<_>>()
                    .join(&sep),
            )
        }
        (Value::Array(items), "includes") => {
            let needle = arg(args, 0);
            Value::Bool(items.iter().any(|v| *v == needle))
        }
        (Value::Array(items), "indexOf") => {
            let needle = arg(args, 0);
            Value::Number(match items.iter().position(|v| *v == needle) {
                Some(i) => i as f64,
                None => -1.0,
            })
        }
        (Value::Array(items), "concat") => {
            let mut out = items.clone();
            for a in args {
                match a {
                    Value::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Value::Array(out)
        }
        (Value::Array(items), "slice") => {
            let len = items.len() as f64;
            let bound = |v: Value, default: f64| match v {
                Value::Undefined => default,
                v => {
                    let n = v.to_number().trunc();
                    let n = if n < 0.0 { len + n } else { n };
                    n.clamp(0.0, len)
                }
            };
            let start = bound(arg(args, 0), 0.0) as usize;
            let end = bound(arg(args, 1), len) as usize;
            Value::Array(items.get(start..end.max(start)).unwrap_or_default().to_vec())
        }
        (_, "toString") => Value::Str(recv.to_display()),
        _ => {
            return Err(ScriptError::Type(format!(
                "{}.{} is not a function",
                recv.type_of(),
                name
            )))
        }
    };
    Ok(v)
}

/// 普通值上的属性
pub(super) fn value_property(recv: &Value, name: &str) -> Result<Value, ScriptError> {
    match recv {
        Value::Undefined | Value::Null => Err(ScriptError::Type(format!(
            "cannot read properties of {} (reading '{}')",
            recv.inspect(),
            name
        ))),
        Value::Str(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
        Value::Array(items) if name == "length" => Ok(Value::Number(items.len() as f64)),
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Undefined)),
        Value::Error(msg) if name == "message" => Ok(Value::Str(msg.clone())),
        _ => Ok(Value::Undefined),
    }
}

pub(super) fn index(recv: &Value, key: &Value) -> Result<Value, ScriptError> {
    match (recv, key) {
        (Value::Array(items), Value::Number(n)) => Ok(if *n >= 0.0 && n.fract() == 0.0 {
            items.get(*n as usize).cloned().unwrap_or(Value::Undefined)
        } else {
            Value::Undefined
        }),
        (Value::Str(s), Value::Number(n)) => Ok(if *n >= 0.0 && n.fract() == 0.0 {
            s.chars()
                .nth(*n as usize)
                .map(|c| Value::Str(c.to_string()))
                .unwrap_or(Value::Undefined)
        } else {
            Value::Undefined
        }),
        (_, key) => value_property(recv, &key.to_display()),
    }
}
