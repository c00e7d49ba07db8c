use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value as Json;

use crate::common::value::{to_json, Setting};

use super::parser::FunctionDef;
use super::scope::Env;

/// 宿主绑定对象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostObject {
    App,
    Json,
    Os,
    Fs,
    Process,
    Util,
}

impl HostObject {
    pub fn name(self) -> &'static str {
        match self {
            HostObject::App => "app",
            HostObject::Json => "JSON",
            HostObject::Os => "os",
            HostObject::Fs => "fs",
            HostObject::Process => "process",
            HostObject::Util => "util",
        }
    }
}

/// 全局可调用函数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Require,
    Error,
    String,
    Number,
    Keys,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Require => "require",
            Builtin::Error => "Error",
            Builtin::String => "String",
            Builtin::Number => "Number",
            Builtin::Keys => "keys",
        }
    }
}

/// 脚本定义的函数及其捕获的作用域
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub env: Env,
}

impl Closure {
    pub fn name(&self) -> Option<&str> {
        self.def.name.as_deref()
    }
}

// 按引用比较
impl PartialEq for Closure {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl fmt::Debug for Closure {
    // 作用域里可能引用自身，不展开
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure({:?})", self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// 错误对象（`Error("x")` 构造）
    Error(String),
    Host(HostObject),
    Builtin(Builtin),
    Function(Rc<Closure>),
    /// 无法序列化的宿主值，只保留类型标签
    Opaque(String),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Builtin(_) | Value::Function(_) => "function",
            Value::Opaque(t) if t == "function" => "function",
            _ => "object",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Builtin(_) | Value::Function(_))
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Null => 0.0,
            Value::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// 字符串形式（拼接与脚本结果使用）
    pub fn to_display(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.to_display(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => match self.to_json() {
                Some(j) => j.to_string(),
                None => self.inspect(),
            },
            _ => self.inspect(),
        }
    }

    /// 便于阅读的检查形式，字符串带引号
    pub fn inspect(&self) -> String {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Value::Array(items) if items.is_empty() => "[]".into(),
            Value::Array(items) => format!(
                "[ {} ]",
                items.iter().map(Value::inspect).collect::<Vec<_>>().join(", ")
            ),
            Value::Object(map) if map.is_empty() => "{}".into(),
            Value::Object(map) => format!(
                "{{ {} }}",
                map.iter()
                    .map(|(k, v)| format!("{}: {}", inspect_key(k), v.inspect()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Value::Error(msg) => format!("Error: {}", msg),
            Value::Host(h) => format!("[object {}]", h.name()),
            Value::Builtin(b) => format!("[Function: {}]", b.name()),
            Value::Function(f) => match f.name() {
                Some(name) => format!("[Function: {}]", name),
                None => "[Function (anonymous)]".into(),
            },
            Value::Opaque(t) => format!("[{}]", t),
        }
    }

    /// 转换为 JSON；宿主绑定、函数等返回 None，undefined 视为 null
    pub fn to_json(&self) -> Option<Json> {
        Some(match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.clone()),
            Value::Array(items) => {
                Json::Array(items.iter().map(Value::to_json).collect::<Option<_>>()?)
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json()?);
                }
                Json::Object(out)
            }
            Value::Error(msg) => Json::String(format!("Error: {}", msg)),
            Value::Host(_) | Value::Builtin(_) | Value::Function(_) | Value::Opaque(_) => {
                return None
            }
        })
    }

    pub fn from_json(v: &Json) -> Self {
        match v {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(items) => Value::Array(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn from_setting(s: &Setting) -> Self {
        match s {
            Setting::Opaque(o) => Value::Opaque(o.type_name().to_string()),
            other => match to_json(other) {
                Some(j) => Value::from_json(&j),
                None => Value::Opaque("object".into()),
            },
        }
    }
}

fn inspect_key(k: &str) -> String {
    let ident = !k.is_empty()
        && !k.starts_with(|c: char| c.is_ascii_digit())
        && k.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if ident {
        k.to_string()
    } else {
        format!("'{}'", k)
    }
}

/// 整数不带小数点，NaN / Infinity 按字面输出
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        let s = if n > 0.0 { "Infinity" } else { "-Infinity" };
        s.into()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn inspect_quotes_strings() {
        assert_eq!(Value::Str("it's".into()).inspect(), r"'it\'s'");
        assert_eq!(Value::Str("abc".into()).to_display(), "abc");
    }

    #[test]
    fn inspect_nested() {
        let v = Value::from_json(&json!({"a": [1, "x"], "b-c": {}}));
        assert_eq!(v.inspect(), "{ a: [ 1, 'x' ], 'b-c': {} }");
    }

    #[test]
    fn display_of_containers() {
        let v = Value::from_json(&json!([1, null, "a"]));
        assert_eq!(v.to_display(), "1,,a");
        let o = Value::from_json(&json!({"k": 1}));
        assert_eq!(o.to_display(), r#"{"k":1}"#);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Str(String::new()).truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(Value::Object(BTreeMap::new()).truthy());
        assert!(Value::Host(HostObject::App).truthy());
    }

    #[test]
    fn host_values_are_not_json() {
        assert!(Value::Host(HostObject::Fs).to_json().is_none());
        assert!(Value::Array(vec![Value::Builtin(Builtin::Require)])
            .to_json()
            .is_none());
        assert_eq!(Value::Undefined.to_json(), Some(json!(null)));
    }
}
