//! 宿主设置值与 JSON 安全性探测
//!
//! 设置存储中的值不一定都能序列化：可能是共享的可变对象（允许自引用形成环），
//! 也可能是函数、活动连接之类的不透明宿主对象。`to_json` 以深度受限、
//! 跟踪祖先引用的方式探测，而不是序列化后再捕获错误。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};

/// 探测允许的最大嵌套深度
pub const MAX_DEPTH: usize = 64;

/// 设置存储中的一个值
#[derive(Clone, Debug)]
pub enum Setting {
    /// 普通 JSON 文档
    Json(Value),
    /// 共享可变对象，可能包含环
    Object(SharedObject),
    /// 不可序列化的宿主对象
    Opaque(Opaque),
}

impl Setting {
    pub fn is_opaque(&self) -> bool {
        matches!(self, Setting::Opaque(_))
    }
}

impl From<Value> for Setting {
    fn from(v: Value) -> Self {
        Setting::Json(v)
    }
}

impl From<SharedObject> for Setting {
    fn from(o: SharedObject) -> Self {
        Setting::Object(o)
    }
}

impl From<Opaque> for Setting {
    fn from(o: Opaque) -> Self {
        Setting::Opaque(o)
    }
}

/// 引用语义的对象：克隆得到的是同一份数据
#[derive(Clone, Default)]
pub struct SharedObject(Arc<RwLock<BTreeMap<String, Setting>>>);

impl SharedObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Setting>) {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<Setting> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// 复制一份条目，调用方遍历时不持有锁
    pub fn entries(&self) -> Vec<(String, Setting)> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for SharedObject {
    // 不递归打印，对象可能自引用
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedObject({} keys)", self.len())
    }
}

/// 不透明宿主对象（函数、连接句柄等），只暴露类型标签
#[derive(Clone)]
pub struct Opaque {
    type_name: String,
    label: String,
}

impl Opaque {
    pub fn new(type_name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            label: label.into(),
        }
    }

    /// 以名字代表的宿主函数
    pub fn function(name: impl Into<String>) -> Self {
        Self::new("function", name)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}]", self.type_name, self.label)
    }
}

/// 转换为 JSON 快照；不可序列化（不透明值、环、过深）时返回 None
pub fn to_json(setting: &Setting) -> Option<Value> {
    let mut ancestors = Vec::new();
    convert(setting, 0, &mut ancestors)
}

pub fn is_json_safe(setting: &Setting) -> bool {
    to_json(setting).is_some()
}

fn convert(setting: &Setting, depth: usize, ancestors: &mut Vec<usize>) -> Option<Value> {
    if depth > MAX_DEPTH {
        return None;
    }
    match setting {
        Setting::Json(v) => {
            if json_depth(v) + depth > MAX_DEPTH {
                None
            } else {
                Some(v.clone())
            }
        }
        Setting::Opaque(_) => None,
        Setting::Object(obj) => {
            let id = obj.identity();
            // 只有祖先链上的重复引用才是环，菱形共享是合法的
            if ancestors.contains(&id) {
                return None;
            }
            ancestors.push(id);
            let mut map = Map::new();
            for (key, child) in obj.entries() {
                match convert(&child, depth + 1, ancestors) {
                    Some(v) => {
                        map.insert(key, v);
                    }
                    None => {
                        ancestors.pop();
                        return None;
                    }
                }
            }
            ancestors.pop();
            Some(Value::Object(map))
        }
    }
}

fn json_depth(v: &Value) -> usize {
    match v {
        Value::Array(items) => 1 + items.iter().map(json_depth).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(json_depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// 只保留标量字段（字符串、数字、布尔）
pub fn scalar_fields(setting: Option<&Setting>) -> Map<String, Value> {
    let mut out = Map::new();
    match setting {
        Some(Setting::Json(Value::Object(map))) => {
            for (k, v) in map {
                if is_scalar(v) {
                    out.insert(k.clone(), v.clone());
                }
            }
        }
        Some(Setting::Object(obj)) => {
            for (k, v) in obj.entries() {
                if let Setting::Json(v) = v {
                    if is_scalar(&v) {
                        out.insert(k, v);
                    }
                }
            }
        }
        _ => {}
    }
    out
}

fn is_scalar(v: &Value) -> bool {
    matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// 按脚本语言的真值规则判断 JSON 值是否为假
pub fn is_falsy(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0 || f.is_nan()).unwrap_or(false),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_json_is_safe() {
        let s = Setting::Json(json!({"a": [1, 2, {"b": true}]}));
        assert_eq!(to_json(&s), Some(json!({"a": [1, 2, {"b": true}]})));
    }

    #[test]
    fn opaque_is_not_safe() {
        assert!(!is_json_safe(&Setting::Opaque(Opaque::function("handler"))));
    }

    #[test]
    fn self_reference_is_detected() {
        let obj = SharedObject::new();
        obj.insert("name", json!("loop"));
        obj.insert("me", obj.clone());
        assert!(to_json(&Setting::Object(obj)).is_none());
    }

    #[test]
    fn diamond_sharing_is_fine() {
        let leaf = SharedObject::new();
        leaf.insert("x", json!(1));
        let root = SharedObject::new();
        root.insert("left", leaf.clone());
        root.insert("right", leaf);
        assert_eq!(
            to_json(&Setting::Object(root)),
            Some(json!({"left": {"x": 1}, "right": {"x": 1}}))
        );
    }

    #[test]
    fn nested_opaque_poisons_parent() {
        let obj = SharedObject::new();
        obj.insert("conn", Opaque::new("socket", "fd 7"));
        assert!(!is_json_safe(&Setting::Object(obj)));
    }

    #[test]
    fn depth_is_bounded() {
        let mut v = json!(0);
        for _ in 0..(MAX_DEPTH + 2) {
            v = json!([v]);
        }
        assert!(!is_json_safe(&Setting::Json(v)));
    }

    #[test]
    fn scalar_fields_drop_nested_and_null() {
        let cfg = Setting::Json(json!({
            "host": "127.0.0.1",
            "port": 3010,
            "useDict": true,
            "opts": {"a": 1},
            "list": [1],
            "none": null
        }));
        let out = scalar_fields(Some(&cfg));
        assert_eq!(out.len(), 3);
        assert_eq!(out["port"], json!(3010));
        assert!(scalar_fields(None).is_empty());
    }

    #[test]
    fn shared_object_survives_poisoning() {
        let obj = SharedObject::new();
        obj.insert("a", json!(1));
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = obj.0.write().unwrap();
            panic!("holder died");
        }));
        obj.insert("b", json!(2));
        assert_eq!(obj.len(), 2);
        assert_eq!(to_json(&Setting::Object(obj)), Some(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn opaque_debug_shows_label() {
        assert_eq!(format!("{:?}", Opaque::function("onClose")), "[function onClose]");
    }

    #[test]
    fn falsy_rules() {
        assert!(is_falsy(&json!(null)));
        assert!(is_falsy(&json!("")));
        assert!(is_falsy(&json!(0)));
        assert!(is_falsy(&json!(false)));
        assert!(!is_falsy(&json!("v")));
        assert!(!is_falsy(&json!({})));
    }
}
