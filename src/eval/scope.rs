//! 词法作用域链

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::value::Value;

pub type Env = Rc<RefCell<Frame>>;

#[derive(Default)]
pub struct Frame {
    vars: HashMap<String, Value>,
    parent: Option<Env>,
    /// 函数体或全局帧，`var` 声明落在这里
    function: bool,
}

impl Frame {
    pub fn root() -> Env {
        Rc::new(RefCell::new(Frame {
            function: true,
            ..Frame::default()
        }))
    }

    pub fn child(parent: &Env, function: bool) -> Env {
        Rc::new(RefCell::new(Frame {
            vars: HashMap::new(),
            parent: Some(parent.clone()),
            function,
        }))
    }
}

pub fn lookup(env: &Env, name: &str) -> Option<Value> {
    let mut cur = env.clone();
    loop {
        let parent = {
            let frame = cur.borrow();
            if let Some(v) = frame.vars.get(name) {
                return Some(v.clone());
            }
            frame.parent.clone()
        };
        cur = parent?;
    }
}

/// 在当前帧声明
pub fn declare(env: &Env, name: &str, value: Value) {
    env.borrow_mut().vars.insert(name.to_string(), value);
}

/// `var` 声明：落到最近的函数帧
pub fn declare_var(env: &Env, name: &str, value: Value) {
    let mut cur = env.clone();
    loop {
        let parent = {
            let frame = cur.borrow();
            if frame.function {
                None
            } else {
                frame.parent.clone()
            }
        };
        match parent {
            Some(p) => cur = p,
            None => break,
        }
    }
    declare(&cur, name, value);
}

/// 沿作用域链赋值；未声明的名字落到全局帧
pub fn assign(env: &Env, name: &str, value: Value) {
    let mut cur = env.clone();
    loop {
        let parent = {
            let mut frame = cur.borrow_mut();
            if let Some(slot) = frame.vars.get_mut(name) {
                *slot = value;
                return;
            }
            frame.parent.clone()
        };
        match parent {
            Some(p) => cur = p,
            None => break,
        }
    }
    declare(&cur, name, value);
}

/// 清空帧并断开父链。闭包与作用域互相引用，求值结束时由解释器调用
pub fn release(env: &Env) {
    let (vars, parent) = {
        let mut frame = env.borrow_mut();
        (std::mem::take(&mut frame.vars), frame.parent.take())
    };
    drop(vars);
    drop(parent);
}
