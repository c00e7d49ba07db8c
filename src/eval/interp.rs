use std::collections::BTreeMap;
use std::rc::Rc;

use crate::app::context::AppContext;

use super::host;
use super::parser::{Expr, FunctionDef, Stmt};
use super::scope::{self, Env, Frame};
use super::value::{Closure, Value};
use super::{Privilege, ScriptError};

/// 求值递归（表达式、语句、函数调用）深度上限
pub(super) const MAX_DEPTH: usize = 1000;

/// 带回调参数的数组方法
const CALLBACK_METHODS: &[&str] = &["map", "filter", "forEach", "find", "some", "every", "reduce"];

/// 语句执行后的控制流
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// 单次求值的执行环境：作用域链 + 步数与深度预算
pub(super) struct Interpreter<'a> {
    ctx: &'a AppContext,
    privilege: Privilege,
    global: Env,
    /// 被闭包捕获过的帧，结束时统一释放
    captured: Vec<Env>,
    steps: usize,
    max_steps: usize,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(ctx: &'a AppContext, privilege: Privilege, max_steps: usize) -> Self {
        let global = Frame::root();
        for (name, v) in privilege.bindings() {
            scope::declare(&global, name, v);
        }
        Self {
            ctx,
            privilege,
            global,
            captured: Vec::new(),
            steps: 0,
            max_steps,
            depth: 0,
        }
    }

    pub fn binding(&self, name: &str) -> Option<Value> {
        scope::lookup(&self.global, name)
    }

    pub fn bind(&mut self, name: &str, value: Value) {
        scope::declare(&self.global, name, value);
    }

    /// 在全局作用域求值单个表达式
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        let global = self.global.clone();
        self.eval(expr, &global)
    }

    pub fn run(&mut self, program: &[Stmt]) -> Result<(), ScriptError> {
        let global = self.global.clone();
        self.exec_block(program, &global)?;
        Ok(())
    }

    fn tick(&mut self) -> Result<(), ScriptError> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(ScriptError::Budget(self.max_steps));
        }
        Ok(())
    }

    fn descend(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ScriptError::Depth(MAX_DEPTH));
        }
        Ok(())
    }

    fn closure(&mut self, def: &Rc<FunctionDef>, env: &Env) -> Value {
        self.captured.push(env.clone());
        Value::Function(Rc::new(Closure {
            def: def.clone(),
            env: env.clone(),
        }))
    }

    /// 在给定帧中顺序执行，函数声明先提升
    fn exec_block(&mut self, stmts: &[Stmt], env: &Env) -> Result<Flow, ScriptError> {
        for stmt in stmts {
            if let Stmt::Function(def) = stmt {
                if let Some(name) = &def.name {
                    let f = self.closure(def, env);
                    scope::declare(env, name, f);
                }
            }
        }
        for stmt in stmts {
            match self.exec(stmt, env)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> Result<Flow, ScriptError> {
        self.tick()?;
        self.descend()?;
        let flow = self.exec_inner(stmt, env);
        self.depth -= 1;
        flow
    }

    fn exec_inner(&mut self, stmt: &Stmt, env: &Env) -> Result<Flow, ScriptError> {
        match stmt {
            Stmt::Let(name, value) => {
                let v = self.eval_opt(value.as_ref(), env)?;
                scope::declare(env, name, v);
            }
            Stmt::Var(name, value) => {
                let v = self.eval_opt(value.as_ref(), env)?;
                scope::declare_var(env, name, v);
            }
            Stmt::Assign(name, expr) => {
                let v = self.eval(expr, env)?;
                scope::assign(env, name, v);
            }
            Stmt::Function(_) => {}
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
            }
            Stmt::Block(stmts) => {
                let inner = Frame::child(env, false);
                return self.exec_block(stmts, &inner);
            }
            Stmt::If(cond, then, otherwise) => {
                if self.eval(cond, env)?.truthy() {
                    return self.exec(then, env);
                }
                if let Some(otherwise) = otherwise {
                    return self.exec(otherwise, env);
                }
            }
            Stmt::While(cond, body) => {
                while self.eval(cond, env)?.truthy() {
                    match self.exec(body, env)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                let frame = Frame::child(env, false);
                if let Some(init) = init {
                    self.exec(init, &frame)?;
                }
                loop {
                    self.tick()?;
                    if let Some(cond) = cond {
                        if !self.eval(cond, &frame)?.truthy() {
                            break;
                        }
                    }
                    match self.exec(body, &frame)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.exec(update, &frame)?;
                    }
                }
            }
            Stmt::ForOf(name, iterable, body) => {
                let items = match self.eval(iterable, env)? {
                    Value::Array(items) => items,
                    Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    other => {
                        return Err(ScriptError::Type(format!(
                            "{} is not iterable",
                            other.inspect()
                        )))
                    }
                };
                for item in items {
                    let frame = Frame::child(env, false);
                    scope::declare(&frame, name, item);
                    match self.exec(body, &frame)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::Return(value) => return Ok(Flow::Return(self.eval_opt(value.as_ref(), env)?)),
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn eval_opt(&mut self, expr: Option<&Expr>, env: &Env) -> Result<Value, ScriptError> {
        match expr {
            Some(e) => self.eval(e, env),
            None => Ok(Value::Undefined),
        }
    }

    fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value, ScriptError> {
        self.tick()?;
        self.descend()?;
        let v = self.eval_inner(expr, env);
        self.depth -= 1;
        v
    }

    fn eval_inner(&mut self, expr: &Expr, env: &Env) -> Result<Value, ScriptError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Ident(name) => {
                scope::lookup(env, name).ok_or_else(|| ScriptError::Reference(name.clone()))
            }
            Expr::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|e| self.eval(e, env))
                    .collect::<Result<_, _>>()?,
            )),
            Expr::Object(fields) => {
                let mut map = BTreeMap::new();
                for (k, e) in fields {
                    let v = self.eval(e, env)?;
                    map.insert(k.clone(), v);
                }
                Ok(Value::Object(map))
            }
            Expr::Function(def) => Ok(self.closure(def, env)),
            Expr::Member(object, name) => {
                let recv = self.eval(object, env)?;
                self.property(&recv, name)
            }
            Expr::Index(object, key) => {
                let recv = self.eval(object, env)?;
                let key = self.eval(key, env)?;
                match recv {
                    Value::Host(h) => Ok(host::property(self.ctx, h, &key.to_display())),
                    _ => host::index(&recv, &key),
                }
            }
            Expr::Call(callee, args) => self.call(callee, args, env),
            Expr::Unary(op, operand) => {
                let v = self.eval(operand, env)?;
                Ok(match *op {
                    "!" => Value::Bool(!v.truthy()),
                    "-" => Value::Number(-v.to_number()),
                    "+" => Value::Number(v.to_number()),
                    _ => Value::Str(v.type_of().to_string()),
                })
            }
            Expr::Binary(op, left, right) => {
                let l = self.eval(left, env)?;
                let r = self.eval(right, env)?;
                Ok(binary(op, &l, &r))
            }
            Expr::Logical(op, left, right) => {
                let l = self.eval(left, env)?;
                let short = if *op == "&&" { !l.truthy() } else { l.truthy() };
                if short {
                    Ok(l)
                } else {
                    self.eval(right, env)
                }
            }
            Expr::Conditional(cond, then, otherwise) => {
                if self.eval(cond, env)?.truthy() {
                    self.eval(then, env)
                } else {
                    self.eval(otherwise, env)
                }
            }
            Expr::Throw(value) => {
                let v = self.eval(value, env)?;
                Err(ScriptError::Thrown(v.to_display()))
            }
        }
    }

    fn property(&self, recv: &Value, name: &str) -> Result<Value, ScriptError> {
        match recv {
            Value::Host(h) => Ok(host::property(self.ctx, *h, name)),
            _ => host::value_property(recv, name),
        }
    }

    fn call(&mut self, callee: &Expr, args: &[Expr], env: &Env) -> Result<Value, ScriptError> {
        // 方法调用：先求接收者
        if let Expr::Member(object, name) = callee {
            let recv = self.eval(object, env)?;
            let args = self.eval_args(args, env)?;
            return match recv {
                Value::Host(h) => host::call_method(self.ctx, h, name, &args),
                Value::Object(ref map) => match map.get(name) {
                    Some(f) if f.is_callable() => {
                        let f = f.clone();
                        self.apply(&f, args)
                    }
                    _ => host::value_method(&recv, name, &args),
                },
                Value::Array(items) if CALLBACK_METHODS.contains(&name.as_str()) => {
                    self.array_method(items, name, args)
                }
                Value::Undefined | Value::Null => Err(ScriptError::Type(format!(
                    "cannot read properties of {} (reading '{}')",
                    recv.inspect(),
                    name
                ))),
                other => host::value_method(&other, name, &args),
            };
        }

        let f = self.eval(callee, env)?;
        let args = self.eval_args(args, env)?;
        if !f.is_callable() {
            return Err(ScriptError::Type(format!(
                "{} is not a function",
                describe_callee(callee, &f)
            )));
        }
        self.apply(&f, args)
    }

    fn eval_args(&mut self, args: &[Expr], env: &Env) -> Result<Vec<Value>, ScriptError> {
        args.iter().map(|a| self.eval(a, env)).collect()
    }

    fn apply(&mut self, f: &Value, args: Vec<Value>) -> Result<Value, ScriptError> {
        match f {
            Value::Builtin(b) => host::call_builtin(*b, &args, self.privilege),
            Value::Function(closure) => self.invoke(closure, args),
            other => Err(ScriptError::Type(format!(
                "{} is not a function",
                other.inspect()
            ))),
        }
    }

    fn invoke(&mut self, closure: &Rc<Closure>, args: Vec<Value>) -> Result<Value, ScriptError> {
        self.descend()?;
        let frame = Frame::child(&closure.env, true);
        if let Some(name) = closure.name() {
            scope::declare(&frame, name, Value::Function(closure.clone()));
        }
        let mut args = args.into_iter();
        for param in &closure.def.params {
            scope::declare(&frame, param, args.next().unwrap_or(Value::Undefined));
        }
        let flow = self.exec_block(&closure.def.body, &frame);
        self.depth -= 1;
        Ok(match flow? {
            Flow::Return(v) => v,
            _ => Value::Undefined,
        })
    }

    fn array_method(
        &mut self,
        items: Vec<Value>,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        let mut args = args.into_iter();
        let f = args.next().unwrap_or(Value::Undefined);
        if !f.is_callable() {
            return Err(ScriptError::Type(format!("{} is not a function", f.inspect())));
        }

        if name == "reduce" {
            let mut rest = items.into_iter().enumerate();
            let mut acc = match args.next().or_else(|| rest.next().map(|(_, v)| v)) {
                Some(v) => v,
                None => {
                    return Err(ScriptError::Type(
                        "reduce of empty array with no initial value".into(),
                    ))
                }
            };
            for (i, item) in rest {
                self.tick()?;
                acc = self.apply(&f, vec![acc, item, Value::Number(i as f64)])?;
            }
            return Ok(acc);
        }

        let mut out = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            self.tick()?;
            let hit = self.apply(&f, vec![item.clone(), Value::Number(i as f64)])?;
            match name {
                "map" => out.push(hit),
                "filter" if hit.truthy() => out.push(item),
                "find" if hit.truthy() => return Ok(item),
                "some" if hit.truthy() => return Ok(Value::Bool(true)),
                "every" if !hit.truthy() => return Ok(Value::Bool(false)),
                _ => {}
            }
        }
        Ok(match name {
            "map" | "filter" => Value::Array(out),
            "some" => Value::Bool(false),
            "every" => Value::Bool(true),
            _ => Value::Undefined,
        })
    }
}

impl Drop for Interpreter<'_> {
    fn drop(&mut self) {
        for env in self.captured.drain(..) {
            scope::release(&env);
        }
        scope::release(&self.global);
    }
}

fn describe_callee(callee: &Expr, value: &Value) -> String {
    match callee {
        Expr::Ident(name) => name.clone(),
        _ => value.inspect(),
    }
}

fn binary(op: &str, l: &Value, r: &Value) -> Value {
    match op {
        "+" => match (l, r) {
            (Value::Str(_), _) | (_, Value::Str(_)) => {
                Value::Str(format!("{}{}", l.to_display(), r.to_display()))
            }
            _ => Value::Number(l.to_number() + r.to_number()),
        },
        "-" => Value::Number(l.to_number() - r.to_number()),
        "*" => Value::Number(l.to_number() * r.to_number()),
        "/" => Value::Number(l.to_number() / r.to_number()),
        "%" => Value::Number(l.to_number() % r.to_number()),
        "===" => Value::Bool(l == r),
        "!==" => Value::Bool(l != r),
        "==" => Value::Bool(loose_eq(l, r)),
        "!=" => Value::Bool(!loose_eq(l, r)),
        _ => Value::Bool(compare(op, l, r)),
    }
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Null | Value::Undefined, Value::Null | Value::Undefined) => true,
        (Value::Null | Value::Undefined, _) | (_, Value::Null | Value::Undefined) => false,
        (Value::Number(_), Value::Str(_))
        | (Value::Str(_), Value::Number(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_)) => l.to_number() == r.to_number(),
        _ => l == r,
    }
}

fn compare(op: &str, l: &Value, r: &Value) -> bool {
    if let (Value::Str(a), Value::Str(b)) = (l, r) {
        return match op {
            "<" => a < b,
            "<=" => a <= b,
            ">" => a > b,
            _ => a >= b,
        };
    }
    let (a, b) = (l.to_number(), r.to_number());
    match op {
        "<" => a < b,
        "<=" => a <= b,
        ">" => a > b,
        _ => a >= b,
    }
}
