//! 运维表达式 / 脚本求值
//!
//! 只面向可信运维人员，不是安全沙箱。绑定表由 [`Privilege`] 决定：
//! `Restricted` 仅暴露 `app`，`Host` 额外暴露 `require`、`os`、`fs`、
//! `process`、`util`。

pub mod host;
mod interp;
pub mod lexer;
pub mod parser;
mod scope;
pub mod value;

use thiserror::Error;
use tracing::{debug, warn};

use crate::app::context::AppContext;

use interp::Interpreter;
use value::{Builtin, HostObject, Value};

/// 求值线程的栈大小，解析与求值都是递归下降
const EVAL_STACK_SIZE: usize = 32 * 1024 * 1024;

/// 脚本未给 `result` 赋值（或赋了假值）时的固定提示
pub const UNASSIGNED_RESULT: &str =
    "script result should be assigned to result value to script module context";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("SyntaxError: {message} ({line}:{column})")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("ReferenceError: {0} is not defined")]
    Reference(String),
    #[error("TypeError: {0}")]
    Type(String),
    /// `throw` 抛出的值，已经是文本形式
    #[error("{0}")]
    Thrown(String),
    #[error("RangeError: step budget of {0} exhausted")]
    Budget(usize),
    #[error("RangeError: maximum nesting depth of {0} exceeded")]
    Depth(usize),
    #[error("Error: {0}")]
    Host(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Restricted,
    Host,
}

impl Privilege {
    pub fn as_str(self) -> &'static str {
        match self {
            Privilege::Restricted => "restricted",
            Privilege::Host => "host",
        }
    }

    pub fn allows(self, object: HostObject) -> bool {
        match self {
            Privilege::Restricted => matches!(object, HostObject::App | HostObject::Json),
            Privilege::Host => true,
        }
    }

    /// 初始全局绑定
    pub fn bindings(self) -> Vec<(&'static str, Value)> {
        let mut table = vec![
            ("app", Value::Host(HostObject::App)),
            ("JSON", Value::Host(HostObject::Json)),
            ("Error", Value::Builtin(Builtin::Error)),
            ("String", Value::Builtin(Builtin::String)),
            ("Number", Value::Builtin(Builtin::Number)),
            ("keys", Value::Builtin(Builtin::Keys)),
        ];
        if self == Privilege::Host {
            table.extend([
                ("require", Value::Builtin(Builtin::Require)),
                ("os", Value::Host(HostObject::Os)),
                ("fs", Value::Host(HostObject::Fs)),
                ("process", Value::Host(HostObject::Process)),
                ("util", Value::Host(HostObject::Util)),
            ]);
        }
        table
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 单个表达式，结果以 inspect 形式报告
    Expression,
    /// 多条语句，由脚本自行给 `result` 赋值
    Script,
}

pub struct Evaluator {
    max_steps: usize,
}

impl Evaluator {
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }

    /// 在独立线程上求值，失败以 [`ScriptError`] 返回，求值线程 panic 也不会波及调用方
    pub fn evaluate(
        &self,
        ctx: &AppContext,
        source: &str,
        mode: Mode,
        privilege: Privilege,
    ) -> Result<String, ScriptError> {
        debug!(
            mode = ?mode,
            privilege = privilege.as_str(),
            len = source.len(),
            "evaluating"
        );
        std::thread::scope(|s| -> Result<String, ScriptError> {
            let worker = std::thread::Builder::new()
                .name("admin-eval".into())
                .stack_size(EVAL_STACK_SIZE)
                .spawn_scoped(s, move || self.evaluate_here(ctx, source, mode, privilege))
                .map_err(|e| ScriptError::Host(format!("cannot start evaluation: {}", e)))?;
            worker.join().unwrap_or_else(|_| {
                warn!("evaluation thread panicked");
                Err(ScriptError::Host("evaluation aborted".into()))
            })
        })
    }

    fn evaluate_here(
        &self,
        ctx: &AppContext,
        source: &str,
        mode: Mode,
        privilege: Privilege,
    ) -> Result<String, ScriptError> {
        let mut interp = Interpreter::new(ctx, privilege, self.max_steps);
        match mode {
            Mode::Expression => {
                let expr = parser::parse_expression(source)?;
                interp.bind("result", Value::Undefined);
                let v = interp.evaluate(&expr)?;
                let text = v.inspect();
                interp.bind("result", v);
                Ok(text)
            }
            Mode::Script => {
                let program = parser::parse_program(source)?;
                interp.run(&program)?;
                Ok(match interp.binding("result") {
                    Some(v) if v.truthy() => v.to_display(),
                    _ => UNASSIGNED_RESULT.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::context::tests::test_context;

    fn run(src: &str) -> String {
        Evaluator::new(10_000)
            .evaluate(&test_context(true), src, Mode::Expression, Privilege::Restricted)
            .unwrap_or_else(|e| e.to_string())
    }

    fn exec(src: &str) -> String {
        Evaluator::new(10_000)
            .evaluate(&test_context(true), src, Mode::Script, Privilege::Host)
            .unwrap_or_else(|e| e.to_string())
    }

    #[test]
    fn arithmetic_expression() {
        assert_eq!(run("1+1"), "2");
        assert_eq!(run("(1 + 2) * 3 - 4 / 2"), "7");
        assert_eq!(run("'a' + 1"), "'a1'");
    }

    #[test]
    fn app_bindings() {
        assert_eq!(run("app.processId"), "'connector-1'");
        assert_eq!(run("app.isFrontend()"), "true");
        assert_eq!(run("app.get('missing')"), "undefined");
    }

    #[test]
    fn thrown_error_becomes_text() {
        assert_eq!(run("throw new Error('x')"), "Error: x");
        assert_eq!(run("throw 'boom'"), "boom");
        assert_eq!(run("(function(){throw new Error('x')})()"), "Error: x");
    }

    #[test]
    fn functions_and_closures() {
        assert_eq!(run("(function(a, b){ return a * b })(6, 7)"), "42");
        assert_eq!(run("[1, 2, 3].map(x => x * 2)"), "[ 2, 4, 6 ]");
        assert_eq!(run("[1, 2, 3, 4].filter(function(x){ return x % 2 == 0 })"), "[ 2, 4 ]");
        assert_eq!(run("[1, 2, 3].reduce((a, b) => a + b)"), "6");
        assert_eq!(run("['a', 'b'].find(x => x == 'b')"), "'b'");
        assert_eq!(run("(function(){})"), "[Function (anonymous)]");
        assert_eq!(run("(function named(){})"), "[Function: named]");
        assert_eq!(
            exec("function counter() {\n  let n = 0\n  return () => { n++; return n }\n}\nvar c = counter()\nc()\nc()\nresult = c()"),
            "3"
        );
    }

    #[test]
    fn loops_and_branches() {
        assert_eq!(
            exec("var total = 0\nfor (let i = 1; i <= 10; i++) {\n  if (i % 2) continue\n  total += i\n}\nresult = total"),
            "30"
        );
        assert_eq!(
            exec("let ids = []\nfor (const s of app.getServers()) ids = ids.concat([s.id])\nresult = ids.join()"),
            "connector-1,chat-1"
        );
        assert_eq!(
            exec("var n = 0\nwhile (true) {\n  n++\n  if (n >= 4) break\n}\nresult = n"),
            "4"
        );
        assert_eq!(
            exec("function fact(n) { if (n <= 1) return 1\n return n * fact(n - 1) }\nresult = fact(10)"),
            "3628800"
        );
    }

    #[test]
    fn script_walks_directory_listing() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.log", "b.log", "c.txt"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        let path = dir.path().to_string_lossy().replace('\\', "/");
        let src = format!(
            "var logs = []\nfor (const f of fs.list('{p}')) {{\n  if (f.endsWith('.log')) logs = logs.concat([f])\n}}\nresult = logs.join(' ')",
            p = path
        );
        assert_eq!(exec(&src), "a.log b.log");
    }

    #[test]
    fn runaway_loops_hit_the_step_budget() {
        assert_eq!(exec("while (true) {}"), "RangeError: step budget of 10000 exhausted");
        assert_eq!(exec("for (;;) {}"), "RangeError: step budget of 10000 exhausted");
    }

    #[test]
    fn unbounded_recursion_hits_the_depth_limit() {
        let err = Evaluator::new(1_000_000)
            .evaluate(
                &test_context(true),
                "function f(n) { return f(n + 1) }\nresult = f(0)",
                Mode::Script,
                Privilege::Host,
            )
            .unwrap_err();
        assert_eq!(err, ScriptError::Depth(interp::MAX_DEPTH));
    }

    #[test]
    fn long_operator_chain_is_rejected() {
        let src = vec!["1"; 5000].join("+");
        assert!(run(&src).starts_with("SyntaxError: nesting too deep"));
    }

    #[test]
    fn expression_mode_binds_result_slot() {
        assert_eq!(run("typeof result"), "'undefined'");
    }

    #[test]
    fn reference_error() {
        assert_eq!(run("nope + 1"), "ReferenceError: nope is not defined");
    }

    #[test]
    fn syntax_error_text() {
        assert!(run("1 +").starts_with("SyntaxError: "));
    }

    #[test]
    fn require_denied_in_restricted_mode() {
        assert_eq!(run("require"), "ReferenceError: require is not defined");
        assert_eq!(run("os"), "ReferenceError: os is not defined");
    }

    #[test]
    fn script_must_assign_result() {
        assert_eq!(exec("var x = 1"), UNASSIGNED_RESULT);
        assert_eq!(exec("result = null"), UNASSIGNED_RESULT);
        assert_eq!(exec("var x = 2\nresult = x * 21"), "42");
        assert_eq!(exec("result = 'plain'"), "plain");
    }

    #[test]
    fn falsy_result_counts_as_unassigned() {
        assert_eq!(exec("result = 0"), UNASSIGNED_RESULT);
        assert_eq!(exec("result = false"), UNASSIGNED_RESULT);
        assert_eq!(exec("result = ''"), UNASSIGNED_RESULT);
        assert_eq!(exec("result = '0'"), "0");
        assert_eq!(exec("result = []"), "");
    }

    #[test]
    fn script_errors_are_reported() {
        assert_eq!(exec("result = missing"), "ReferenceError: missing is not defined");
        assert_eq!(
            exec("result = require('net')"),
            "Error: cannot find module 'net'"
        );
    }

    #[test]
    fn host_modules_in_script_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        let path = path.to_string_lossy().replace('\\', "/");
        let src = format!(
            "var f = require('fs')\nf.write('{p}', 'hello')\nresult = f.read('{p}')",
            p = path
        );
        assert_eq!(exec(&src), "hello");
        assert_eq!(exec("result = typeof process.pid"), "number");
    }

    #[test]
    fn step_budget_is_enforced() {
        let ctx = test_context(true);
        let err = Evaluator::new(5)
            .evaluate(&ctx, "1+1+1+1+1+1+1", Mode::Expression, Privilege::Restricted)
            .unwrap_err();
        assert_eq!(err, ScriptError::Budget(5));
    }

    #[test]
    fn settings_round_trip_through_app() {
        assert_eq!(exec("app.set('k', { a: 1 })\nresult = app.get('k').a"), "1");
        assert_eq!(exec("app.enable('f')\nresult = app.enabled('f')"), "true");
    }

    #[test]
    fn restricted_privilege_table() {
        assert!(!Privilege::Restricted.allows(HostObject::Fs));
        assert!(Privilege::Host.allows(HostObject::Fs));
        let names: Vec<_> = Privilege::Host.bindings().into_iter().map(|(n, _)| n).collect();
        assert!(names.contains(&"require"));
    }
}
