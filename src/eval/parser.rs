//! 表达式 / 脚本语法
//!
//! ```text
//! program  := stmt (SEP stmt)*
//! stmt     := ("let" | "const" | "var") IDENT ("=" expr)?
//!           | "function" IDENT params block
//!           | "if" "(" expr ")" stmt ("else" stmt)?
//!           | "while" "(" expr ")" stmt
//!           | "for" "(" ("let" | "const" | "var") IDENT "of" expr ")" stmt
//!           | "for" "(" stmt? ";" expr? ";" stmt? ")" stmt
//!           | "return" expr? | "break" | "continue"
//!           | block
//!           | IDENT ("=" | "+=" | "-=" | "*=" | "/=") expr
//!           | IDENT ("++" | "--") | ("++" | "--") IDENT
//!           | expr
//! block    := "{" stmt* "}"
//! expr     := "throw" expr | arrow | ternary
//! arrow    := (IDENT | params) "=>" (block | expr)
//! ternary  := or ("?" expr ":" expr)?
//! or       := and ("||" and)*
//! and      := eq ("&&" eq)*
//! eq       := cmp (("==" | "!=" | "===" | "!==") cmp)*
//! cmp      := add (("<" | "<=" | ">" | ">=") add)*
//! add      := mul (("+" | "-") mul)*
//! mul      := unary (("*" | "/" | "%") unary)*
//! unary    := ("!" | "-" | "+" | "typeof") unary | "new"? postfix
//! postfix  := primary ("." IDENT | "[" expr "]" | "(" args ")")*
//! primary  := literal | IDENT | "(" expr ")" | array | object
//!           | "function" IDENT? params block
//! params   := "(" (IDENT ("," IDENT)*)? ")"
//! ```
//!
//! 运算符链与括号、语句嵌套共用同一个深度计数，语法树的深度在解析期就有上限。

use std::rc::Rc;

use super::lexer::{tokenize, Spanned, Token};
use super::ScriptError;

/// 语法树嵌套上限
const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Function(Rc<FunctionDef>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(&'static str, Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
    Logical(&'static str, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Throw(Box<Expr>),
}

#[derive(Debug, PartialEq)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `let` / `const`，块级
    Let(String, Option<Expr>),
    /// `var`，落到最近的函数作用域
    Var(String, Option<Expr>),
    Assign(String, Expr),
    /// 函数声明，进入所在块时提升
    Function(Rc<FunctionDef>),
    Expr(Expr),
    Block(Vec<Stmt>),
    If(Expr, Box<Stmt>, Option<Box<Stmt>>),
    While(Expr, Box<Stmt>),
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        update: Option<Box<Stmt>>,
        body: Box<Stmt>,
    },
    ForOf(String, Expr, Box<Stmt>),
    Return(Option<Expr>),
    Break,
    Continue,
}

impl Stmt {
    /// 以块结尾的语句后面不要求分隔符
    fn is_compound(&self) -> bool {
        matches!(
            self,
            Stmt::Function(_)
                | Stmt::Block(_)
                | Stmt::If(..)
                | Stmt::While(..)
                | Stmt::For { .. }
                | Stmt::ForOf(..)
        )
    }
}

/// 解析单个表达式（不允许语句分隔）
pub fn parse_expression(source: &str) -> Result<Expr, ScriptError> {
    let mut p = Parser::new(tokenize(source)?);
    p.skip_separators();
    let expr = p.expression()?;
    p.skip_separators();
    p.expect_eof()?;
    Ok(expr)
}

/// 解析语句序列
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, ScriptError> {
    Parser::new(tokenize(source)?).statements(None)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    /// 外层函数数，`return` 只能出现在函数里
    functions: usize,
    /// 当前函数内的外层循环数
    loops: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            functions: 0,
            loops: 0,
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let i = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[i].token
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Token::Punct(p) if *p == punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s == kw)
    }

    fn expect(&mut self, punct: &str) -> Result<(), ScriptError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_eof(&self) -> Result<(), ScriptError> {
        if self.peek() == &Token::Eof {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_separator(&mut self) -> Result<(), ScriptError> {
        if self.peek() == &Token::Separator {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn skip_separators(&mut self) {
        while self.peek() == &Token::Separator {
            self.advance();
        }
    }

    fn skip_newlines(&mut self) {
        // 括号内部允许换行
        self.skip_separators();
    }

    fn error_here(&self, message: &str) -> ScriptError {
        let t = &self.tokens[self.pos];
        ScriptError::Syntax {
            line: t.line,
            column: t.column,
            message: message.to_string(),
        }
    }

    fn unexpected(&self) -> ScriptError {
        let what = match self.peek() {
            Token::Number(n) => format!("number {}", n),
            Token::Str(s) => format!("string '{}'", s),
            Token::Ident(s) => format!("identifier '{}'", s),
            Token::Punct(p) => format!("token '{}'", p),
            Token::Separator => "end of statement".to_string(),
            Token::Eof => "end of input".to_string(),
        };
        self.error_here(&format!("unexpected {}", what))
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error_here("nesting too deep"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn release(&mut self, links: usize) {
        self.depth -= links;
    }

    /// 语句序列，`close` 为 None 时读到输入结束
    fn statements(&mut self, close: Option<&str>) -> Result<Vec<Stmt>, ScriptError> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            match close {
                Some(c) if self.eat(c) => break,
                None if self.peek() == &Token::Eof => break,
                _ => {}
            }
            let stmt = self.statement()?;
            let compound = stmt.is_compound();
            stmts.push(stmt);
            match self.peek() {
                Token::Separator | Token::Eof => {}
                Token::Punct(p) if Some(*p) == close => {}
                _ if compound => {}
                _ => return Err(self.unexpected()),
            }
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        let word = match self.peek() {
            Token::Ident(w) => w.clone(),
            Token::Punct("{") => return Ok(Stmt::Block(self.block()?)),
            _ => String::new(),
        };
        match word.as_str() {
            "let" | "const" | "var" => {
                self.advance();
                let name = self.identifier()?;
                let value = if self.eat("=") {
                    Some(self.expression()?)
                } else {
                    None
                };
                return Ok(if word == "var" {
                    Stmt::Var(name, value)
                } else {
                    Stmt::Let(name, value)
                });
            }
            "function" if matches!(self.peek_at(1), Token::Ident(_)) => {
                self.advance();
                let name = self.identifier()?;
                return Ok(Stmt::Function(self.function_rest(Some(name))?));
            }
            "if" => return self.if_statement(),
            "while" => {
                self.advance();
                let cond = self.condition()?;
                return Ok(Stmt::While(cond, self.loop_body()?));
            }
            "for" => return self.for_statement(),
            "return" => {
                if self.functions == 0 {
                    return Err(self.error_here("return outside of function"));
                }
                self.advance();
                let value = match self.peek() {
                    Token::Separator | Token::Eof | Token::Punct("}") => None,
                    _ => Some(self.expression()?),
                };
                return Ok(Stmt::Return(value));
            }
            "break" | "continue" => {
                if self.loops == 0 {
                    return Err(self.error_here(&format!("{} outside of loop", word)));
                }
                self.advance();
                return Ok(if word == "break" {
                    Stmt::Break
                } else {
                    Stmt::Continue
                });
            }
            _ => {}
        }

        if let Some(stmt) = self.assignment()? {
            return Ok(stmt);
        }
        let expr = self.expression()?;
        if matches!(self.peek(), Token::Punct(p) if is_assign_op(p)) {
            return Err(self.error_here("invalid assignment target"));
        }
        Ok(Stmt::Expr(expr))
    }

    /// `x = e`、`x += e`、`x++`、`++x`；不是赋值时不消耗任何记号
    fn assignment(&mut self) -> Result<Option<Stmt>, ScriptError> {
        if let (Token::Punct(op), Token::Ident(name)) = (self.peek(), self.peek_at(1)) {
            if *op == "++" || *op == "--" {
                let stmt = step(name.clone(), op);
                self.advance();
                self.advance();
                return Ok(Some(stmt));
            }
        }
        let (name, op) = match (self.peek(), self.peek_at(1)) {
            (Token::Ident(name), Token::Punct(op)) if is_assign_op(op) => (name.clone(), *op),
            _ => return Ok(None),
        };
        self.advance();
        self.advance();
        if op == "++" || op == "--" {
            return Ok(Some(step(name, op)));
        }
        let value = self.expression()?;
        let value = match compound_operator(op) {
            Some(bin) => Expr::Binary(bin, Box::new(Expr::Ident(name.clone())), Box::new(value)),
            None => value,
        };
        Ok(Some(Stmt::Assign(name, value)))
    }

    fn if_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        let cond = self.condition()?;
        let then = self.body()?;
        let save = self.pos;
        self.skip_separators();
        let otherwise = if self.eat_keyword("else") {
            Some(self.body()?)
        } else {
            self.pos = save;
            None
        };
        Ok(Stmt::If(cond, then, otherwise))
    }

    fn for_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        self.expect("(")?;
        let declares = matches!(self.peek(), Token::Ident(k) if k == "let" || k == "const" || k == "var");
        if declares && matches!(self.peek_at(2), Token::Ident(k) if k == "of") {
            self.advance();
            let name = self.identifier()?;
            self.advance();
            let iterable = self.expression()?;
            self.expect(")")?;
            return Ok(Stmt::ForOf(name, iterable, self.loop_body()?));
        }

        // 头部的 `;` 与换行同为分隔记号，这里逐个匹配
        let init = if self.peek() == &Token::Separator {
            None
        } else {
            Some(Box::new(self.statement()?))
        };
        self.expect_separator()?;
        let cond = if self.peek() == &Token::Separator {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_separator()?;
        let update = if self.eat(")") {
            None
        } else {
            let update = self.statement()?;
            self.expect(")")?;
            Some(Box::new(update))
        };
        Ok(Stmt::For {
            init,
            cond,
            update,
            body: self.loop_body()?,
        })
    }

    fn condition(&mut self) -> Result<Expr, ScriptError> {
        self.expect("(")?;
        self.skip_newlines();
        let cond = self.expression()?;
        self.skip_newlines();
        self.expect(")")?;
        Ok(cond)
    }

    /// `if` / 循环的子语句
    fn body(&mut self) -> Result<Box<Stmt>, ScriptError> {
        self.skip_newlines();
        self.enter()?;
        let stmt = self.statement()?;
        self.leave();
        Ok(Box::new(stmt))
    }

    fn loop_body(&mut self) -> Result<Box<Stmt>, ScriptError> {
        self.loops += 1;
        let body = self.body();
        self.loops -= 1;
        body
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect("{")?;
        self.enter()?;
        let stmts = self.statements(Some("}"))?;
        self.leave();
        Ok(stmts)
    }

    fn function_body(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let loops = std::mem::replace(&mut self.loops, 0);
        self.functions += 1;
        let body = self.block();
        self.functions -= 1;
        self.loops = loops;
        body
    }

    /// 函数名之后的部分：参数表与函数体
    fn function_rest(&mut self, name: Option<String>) -> Result<Rc<FunctionDef>, ScriptError> {
        self.expect("(")?;
        let params = self.params()?;
        self.skip_newlines();
        let body = self.function_body()?;
        Ok(Rc::new(FunctionDef { name, params, body }))
    }

    /// 参数名列表，左括号已消耗
    fn params(&mut self) -> Result<Vec<String>, ScriptError> {
        let mut params = Vec::new();
        self.skip_newlines();
        while !self.eat(")") {
            params.push(self.identifier()?);
            self.skip_newlines();
            if !self.eat(",") {
                self.expect(")")?;
                break;
            }
            self.skip_newlines();
        }
        Ok(params)
    }

    fn arrow_ahead(&self) -> bool {
        match self.peek() {
            Token::Ident(_) => matches!(self.peek_at(1), Token::Punct("=>")),
            Token::Punct("(") => {
                let mut i = 1;
                loop {
                    match self.peek_at(i) {
                        Token::Ident(_) | Token::Punct(",") => i += 1,
                        Token::Punct(")") => {
                            return matches!(self.peek_at(i + 1), Token::Punct("=>"))
                        }
                        _ => return false,
                    }
                }
            }
            _ => false,
        }
    }

    fn arrow(&mut self) -> Result<Expr, ScriptError> {
        let params = if self.eat("(") {
            self.params()?
        } else {
            vec![self.identifier()?]
        };
        self.expect("=>")?;
        self.skip_newlines();
        let body = if matches!(self.peek(), Token::Punct("{")) {
            self.function_body()?
        } else {
            vec![Stmt::Return(Some(self.expression()?))]
        };
        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
        })))
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.enter()?;
        let expr = if self.eat_keyword("throw") {
            Expr::Throw(Box::new(self.expression()?))
        } else if self.arrow_ahead() {
            self.arrow()?
        } else {
            self.ternary()?
        };
        self.leave();
        Ok(expr)
    }

    fn ternary(&mut self) -> Result<Expr, ScriptError> {
        let cond = self.logical_or()?;
        if self.eat("?") {
            let then = self.expression()?;
            self.expect(":")?;
            let otherwise = self.expression()?;
            return Ok(Expr::Conditional(
                Box::new(cond),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(cond)
    }

    fn logical_or(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.logical_and()?;
        let mut links = 0;
        while self.eat("||") {
            self.enter()?;
            links += 1;
            let right = self.logical_and()?;
            left = Expr::Logical("||", Box::new(left), Box::new(right));
        }
        self.release(links);
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.binary_level(0)?;
        let mut links = 0;
        while self.eat("&&") {
            self.enter()?;
            links += 1;
            let right = self.binary_level(0)?;
            left = Expr::Logical("&&", Box::new(left), Box::new(right));
        }
        self.release(links);
        Ok(left)
    }

    fn binary_level(&mut self, level: usize) -> Result<Expr, ScriptError> {
        const LEVELS: &[&[&str]] = &[
            &["===", "!==", "==", "!="],
            &["<=", ">=", "<", ">"],
            &["+", "-"],
            &["*", "/", "%"],
        ];
        if level == LEVELS.len() {
            return self.unary();
        }
        let mut left = self.binary_level(level + 1)?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Token::Punct(p) if LEVELS[level].contains(p) => *p,
                _ => break,
            };
            self.advance();
            self.enter()?;
            links += 1;
            let right = self.binary_level(level + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.release(links);
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        for op in ["!", "-", "+"] {
            if self.eat(op) {
                self.enter()?;
                let operand = self.unary()?;
                self.leave();
                return Ok(Expr::Unary(op, Box::new(operand)));
            }
        }
        if self.eat_keyword("typeof") {
            self.enter()?;
            let operand = self.unary()?;
            self.leave();
            return Ok(Expr::Unary("typeof", Box::new(operand)));
        }
        // `new X(...)` 等价于 `X(...)`
        self.eat_keyword("new");
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        let mut links = 0;
        loop {
            if self.eat(".") {
                self.enter()?;
                let name = self.identifier()?;
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat("[") {
                self.enter()?;
                let index = self.expression()?;
                self.expect("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat("(") {
                self.enter()?;
                let args = self.list(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                break;
            }
            links += 1;
        }
        self.release(links);
        Ok(expr)
    }

    /// 逗号分隔的表达式列表，允许结尾逗号
    fn list(&mut self, close: &str) -> Result<Vec<Expr>, ScriptError> {
        let mut items = Vec::new();
        self.skip_newlines();
        while !self.eat(close) {
            items.push(self.expression()?);
            self.skip_newlines();
            if !self.eat(",") {
                self.expect(close)?;
                break;
            }
            self.skip_newlines();
        }
        Ok(items)
    }

    fn identifier(&mut self) -> Result<String, ScriptError> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        if matches!(self.peek(), Token::Separator | Token::Eof) {
            return Err(self.unexpected());
        }
        match self.advance() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Ident(name) if name == "function" => {
                self.enter()?;
                let name = match self.peek() {
                    Token::Ident(_) => Some(self.identifier()?),
                    _ => None,
                };
                let def = self.function_rest(name)?;
                self.leave();
                Ok(Expr::Function(def))
            }
            Token::Ident(name) => Ok(literal_keyword(&name).unwrap_or(Expr::Ident(name))),
            Token::Punct("(") => {
                self.enter()?;
                self.skip_newlines();
                let e = self.expression()?;
                self.skip_newlines();
                self.expect(")")?;
                self.leave();
                Ok(e)
            }
            Token::Punct("[") => {
                self.enter()?;
                let items = self.list("]")?;
                self.leave();
                Ok(Expr::Array(items))
            }
            Token::Punct("{") => {
                self.enter()?;
                let fields = self.object_fields()?;
                self.leave();
                Ok(Expr::Object(fields))
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn object_fields(&mut self) -> Result<Vec<(String, Expr)>, ScriptError> {
        let mut fields = Vec::new();
        self.skip_newlines();
        while !self.eat("}") {
            let key = match self.peek().clone() {
                Token::Ident(k) | Token::Str(k) => k,
                Token::Number(n) => super::value::format_number(n),
                _ => return Err(self.unexpected()),
            };
            self.advance();
            self.expect(":")?;
            fields.push((key, self.expression()?));
            self.skip_newlines();
            if !self.eat(",") {
                self.skip_newlines();
                self.expect("}")?;
                break;
            }
            self.skip_newlines();
        }
        Ok(fields)
    }
}

fn is_assign_op(op: &str) -> bool {
    matches!(op, "=" | "+=" | "-=" | "*=" | "/=" | "++" | "--")
}

fn compound_operator(op: &str) -> Option<&'static str> {
    match op {
        "+=" => Some("+"),
        "-=" => Some("-"),
        "*=" => Some("*"),
        "/=" => Some("/"),
        _ => None,
    }
}

/// `x++` / `x--`：先转成数字再加减
fn step(name: String, op: &str) -> Stmt {
    let current = Expr::Unary("+", Box::new(Expr::Ident(name.clone())));
    let bin = if op == "++" { "+" } else { "-" };
    Stmt::Assign(
        name,
        Expr::Binary(bin, Box::new(current), Box::new(Expr::Number(1.0))),
    )
}

fn literal_keyword(name: &str) -> Option<Expr> {
    match name {
        "true" => Some(Expr::Bool(true)),
        "false" => Some(Expr::Bool(false)),
        "null" => Some(Expr::Null),
        "undefined" => Some(Expr::Undefined),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence() {
        let e = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            e,
            Expr::Binary(
                "+",
                Box::new(Expr::Number(1.0)),
                Box::new(Expr::Binary(
                    "*",
                    Box::new(Expr::Number(2.0)),
                    Box::new(Expr::Number(3.0))
                ))
            )
        );
    }

    #[test]
    fn member_call_chain() {
        let e = parse_expression("app.get('k').length").unwrap();
        assert!(matches!(e, Expr::Member(_, ref p) if p == "length"));
    }

    #[test]
    fn expression_rejects_trailing_statement() {
        assert!(matches!(
            parse_expression("1; 2"),
            Err(ScriptError::Syntax { .. })
        ));
    }

    #[test]
    fn program_statements() {
        let prog = parse_program("let a = 1\nresult = a + 1;").unwrap();
        assert_eq!(prog.len(), 2);
        assert!(matches!(prog[0], Stmt::Let(ref n, Some(_)) if n == "a"));
        assert!(matches!(prog[1], Stmt::Assign(ref n, _) if n == "result"));
    }

    #[test]
    fn multiline_literals() {
        let prog = parse_program("result = {\n  a: 1,\n  'b-c': [1,\n 2],\n}").unwrap();
        assert_eq!(prog.len(), 1);
    }

    #[test]
    fn invalid_assignment_target() {
        let err = parse_program("a.b = 1").unwrap_err();
        assert!(err.to_string().contains("invalid assignment target"));
    }

    #[test]
    fn missing_paren_is_syntax_error() {
        let err = parse_expression("(1 + 2").unwrap_err();
        assert!(err.to_string().starts_with("SyntaxError: unexpected end of input"));
    }

    #[test]
    fn nesting_is_bounded() {
        let src = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        let err = parse_expression(&src).unwrap_err();
        assert!(err.to_string().contains("nesting too deep"));
    }

    #[test]
    fn operator_chains_count_toward_nesting() {
        let long = vec!["1"; 5000].join("+");
        let err = parse_expression(&long).unwrap_err();
        assert!(err.to_string().contains("nesting too deep"));

        let members = format!("a{}", ".b".repeat(5000));
        assert!(parse_expression(&members)
            .unwrap_err()
            .to_string()
            .contains("nesting too deep"));

        let short = vec!["1"; 100].join("+");
        assert!(parse_expression(&short).is_ok());
    }

    #[test]
    fn invoked_function_expression() {
        let e = parse_expression("(function(){throw new Error('x')})()").unwrap();
        let Expr::Call(callee, args) = e else {
            panic!("expected call");
        };
        assert!(args.is_empty());
        let Expr::Function(def) = *callee else {
            panic!("expected function");
        };
        assert_eq!(def.name, None);
        assert!(matches!(def.body[0], Stmt::Expr(Expr::Throw(_))));
    }

    #[test]
    fn arrow_functions() {
        let e = parse_expression("xs.map(x => x * 2)").unwrap();
        let Expr::Call(_, args) = e else {
            panic!("expected call");
        };
        assert!(matches!(&args[0], Expr::Function(def) if def.params == ["x"]));
        let e = parse_expression("((a, b) => { return a + b })(1, 2)").unwrap();
        assert!(matches!(e, Expr::Call(..)));
    }

    #[test]
    fn control_flow_statements() {
        let src = "var n = 0\n\
                   for (let i = 0; i < 3; i++) { n += i }\n\
                   for (const f of xs) {\n  if (f == 'a') continue\n  else break\n}\n\
                   while (n > 0) n--\n\
                   function twice(v) { return v * 2 } result = twice(n)";
        let prog = parse_program(src).unwrap();
        assert_eq!(prog.len(), 6);
        assert!(matches!(prog[0], Stmt::Var(..)));
        assert!(matches!(prog[1], Stmt::For { ref update, .. } if update.is_some()));
        assert!(matches!(prog[2], Stmt::ForOf(ref n, _, _) if n == "f"));
        assert!(matches!(prog[3], Stmt::While(..)));
        assert!(matches!(prog[4], Stmt::Function(ref def) if def.params == ["v"]));
        assert!(matches!(prog[5], Stmt::Assign(ref n, Expr::Call(..)) if n == "result"));
    }

    #[test]
    fn compound_assignment_desugars() {
        let prog = parse_program("n += 2").unwrap();
        assert!(matches!(prog[0], Stmt::Assign(ref n, Expr::Binary("+", _, _)) if n == "n"));
    }

    #[test]
    fn misplaced_jumps_are_rejected() {
        assert!(parse_program("return 1")
            .unwrap_err()
            .to_string()
            .contains("return outside of function"));
        assert!(parse_program("break")
            .unwrap_err()
            .to_string()
            .contains("break outside of loop"));
        // 函数体重新开始计数循环
        assert!(parse_program("while (true) { (function(){ continue })() }").is_err());
    }

    #[test]
    fn unterminated_block() {
        let err = parse_program("if (x) { result = 1").unwrap_err();
        assert!(err.to_string().starts_with("SyntaxError: unexpected end of input"));
    }
}
