use super::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    /// 运算符与标点
    Punct(&'static str),
    /// 语句分隔（`;` 或换行）
    Separator,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

// 长的在前，保证最长匹配
const PUNCTS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "=>", "++", "--", "+=", "-=", "*=", "/=",
    "=", "<", ">", "+", "-", "*", "/", "%", "!", "?", ":", ".", ",", "(", ")", "[", "]", "{",
    "}",
];

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ScriptError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;
    let mut col = 1;

    while i < chars.len() {
        let c = chars[i];
        let (start_line, start_col) = (line, col);

        if c == '\n' || c == ';' {
            tokens.push(Spanned {
                token: Token::Separator,
                line,
                column: col,
            });
            if c == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            col += 1;
            continue;
        }
        // 行注释
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()))
        {
            let begin = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                i += 1;
                if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[begin..i].iter().collect();
            let n: f64 = text.parse().map_err(|_| ScriptError::Syntax {
                line: start_line,
                column: start_col,
                message: format!("invalid number '{}'", text),
            })?;
            col += i - begin;
            tokens.push(Spanned {
                token: Token::Number(n),
                line: start_line,
                column: start_col,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let begin = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            col += i - begin;
            tokens.push(Spanned {
                token: Token::Ident(chars[begin..i].iter().collect()),
                line: start_line,
                column: start_col,
            });
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            let mut s = String::new();
            i += 1;
            col += 1;
            loop {
                let Some(&ch) = chars.get(i) else {
                    return Err(ScriptError::Syntax {
                        line: start_line,
                        column: start_col,
                        message: "unterminated string".into(),
                    });
                };
                i += 1;
                col += 1;
                if ch == quote {
                    break;
                }
                if ch == '\n' {
                    return Err(ScriptError::Syntax {
                        line: start_line,
                        column: start_col,
                        message: "unterminated string".into(),
                    });
                }
                if ch == '\\' {
                    let esc = chars.get(i).copied().unwrap_or('\\');
                    i += 1;
                    col += 1;
                    s.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                } else {
                    s.push(ch);
                }
            }
            tokens.push(Spanned {
                token: Token::Str(s),
                line: start_line,
                column: start_col,
            });
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
        match PUNCTS.iter().find(|p| rest.starts_with(**p)) {
            Some(&p) => {
                i += p.len();
                col += p.len();
                tokens.push(Spanned {
                    token: Token::Punct(p),
                    line: start_line,
                    column: start_col,
                });
            }
            None => {
                return Err(ScriptError::Syntax {
                    line,
                    column: col,
                    message: format!("unexpected character '{}'", c),
                })
            }
        }
    }

    tokens.push(Spanned {
        token: Token::Eof,
        line,
        column: col,
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn arithmetic_tokens() {
        assert_eq!(
            kinds("1+2.5"),
            vec![
                Token::Number(1.0),
                Token::Punct("+"),
                Token::Number(2.5),
                Token::Eof
            ]
        );
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(
            kinds("a !== b"),
            vec![
                Token::Ident("a".into()),
                Token::Punct("!=="),
                Token::Ident("b".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(kinds(r#"'it\'s' "a\nb""#)[0], Token::Str("it's".into()));
        assert_eq!(kinds(r#""a\nb""#)[0], Token::Str("a\nb".into()));
    }

    #[test]
    fn separators_and_comments() {
        let toks = kinds("a = 1; // note\nb");
        assert_eq!(
            toks,
            vec![
                Token::Ident("a".into()),
                Token::Punct("="),
                Token::Number(1.0),
                Token::Separator,
                Token::Separator,
                Token::Ident("b".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn unterminated_string_reports_position() {
        let err = tokenize("x = 'abc").unwrap_err();
        assert_eq!(
            err,
            ScriptError::Syntax {
                line: 1,
                column: 5,
                message: "unterminated string".into()
            }
        );
    }

    #[test]
    fn update_and_arrow_operators() {
        assert_eq!(
            kinds("i++ n+=2 x=>x"),
            vec![
                Token::Ident("i".into()),
                Token::Punct("++"),
                Token::Ident("n".into()),
                Token::Punct("+="),
                Token::Number(2.0),
                Token::Ident("x".into()),
                Token::Punct("=>"),
                Token::Ident("x".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn unexpected_character() {
        assert!(matches!(tokenize("1 # 2"), Err(ScriptError::Syntax { .. })));
    }
}
