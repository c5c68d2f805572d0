//! Tokenizer for the JavaScript subset the sandbox evaluates.
//!
//! Operates on *generated* code (post-transpile), so tokens carry the
//! generated line/column that the source-map locator later remaps.

/// A position in generated code: 1-based line, 0-based column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// 1-based line.
    pub line: u32,
    /// 0-based column.
    pub column: u32,
}

impl Span {
    /// Creates a span.
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One piece of a template literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text between interpolations.
    Text(String),
    /// Raw source of a `${…}` interpolation, parsed later.
    Expr(String, Span),
}

/// Token kinds for the evaluated subset.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(f64),
    Str(String),
    Template(Vec<TemplatePart>),

    // Keywords
    Const,
    Let,
    Var,
    Function,
    Return,
    If,
    Else,
    True,
    False,
    Null,
    Undefined,
    While,
    For,
    Of,
    New,
    Typeof,
    Throw,
    Break,
    Continue,

    // Punctuation and operators
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    Dot,
    Ellipsis,
    Arrow,
    Question,
    QuestionDot,
    QuestionQuestion,
    Assign,
    PlusAssign,
    MinusAssign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    Lt,
    Gt,
    Le,
    Ge,
    AndAnd,
    OrOr,
    Not,

    Eof,
}

/// A token with its generated-code position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// A lexing failure with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

/// Character cursor tracking line/column.
struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str, start: Span) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: start.line,
            column: start.column,
        }
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }
}

/// Tokenizes `source`, positions offset from `start` (so sub-lexes of
/// template interpolations report real coordinates).
pub fn tokenize_at(source: &str, start: Span) -> Result<Vec<Token>, LexError> {
    let mut cursor = Cursor::new(source, start);
    let mut tokens = Vec::new();

    loop {
        skip_trivia(&mut cursor)?;
        let span = cursor.span();
        let Some(ch) = cursor.advance() else {
            tokens.push(Token {
                kind: TokenKind::Eof,
                span,
            });
            return Ok(tokens);
        };

        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semi,
            ':' => TokenKind::Colon,
            '%' => TokenKind::Percent,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '+' => {
                if cursor.eat('=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if cursor.eat('=') {
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }
            '.' => {
                if cursor.peek() == Some('.') {
                    cursor.advance();
                    if cursor.eat('.') {
                        TokenKind::Ellipsis
                    } else {
                        return Err(LexError {
                            message: "unexpected '..'".to_string(),
                            span,
                        });
                    }
                } else {
                    TokenKind::Dot
                }
            }
            '?' => {
                if cursor.eat('.') {
                    TokenKind::QuestionDot
                } else if cursor.eat('?') {
                    TokenKind::QuestionQuestion
                } else {
                    TokenKind::Question
                }
            }
            '=' => {
                if cursor.eat('=') {
                    if cursor.eat('=') {
                        TokenKind::EqEqEq
                    } else {
                        TokenKind::EqEq
                    }
                } else if cursor.eat('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if cursor.eat('=') {
                    if cursor.eat('=') {
                        TokenKind::NotEqEq
                    } else {
                        TokenKind::NotEq
                    }
                } else {
                    TokenKind::Not
                }
            }
            '<' => {
                if cursor.eat('=') {
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if cursor.eat('=') {
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                if cursor.eat('&') {
                    TokenKind::AndAnd
                } else {
                    return Err(LexError {
                        message: "bitwise '&' is not supported".to_string(),
                        span,
                    });
                }
            }
            '|' => {
                if cursor.eat('|') {
                    TokenKind::OrOr
                } else {
                    return Err(LexError {
                        message: "bitwise '|' is not supported".to_string(),
                        span,
                    });
                }
            }
            '"' | '\'' => TokenKind::Str(lex_string(&mut cursor, ch, span)?),
            '`' => TokenKind::Template(lex_template(&mut cursor, span)?),
            c if c.is_ascii_digit() => lex_number(&mut cursor, c, span)?,
            c if is_ident_start(c) => lex_ident(&mut cursor, c),
            other => {
                return Err(LexError {
                    message: format!("unexpected character '{other}'"),
                    span,
                });
            }
        };

        tokens.push(Token { kind, span });
    }
}

/// Tokenizes from line 1, column 0.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    tokenize_at(source, Span::new(1, 0))
}

fn skip_trivia(cursor: &mut Cursor<'_>) -> Result<(), LexError> {
    loop {
        match cursor.peek() {
            Some(c) if c.is_whitespace() => {
                cursor.advance();
            }
            Some('/') => {
                // Peek one past the slash without consuming it.
                let mut probe = cursor.chars.clone();
                probe.next();
                match probe.peek() {
                    Some('/') => {
                        while let Some(c) = cursor.peek() {
                            if c == '\n' {
                                break;
                            }
                            cursor.advance();
                        }
                    }
                    Some('*') => {
                        let open = cursor.span();
                        cursor.advance();
                        cursor.advance();
                        loop {
                            match cursor.advance() {
                                Some('*') if cursor.peek() == Some('/') => {
                                    cursor.advance();
                                    break;
                                }
                                Some(_) => {}
                                None => {
                                    return Err(LexError {
                                        message: "unterminated block comment".to_string(),
                                        span: open,
                                    });
                                }
                            }
                        }
                    }
                    _ => return Ok(()),
                }
            }
            _ => return Ok(()),
        }
    }
}

fn lex_string(cursor: &mut Cursor<'_>, quote: char, open: Span) -> Result<String, LexError> {
    let mut value = String::new();
    loop {
        match cursor.advance() {
            None => {
                return Err(LexError {
                    message: "unterminated string".to_string(),
                    span: open,
                });
            }
            Some(c) if c == quote => return Ok(value),
            Some('\\') => match cursor.advance() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some('r') => value.push('\r'),
                Some('\\') => value.push('\\'),
                Some('0') => value.push('\0'),
                Some(c) => value.push(c),
                None => {
                    return Err(LexError {
                        message: "unterminated string escape".to_string(),
                        span: open,
                    });
                }
            },
            Some('\n') => {
                return Err(LexError {
                    message: "unterminated string".to_string(),
                    span: open,
                });
            }
            Some(c) => value.push(c),
        }
    }
}

/// Lexes a template literal body (backtick already consumed).
///
/// Interpolation sources are captured raw, with their start span, and
/// parsed later by the expression parser.
fn lex_template(cursor: &mut Cursor<'_>, open: Span) -> Result<Vec<TemplatePart>, LexError> {
    let mut parts = Vec::new();
    let mut text = String::new();

    loop {
        match cursor.advance() {
            None => {
                return Err(LexError {
                    message: "unterminated template literal".to_string(),
                    span: open,
                });
            }
            Some('`') => {
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(text));
                }
                return Ok(parts);
            }
            Some('\\') => match cursor.advance() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some('`') => text.push('`'),
                Some('$') => text.push('$'),
                Some('\\') => text.push('\\'),
                Some(c) => text.push(c),
                None => {
                    return Err(LexError {
                        message: "unterminated template escape".to_string(),
                        span: open,
                    });
                }
            },
            Some('$') if cursor.peek() == Some('{') => {
                cursor.advance(); // {
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                }
                let expr_span = cursor.span();
                let mut depth = 1u32;
                let mut expr = String::new();
                loop {
                    match cursor.advance() {
                        None => {
                            return Err(LexError {
                                message: "unterminated template interpolation".to_string(),
                                span: open,
                            });
                        }
                        Some('{') => {
                            depth += 1;
                            expr.push('{');
                        }
                        Some('}') => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                            expr.push('}');
                        }
                        Some(q @ ('"' | '\'')) => {
                            // Copy nested strings opaquely so braces inside
                            // them do not affect the depth count.
                            expr.push(q);
                            loop {
                                match cursor.advance() {
                                    None => {
                                        return Err(LexError {
                                            message: "unterminated string".to_string(),
                                            span: open,
                                        });
                                    }
                                    Some('\\') => {
                                        expr.push('\\');
                                        if let Some(e) = cursor.advance() {
                                            expr.push(e);
                                        }
                                    }
                                    Some(c) => {
                                        expr.push(c);
                                        if c == q {
                                            break;
                                        }
                                    }
                                }
                            }
                        }
                        Some(c) => expr.push(c),
                    }
                }
                parts.push(TemplatePart::Expr(expr, expr_span));
            }
            Some(c) => text.push(c),
        }
    }
}

fn lex_number(cursor: &mut Cursor<'_>, first: char, span: Span) -> Result<TokenKind, LexError> {
    let mut text = String::new();
    text.push(first);
    while let Some(c) = cursor.peek() {
        if c.is_ascii_digit() || c == '.' || c == '_' {
            if c != '_' {
                text.push(c);
            }
            cursor.advance();
        } else {
            break;
        }
    }
    text.parse::<f64>().map(TokenKind::Number).map_err(|_| LexError {
        message: format!("invalid number literal '{text}'"),
        span,
    })
}

fn lex_ident(cursor: &mut Cursor<'_>, first: char) -> TokenKind {
    let mut text = String::new();
    text.push(first);
    while let Some(c) = cursor.peek() {
        if is_ident_continue(c) {
            text.push(c);
            cursor.advance();
        } else {
            break;
        }
    }

    match text.as_str() {
        "const" => TokenKind::Const,
        "let" => TokenKind::Let,
        "var" => TokenKind::Var,
        "function" => TokenKind::Function,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "undefined" => TokenKind::Undefined,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "of" => TokenKind::Of,
        "new" => TokenKind::New,
        "typeof" => TokenKind::Typeof,
        "throw" => TokenKind::Throw,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        _ => TokenKind::Ident(text),
    }
}

const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

const fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_statement() {
        let toks = kinds("const x = 42;");
        assert_eq!(
            toks,
            vec![
                TokenKind::Const,
                TokenKind::Ident("x".to_string()),
                TokenKind::Assign,
                TokenKind::Number(42.0),
                TokenKind::Semi,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_spans_track_lines_and_columns() {
        let toks = tokenize("a\n  b").unwrap();
        assert_eq!(toks[0].span, Span::new(1, 0));
        assert_eq!(toks[1].span, Span::new(2, 2));
    }

    #[test]
    fn test_operators() {
        let toks = kinds("a === b !== c <= d >= e && f || g ?? h => i");
        assert!(toks.contains(&TokenKind::EqEqEq));
        assert!(toks.contains(&TokenKind::NotEqEq));
        assert!(toks.contains(&TokenKind::Le));
        assert!(toks.contains(&TokenKind::Ge));
        assert!(toks.contains(&TokenKind::AndAnd));
        assert!(toks.contains(&TokenKind::OrOr));
        assert!(toks.contains(&TokenKind::QuestionQuestion));
        assert!(toks.contains(&TokenKind::Arrow));
    }

    #[test]
    fn test_strings_and_escapes() {
        let toks = kinds(r#"'it\'s' "a\nb""#);
        assert_eq!(toks[0], TokenKind::Str("it's".to_string()));
        assert_eq!(toks[1], TokenKind::Str("a\nb".to_string()));
    }

    #[test]
    fn test_template_literal_parts() {
        let toks = kinds("`count is ${count + 1}!`");
        let TokenKind::Template(parts) = &toks[0] else {
            panic!("expected template");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], TemplatePart::Text("count is ".to_string()));
        assert!(matches!(&parts[1], TemplatePart::Expr(src, _) if src == "count + 1"));
        assert_eq!(parts[2], TemplatePart::Text("!".to_string()));
    }

    #[test]
    fn test_comments_are_skipped() {
        let toks = kinds("a // line\n/* block\nstill */ b");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Ident("b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_spread_and_optional_chaining() {
        let toks = kinds("...rest a?.b");
        assert_eq!(toks[0], TokenKind::Ellipsis);
        assert!(toks.contains(&TokenKind::QuestionDot));
    }

    #[test]
    fn test_unterminated_string_is_error() {
        assert!(tokenize("'oops").is_err());
        assert!(tokenize("`oops").is_err());
    }
}
