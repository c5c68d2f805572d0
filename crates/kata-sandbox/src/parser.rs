//! Recursive-descent parser for the evaluated JavaScript subset.
//!
//! Produces a spanned AST; spans are generated-code coordinates that the
//! source-map locator remaps when an evaluation error surfaces.

use crate::lexer::{self, Span, TemplatePart, Token, TokenKind};

/// A parse failure with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

/// `const` / `let` / `var`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Const,
    Let,
    Var,
}

/// A binding pattern in declarations and parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Plain identifier binding.
    Ident(String),
    /// Array destructuring; `None` marks an elision hole.
    Array(Vec<Option<Pattern>>),
    /// Object destructuring: `(key, binding)` pairs.
    Object(Vec<(String, Pattern)>),
}

/// An object-literal property.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjProp {
    /// `key: value`
    KeyValue(String, Expr),
    /// `{ x }` shorthand.
    Shorthand(String, Span),
    /// `{ ...expr }` spread.
    Spread(Expr),
}

/// An array-literal element.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayElem {
    Item(Expr),
    Spread(Expr),
}

/// Arrow-function body.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrowBody {
    Expr(Box<Expr>),
    Block(Vec<Stmt>),
}

/// A piece of a template literal, post-parse.
#[derive(Debug, Clone, PartialEq)]
pub enum TplChunk {
    Text(String),
    Expr(Expr),
}

/// Member-access property.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberProp {
    /// `obj.name`
    Static(String),
    /// `obj[expr]`
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    EqLoose,
    EqStrict,
    NeLoose,
    NeStrict,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
    Pos,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
}

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64, Span),
    Str(String, Span),
    Bool(bool, Span),
    Null(Span),
    Undefined(Span),
    Ident(String, Span),
    Template(Vec<TplChunk>, Span),
    Array(Vec<ArrayElem>, Span),
    Object(Vec<ObjProp>, Span),
    Arrow {
        params: Vec<Pattern>,
        body: ArrowBody,
        span: Span,
    },
    FuncExpr {
        name: Option<String>,
        params: Vec<Pattern>,
        body: Vec<Stmt>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Member {
        object: Box<Expr>,
        property: MemberProp,
        optional: bool,
        span: Span,
    },
    Assign {
        target: Box<Expr>,
        op: AssignOp,
        value: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
        span: Span,
    },
    Cond {
        test: Box<Expr>,
        cons: Box<Expr>,
        alt: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    /// The expression's position in generated code.
    #[must_use]
    pub const fn span(&self) -> Span {
        match self {
            Self::Number(_, s)
            | Self::Str(_, s)
            | Self::Bool(_, s)
            | Self::Null(s)
            | Self::Undefined(s)
            | Self::Ident(_, s)
            | Self::Template(_, s)
            | Self::Array(_, s)
            | Self::Object(_, s)
            | Self::Arrow { span: s, .. }
            | Self::FuncExpr { span: s, .. }
            | Self::Call { span: s, .. }
            | Self::New { span: s, .. }
            | Self::Member { span: s, .. }
            | Self::Assign { span: s, .. }
            | Self::Binary { span: s, .. }
            | Self::Logical { span: s, .. }
            | Self::Unary { span: s, .. }
            | Self::Cond { span: s, .. } => *s,
        }
    }
}

/// Statements.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VarDecl {
        kind: DeclKind,
        pattern: Pattern,
        init: Option<Expr>,
        span: Span,
    },
    FuncDecl {
        name: String,
        params: Vec<Pattern>,
        body: Vec<Stmt>,
        span: Span,
    },
    Return(Option<Expr>, Span),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
        span: Span,
    },
    ForOf {
        kind: DeclKind,
        pattern: Pattern,
        iterable: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    Throw(Expr, Span),
    Break(Span),
    Continue(Span),
    Block(Vec<Stmt>),
    Expr(Expr),
}

/// Parses a whole program (module body or check snippet).
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, ParseError> {
    parse_program_at(source, Span::new(1, 0))
}

/// Parses with positions offset from `start`.
pub fn parse_program_at(source: &str, start: Span) -> Result<Vec<Stmt>, ParseError> {
    let tokens = lexer::tokenize_at(source, start).map_err(|e| ParseError {
        message: e.message,
        span: e.span,
    })?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut stmts = Vec::new();
    while !parser.at(&TokenKind::Eof) {
        stmts.push(parser.parse_stmt()?);
    }
    Ok(stmts)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| &self.tokens[self.tokens.len() - 1])
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn span(&self) -> Span {
        self.peek().span
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.peek_kind())))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            span: self.span(),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span();
        match self.peek_kind() {
            TokenKind::Const | TokenKind::Let | TokenKind::Var => self.parse_var_decl(),
            TokenKind::Function => self.parse_func_decl(),
            TokenKind::Return => {
                self.advance();
                let value = if self.at(&TokenKind::Semi)
                    || self.at(&TokenKind::RBrace)
                    || self.at(&TokenKind::Eof)
                {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.eat(&TokenKind::Semi);
                Ok(Stmt::Return(value, span))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                self.expect(&TokenKind::LParen, "'('")?;
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::While { cond, body, span })
            }
            TokenKind::For => self.parse_for(),
            TokenKind::Throw => {
                self.advance();
                let value = self.parse_expr()?;
                self.eat(&TokenKind::Semi);
                Ok(Stmt::Throw(value, span))
            }
            TokenKind::Break => {
                self.advance();
                self.eat(&TokenKind::Semi);
                Ok(Stmt::Break(span))
            }
            TokenKind::Continue => {
                self.advance();
                self.eat(&TokenKind::Semi);
                Ok(Stmt::Continue(span))
            }
            TokenKind::LBrace => {
                self.advance();
                let body = self.parse_block_body()?;
                Ok(Stmt::Block(body))
            }
            TokenKind::Semi => {
                self.advance();
                Ok(Stmt::Block(Vec::new()))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.eat(&TokenKind::Semi);
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_var_decl(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span();
        let kind = match self.advance().kind {
            TokenKind::Const => DeclKind::Const,
            TokenKind::Let => DeclKind::Let,
            _ => DeclKind::Var,
        };
        let pattern = self.parse_pattern()?;
        let init = if self.eat(&TokenKind::Assign) {
            Some(self.parse_assign_expr()?)
        } else {
            None
        };
        // Multiple declarators desugar into a block of single declarations.
        if self.at(&TokenKind::Comma) {
            let mut decls = vec![Stmt::VarDecl {
                kind,
                pattern,
                init,
                span,
            }];
            while self.eat(&TokenKind::Comma) {
                let span = self.span();
                let pattern = self.parse_pattern()?;
                let init = if self.eat(&TokenKind::Assign) {
                    Some(self.parse_assign_expr()?)
                } else {
                    None
                };
                decls.push(Stmt::VarDecl {
                    kind,
                    pattern,
                    init,
                    span,
                });
            }
            self.eat(&TokenKind::Semi);
            return Ok(Stmt::Block(decls));
        }
        self.eat(&TokenKind::Semi);
        Ok(Stmt::VarDecl {
            kind,
            pattern,
            init,
            span,
        })
    }

    fn parse_func_decl(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span();
        self.advance(); // function
        let name = self.parse_ident("function name")?;
        let params = self.parse_params()?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let body = self.parse_block_body()?;
        Ok(Stmt::FuncDecl {
            name,
            params,
            body,
            span,
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span();
        self.advance(); // if
        self.expect(&TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "')'")?;
        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
            span,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span();
        self.advance(); // for
        self.expect(&TokenKind::LParen, "'('")?;

        // for (const x of xs): detect `of` after the pattern.
        if matches!(
            self.peek_kind(),
            TokenKind::Const | TokenKind::Let | TokenKind::Var
        ) {
            let kind = match self.peek_kind() {
                TokenKind::Const => DeclKind::Const,
                TokenKind::Let => DeclKind::Let,
                _ => DeclKind::Var,
            };
            let checkpoint = self.pos;
            self.advance();
            let pattern = self.parse_pattern()?;
            if self.eat(&TokenKind::Of) {
                let iterable = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                let body = Box::new(self.parse_stmt()?);
                return Ok(Stmt::ForOf {
                    kind,
                    pattern,
                    iterable,
                    body,
                    span,
                });
            }
            self.pos = checkpoint;
        }

        let init = if self.eat(&TokenKind::Semi) {
            None
        } else {
            let stmt = if matches!(
                self.peek_kind(),
                TokenKind::Const | TokenKind::Let | TokenKind::Var
            ) {
                self.parse_var_decl()?
            } else {
                let expr = self.parse_expr()?;
                self.eat(&TokenKind::Semi);
                Stmt::Expr(expr)
            };
            Some(Box::new(stmt))
        };
        let test = if self.at(&TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::Semi, "';'")?;
        let update = if self.at(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::RParen, "')'")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
            span,
        })
    }

    fn parse_block_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            if self.at(&TokenKind::Eof) {
                return Err(self.error("unexpected end of input, expected '}'"));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.advance(); // }
        Ok(stmts)
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    fn parse_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            // Contextual keywords usable as names.
            TokenKind::Of => {
                self.advance();
                Ok("of".to_string())
            }
            TokenKind::Undefined => {
                self.advance();
                Ok("undefined".to_string())
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn parse_pattern(&mut self) -> Result<Pattern, ParseError> {
        match self.peek_kind() {
            TokenKind::LBracket => {
                self.advance();
                let mut elems = Vec::new();
                loop {
                    if self.eat(&TokenKind::RBracket) {
                        break;
                    }
                    if self.eat(&TokenKind::Comma) {
                        elems.push(None); // elision hole
                        continue;
                    }
                    elems.push(Some(self.parse_pattern()?));
                    if !self.eat(&TokenKind::Comma) {
                        self.expect(&TokenKind::RBracket, "']'")?;
                        break;
                    }
                }
                Ok(Pattern::Array(elems))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut props = Vec::new();
                loop {
                    if self.eat(&TokenKind::RBrace) {
                        break;
                    }
                    let key = self.parse_ident("property name")?;
                    let binding = if self.eat(&TokenKind::Colon) {
                        self.parse_pattern()?
                    } else {
                        Pattern::Ident(key.clone())
                    };
                    props.push((key, binding));
                    if !self.eat(&TokenKind::Comma) {
                        self.expect(&TokenKind::RBrace, "'}'")?;
                        break;
                    }
                }
                Ok(Pattern::Object(props))
            }
            _ => Ok(Pattern::Ident(self.parse_ident("binding name")?)),
        }
    }

    fn parse_params(&mut self) -> Result<Vec<Pattern>, ParseError> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        loop {
            if self.eat(&TokenKind::RParen) {
                break;
            }
            params.push(self.parse_pattern()?);
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RParen, "')'")?;
                break;
            }
        }
        Ok(params)
    }

    // ------------------------------------------------------------------
    // Expressions (precedence climbing)
    // ------------------------------------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_assign_expr()
    }

    fn parse_assign_expr(&mut self) -> Result<Expr, ParseError> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }

        let left = self.parse_cond_expr()?;
        let op = match self.peek_kind() {
            TokenKind::Assign => Some(AssignOp::Assign),
            TokenKind::PlusAssign => Some(AssignOp::AddAssign),
            TokenKind::MinusAssign => Some(AssignOp::SubAssign),
            _ => None,
        };
        if let Some(op) = op {
            let span = self.span();
            if !matches!(left, Expr::Ident(..) | Expr::Member { .. }) {
                return Err(self.error("invalid assignment target"));
            }
            self.advance();
            let value = self.parse_assign_expr()?;
            return Ok(Expr::Assign {
                target: Box::new(left),
                op,
                value: Box::new(value),
                span,
            });
        }
        Ok(left)
    }

    /// Detects `ident =>` and `( … ) =>` ahead of normal expression
    /// parsing; returns `None` when the lookahead says "not an arrow".
    fn try_parse_arrow(&mut self) -> Result<Option<Expr>, ParseError> {
        let is_arrow = match self.peek_kind() {
            TokenKind::Ident(_) => matches!(self.kind_at(1), Some(TokenKind::Arrow)),
            TokenKind::LParen => {
                let mut depth = 0usize;
                let mut i = self.pos;
                loop {
                    match self.tokens.get(i).map(|t| &t.kind) {
                        Some(TokenKind::LParen) => depth += 1,
                        Some(TokenKind::RParen) => {
                            depth -= 1;
                            if depth == 0 {
                                break matches!(
                                    self.tokens.get(i + 1).map(|t| &t.kind),
                                    Some(TokenKind::Arrow)
                                );
                            }
                        }
                        Some(TokenKind::Eof) | None => break false,
                        Some(_) => {}
                    }
                    i += 1;
                }
            }
            _ => false,
        };
        if !is_arrow {
            return Ok(None);
        }

        let span = self.span();
        let params = if matches!(self.peek_kind(), TokenKind::Ident(_)) {
            vec![Pattern::Ident(self.parse_ident("parameter")?)]
        } else {
            self.parse_params()?
        };
        self.expect(&TokenKind::Arrow, "'=>'")?;
        let body = if self.at(&TokenKind::LBrace) {
            self.advance();
            ArrowBody::Block(self.parse_block_body()?)
        } else {
            ArrowBody::Expr(Box::new(self.parse_assign_expr()?))
        };
        Ok(Some(Expr::Arrow { params, body, span }))
    }

    fn parse_cond_expr(&mut self) -> Result<Expr, ParseError> {
        let test = self.parse_nullish_expr()?;
        if self.at(&TokenKind::Question) {
            let span = self.span();
            self.advance();
            let cons = self.parse_assign_expr()?;
            self.expect(&TokenKind::Colon, "':'")?;
            let alt = self.parse_assign_expr()?;
            return Ok(Expr::Cond {
                test: Box::new(test),
                cons: Box::new(cons),
                alt: Box::new(alt),
                span,
            });
        }
        Ok(test)
    }

    fn parse_nullish_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_or_expr()?;
        while self.at(&TokenKind::QuestionQuestion) {
            let span = self.span();
            self.advance();
            let right = self.parse_or_expr()?;
            left = Expr::Logical {
                op: LogicalOp::Nullish,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and_expr()?;
        while self.at(&TokenKind::OrOr) {
            let span = self.span();
            self.advance();
            let right = self.parse_and_expr()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality_expr()?;
        while self.at(&TokenKind::AndAnd) {
            let span = self.span();
            self.advance();
            let right = self.parse_equality_expr()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_equality_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_relational_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinOp::EqLoose,
                TokenKind::EqEqEq => BinOp::EqStrict,
                TokenKind::NotEq => BinOp::NeLoose,
                TokenKind::NotEqEq => BinOp::NeStrict,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_relational_expr()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_relational_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_additive_expr()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_additive_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_multiplicative_expr()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_multiplicative_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Rem,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_unary_expr()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            TokenKind::Not => Some(UnOp::Not),
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Plus => Some(UnOp::Pos),
            TokenKind::Typeof => Some(UnOp::Typeof),
            _ => None,
        };
        if let Some(op) = op {
            let span = self.span();
            self.advance();
            let expr = self.parse_unary_expr()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
                span,
            });
        }
        self.parse_postfix_expr()
    }

    fn parse_postfix_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    let span = self.span();
                    self.advance();
                    let name = self.parse_ident("property name")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: MemberProp::Static(name),
                        optional: false,
                        span,
                    };
                }
                TokenKind::QuestionDot => {
                    let span = self.span();
                    self.advance();
                    let name = self.parse_ident("property name")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: MemberProp::Static(name),
                        optional: true,
                        span,
                    };
                }
                TokenKind::LBracket => {
                    let span = self.span();
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: MemberProp::Computed(Box::new(index)),
                        optional: false,
                        span,
                    };
                }
                TokenKind::LParen => {
                    let span = self.span();
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        span,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        loop {
            if self.eat(&TokenKind::RParen) {
                break;
            }
            args.push(self.parse_assign_expr()?);
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RParen, "')'")?;
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ParseError> {
        let span = self.span();
        match self.peek_kind().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(n, span))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s, span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool(true, span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(false, span))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Null(span))
            }
            TokenKind::Undefined => {
                self.advance();
                Ok(Expr::Undefined(span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(name, span))
            }
            TokenKind::Template(parts) => {
                self.advance();
                let mut chunks = Vec::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(t) => chunks.push(TplChunk::Text(t)),
                        TemplatePart::Expr(src, at) => {
                            let mut stmts = parse_program_at(&src, at)?;
                            match stmts.pop() {
                                Some(Stmt::Expr(e)) if stmts.is_empty() => {
                                    chunks.push(TplChunk::Expr(e));
                                }
                                _ => {
                                    return Err(ParseError {
                                        message: "expected a single expression in template \
                                                  interpolation"
                                            .to_string(),
                                        span: at,
                                    });
                                }
                            }
                        }
                    }
                }
                Ok(Expr::Template(chunks, span))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elems = Vec::new();
                loop {
                    if self.eat(&TokenKind::RBracket) {
                        break;
                    }
                    if self.eat(&TokenKind::Ellipsis) {
                        elems.push(ArrayElem::Spread(self.parse_assign_expr()?));
                    } else {
                        elems.push(ArrayElem::Item(self.parse_assign_expr()?));
                    }
                    if !self.eat(&TokenKind::Comma) {
                        self.expect(&TokenKind::RBracket, "']'")?;
                        break;
                    }
                }
                Ok(Expr::Array(elems, span))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut props = Vec::new();
                loop {
                    if self.eat(&TokenKind::RBrace) {
                        break;
                    }
                    if self.eat(&TokenKind::Ellipsis) {
                        props.push(ObjProp::Spread(self.parse_assign_expr()?));
                    } else {
                        let key_span = self.span();
                        let key = match self.peek_kind().clone() {
                            TokenKind::Str(s) => {
                                self.advance();
                                s
                            }
                            TokenKind::Number(n) => {
                                self.advance();
                                crate::interp::format_number(n)
                            }
                            _ => self.parse_ident("property name")?,
                        };
                        if self.eat(&TokenKind::Colon) {
                            props.push(ObjProp::KeyValue(key, self.parse_assign_expr()?));
                        } else {
                            props.push(ObjProp::Shorthand(key, key_span));
                        }
                    }
                    if !self.eat(&TokenKind::Comma) {
                        self.expect(&TokenKind::RBrace, "'}'")?;
                        break;
                    }
                }
                Ok(Expr::Object(props, span))
            }
            TokenKind::Function => {
                self.advance();
                let name = if matches!(self.peek_kind(), TokenKind::Ident(_)) {
                    Some(self.parse_ident("function name")?)
                } else {
                    None
                };
                let params = self.parse_params()?;
                self.expect(&TokenKind::LBrace, "'{'")?;
                let body = self.parse_block_body()?;
                Ok(Expr::FuncExpr {
                    name,
                    params,
                    body,
                    span,
                })
            }
            TokenKind::New => {
                self.advance();
                // Callee is a primary + member chain; arguments bind to `new`.
                let mut callee = self.parse_primary_expr()?;
                while self.at(&TokenKind::Dot) {
                    let span = self.span();
                    self.advance();
                    let name = self.parse_ident("property name")?;
                    callee = Expr::Member {
                        object: Box::new(callee),
                        property: MemberProp::Static(name),
                        optional: false,
                        span,
                    };
                }
                let args = if self.at(&TokenKind::LParen) {
                    self.parse_args()?
                } else {
                    Vec::new()
                };
                Ok(Expr::New {
                    callee: Box::new(callee),
                    args,
                    span,
                })
            }
            other => Err(self.error(format!("unexpected token {other:?}"))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_decl_with_destructuring() {
        let stmts = parse_program("const [count, setCount] = useState(0);").unwrap();
        assert_eq!(stmts.len(), 1);
        let Stmt::VarDecl { kind, pattern, .. } = &stmts[0] else {
            panic!("expected var decl");
        };
        assert_eq!(*kind, DeclKind::Const);
        assert_eq!(
            *pattern,
            Pattern::Array(vec![
                Some(Pattern::Ident("count".to_string())),
                Some(Pattern::Ident("setCount".to_string())),
            ])
        );
    }

    #[test]
    fn test_parse_object_pattern_with_alias() {
        let stmts = parse_program("const { value: v, label } = props;").unwrap();
        let Stmt::VarDecl { pattern, .. } = &stmts[0] else {
            panic!("expected var decl");
        };
        assert_eq!(
            *pattern,
            Pattern::Object(vec![
                ("value".to_string(), Pattern::Ident("v".to_string())),
                ("label".to_string(), Pattern::Ident("label".to_string())),
            ])
        );
    }

    #[test]
    fn test_arrow_detection() {
        let stmts = parse_program("const f = (a, b) => a + b; const g = x => x;").unwrap();
        assert_eq!(stmts.len(), 2);
        for stmt in &stmts {
            let Stmt::VarDecl {
                init: Some(Expr::Arrow { .. }),
                ..
            } = stmt
            else {
                panic!("expected arrow initializer, got {stmt:?}");
            };
        }
    }

    #[test]
    fn test_parenthesized_expr_is_not_arrow() {
        let stmts = parse_program("(a + b) * c;").unwrap();
        let Stmt::Expr(Expr::Binary { op, .. }) = &stmts[0] else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinOp::Mul);
    }

    #[test]
    fn test_precedence() {
        let stmts = parse_program("1 + 2 * 3 === 7;").unwrap();
        let Stmt::Expr(Expr::Binary { op, .. }) = &stmts[0] else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinOp::EqStrict);
    }

    #[test]
    fn test_member_and_call_chain() {
        let stmts = parse_program("console.log(items[0].name);").unwrap();
        let Stmt::Expr(Expr::Call { callee, args, .. }) = &stmts[0] else {
            panic!("expected call");
        };
        assert!(matches!(**callee, Expr::Member { .. }));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_object_literal_spread_and_shorthand() {
        let stmts = parse_program("const o = { a: 1, b, ...rest };").unwrap();
        let Stmt::VarDecl {
            init: Some(Expr::Object(props, _)),
            ..
        } = &stmts[0]
        else {
            panic!("expected object literal");
        };
        assert_eq!(props.len(), 3);
        assert!(matches!(props[0], ObjProp::KeyValue(..)));
        assert!(matches!(props[1], ObjProp::Shorthand(..)));
        assert!(matches!(props[2], ObjProp::Spread(..)));
    }

    #[test]
    fn test_for_of_and_classic_for() {
        let stmts =
            parse_program("for (const x of xs) { log(x); } for (let i = 0; i < 3; i += 1) {}")
                .unwrap();
        assert!(matches!(stmts[0], Stmt::ForOf { .. }));
        assert!(matches!(stmts[1], Stmt::For { .. }));
    }

    #[test]
    fn test_new_expression() {
        let stmts = parse_program(r#"throw new Error("boom");"#).unwrap();
        let Stmt::Throw(Expr::New { args, .. }, _) = &stmts[0] else {
            panic!("expected throw new");
        };
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_template_with_interpolation() {
        let stmts = parse_program("const s = `n = ${n + 1}`;").unwrap();
        let Stmt::VarDecl {
            init: Some(Expr::Template(chunks, _)),
            ..
        } = &stmts[0]
        else {
            panic!("expected template");
        };
        assert_eq!(chunks.len(), 2);
        assert!(matches!(&chunks[1], TplChunk::Expr(Expr::Binary { .. })));
    }

    #[test]
    fn test_error_reports_position() {
        let err = parse_program("const = 1;").unwrap_err();
        assert_eq!(err.span.line, 1);
        assert!(err.message.contains("binding name"));
    }
}
