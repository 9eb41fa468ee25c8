/// Recursive-descent parser from tokens to [`Program`].
/// No name resolution is done here -- that is the engine's job.
use crate::ast::{BinaryOp, Expr, Program, Statement, UnaryOp};
use crate::error::ParseError;
use crate::lexer::{lex, Spanned, Token};

const KEYWORDS: &[&str] = &["to", "true", "false", "if", "then", "else"];

/// Deepest expression nesting accepted before parsing gives up.
pub const MAX_NESTING: usize = 128;

/// Lex and parse `src`, attributing errors to the source unit `unit`.
pub fn parse(src: &str, unit: &str) -> Result<Program, ParseError> {
    let tokens = lex(src, unit)?;
    let mut p = Parser::new(&tokens, unit);
    let statements = p.parse_statements(&Token::Eof)?;
    Ok(Program { statements })
}

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    unit: String,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Spanned], unit: &str) -> Self {
        Parser {
            tokens,
            pos: 0,
            unit: unit.to_owned(),
            depth: 0,
        }
    }

    fn cur(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.cur().token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].token
    }

    fn cur_line(&self) -> u32 {
        self.cur().line
    }

    fn advance(&mut self) -> &Spanned {
        let t = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError::new(&self.unit, self.cur_line(), msg)
    }

    fn expect(&mut self, expected: &Token, shown: &str) -> Result<(), ParseError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected '{}', got {}", shown, describe(self.peek()))))
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Ident(w) if w == kw)
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.is_keyword(kw) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected '{}', got {}", kw, describe(self.peek()))))
        }
    }

    fn take_ident(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Ident(w) if !KEYWORDS.contains(&w.as_str()) => {
                self.advance();
                Ok(w)
            }
            other => Err(self.err(format!("expected identifier, got {}", describe(&other)))),
        }
    }

    /// Run `f` one nesting level deeper, failing past [`MAX_NESTING`].
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.err(format!(
                "expression nested too deeply (limit {})",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn skip_newlines(&mut self) {
        while self.peek() == &Token::Newline {
            self.advance();
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Token::Newline | Token::Semi) {
            self.advance();
        }
    }

    // -- Statements ---------------------------------------------

    /// Parse statements until `end` (not consumed).
    fn parse_statements(&mut self, end: &Token) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if self.peek() == end {
                break;
            }
            if self.peek() == &Token::Eof {
                return Err(self.err("unexpected end of input"));
            }
            statements.push(self.parse_statement()?);
            match self.peek() {
                Token::Newline | Token::Semi => {}
                t if t == end => {}
                other => {
                    return Err(self.err(format!(
                        "expected end of statement, got {}",
                        describe(other)
                    )))
                }
            }
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let line = self.cur_line();
        if let Token::Ident(name) = self.peek().clone() {
            if !KEYWORDS.contains(&name.as_str()) {
                if self.peek_at(1) == &Token::Assign {
                    self.advance();
                    self.advance();
                    self.skip_newlines();
                    let value = self.parse_expr()?;
                    return Ok(Statement::Let { name, value, line });
                }
                if self.looks_like_defun() {
                    self.advance();
                    let params = self.parse_param_list()?;
                    self.expect(&Token::Assign, "=")?;
                    self.skip_newlines();
                    let body = self.parse_expr()?;
                    return Ok(Statement::Defun {
                        name,
                        params,
                        body,
                        line,
                    });
                }
            }
        }
        let expr = self.parse_expr()?;
        Ok(Statement::Expr { expr, line })
    }

    /// `ident ( ident, ... ) =` with the cursor on the leading ident.
    fn looks_like_defun(&self) -> bool {
        if self.peek_at(1) != &Token::LParen {
            return false;
        }
        let mut offset = 2;
        let mut want_ident = true;
        loop {
            match self.peek_at(offset) {
                Token::RParen => return self.peek_at(offset + 1) == &Token::Assign,
                Token::Ident(_) if want_ident => want_ident = false,
                Token::Comma if !want_ident => want_ident = true,
                _ => return false,
            }
            offset += 1;
        }
    }

    fn parse_param_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(&Token::LParen, "(")?;
        let mut params = Vec::new();
        while self.peek() != &Token::RParen {
            params.push(self.take_ident()?);
            if self.peek() == &Token::Comma {
                self.advance();
            }
        }
        self.advance();
        Ok(params)
    }

    // -- Expressions --------------------------------------------

    pub(crate) fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::parse_range)
    }

    fn parse_range(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_or()?;
        if self.is_keyword("to") {
            self.advance();
            self.skip_newlines();
            let rhs = self.parse_or()?;
            return Ok(binary(BinaryOp::To, lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == &Token::OrOr {
            self.advance();
            self.skip_newlines();
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_cmp()?;
        while self.peek() == &Token::AndAnd {
            self.advance();
            self.skip_newlines();
            let rhs = self.parse_cmp()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinaryOp::Eq,
                Token::Neq => BinaryOp::Neq,
                Token::Lt => BinaryOp::Lt,
                Token::Lte => BinaryOp::Lte,
                Token::Gt => BinaryOp::Gt,
                Token::Gte => BinaryOp::Gte,
                _ => return Ok(lhs),
            };
            self.advance();
            self.skip_newlines();
            let rhs = self.parse_add()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_add(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            self.skip_newlines();
            let rhs = self.parse_mul()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_mul(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            self.skip_newlines();
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Bang => UnaryOp::Not,
            _ => return self.parse_pow(),
        };
        self.advance();
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// `^` binds tighter than unary minus and is right-associative.
    fn parse_pow(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_postfix()?;
        if self.peek() == &Token::Caret {
            self.advance();
            self.skip_newlines();
            let exponent = self.nested(Self::parse_unary)?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::LParen => {
                    self.advance();
                    let args = self.parse_delimited(&Token::RParen, ")")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                Token::Dot => {
                    self.advance();
                    let name = match self.peek().clone() {
                        Token::Ident(w) => {
                            self.advance();
                            w
                        }
                        other => {
                            return Err(self.err(format!(
                                "expected field name after '.', got {}",
                                describe(&other)
                            )))
                        }
                    };
                    expr = Expr::Field {
                        target: Box::new(expr),
                        name,
                    };
                }
                Token::LBracket => {
                    self.advance();
                    self.skip_newlines();
                    let index = self.parse_expr()?;
                    self.skip_newlines();
                    self.expect(&Token::RBracket, "]")?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Comma-separated expressions up to `close` (consumed). Newlines and a
    /// trailing comma are allowed.
    fn parse_delimited(&mut self, close: &Token, shown: &str) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            if self.peek() == close {
                self.advance();
                return Ok(items);
            }
            items.push(self.parse_expr()?);
            self.skip_newlines();
            match self.peek() {
                Token::Comma => {
                    self.advance();
                }
                t if t == close => {}
                other => {
                    return Err(self.err(format!(
                        "expected ',' or '{}', got {}",
                        shown,
                        describe(other)
                    )))
                }
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Token::Ident(w) => match w.as_str() {
                "true" => {
                    self.advance();
                    Ok(Expr::Bool(true))
                }
                "false" => {
                    self.advance();
                    Ok(Expr::Bool(false))
                }
                "if" => self.parse_if(),
                "to" | "then" | "else" => Err(self.err(format!("unexpected keyword '{}'", w))),
                _ => {
                    self.advance();
                    Ok(Expr::Ident(w))
                }
            },
            Token::LParen => {
                self.advance();
                self.skip_newlines();
                let inner = self.parse_expr()?;
                self.skip_newlines();
                self.expect(&Token::RParen, ")")?;
                Ok(inner)
            }
            Token::LBracket => {
                self.advance();
                Ok(Expr::Array(self.parse_delimited(&Token::RBracket, "]")?))
            }
            Token::LBrace => self.parse_brace(),
            other => Err(self.err(format!("expected expression, got {}", describe(&other)))),
        }
    }

    fn parse_if(&mut self) -> Result<Expr, ParseError> {
        self.expect_keyword("if")?;
        let cond = self.parse_expr()?;
        self.skip_newlines();
        self.expect_keyword("then")?;
        self.skip_newlines();
        let then_branch = self.parse_expr()?;
        self.skip_newlines();
        self.expect_keyword("else")?;
        self.skip_newlines();
        let else_branch = self.parse_expr()?;
        Ok(Expr::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    /// `{` opens a lambda, a record literal or a block.
    fn parse_brace(&mut self) -> Result<Expr, ParseError> {
        self.expect(&Token::LBrace, "{")?;
        self.skip_newlines();
        match self.peek() {
            Token::Pipe | Token::OrOr => self.parse_lambda(),
            Token::RBrace => {
                self.advance();
                Ok(Expr::Record(Vec::new()))
            }
            Token::Ident(_) | Token::Str(_) if self.peek_at(1) == &Token::Colon => {
                self.parse_record()
            }
            _ => {
                let statements = self.parse_statements(&Token::RBrace)?;
                self.advance();
                Ok(Expr::Block(statements))
            }
        }
    }

    fn parse_lambda(&mut self) -> Result<Expr, ParseError> {
        let mut params = Vec::new();
        if self.peek() == &Token::OrOr {
            self.advance();
        } else {
            self.expect(&Token::Pipe, "|")?;
            while self.peek() != &Token::Pipe {
                params.push(self.take_ident()?);
                match self.peek() {
                    Token::Comma => {
                        self.advance();
                    }
                    Token::Pipe => {}
                    other => {
                        return Err(self.err(format!(
                            "expected ',' or '|' in parameter list, got {}",
                            describe(other)
                        )))
                    }
                }
            }
            self.advance();
        }
        let mut statements = self.parse_statements(&Token::RBrace)?;
        self.advance();
        let single = statements.len() == 1;
        let body = match statements.pop() {
            Some(Statement::Expr { expr, .. }) if single => expr,
            Some(last) => {
                statements.push(last);
                Expr::Block(statements)
            }
            None => Expr::Block(statements),
        };
        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
        })
    }

    fn parse_record(&mut self) -> Result<Expr, ParseError> {
        let mut entries = Vec::new();
        loop {
            self.skip_newlines();
            if self.peek() == &Token::RBrace {
                self.advance();
                return Ok(Expr::Record(entries));
            }
            let key = match self.peek().clone() {
                Token::Ident(w) | Token::Str(w) => {
                    self.advance();
                    w
                }
                other => {
                    return Err(
                        self.err(format!("expected record key, got {}", describe(&other)))
                    )
                }
            };
            self.expect(&Token::Colon, ":")?;
            self.skip_newlines();
            let value = self.parse_expr()?;
            entries.push((key, value));
            self.skip_newlines();
            match self.peek() {
                Token::Comma => {
                    self.advance();
                }
                Token::RBrace => {}
                other => {
                    return Err(self.err(format!(
                        "expected ',' or '}}' in record, got {}",
                        describe(other)
                    )))
                }
            }
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(w) => format!("'{}'", w),
        Token::Str(s) => format!("string {:?}", s),
        Token::Number(n) => format!("number {}", n),
        Token::Newline => "end of line".to_owned(),
        Token::Eof => "end of input".to_owned(),
        other => format!("{:?}", other),
    }
}
