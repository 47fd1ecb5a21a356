//! Recursive-descent parser producing the script AST.
//!
//! Precedence, lowest first: assignment, conditional, `??`, `||`, `&&`,
//! equality, relational, additive, multiplicative, unary, postfix, call
//! and member access, primary.

use super::ScriptError;
use super::lexer::{Spanned, TemplatePiece, Token, tokenize};

const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Declare {
        name: String,
        init: Option<Expr>,
        constant: bool,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    Block(Vec<Stmt>),
    Return(Option<Expr>),
    Throw(Expr),
    Break,
    Continue,
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Template(Vec<TemplatePart>),
    Bool(bool),
    Null,
    Undefined,
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        constructor: String,
        args: Vec<Expr>,
    },
    Unary {
        op: &'static str,
        operand: Box<Expr>,
    },
    Binary {
        op: &'static str,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: &'static str,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Assign {
        op: &'static str,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Raw(String),
    Expr(Expr),
}

/// Parse a whole program.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(&tokens);
    let mut program = Vec::new();
    while parser.peek().is_some() {
        program.push(parser.parse_statement()?);
    }
    Ok(program)
}

fn parse_expression_source(source: &str, line: usize) -> Result<Expr, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(&tokens);
    let expr = parser.parse_expr()?;
    if parser.peek().is_some() {
        return Err(ScriptError::syntax("unexpected token in template expression", line));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    depth: usize,
    loops: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Spanned]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            loops: 0,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn consume(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos).map(|s| &s.token);
        self.pos += 1;
        token
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Some(Token::Punct(q)) if *q == p)
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if w == word)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), ScriptError> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{p}'")))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ScriptError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("expected identifier")),
        }
    }

    fn unexpected(&self, context: &str) -> ScriptError {
        let found = match self.peek() {
            None => "end of input".to_string(),
            Some(Token::Punct(p)) => format!("'{p}'"),
            Some(Token::Ident(name)) => format!("'{name}'"),
            Some(Token::Number(n)) => format!("number {n}"),
            Some(Token::Str(_)) | Some(Token::Template(_)) => "string".to_string(),
        };
        ScriptError::syntax(format!("{context}, found {found}"), self.line())
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ScriptError::syntax("nesting too deep", self.line()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn end_statement(&mut self) {
        self.eat_punct(";");
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn parse_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.enter()?;
        let stmt = self.parse_statement_inner();
        self.leave();
        stmt
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt, ScriptError> {
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        if self.is_punct("{") {
            self.pos += 1;
            let mut body = Vec::new();
            while !self.is_punct("}") {
                if self.peek().is_none() {
                    return Err(self.unexpected("expected '}'"));
                }
                body.push(self.parse_statement()?);
            }
            self.pos += 1;
            return Ok(Stmt::Block(body));
        }

        let keyword = match self.peek() {
            Some(Token::Ident(word)) => word.as_str(),
            _ => "",
        };
        match keyword {
            "let" | "const" | "var" => {
                let stmt = self.parse_declaration()?;
                self.end_statement();
                Ok(stmt)
            }
            "if" => {
                self.pos += 1;
                self.expect_punct("(")?;
                let cond = self.parse_expr()?;
                self.expect_punct(")")?;
                let then = Box::new(self.parse_statement()?);
                let otherwise = if self.is_keyword("else") {
                    self.pos += 1;
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then,
                    otherwise,
                })
            }
            "while" => {
                self.pos += 1;
                self.expect_punct("(")?;
                let cond = self.parse_expr()?;
                self.expect_punct(")")?;
                let body = Box::new(self.parse_loop_body()?);
                Ok(Stmt::While { cond, body })
            }
            "for" => self.parse_for(),
            "return" => {
                self.pos += 1;
                let value = if self.is_punct(";") || self.is_punct("}") || self.peek().is_none() {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.end_statement();
                Ok(Stmt::Return(value))
            }
            "throw" => {
                self.pos += 1;
                let value = self.parse_expr()?;
                self.end_statement();
                Ok(Stmt::Throw(value))
            }
            "break" | "continue" => {
                if self.loops == 0 {
                    return Err(ScriptError::syntax(
                        format!("illegal {keyword} statement"),
                        self.line(),
                    ));
                }
                let stmt = if keyword == "break" {
                    Stmt::Break
                } else {
                    Stmt::Continue
                };
                self.pos += 1;
                self.end_statement();
                Ok(stmt)
            }
            "function" | "class" | "async" | "import" | "export" | "try" | "switch" | "do" => Err(
                ScriptError::syntax(format!("'{keyword}' is not supported"), self.line()),
            ),
            _ => {
                let expr = self.parse_expr()?;
                self.end_statement();
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_loop_body(&mut self) -> Result<Stmt, ScriptError> {
        self.loops += 1;
        let body = self.parse_statement();
        self.loops -= 1;
        body
    }

    fn parse_declaration(&mut self) -> Result<Stmt, ScriptError> {
        let constant = self.is_keyword("const");
        self.pos += 1;
        let name = self.expect_ident()?;
        let init = if self.eat_punct("=") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        if constant && init.is_none() {
            return Err(ScriptError::syntax(
                "missing initializer in const declaration",
                self.line(),
            ));
        }
        Ok(Stmt::Declare {
            name,
            init,
            constant,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ScriptError> {
        self.pos += 1;
        self.expect_punct("(")?;
        let init = if self.is_punct(";") {
            None
        } else if self.is_keyword("let") || self.is_keyword("const") || self.is_keyword("var") {
            Some(Box::new(self.parse_declaration()?))
        } else {
            Some(Box::new(Stmt::Expr(self.parse_expr()?)))
        };
        self.expect_punct(";")?;
        let cond = if self.is_punct(";") {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.parse_loop_body()?);
        Ok(Stmt::For {
            init,
            cond,
            update,
            body,
        })
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr, ScriptError> {
        self.enter()?;
        let expr = self.parse_assignment();
        self.leave();
        expr
    }

    fn parse_assignment(&mut self) -> Result<Expr, ScriptError> {
        let target = self.parse_conditional()?;
        let op = match self.peek() {
            Some(Token::Punct(p)) if matches!(*p, "=" | "+=" | "-=" | "*=" | "/=" | "%=") => *p,
            _ => return Ok(target),
        };
        if !matches!(target, Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }) {
            return Err(ScriptError::syntax("invalid assignment target", self.line()));
        }
        self.pos += 1;
        let value = self.parse_expr()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr, ScriptError> {
        let cond = self.parse_logical(0)?;
        if !self.eat_punct("?") {
            return Ok(cond);
        }
        let then = self.parse_expr()?;
        self.expect_punct(":")?;
        let otherwise = self.parse_expr()?;
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_logical(&mut self, level: usize) -> Result<Expr, ScriptError> {
        const LEVELS: [&str; 3] = ["??", "||", "&&"];
        if level == LEVELS.len() {
            return self.parse_binary(0);
        }
        let mut left = self.parse_logical(level + 1)?;
        while self.is_punct(LEVELS[level]) {
            self.pos += 1;
            let right = self.parse_logical(level + 1)?;
            left = Expr::Logical {
                op: LEVELS[level],
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_binary(&mut self, level: usize) -> Result<Expr, ScriptError> {
        const LEVELS: [&[&str]; 4] = [
            &["===", "!==", "==", "!="],
            &["<", "<=", ">", ">="],
            &["+", "-"],
            &["*", "/", "%"],
        ];
        if level == LEVELS.len() {
            return self.parse_unary();
        }
        let mut left = self.parse_binary(level + 1)?;
        loop {
            let op = match self.peek() {
                Some(Token::Punct(p)) if LEVELS[level].contains(p) => *p,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_binary(level + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek() {
            Some(Token::Punct(p)) if matches!(*p, "!" | "-" | "+") => *p,
            Some(Token::Punct(p)) if matches!(*p, "++" | "--") => {
                let increment = *p == "++";
                self.pos += 1;
                let target = self.parse_call()?;
                return Self::update(increment, true, target, self.line());
            }
            Some(Token::Ident(word)) if word == "typeof" => "typeof",
            _ => return self.parse_postfix(),
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.parse_unary();
        self.leave();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn update(increment: bool, prefix: bool, target: Expr, line: usize) -> Result<Expr, ScriptError> {
        if !matches!(target, Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }) {
            return Err(ScriptError::syntax("invalid update target", line));
        }
        Ok(Expr::Update {
            increment,
            prefix,
            target: Box::new(target),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ScriptError> {
        let expr = self.parse_call()?;
        match self.peek() {
            Some(Token::Punct(p)) if matches!(*p, "++" | "--") => {
                let increment = *p == "++";
                self.pos += 1;
                Self::update(increment, false, expr, self.line())
            }
            _ => Ok(expr),
        }
    }

    fn parse_call(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_punct(".") {
                let property = self.expect_ident()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.eat_punct("[") {
                let index = self.parse_expr()?;
                self.expect_punct("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.is_punct("(") {
                let args = self.parse_arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ScriptError> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            args.push(self.parse_expr()?);
            if !self.is_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ScriptError> {
        let line = self.line();
        let token = match self.consume() {
            Some(token) => token.clone(),
            None => return Err(ScriptError::syntax("unexpected end of input", line)),
        };
        match token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Template(pieces) => {
                let parts = pieces
                    .into_iter()
                    .map(|piece| match piece {
                        TemplatePiece::Raw(raw) => Ok(TemplatePart::Raw(raw)),
                        TemplatePiece::Source(src) => {
                            parse_expression_source(&src, line).map(TemplatePart::Expr)
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::Template(parts))
            }
            Token::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "undefined" => Ok(Expr::Undefined),
                "new" => {
                    let constructor = self.expect_ident()?;
                    let args = if self.is_punct("(") {
                        self.parse_arguments()?
                    } else {
                        Vec::new()
                    };
                    Ok(Expr::New { constructor, args })
                }
                "function" => Err(ScriptError::syntax("'function' is not supported", line)),
                _ if self.is_punct("=>") => {
                    Err(ScriptError::syntax("arrow functions are not supported", line))
                }
                _ => Ok(Expr::Ident(word)),
            },
            Token::Punct("(") => {
                let expr = self.parse_expr()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Token::Punct("[") => {
                let mut items = Vec::new();
                while !self.eat_punct("]") {
                    items.push(self.parse_expr()?);
                    if !self.is_punct("]") {
                        self.expect_punct(",")?;
                    }
                }
                Ok(Expr::Array(items))
            }
            Token::Punct("{") => self.parse_object(),
            Token::Punct(p) => Err(ScriptError::syntax(format!("unexpected '{p}'"), line)),
        }
    }

    fn parse_object(&mut self) -> Result<Expr, ScriptError> {
        let mut fields = Vec::new();
        while !self.eat_punct("}") {
            let key = match self.consume().cloned() {
                Some(Token::Ident(name)) => name,
                Some(Token::Str(s)) => s,
                Some(Token::Number(n)) => super::value::format_number(n),
                _ => {
                    self.pos -= 1;
                    return Err(self.unexpected("expected property name"));
                }
            };
            let value = if self.eat_punct(":") {
                self.parse_expr()?
            } else if matches!(self.peek_at(0), Some(Token::Punct(",")) | Some(Token::Punct("}"))) {
                Expr::Ident(key.clone())
            } else {
                return Err(self.unexpected("expected ':'"));
            };
            fields.push((key, value));
            if !self.is_punct("}") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Object(fields))
    }
}
