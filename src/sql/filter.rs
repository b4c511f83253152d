//! The `q` collection filter, parsed into a predicate with bound values.
//!
//! Grammar (keywords are case-insensitive):
//!
//! ```text
//! expr      := and_expr ("or" and_expr)*
//! and_expr  := atom ("and" atom)*
//! atom      := "(" expr ")" | column condition
//! condition := op value | "is" ["not"] "null" | ["not"] "like" value
//! op        := "=" | "!=" | "<>" | "<" | "<=" | ">" | ">="
//! value     := 'single' | "double" | bare-word
//! ```
//!
//! Columns must exist in the table; every value becomes a `?` parameter.
//! Input longer than [`MAX_FILTER_LEN`] characters or nested deeper than
//! [`MAX_FILTER_DEPTH`] parentheses is rejected.

use super::builder::{typed_value, Predicate, TableSchema};
use crate::binder::BoundValue;
use crate::error::AppError;
use crate::sanitize::{quote_ident, scrub};

/// Longest accepted `q`, in characters.
pub const MAX_FILTER_LEN: usize = 4096;

/// Deepest accepted parenthesis nesting.
pub const MAX_FILTER_DEPTH: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
}

impl Comparison {
    fn sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Like => "LIKE",
            Comparison::NotLike => "NOT LIKE",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    Compare {
        column: String,
        op: Comparison,
        value: String,
    },
    IsNull {
        column: String,
        negated: bool,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    QuotedIdent(String),
    Op(Comparison),
    LParen,
    RParen,
}

fn bad(msg: impl Into<String>) -> AppError {
    AppError::QueryFailure(format!("filter: {}", msg.into()))
}

fn tokenize(input: &str) -> Result<Vec<Token>, AppError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ';' => return Err(bad("statement separator")),
            '\'' | '"' | '`' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(bad("unterminated quote")),
                        Some(&ch) if ch == quote => {
                            // a doubled quote is a literal quote
                            if chars.get(i + 1) == Some(&quote) {
                                text.push(quote);
                                i += 2;
                            } else {
                                i += 1;
                                break;
                            }
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(if quote == '`' {
                    Token::QuotedIdent(text)
                } else {
                    Token::Quoted(text)
                });
            }
            '=' => {
                tokens.push(Token::Op(Comparison::Eq));
                i += 1;
            }
            '!' => {
                if chars.get(i + 1) != Some(&'=') {
                    return Err(bad("expected != "));
                }
                tokens.push(Token::Op(Comparison::Ne));
                i += 2;
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Op(Comparison::Le));
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::Op(Comparison::Ne));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Op(Comparison::Lt));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(Comparison::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(Comparison::Gt));
                    i += 1;
                }
            }
            _ => {
                let start = i;
                while i < chars.len() {
                    let ch = chars[i];
                    if ch.is_whitespace() || "()=!<>'\"`;".contains(ch) {
                        break;
                    }
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    schema: &'a TableSchema,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(kw))
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), AppError> {
        if self.peek_keyword(kw) {
            self.pos += 1;
            Ok(())
        } else {
            Err(bad(format!("expected {}", kw)))
        }
    }

    fn expr(&mut self) -> Result<Filter, AppError> {
        let mut terms = vec![self.and_expr()?];
        while self.peek_keyword("or") {
            self.pos += 1;
            terms.push(self.and_expr()?);
        }
        Ok(if terms.len() == 1 { terms.remove(0) } else { Filter::Or(terms) })
    }

    fn and_expr(&mut self) -> Result<Filter, AppError> {
        let mut terms = vec![self.atom()?];
        while self.peek_keyword("and") {
            self.pos += 1;
            terms.push(self.atom()?);
        }
        Ok(if terms.len() == 1 { terms.remove(0) } else { Filter::And(terms) })
    }

    fn atom(&mut self) -> Result<Filter, AppError> {
        match self.next() {
            Some(Token::LParen) => {
                self.depth += 1;
                if self.depth > MAX_FILTER_DEPTH {
                    return Err(bad("nesting too deep"));
                }
                let inner = self.expr()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(bad("expected )")),
                }
            }
            Some(Token::Word(name)) | Some(Token::QuotedIdent(name)) => {
                let column = self.schema.column(&name)?.name.clone();
                self.condition(column)
            }
            other => Err(bad(format!("expected column, got {:?}", other))),
        }
    }

    fn condition(&mut self, column: String) -> Result<Filter, AppError> {
        if self.peek_keyword("is") {
            self.pos += 1;
            let negated = self.peek_keyword("not");
            if negated {
                self.pos += 1;
            }
            self.expect_keyword("null")?;
            return Ok(Filter::IsNull { column, negated });
        }
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("like") => Comparison::Like,
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("not") => {
                self.expect_keyword("like")?;
                Comparison::NotLike
            }
            other => return Err(bad(format!("expected operator after {}, got {:?}", column, other))),
        };
        let value = match self.next() {
            Some(Token::Quoted(v)) | Some(Token::Word(v)) => v,
            other => return Err(bad(format!("expected value, got {:?}", other))),
        };
        Ok(Filter::Compare { column, op, value })
    }
}

impl Filter {
    /// Parse `q` against the table's columns.
    pub fn parse(input: &str, schema: &TableSchema) -> Result<Filter, AppError> {
        if input.chars().count() > MAX_FILTER_LEN {
            return Err(bad("too long"));
        }
        let tokens = tokenize(&scrub(input))?;
        if tokens.is_empty() {
            return Err(bad("empty"));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
            schema,
        };
        let filter = parser.expr()?;
        if let Some(t) = parser.peek() {
            return Err(bad(format!("unexpected {:?}", t)));
        }
        Ok(filter)
    }

    fn is_compound(&self) -> bool {
        matches!(self, Filter::And(_) | Filter::Or(_))
    }

    fn render(&self, schema: &TableSchema, sql: &mut String, params: &mut Vec<BoundValue>) {
        match self {
            Filter::Compare { column, op, value } => {
                sql.push_str(&format!("{} {} ?", quote_ident(column), op.sql()));
                let bound = match (op, schema.column(column)) {
                    (Comparison::Like | Comparison::NotLike, _) | (_, Err(_)) => BoundValue::Text(value.clone()),
                    (_, Ok(c)) => typed_value(c, value),
                };
                params.push(bound);
            }
            Filter::IsNull { column, negated } => {
                sql.push_str(&format!(
                    "{} IS {}NULL",
                    quote_ident(column),
                    if *negated { "NOT " } else { "" }
                ));
            }
            Filter::And(terms) | Filter::Or(terms) => {
                let joiner = if matches!(self, Filter::And(_)) { " AND " } else { " OR " };
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(joiner);
                    }
                    if term.is_compound() {
                        sql.push('(');
                        term.render(schema, sql, params);
                        sql.push(')');
                    } else {
                        term.render(schema, sql, params);
                    }
                }
            }
        }
    }

    pub fn to_predicate(&self, schema: &TableSchema) -> Predicate {
        let mut sql = String::new();
        let mut params = Vec::new();
        self.render(schema, &mut sql, &mut params);
        Predicate::from_parts(sql, params, self.is_compound())
    }
}
