//! View query parsing collaborator.
//!
//! The catalog only needs to know which class a view reads from and which
//! fields its filter touches. [`SimpleQueryParser`] understands
//! `SELECT [projections] FROM <Class> [WHERE <condition>] [ORDER BY ...]
//! [SKIP n] [LIMIT n]`.

use crate::error::{CatalogError, Result};

/// What the catalog learns from a view query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedQuery {
    /// Class the query reads from.
    pub target: String,
    /// Projection names, empty for all fields.
    pub projections: Vec<String>,
    /// Fields referenced by the filter, in order of first appearance.
    pub filter_fields: Vec<String>,
}

/// Parses view queries.
pub trait QueryParser: Send + Sync {
    fn parse(&self, query: &str) -> Result<ParsedQuery>;
}

/// Recursive-descent parser for simple select statements.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleQueryParser;

impl QueryParser for SimpleQueryParser {
    fn parse(&self, query: &str) -> Result<ParsedQuery> {
        let tokens = tokenize(query).map_err(|reason| invalid(query, reason))?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            parsed: ParsedQuery::default(),
        };
        parser
            .statement()
            .map_err(|reason| invalid(query, reason))?;
        Ok(parser.parsed)
    }
}

fn invalid(query: &str, reason: String) -> CatalogError {
    CatalogError::ViewQueryInvalid {
        query: query.to_string(),
        reason,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str(String),
    Param(String),
    Symbol(&'static str),
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(keyword))
    }
}

const SYMBOLS: [&str; 13] = [
    "<=", ">=", "!=", "<>", "=", "<", ">", "(", ")", ",", "*", ".", "-",
];

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_alphabetic() || c == '_' || c == '@' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '@') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if c == '`' {
            let end = chars[i + 1..]
                .iter()
                .position(|&ch| ch == '`')
                .ok_or_else(|| "unterminated quoted identifier".to_string())?;
            tokens.push(Token::Ident(chars[i + 1..i + 1 + end].iter().collect()));
            i += end + 2;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
        } else if c == '\'' || c == '"' {
            let end = chars[i + 1..]
                .iter()
                .position(|&ch| ch == c)
                .ok_or_else(|| "unterminated string literal".to_string())?;
            tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
            i += end + 2;
        } else if c == '?' {
            tokens.push(Token::Param("?".to_string()));
            i += 1;
        } else if c == ':' {
            let start = i + 1;
            i = start;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            if i == start {
                return Err("expected parameter name after ':'".to_string());
            }
            tokens.push(Token::Param(chars[start..i].iter().collect()));
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let symbol = SYMBOLS
                .iter()
                .find(|s| rest.starts_with(**s))
                .ok_or_else(|| format!("unexpected character '{}'", c))?;
            tokens.push(Token::Symbol(*symbol));
            i += symbol.len();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    parsed: ParsedQuery,
}

type ParseResult<T> = std::result::Result<T, String>;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(format!("expected {} at {}", keyword.to_uppercase(), self.describe()))
        }
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if matches!(self.peek(), Some(Token::Symbol(s)) if *s == symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn describe(&self) -> String {
        match self.peek() {
            Some(Token::Ident(s)) | Some(Token::Number(s)) => format!("'{}'", s),
            Some(Token::Str(s)) => format!("string '{}'", s),
            Some(Token::Param(s)) => format!("parameter '{}'", s),
            Some(Token::Symbol(s)) => format!("'{}'", s),
            None => "end of query".to_string(),
        }
    }

    fn statement(&mut self) -> ParseResult<()> {
        self.expect_keyword("select")?;
        if !self.at_keyword("from") {
            self.projections()?;
        }
        self.expect_keyword("from")?;
        match self.next() {
            Some(Token::Ident(target)) if !is_reserved(&target) => self.parsed.target = target,
            _ => {
                self.pos -= 1;
                return Err(format!("expected target class at {}", self.describe()));
            }
        }
        if self.eat_keyword("where") {
            self.or_condition()?;
        }
        if self.eat_keyword("order") {
            self.expect_keyword("by")?;
            loop {
                self.path()?;
                let _ = self.eat_keyword("asc") || self.eat_keyword("desc");
                if !self.eat_symbol(",") {
                    break;
                }
            }
        }
        if self.eat_keyword("skip") {
            self.integer()?;
        }
        if self.eat_keyword("limit") {
            self.integer()?;
        }
        if self.peek().is_some() {
            return Err(format!("unexpected {}", self.describe()));
        }
        Ok(())
    }

    fn projections(&mut self) -> ParseResult<()> {
        loop {
            if self.eat_symbol("*") {
                self.parsed.projections.push("*".to_string());
            } else {
                let mut name = self.path()?;
                if self.eat_symbol("(") {
                    let mut depth = 1;
                    while depth > 0 {
                        match self.next() {
                            Some(Token::Symbol("(")) => depth += 1,
                            Some(Token::Symbol(")")) => depth -= 1,
                            Some(_) => {}
                            None => return Err("unbalanced parentheses in projection".to_string()),
                        }
                    }
                    name.push_str("()");
                }
                if self.eat_keyword("as") {
                    name = self.identifier()?;
                }
                self.parsed.projections.push(name);
            }
            if !self.eat_symbol(",") {
                break;
            }
        }
        Ok(())
    }

    fn identifier(&mut self) -> ParseResult<String> {
        match self.next() {
            Some(Token::Ident(name)) if !is_reserved(&name) => Ok(name),
            _ => {
                self.pos -= 1;
                Err(format!("expected identifier at {}", self.describe()))
            }
        }
    }

    fn path(&mut self) -> ParseResult<String> {
        let mut path = self.identifier()?;
        while self.eat_symbol(".") {
            path.push('.');
            path.push_str(&self.identifier()?);
        }
        Ok(path)
    }

    fn integer(&mut self) -> ParseResult<()> {
        match self.next() {
            Some(Token::Number(n)) if n.parse::<u64>().is_ok() => Ok(()),
            Some(Token::Param(_)) => Ok(()),
            _ => {
                self.pos -= 1;
                Err(format!("expected integer at {}", self.describe()))
            }
        }
    }

    fn or_condition(&mut self) -> ParseResult<()> {
        self.and_condition()?;
        while self.eat_keyword("or") {
            self.and_condition()?;
        }
        Ok(())
    }

    fn and_condition(&mut self) -> ParseResult<()> {
        self.not_condition()?;
        while self.eat_keyword("and") {
            self.not_condition()?;
        }
        Ok(())
    }

    fn not_condition(&mut self) -> ParseResult<()> {
        if self.eat_keyword("not") {
            return self.not_condition();
        }
        if self.eat_symbol("(") {
            self.or_condition()?;
            if !self.eat_symbol(")") {
                return Err(format!("expected ')' at {}", self.describe()));
            }
            return Ok(());
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult<()> {
        let field = self.path()?;
        let root = field.split('.').next().unwrap_or(&field).to_string();
        if !self.parsed.filter_fields.contains(&root) {
            self.parsed.filter_fields.push(root);
        }

        if self.eat_keyword("is") {
            let _ = self.eat_keyword("not");
            return self.expect_keyword("null");
        }
        if self.eat_keyword("between") {
            self.value()?;
            self.expect_keyword("and")?;
            return self.value();
        }
        if self.eat_keyword("in") {
            if !self.eat_symbol("(") {
                return self.value();
            }
            loop {
                self.value()?;
                if !self.eat_symbol(",") {
                    break;
                }
            }
            if !self.eat_symbol(")") {
                return Err(format!("expected ')' at {}", self.describe()));
            }
            return Ok(());
        }
        let is_operator = matches!(
            self.peek(),
            Some(Token::Symbol("=" | "!=" | "<>" | "<" | "<=" | ">" | ">="))
        ) || self.at_keyword("like")
            || self.at_keyword("contains")
            || self.at_keyword("containskey")
            || self.at_keyword("containsvalue");
        if !is_operator {
            return Err(format!("expected comparison operator at {}", self.describe()));
        }
        self.pos += 1;
        self.value()
    }

    fn value(&mut self) -> ParseResult<()> {
        let negative = self.eat_symbol("-");
        match self.peek() {
            Some(Token::Number(_)) => {
                self.pos += 1;
                Ok(())
            }
            Some(Token::Str(_)) | Some(Token::Param(_)) if !negative => {
                self.pos += 1;
                Ok(())
            }
            Some(Token::Ident(word))
                if !negative
                    && ["true", "false", "null"]
                        .iter()
                        .any(|k| word.eq_ignore_ascii_case(k)) =>
            {
                self.pos += 1;
                Ok(())
            }
            Some(Token::Ident(_)) if !negative => self.path().map(|_| ()),
            _ => Err(format!("expected value at {}", self.describe())),
        }
    }
}

fn is_reserved(word: &str) -> bool {
    [
        "select", "from", "where", "and", "or", "not", "order", "by", "skip", "limit", "is",
        "null", "in", "between", "like", "contains", "as",
    ]
    .iter()
    .any(|k| word.eq_ignore_ascii_case(k))
}
