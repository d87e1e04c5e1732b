/// Minimal CQL for the test node
///
/// Understands `USE`, `SELECT` (columns, `*` or `COUNT(*)`, an optional
/// `WHERE KEY = ...` and `LIMIT`), `INSERT`, `DELETE` and `TRUNCATE`.
/// Statements may contain `?` markers which are bound by prepared
/// execution.
use crate::store::Store;
use cassaforte_proto::{
    Column, ColumnParent, ColumnPath, CqlMetadata, CqlResult, CqlResultType,
};
use std::time::{SystemTime, UNIX_EPOCH};
use tonic::Status;

const DEFAULT_LIMIT: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(String),
    Literal(Vec<u8>),
    Symbol(char),
    Marker,
}

/// Split a query into tokens
pub fn tokenize(query: &[u8]) -> Result<Vec<Token>, Status> {
    let query = std::str::from_utf8(query)
        .map_err(|_| Status::invalid_argument("Query is not valid UTF-8"))?;

    let mut tokens = Vec::new();
    let mut chars = query.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = c.to_string();
                while let Some((_, next)) = chars.next_if(|(_, n)| n.is_ascii_alphanumeric() || *n == '_') {
                    word.push(next);
                }
                tokens.push(Token::Word(word));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut number = c.to_string();
                while let Some((_, next)) = chars.next_if(|(_, n)| n.is_ascii_digit() || *n == '.') {
                    number.push(next);
                }
                if number == "-" {
                    return Err(unexpected(pos, c));
                }
                tokens.push(Token::Literal(number.into_bytes()));
            }
            '\'' | '"' => {
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, q)) if q == c => {
                            // A doubled quote stands for itself
                            if chars.next_if(|(_, n)| *n == c).is_some() {
                                text.push(c);
                            } else {
                                break;
                            }
                        }
                        Some((_, other)) => text.push(other),
                        None => {
                            return Err(Status::invalid_argument(format!(
                                "line 1:{} unterminated quoted text",
                                pos
                            )))
                        }
                    }
                }
                tokens.push(if c == '"' {
                    Token::Word(text)
                } else {
                    Token::Literal(text.into_bytes())
                });
            }
            '?' => tokens.push(Token::Marker),
            '(' | ')' | ',' | '=' | '*' | ';' => tokens.push(Token::Symbol(c)),
            other => return Err(unexpected(pos, other)),
        }
    }

    if tokens.is_empty() {
        return Err(Status::invalid_argument("Empty query"));
    }
    Ok(tokens)
}

fn unexpected(pos: usize, c: char) -> Status {
    Status::invalid_argument(format!("line 1:{} unexpected character '{}'", pos, c))
}

/// Number of bind markers in a statement
pub fn markers(tokens: &[Token]) -> usize {
    tokens.iter().filter(|t| **t == Token::Marker).count()
}

/// Replace bind markers with values, in order
pub fn bind(tokens: &[Token], values: Vec<Vec<u8>>) -> Result<Vec<Token>, Status> {
    let expected = markers(tokens);
    if values.len() != expected {
        return Err(Status::invalid_argument(format!(
            "Expected {} bound values, got {}",
            expected,
            values.len()
        )));
    }

    let mut values = values.into_iter();
    Ok(tokens
        .iter()
        .map(|token| match token {
            Token::Marker => values.next().map(Token::Literal).unwrap_or(Token::Marker),
            other => other.clone(),
        })
        .collect())
}

/// Session state a statement can read or change
pub struct Session<'a> {
    pub store: &'a mut Store,
    pub keyspace: &'a mut Option<String>,
}

impl Session<'_> {
    fn keyspace(&self) -> Result<String, Status> {
        self.keyspace
            .clone()
            .ok_or_else(|| Status::invalid_argument("You have not set a keyspace for this session"))
    }
}

/// Run one statement
pub fn execute(session: Session<'_>, tokens: Vec<Token>) -> Result<CqlResult, Status> {
    let mut parser = Parser { tokens, pos: 0 };

    let verb = parser.identifier()?.to_ascii_uppercase();
    match verb.as_str() {
        "USE" => {
            let keyspace = parser.identifier()?;
            parser.end()?;
            if session.store.keyspace(&keyspace).is_none() {
                return Err(Status::invalid_argument(format!(
                    "Keyspace '{}' does not exist",
                    keyspace
                )));
            }
            *session.keyspace = Some(keyspace);
            Ok(CqlResult::void())
        }
        "SELECT" => select(session, &mut parser),
        "INSERT" => insert(session, &mut parser),
        "DELETE" => delete(session, &mut parser),
        "TRUNCATE" => {
            let column_family = parser.identifier()?;
            parser.end()?;
            let keyspace = session.keyspace()?;
            session.store.truncate(&keyspace, &column_family)?;
            Ok(CqlResult::void())
        }
        _ => Err(Status::invalid_argument(format!(
            "line 1:0 no viable alternative at input '{}'",
            verb
        ))),
    }
}

fn select(session: Session<'_>, parser: &mut Parser) -> Result<CqlResult, Status> {
    let mut columns = Vec::new();
    let count = if parser.keyword("COUNT") {
        parser.symbol('(')?;
        parser.symbol('*')?;
        parser.symbol(')')?;
        true
    } else {
        if !parser.next_symbol('*') {
            loop {
                columns.push(parser.identifier()?.into_bytes());
                if !parser.next_symbol(',') {
                    break;
                }
            }
        }
        false
    };

    parser.expect_keyword("FROM")?;
    let column_family = parser.identifier()?;
    let key = parser.where_key()?;
    let limit = if parser.keyword("LIMIT") {
        let literal = parser.literal()?;
        std::str::from_utf8(&literal)
            .ok()
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| Status::invalid_argument("LIMIT must be a non-negative integer"))?
    } else {
        DEFAULT_LIMIT
    };
    parser.end()?;

    let keyspace = session.keyspace()?;
    if count {
        let num = match &key {
            Some(key) => session.store.select(&keyspace, &column_family, Some(key.as_slice()), 1)?.len(),
            None => session.store.row_count(&keyspace, &column_family)?.min(limit),
        };
        return Ok(CqlResult {
            result_type: CqlResultType::Int as i32,
            num: num as i32,
            ..Default::default()
        });
    }

    let cf_def = session.store.cf_def(&keyspace, &column_family)?;
    let schema = CqlMetadata {
        default_name_type: cf_def.comparator_type.clone(),
        default_value_type: if cf_def.default_validation_class.is_empty() {
            "BytesType".to_string()
        } else {
            cf_def.default_validation_class.clone()
        },
        ..Default::default()
    };

    let mut rows = session
        .store
        .select(&keyspace, &column_family, key.as_deref(), limit)?;
    if !columns.is_empty() {
        for row in &mut rows {
            row.columns.retain(|c| columns.contains(&c.name));
        }
    }

    Ok(CqlResult {
        result_type: CqlResultType::Rows as i32,
        rows,
        num: 0,
        schema: Some(schema),
    })
}

fn insert(session: Session<'_>, parser: &mut Parser) -> Result<CqlResult, Status> {
    parser.expect_keyword("INTO")?;
    let column_family = parser.identifier()?;

    parser.symbol('(')?;
    let mut names = Vec::new();
    loop {
        names.push(parser.identifier()?);
        if !parser.next_symbol(',') {
            break;
        }
    }
    parser.symbol(')')?;

    parser.expect_keyword("VALUES")?;
    parser.symbol('(')?;
    let mut values = Vec::new();
    loop {
        values.push(parser.literal()?);
        if !parser.next_symbol(',') {
            break;
        }
    }
    parser.symbol(')')?;

    let timestamp = if parser.keyword("USING") {
        parser.expect_keyword("TIMESTAMP")?;
        let literal = parser.literal()?;
        std::str::from_utf8(&literal)
            .ok()
            .and_then(|n| n.parse::<i64>().ok())
            .ok_or_else(|| Status::invalid_argument("TIMESTAMP must be an integer"))?
    } else {
        now_micros()
    };
    parser.end()?;

    if names.len() != values.len() {
        return Err(Status::invalid_argument(
            "unmatched column names/values",
        ));
    }
    if !names[0].eq_ignore_ascii_case("KEY") {
        return Err(Status::invalid_argument("The first column must be KEY"));
    }

    let keyspace = session.keyspace()?;
    let parent = ColumnParent::new(column_family);
    let mut values = values.into_iter();
    let key = values.next().unwrap_or_default();
    for (name, value) in names.iter().skip(1).zip(values) {
        session
            .store
            .insert(&keyspace, &key, &parent, Column::new(name.as_bytes(), &value, timestamp))?;
    }
    Ok(CqlResult::void())
}

fn delete(session: Session<'_>, parser: &mut Parser) -> Result<CqlResult, Status> {
    parser.expect_keyword("FROM")?;
    let column_family = parser.identifier()?;
    let key = parser
        .where_key()?
        .ok_or_else(|| Status::invalid_argument("DELETE requires a WHERE KEY clause"))?;
    parser.end()?;

    let keyspace = session.keyspace()?;
    session
        .store
        .remove(&keyspace, &key, &ColumnPath::row(column_family), now_micros())?;
    Ok(CqlResult::void())
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or_default()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn error(&self, expected: &str) -> Status {
        let found = match self.peek() {
            Some(Token::Word(w)) => w.clone(),
            Some(Token::Literal(l)) => String::from_utf8_lossy(l).into_owned(),
            Some(Token::Symbol(c)) => c.to_string(),
            Some(Token::Marker) => "?".to_string(),
            None => "<EOF>".to_string(),
        };
        Status::invalid_argument(format!("line 1:{} expected {}, found '{}'", self.pos, expected, found))
    }

    fn identifier(&mut self) -> Result<String, Status> {
        match self.peek() {
            Some(Token::Word(word)) => {
                let word = word.clone();
                self.pos += 1;
                Ok(word)
            }
            _ => Err(self.error("identifier")),
        }
    }

    fn literal(&mut self) -> Result<Vec<u8>, Status> {
        match self.peek() {
            Some(Token::Literal(value)) => {
                let value = value.clone();
                self.pos += 1;
                Ok(value)
            }
            Some(Token::Marker) => Err(Status::invalid_argument(
                "Bind markers are only allowed in prepared statements",
            )),
            _ => Err(self.error("value")),
        }
    }

    /// Consume `kw` if it is next
    fn keyword(&mut self, kw: &str) -> bool {
        match self.peek() {
            Some(Token::Word(word)) if word.eq_ignore_ascii_case(kw) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), Status> {
        if self.keyword(kw) {
            Ok(())
        } else {
            Err(self.error(kw))
        }
    }

    fn next_symbol(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Symbol(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn symbol(&mut self, c: char) -> Result<(), Status> {
        if self.next_symbol(c) {
            Ok(())
        } else {
            Err(self.error(&format!("'{}'", c)))
        }
    }

    fn where_key(&mut self) -> Result<Option<Vec<u8>>, Status> {
        if !self.keyword("WHERE") {
            return Ok(None);
        }
        self.expect_keyword("KEY")?;
        self.symbol('=')?;
        self.literal().map(Some)
    }

    fn end(&mut self) -> Result<(), Status> {
        self.next_symbol(';');
        if self.peek().is_some() {
            return Err(self.error("end of statement"));
        }
        Ok(())
    }
}
