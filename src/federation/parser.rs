// SPDX-License-Identifier: Apache-2.0

//! Recursive-descent parser for federated SELECT statements.
//!
//! One production per clause, consuming tokens left to right with one token
//! of lookahead for keyword disambiguation (LEFT vs LEFT OUTER, FULL vs FULL
//! OUTER). WHERE clauses are deliberately not parsed into a predicate tree:
//! the raw token span is retained and forwarded to every source fetch, and
//! each database evaluates its own portion of the predicate locally.

use crate::engine::error::{EngineError, EngineResult};

use super::tokenizer::{tokenize, Token, TokenType};
use super::types::{
    AggregateFunction, JoinClause, JoinCondition, JoinType, OrderKey, ParsedQuery, SelectItem,
    SortDirection, TableRef,
};

/// Parses `sql` into a [`ParsedQuery`].
///
/// Bare table names (no `db.` qualifier) are attributed to
/// `default_database`; without one they are an error, since a federated
/// query cannot route an unqualified table.
pub fn parse(sql: &str, default_database: Option<&str>) -> EngineResult<ParsedQuery> {
    Parser::new(tokenize(sql), default_database).parse()
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    default_database: Option<&'a str>,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, default_database: Option<&'a str>) -> Self {
        Self { tokens, pos: 0, default_database }
    }

    fn parse(mut self) -> EngineResult<ParsedQuery> {
        if !self.take_keyword("SELECT") {
            return Err(self.error("statement must begin with SELECT"));
        }

        let select = self.parse_select_list()?;

        if !self.take_keyword("FROM") {
            return Err(self.error("missing FROM clause"));
        }
        let mut from = vec![self.parse_table_ref()?];
        while self.take_punctuation(",") {
            from.push(self.parse_table_ref()?);
        }

        let joins = self.parse_joins()?;
        let where_span = self.parse_where_span()?;
        let group_by = self.parse_group_by()?;
        let order_by = self.parse_order_by()?;
        let (limit, offset) = self.parse_limit_offset()?;

        self.take_punctuation(";");
        if let Some(token) = self.peek() {
            return Err(self.error(format!(
                "unexpected token '{}' after end of statement",
                token.value
            )));
        }

        Ok(ParsedQuery {
            select,
            from,
            joins,
            where_span,
            group_by,
            order_by,
            limit,
            offset,
        })
    }

    // --- Clause productions ---

    fn parse_select_list(&mut self) -> EngineResult<Vec<SelectItem>> {
        let mut items = vec![self.parse_select_item()?];
        while self.take_punctuation(",") {
            items.push(self.parse_select_item()?);
        }
        Ok(items)
    }

    fn parse_select_item(&mut self) -> EngineResult<SelectItem> {
        if self.take_punctuation("*") {
            return Ok(SelectItem { expression: "*".to_string(), aggregate: None, alias: None });
        }

        // Aggregate call: FUNC( expr ), one token of lookahead for the '('.
        let aggregate = match (self.peek(), self.peek_at(1)) {
            (Some(name), Some(paren))
                if name.token_type == TokenType::Identifier && paren.is_punctuation("(") =>
            {
                AggregateFunction::from_name(&name.value)
            }
            _ => None,
        };

        let expression = if aggregate.is_some() {
            self.bump(); // function name
            self.bump(); // '('
            let argument = if self.take_punctuation("*") {
                "*".to_string()
            } else {
                self.parse_column_ref("expected aggregate argument")?
            };
            if !self.take_punctuation(")") {
                return Err(self.error("expected ')' after aggregate argument"));
            }
            argument
        } else {
            self.parse_column_ref("expected column reference in select list")?
        };

        let alias = self.parse_alias()?;
        Ok(SelectItem { expression, aggregate, alias })
    }

    fn parse_table_ref(&mut self) -> EngineResult<TableRef> {
        let first = self.expect_identifier("expected table name")?;

        let (database, table) = if self.peek_is_dotted_identifier() {
            self.bump(); // '.'
            let table = self.expect_identifier("expected table name after '.'")?;
            (first, table)
        } else {
            match self.default_database {
                Some(database) => (database.to_string(), first),
                None => {
                    return Err(EngineError::federation(format!(
                        "table '{first}' has no database qualifier and no default database is configured"
                    )));
                }
            }
        };

        let alias = self.parse_alias()?;
        Ok(TableRef { database, table, alias })
    }

    fn parse_joins(&mut self) -> EngineResult<Vec<JoinClause>> {
        let mut joins = Vec::new();
        loop {
            let join_type = if self.take_keyword("JOIN") {
                JoinType::Inner
            } else if self.take_keyword("INNER") {
                self.expect_keyword("JOIN")?;
                JoinType::Inner
            } else if self.take_keyword("LEFT") {
                self.take_keyword("OUTER");
                self.expect_keyword("JOIN")?;
                JoinType::Left
            } else if self.take_keyword("RIGHT") {
                self.take_keyword("OUTER");
                self.expect_keyword("JOIN")?;
                JoinType::Right
            } else if self.take_keyword("FULL") {
                self.take_keyword("OUTER");
                self.expect_keyword("JOIN")?;
                JoinType::Full
            } else {
                break;
            };

            let table = self.parse_table_ref()?;
            if !self.take_keyword("ON") {
                return Err(self.error(format!(
                    "JOIN on '{}' is missing its ON clause",
                    table.qualified()
                )));
            }
            let on = self.parse_join_condition()?;

            joins.push(JoinClause { table, join_type, on });
        }
        Ok(joins)
    }

    fn parse_join_condition(&mut self) -> EngineResult<JoinCondition> {
        let (left_table, left_column) = self.parse_qualified_column()?;

        let is_equals = self
            .peek()
            .map(|t| t.token_type == TokenType::Operator && t.value == "=")
            .unwrap_or(false);
        if !is_equals {
            return Err(self.error("join condition requires '=' between its two columns"));
        }
        self.bump();

        let (right_table, right_column) = self.parse_qualified_column()?;
        Ok(JoinCondition { left_table, left_column, right_table, right_column })
    }

    /// A join side must bind exactly one column, written `table.column`.
    fn parse_qualified_column(&mut self) -> EngineResult<(String, String)> {
        let table = self.expect_identifier("join condition must reference table.column")?;
        if !self.peek_is("." ) {
            return Err(self.error(
                "join condition must bind exactly one column on each side as table.column",
            ));
        }
        self.bump();
        let column = self.expect_identifier("expected column name after '.' in join condition")?;
        Ok((table, column))
    }

    fn parse_where_span(&mut self) -> EngineResult<Vec<Token>> {
        if !self.take_keyword("WHERE") {
            return Ok(Vec::new());
        }

        let mut span = Vec::new();
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            if depth == 0
                && (token.is_keyword("GROUP")
                    || token.is_keyword("ORDER")
                    || token.is_keyword("LIMIT")
                    || token.is_keyword("OFFSET"))
            {
                break;
            }
            if token.is_punctuation(";") {
                break;
            }
            if token.is_punctuation("(") {
                depth += 1;
            } else if token.is_punctuation(")") {
                depth = depth.saturating_sub(1);
            }
            span.push(token.clone());
            self.bump();
        }

        if span.is_empty() {
            return Err(self.error("WHERE clause has no predicate"));
        }
        Ok(span)
    }

    fn parse_group_by(&mut self) -> EngineResult<Vec<String>> {
        if !self.take_keyword("GROUP") {
            return Ok(Vec::new());
        }
        self.expect_keyword("BY")?;

        let mut columns = vec![self.parse_bare_column("GROUP BY references no column")?];
        while self.take_punctuation(",") {
            columns.push(self.parse_bare_column("expected column after ',' in GROUP BY")?);
        }
        Ok(columns)
    }

    fn parse_order_by(&mut self) -> EngineResult<Vec<OrderKey>> {
        if !self.take_keyword("ORDER") {
            return Ok(Vec::new());
        }
        self.expect_keyword("BY")?;

        let mut keys = vec![self.parse_order_key("ORDER BY references no column")?];
        while self.take_punctuation(",") {
            keys.push(self.parse_order_key("expected column after ',' in ORDER BY")?);
        }
        Ok(keys)
    }

    fn parse_order_key(&mut self, message: &str) -> EngineResult<OrderKey> {
        let column = self.parse_bare_column(message)?;
        let direction = if self.take_keyword("DESC") {
            SortDirection::Desc
        } else {
            self.take_keyword("ASC");
            SortDirection::Asc
        };
        Ok(OrderKey { column, direction })
    }

    fn parse_limit_offset(&mut self) -> EngineResult<(Option<u64>, Option<u64>)> {
        let mut limit = None;
        let mut offset = None;
        loop {
            if self.take_keyword("LIMIT") {
                limit = Some(self.expect_non_negative_integer("LIMIT")?);
            } else if self.take_keyword("OFFSET") {
                offset = Some(self.expect_non_negative_integer("OFFSET")?);
            } else {
                break;
            }
        }
        Ok((limit, offset))
    }

    // --- Shared pieces ---

    /// `ident(.ident)*` joined back with dots (`u.id` stays one reference).
    fn parse_column_ref(&mut self, message: &str) -> EngineResult<String> {
        let mut parts = vec![self.expect_identifier(message)?];
        while self.peek_is_dotted_identifier() {
            self.bump();
            parts.push(self.expect_identifier("expected identifier after '.'")?);
        }
        Ok(parts.join("."))
    }

    /// Column reference with any `table.` qualifier stripped; rows carry
    /// bare column names by the time GROUP BY and ORDER BY run.
    fn parse_bare_column(&mut self, message: &str) -> EngineResult<String> {
        let reference = self.parse_column_ref(message)?;
        Ok(reference
            .rsplit('.')
            .next()
            .unwrap_or(reference.as_str())
            .to_string())
    }

    fn parse_alias(&mut self) -> EngineResult<Option<String>> {
        if self.take_keyword("AS") {
            return Ok(Some(self.expect_identifier("expected alias after AS")?));
        }
        match self.peek() {
            Some(token) if token.token_type == TokenType::Identifier => {
                let alias = token.value.clone();
                self.bump();
                Ok(Some(alias))
            }
            _ => Ok(None),
        }
    }

    // --- Token plumbing ---

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn peek_is(&self, punctuation: &str) -> bool {
        self.peek().map(|t| t.is_punctuation(punctuation)).unwrap_or(false)
    }

    fn peek_is_dotted_identifier(&self) -> bool {
        self.peek_is(".")
            && self
                .peek_at(1)
                .map(|t| t.token_type == TokenType::Identifier)
                .unwrap_or(false)
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn take_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().map(|t| t.is_keyword(keyword)).unwrap_or(false) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> EngineResult<()> {
        if self.take_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("expected {keyword}")))
        }
    }

    fn take_punctuation(&mut self, punctuation: &str) -> bool {
        if self.peek_is(punctuation) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_identifier(&mut self, message: &str) -> EngineResult<String> {
        match self.peek() {
            Some(token) if token.token_type == TokenType::Identifier => {
                let value = token.value.clone();
                self.bump();
                Ok(value)
            }
            _ => Err(self.error(message)),
        }
    }

    fn expect_non_negative_integer(&mut self, clause: &str) -> EngineResult<u64> {
        let parsed = match self.peek() {
            Some(token) if token.token_type == TokenType::Literal => {
                token.value.parse::<u64>().ok()
            }
            _ => None,
        };
        match parsed {
            Some(value) => {
                self.bump();
                Ok(value)
            }
            None => Err(self.error(format!("{clause} value must be a non-negative integer"))),
        }
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        let message = message.into();
        match self.peek() {
            Some(token) => EngineError::syntax(format!(
                "{message} (at '{}', token {})",
                token.value,
                self.pos + 1
            )),
            None => EngineError::syntax(format!("{message} (at end of statement)")),
        }
    }
}
