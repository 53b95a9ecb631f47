//! Statements and statement batches
//!
//! A `Statement` is immutable once built. Its `StatementKind` decides whether
//! the retry layer may re-send it after a connection loss, so the kind is
//! either inferred from the leading keyword or forced by the caller.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static READ_SQL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\A\s*(?:SELECT|SHOW|SET|DESCRIBE|DESC|EXPLAIN|USE|BEGIN|START\s+TRANSACTION|ROLLBACK)\b",
    )
    .expect("read statement pattern is valid")
});

static BEGIN_SQL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\A\s*(?:BEGIN(?:\s+WORK)?|START\s+TRANSACTION)\s*;?\s*\z")
        .expect("begin pattern is valid")
});

static COMMIT_SQL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\A\s*COMMIT(?:\s+WORK)?\s*;?\s*\z").expect("commit pattern is valid")
});

static ROLLBACK_SQL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\A\s*ROLLBACK(?:\s+WORK)?\s*;?\s*\z").expect("rollback pattern is valid")
});

/// Whether a statement only reads or may have side effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Read,
    Write,
}

impl StatementKind {
    /// Infer the kind from the statement text.
    ///
    /// Anything that does not start with a known read-only keyword is a write,
    /// `COMMIT` included.
    pub fn infer(sql: &str) -> Self {
        if READ_SQL.is_match(sql) {
            StatementKind::Read
        } else {
            StatementKind::Write
        }
    }
}

/// A single SQL statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    text: String,
    label: Option<String>,
    kind: StatementKind,
}

impl Statement {
    /// Create a statement, inferring its kind from the SQL text.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let kind = StatementKind::infer(&text);
        Self {
            text,
            label: None,
            kind,
        }
    }

    /// Create a statement that is known to be read-only.
    pub fn read(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: None,
            kind: StatementKind::Read,
        }
    }

    /// Create a statement that is known to have side effects.
    pub fn write(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: None,
            kind: StatementKind::Write,
        }
    }

    /// Attach a label (shown in logs, e.g. "Employee Create").
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn is_write(&self) -> bool {
        self.kind == StatementKind::Write
    }

    /// `BEGIN`, `BEGIN WORK` or `START TRANSACTION`
    pub fn is_begin(&self) -> bool {
        BEGIN_SQL.is_match(&self.text)
    }

    pub fn is_commit(&self) -> bool {
        COMMIT_SQL.is_match(&self.text)
    }

    /// A full `ROLLBACK`; `ROLLBACK TO SAVEPOINT` does not end the transaction.
    pub fn is_rollback(&self) -> bool {
        ROLLBACK_SQL.is_match(&self.text)
    }
}

impl From<&str> for Statement {
    fn from(text: &str) -> Self {
        Statement::new(text)
    }
}

impl From<String> for Statement {
    fn from(text: String) -> Self {
        Statement::new(text)
    }
}

impl From<&Statement> for Statement {
    fn from(statement: &Statement) -> Self {
        statement.clone()
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} ({})", self.text, label),
            None => write!(f, "{}", self.text),
        }
    }
}

/// An ordered sequence of statements executed as one logical unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementBatch {
    statements: Vec<Statement>,
}

impl StatementBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement, keeping issue order.
    pub fn push(&mut self, statement: impl Into<Statement>) {
        self.statements.push(statement.into());
    }

    pub fn with(mut self, statement: impl Into<Statement>) -> Self {
        self.push(statement);
        self
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Statement> {
        self.statements.iter()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// True when any statement may have side effects.
    pub fn has_writes(&self) -> bool {
        self.statements.iter().any(Statement::is_write)
    }

    pub fn contains_commit(&self) -> bool {
        self.statements.iter().any(Statement::is_commit)
    }

    /// Concatenate `other` after `self`.
    pub fn chain(mut self, other: &StatementBatch) -> Self {
        self.statements.extend(other.statements.iter().cloned());
        self
    }
}

impl From<Statement> for StatementBatch {
    fn from(statement: Statement) -> Self {
        Self {
            statements: vec![statement],
        }
    }
}

impl From<Vec<Statement>> for StatementBatch {
    fn from(statements: Vec<Statement>) -> Self {
        Self { statements }
    }
}

impl FromIterator<Statement> for StatementBatch {
    fn from_iter<I: IntoIterator<Item = Statement>>(iter: I) -> Self {
        Self {
            statements: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a StatementBatch {
    type Item = &'a Statement;
    type IntoIter = std::slice::Iter<'a, Statement>;

    fn into_iter(self) -> Self::IntoIter {
        self.statements.iter()
    }
}
