//! Result values the retry layer hands back unchanged

/// A single column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int64(i64),
    Text(String),
}

impl Value {
    /// Integer view of the value; numeric text is parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }
}

/// Rows returned by a query, with their column names
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// One row, one column (`SELECT COUNT(*)` and the like)
    pub fn scalar(column: impl Into<String>, value: Value) -> Self {
        Self {
            columns: vec![column.into()],
            rows: vec![vec![value]],
        }
    }

    pub fn first_value(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// Outcome of one statement
#[derive(Debug, Clone, PartialEq)]
pub struct StatementResult {
    /// Present when the statement returned rows
    pub result: Option<QueryResult>,
    pub affected_rows: u64,
    pub last_insert_id: Option<u64>,
}

impl StatementResult {
    pub fn query(result: QueryResult) -> Self {
        Self {
            result: Some(result),
            affected_rows: 0,
            last_insert_id: None,
        }
    }

    pub fn command(affected_rows: u64, last_insert_id: Option<u64>) -> Self {
        Self {
            result: None,
            affected_rows,
            last_insert_id,
        }
    }

    /// Result of BEGIN, SET and other statements with no output
    pub fn empty() -> Self {
        Self::command(0, None)
    }

    pub fn is_query(&self) -> bool {
        self.result.is_some()
    }

    pub fn scalar(&self) -> Option<&Value> {
        self.result.as_ref().and_then(QueryResult::first_value)
    }
}
