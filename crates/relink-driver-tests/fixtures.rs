//! Simulated database server and session fixtures.
//!
//! The scenario suites never talk to a real server. `SimulatedServer` plays
//! the part of a MySQL instance that can be restarted, stopped, switched to
//! read-only, or told to drop the next statement, and `SimulatedConnection`
//! is the driver `Connection` the sessions under test wrap.
//!
//! # Usage
//!
//! ```rust,ignore
//! use relink_driver_tests::fixtures::{server, session_for};
//! use rstest::rstest;
//!
//! #[rstest]
//! #[tokio::test(start_paused = true)]
//! async fn test_count_survives_restart(server: SimulatedServer) {
//!     let session = session_for(&server, fast_config());
//!     server.restart();
//!     session.execute("SELECT COUNT(*) FROM employees").await.unwrap();
//! }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use relink_connection::{
    BackoffSchedule, ReconnectConfig, RelinkConfig, RetryPolicyConfig, Session, SessionBuilder,
};
use relink_core::{
    Connection, QueryResult, RelinkError, Result, Statement, StatementResult, Value,
};
use rstest::fixture;

static INIT_LOGGING: Once = Once::new();

/// Install a test-friendly `tracing` subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to warnings only.
pub fn initialize_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Failure to inject into the next statement that reaches the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Socket already gone; the statement is not executed
    GoneAway,
    /// Socket dies mid-statement; the statement is not executed
    LostDuringQuery,
    /// The statement is executed, then the socket dies before the reply
    AppliedThenLost,
}

#[derive(Debug, Clone)]
enum Op {
    Insert(String),
    DeleteAll,
}

#[derive(Debug)]
struct ServerState {
    running: bool,
    /// Bumped whenever the server drops every connection
    epoch: u64,
    read_only: bool,
    employees: Vec<String>,
    faults: VecDeque<Fault>,
    /// Statements the server actually executed, in order
    applied: Vec<String>,
    connects: u32,
}

/// An in-memory stand-in for a MySQL server
#[derive(Debug, Clone)]
pub struct SimulatedServer {
    state: Arc<Mutex<ServerState>>,
}

impl Default for SimulatedServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedServer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                running: true,
                epoch: 0,
                read_only: false,
                employees: Vec::new(),
                faults: VecDeque::new(),
                applied: Vec::new(),
                connects: 0,
            })),
        }
    }

    /// Open a new connection to the server.
    pub fn connect(&self) -> SimulatedConnection {
        let mut state = self.state.lock();
        state.connects += 1;
        SimulatedConnection {
            server: self.clone(),
            link: Mutex::new(Link {
                epoch: state.running.then_some(state.epoch),
                pending: None,
                closed: false,
            }),
        }
    }

    /// Drop every connection; the server comes straight back up.
    pub fn restart(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        tracing::info!(epoch = state.epoch, "simulated server restarted");
    }

    /// Drop every connection and refuse new ones until `start`.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.epoch += 1;
        tracing::info!(epoch = state.epoch, "simulated server stopped");
    }

    pub fn start(&self) {
        self.state.lock().running = true;
        tracing::info!("simulated server started");
    }

    /// Stop now and start again after `downtime` (on the tokio clock).
    pub fn stop_for(&self, downtime: Duration) -> tokio::task::JoinHandle<()> {
        self.stop();
        let server = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(downtime).await;
            server.start();
        })
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.state.lock().read_only = read_only;
    }

    /// Queue a fault for the next statement executed on any live connection.
    pub fn inject(&self, fault: Fault) {
        self.state.lock().faults.push_back(fault);
    }

    /// Committed rows of the `employees` table
    pub fn employees(&self) -> Vec<String> {
        self.state.lock().employees.clone()
    }

    pub fn employee_count(&self) -> usize {
        self.state.lock().employees.len()
    }

    /// Statements the server executed, in order
    pub fn applied(&self) -> Vec<String> {
        self.state.lock().applied.clone()
    }

    /// How often `statement` was executed
    pub fn applied_count(&self, statement: &str) -> usize {
        self.state
            .lock()
            .applied
            .iter()
            .filter(|applied| applied.as_str() == statement)
            .count()
    }

    /// Connections opened and reconnects accepted
    pub fn connects(&self) -> u32 {
        self.state.lock().connects
    }
}

#[derive(Debug)]
struct Link {
    /// Server epoch the socket belongs to; `None` once it is known dead
    epoch: Option<u64>,
    /// Uncommitted work of the open transaction
    pending: Option<Vec<Op>>,
    closed: bool,
}

/// Driver connection to a `SimulatedServer`
#[derive(Debug)]
pub struct SimulatedConnection {
    server: SimulatedServer,
    link: Mutex<Link>,
}

#[async_trait]
impl Connection for SimulatedConnection {
    fn driver_name(&self) -> &str {
        "simulated-mysql"
    }

    async fn execute(&self, statement: &Statement) -> Result<StatementResult> {
        // yield so that concurrent sessions interleave
        tokio::task::yield_now().await;

        let mut link = self.link.lock();
        if link.closed {
            return Err(RelinkError::Connection("closed MySQL connection".into()));
        }
        let mut server = self.server.state.lock();
        if link.epoch != Some(server.epoch) || !server.running {
            link.epoch = None;
            link.pending = None;
            return Err(RelinkError::Query("MySQL server has gone away".into()));
        }

        match server.faults.pop_front() {
            Some(Fault::GoneAway) => {
                link.epoch = None;
                link.pending = None;
                Err(RelinkError::Query("MySQL server has gone away".into()))
            }
            Some(Fault::LostDuringQuery) => {
                link.epoch = None;
                link.pending = None;
                Err(lost_during_query())
            }
            Some(Fault::AppliedThenLost) => {
                apply(&mut server, &mut link.pending, statement)?;
                link.epoch = None;
                link.pending = None;
                Err(lost_during_query())
            }
            None => apply(&mut server, &mut link.pending, statement),
        }
    }

    async fn reconnect(&self) -> Result<()> {
        tokio::task::yield_now().await;

        let mut link = self.link.lock();
        let mut server = self.server.state.lock();
        link.epoch = None;
        link.pending = None;
        if !server.running {
            return Err(RelinkError::Connection(
                "Can't connect to MySQL server on 'localhost' (111)".into(),
            ));
        }
        server.connects += 1;
        link.epoch = Some(server.epoch);
        link.closed = false;
        Ok(())
    }

    async fn ping(&self) -> bool {
        let link = self.link.lock();
        let server = self.server.state.lock();
        !link.closed && server.running && link.epoch == Some(server.epoch)
    }

    async fn close(&self) -> Result<()> {
        let mut link = self.link.lock();
        link.closed = true;
        link.pending = None;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.link.lock().closed
    }
}

fn lost_during_query() -> RelinkError {
    RelinkError::Query("Lost connection to MySQL server during query".into())
}

/// Execute `statement` against the server state and the link's open transaction.
fn apply(
    server: &mut ServerState,
    pending: &mut Option<Vec<Op>>,
    statement: &Statement,
) -> Result<StatementResult> {
    let sql = statement.text().trim().to_ascii_uppercase();

    let result = if statement.is_begin() {
        if let Some(ops) = pending.take() {
            commit(server, ops);
        }
        *pending = Some(Vec::new());
        StatementResult::command(0, None)
    } else if statement.is_commit() {
        if let Some(ops) = pending.take() {
            commit(server, ops);
        }
        StatementResult::command(0, None)
    } else if statement.is_rollback() {
        *pending = None;
        StatementResult::command(0, None)
    } else if sql.starts_with("SELECT COUNT(*) FROM EMPLOYEES") {
        let count = visible(server, pending.as_deref()).len() as i64;
        StatementResult::query(QueryResult::scalar("count", Value::Int64(count)))
    } else if sql.starts_with("SELECT") {
        StatementResult::query(QueryResult::scalar("1", Value::Int64(1)))
    } else if sql.starts_with("INSERT INTO EMPLOYEES") {
        reject_if_read_only(server)?;
        let name = quoted(statement.text()).unwrap_or_default();
        stage(server, pending, Op::Insert(name));
        StatementResult::command(1, Some(server.applied.len() as u64 + 1))
    } else if sql.starts_with("DELETE FROM EMPLOYEES") {
        reject_if_read_only(server)?;
        let affected = visible(server, pending.as_deref()).len() as u64;
        stage(server, pending, Op::DeleteAll);
        StatementResult::command(affected, None)
    } else {
        return Err(RelinkError::Query(format!(
            "You have an error in your SQL syntax near '{}'",
            statement.text()
        )));
    };

    server.applied.push(statement.text().to_string());
    Ok(result)
}

fn reject_if_read_only(server: &ServerState) -> Result<()> {
    if server.read_only {
        return Err(RelinkError::Query(
            "The MySQL server is running with the --read-only option so it cannot execute this statement"
                .into(),
        ));
    }
    Ok(())
}

/// Stage `op` in the open transaction, or apply it straight away in autocommit.
fn stage(server: &mut ServerState, pending: &mut Option<Vec<Op>>, op: Op) {
    match pending {
        Some(ops) => ops.push(op),
        None => commit(server, vec![op]),
    }
}

fn commit(server: &mut ServerState, ops: Vec<Op>) {
    for op in ops {
        match op {
            Op::Insert(name) => server.employees.push(name),
            Op::DeleteAll => server.employees.clear(),
        }
    }
}

fn visible(server: &ServerState, pending: Option<&[Op]>) -> Vec<String> {
    let mut rows = server.employees.clone();
    for op in pending.unwrap_or_default() {
        match op {
            Op::Insert(name) => rows.push(name.clone()),
            Op::DeleteAll => rows.clear(),
        }
    }
    rows
}

fn quoted(text: &str) -> Option<String> {
    let start = text.find('\'')? + 1;
    let end = start + text[start..].find('\'')?;
    Some(text[start..end].to_string())
}

/// A fresh server for each test
#[fixture]
pub fn server() -> SimulatedServer {
    initialize_logging();
    SimulatedServer::new()
}

/// Config with the default failover schedule and a short pacing delay
#[fixture]
pub fn config() -> RelinkConfig {
    RelinkConfig {
        retry: RetryPolicyConfig::new(3, Duration::from_millis(100)),
        reconnect: ReconnectConfig::new(7, BackoffSchedule::failover()),
    }
}

/// Open a session on `server` with its own policy taken from `config`.
pub fn session_for(server: &SimulatedServer, config: &RelinkConfig) -> Session {
    SessionBuilder::new(server.connect()).with_config(config).build()
}

/// Insert statement for employee `name`
pub fn insert_employee(name: &str) -> Statement {
    Statement::new(format!("INSERT INTO employees (name) VALUES ('{name}')"))
}

/// Read the scalar `SELECT COUNT(*)` result.
pub async fn count_employees(session: &Session) -> anyhow::Result<i64> {
    use anyhow::Context;

    let result = session
        .execute("SELECT COUNT(*) FROM employees")
        .await
        .context("count query failed")?;
    result
        .scalar()
        .and_then(Value::as_i64)
        .context("count query returned no value")
}
