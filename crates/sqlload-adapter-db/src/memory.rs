//! In-memory connection backend.
//!
//! Records every statement it is asked to execute and can be told to fail
//! statements matching a predicate. A transient fault breaks the connection
//! it happened on, so later statements on that connection fail until a new
//! one is acquired.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::coercion::SqlParam;
use crate::connection::{Connection, ConnectionProvider};
use crate::{Error, FaultKind, Result};

type Predicate = Box<dyn Fn(&str, &[SqlParam]) -> bool + Send + Sync>;

/// A statement seen by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub connection_id: usize,
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub succeeded: bool,
}

struct FailureRule {
    predicate: Predicate,
    /// `None` fails with a connection-level error that carries no fault kind.
    fault: Option<FaultKind>,
    remaining: Option<usize>,
}

#[derive(Default)]
struct MemoryState {
    next_id: usize,
    acquired: usize,
    closed: usize,
    acquire_failures: usize,
    broken: HashSet<usize>,
    rules: Vec<FailureRule>,
    executed: Vec<ExecutedStatement>,
    rows_stored: u64,
}

/// Connection provider backed by shared in-memory state.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl std::fmt::Debug for MemoryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryConnector")
            .field("acquired", &state.acquired)
            .field("closed", &state.closed)
            .field("executed", &state.executed.len())
            .finish()
    }
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail statements matching `predicate` with `fault`, at most `times`
    /// times when given.
    pub fn fail_when<F>(&self, predicate: F, fault: FaultKind, times: Option<usize>) -> &Self
    where
        F: Fn(&str, &[SqlParam]) -> bool + Send + Sync + 'static,
    {
        self.push_rule(Box::new(predicate), Some(fault), times)
    }

    /// Fail statements matching `predicate` with an unclassified backend
    /// error, as a driver does when the session itself is unusable.
    pub fn fail_unexpectedly_when<F>(&self, predicate: F, times: Option<usize>) -> &Self
    where
        F: Fn(&str, &[SqlParam]) -> bool + Send + Sync + 'static,
    {
        self.push_rule(Box::new(predicate), None, times)
    }

    fn push_rule(&self, predicate: Predicate, fault: Option<FaultKind>, times: Option<usize>) -> &Self {
        self.lock().rules.push(FailureRule {
            predicate,
            fault,
            remaining: times,
        });
        self
    }

    /// Fail the next `times` acquisitions.
    pub fn fail_acquire(&self, times: usize) -> &Self {
        self.lock().acquire_failures += times;
        self
    }

    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.lock().executed.clone()
    }

    /// Statements that completed without a fault.
    pub fn committed(&self) -> Vec<ExecutedStatement> {
        self.lock()
            .executed
            .iter()
            .filter(|statement| statement.succeeded)
            .cloned()
            .collect()
    }

    /// Rows persisted by successful statements.
    pub fn rows_stored(&self) -> u64 {
        self.lock().rows_stored
    }

    pub fn acquired(&self) -> usize {
        self.lock().acquired
    }

    pub fn closed(&self) -> usize {
        self.lock().closed
    }
}

impl ConnectionProvider for MemoryConnector {
    type Connection = MemoryConnection;

    async fn acquire(&self) -> Result<MemoryConnection> {
        let mut state = self.lock();
        if state.acquire_failures > 0 {
            state.acquire_failures -= 1;
            return Err(Error::Connection {
                details: "memory backend refused the connection".to_string(),
            });
        }
        state.next_id += 1;
        state.acquired += 1;
        Ok(MemoryConnection {
            id: state.next_id,
            state: Arc::clone(&self.state),
        })
    }
}

/// Connection handed out by [`MemoryConnector`].
pub struct MemoryConnection {
    id: usize,
    state: Arc<Mutex<MemoryState>>,
}

impl std::fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl MemoryConnection {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Connection for MemoryConnection {
    async fn execute(&mut self, sql: &str, params: Vec<SqlParam>) -> Result<u64> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let fault = if state.broken.contains(&self.id) {
            Some((
                Some(FaultKind::TransientConnection),
                "connection closed".to_string(),
            ))
        } else {
            state
                .rules
                .iter_mut()
                .find(|rule| rule.remaining != Some(0) && (rule.predicate)(sql, &params))
                .map(|rule| {
                    if let Some(remaining) = rule.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    let message = match rule.fault {
                        Some(FaultKind::TransientConnection) => "communications link failure",
                        Some(FaultKind::Other) => "constraint violation",
                        None => "memory backend state unavailable",
                    };
                    (rule.fault, message.to_string())
                })
        };

        state.executed.push(ExecutedStatement {
            connection_id: self.id,
            sql: sql.to_string(),
            params: params.clone(),
            succeeded: fault.is_none(),
        });

        match fault {
            Some((Some(fault), message)) => {
                if fault == FaultKind::TransientConnection {
                    state.broken.insert(self.id);
                }
                return Err(Error::sql(sql, fault, message));
            }
            Some((None, message)) => return Err(Error::Connection { details: message }),
            None => {}
        }

        let rows = if params.is_empty() {
            count_value_tuples(sql)
        } else {
            1
        };
        state.rows_stored += rows;
        Ok(rows)
    }

    async fn close(self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.closed += 1;
        state.broken.remove(&self.id);
    }
}

/// Number of top-level `( ... )` tuples after `VALUES` in a literal INSERT.
fn count_value_tuples(sql: &str) -> u64 {
    let Some(start) = sql.find(" VALUES ") else {
        return 0;
    };

    let mut depth = 0_usize;
    let mut in_quote = false;
    let mut tuples = 0;
    for ch in sql[start..].chars() {
        match ch {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => {
                if depth == 0 {
                    tuples += 1;
                }
                depth += 1;
            }
            ')' if !in_quote => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    tuples
}
