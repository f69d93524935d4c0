//! Tessera Test Utilities
//!
//! Shared test infrastructure for the Tessera workspace:
//! - A scripted in-memory statement runner
//! - Proptest generators for keys and rows
//! - Fixtures for statements wired to a shared cache
//! - Assertions for Tessera error variants

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

// Re-export core types for convenience
pub use tessera_cache::{Cache, CacheBuilder, CacheRegistry, TransactionalCacheManager};
pub use tessera_core::{
    CacheError, CacheKey, CacheResult, CacheSettings, CacheValue, ConfigError, EvictionPolicy,
    ExecutorError, KeyComponent, TesseraError, TesseraResult,
};
pub use tessera_query::{
    BoundStatement, CachingExecutor, Executor, MappedStatement, RowBounds, SessionExecutor,
    StatementRunner,
};

/// Install a `fmt` subscriber filtered by `RUST_LOG`. Safe to call from
/// every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A mapped row of the `users` table used throughout the tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: i64,
    pub name: String,
}

impl Row {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

// ============================================================================
// SCRIPTED RUNNER
// ============================================================================

/// Calls observed by a [`ScriptedRunner`].
#[derive(Debug, Default)]
pub struct RunnerCounters {
    queries: AtomicUsize,
    updates: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    closes: AtomicUsize,
}

impl RunnerCounters {
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// In-memory stand-in for a database connection.
///
/// Holds a `users` table shared by every clone, so several sessions built
/// from clones of one runner see each other's updates. Queries filter by an
/// `id` parameter when one is bound and return a serializable `Vec<Row>`.
/// Updates rename the row named by `id` to `name`.
#[derive(Debug, Clone)]
pub struct ScriptedRunner {
    table: Arc<Mutex<BTreeMap<i64, Row>>>,
    counters: Arc<RunnerCounters>,
    failing_statement: Option<String>,
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRunner {
    /// Runner seeded with [`fixtures::sample_rows`].
    pub fn new() -> Self {
        Self::with_rows(fixtures::sample_rows())
    }

    pub fn with_rows(rows: impl IntoIterator<Item = Row>) -> Self {
        Self {
            table: Arc::new(Mutex::new(rows.into_iter().map(|r| (r.id, r)).collect())),
            counters: Arc::new(RunnerCounters::default()),
            failing_statement: None,
        }
    }

    /// Make every execution of `statement_id` fail.
    pub fn failing_on(mut self, statement_id: impl Into<String>) -> Self {
        self.failing_statement = Some(statement_id.into());
        self
    }

    pub fn counters(&self) -> Arc<RunnerCounters> {
        Arc::clone(&self.counters)
    }

    pub fn row(&self, id: i64) -> Option<Row> {
        self.table.lock().get(&id).cloned()
    }

    fn check_failure(&self, statement: &MappedStatement) -> TesseraResult<()> {
        if self.failing_statement.as_deref() == Some(statement.id()) {
            return Err(ExecutorError::StatementFailed {
                statement_id: statement.id().to_string(),
                reason: "scripted failure".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn parameter<'a>(bound: &'a BoundStatement, property: &str) -> Option<&'a KeyComponent> {
    bound
        .parameters
        .iter()
        .find(|p| p.property == property)
        .map(|p| &p.value)
}

impl StatementRunner for ScriptedRunner {
    fn run_query(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
    ) -> TesseraResult<CacheValue> {
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        self.check_failure(statement)?;
        tracing::trace!(statement_id = %statement.id(), "Scripted query");

        let table = self.table.lock();
        let rows: Vec<Row> = match parameter(bound, "id") {
            Some(KeyComponent::Int(id)) => table.get(id).cloned().into_iter().collect(),
            _ => table
                .values()
                .skip(bounds.offset)
                .take(bounds.limit)
                .cloned()
                .collect(),
        };
        Ok(CacheValue::serializable(rows))
    }

    fn run_update(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
    ) -> TesseraResult<u64> {
        self.counters.updates.fetch_add(1, Ordering::SeqCst);
        self.check_failure(statement)?;

        let (Some(KeyComponent::Int(id)), Some(KeyComponent::Text(name))) =
            (parameter(bound, "id"), parameter(bound, "name"))
        else {
            return Ok(0);
        };
        match self.table.lock().get_mut(id) {
            Some(row) => {
                row.name = name.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn commit(&mut self) -> TesseraResult<()> {
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&mut self) -> TesseraResult<()> {
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for keys, rows and settings.

    use super::*;
    use proptest::prelude::*;

    /// Scalar key component (no nested lists).
    pub fn arb_scalar_component() -> impl Strategy<Value = KeyComponent> {
        prop_oneof![
            Just(KeyComponent::Null),
            any::<bool>().prop_map(KeyComponent::from),
            any::<i64>().prop_map(KeyComponent::from),
            any::<u64>().prop_map(KeyComponent::from),
            any::<f64>().prop_map(KeyComponent::from),
            "[a-z0-9_.]{0,16}".prop_map(KeyComponent::from),
            prop::collection::vec(any::<u8>(), 0..8).prop_map(KeyComponent::from),
        ]
    }

    /// Key component, possibly a shallow list of scalars.
    pub fn arb_key_component() -> impl Strategy<Value = KeyComponent> {
        prop_oneof![
            4 => arb_scalar_component(),
            1 => prop::collection::vec(arb_scalar_component(), 0..4).prop_map(KeyComponent::from),
        ]
    }

    /// JSON parameter object converted to a key component.
    pub fn arb_json_component() -> impl Strategy<Value = KeyComponent> {
        (any::<i64>(), "[a-z]{1,8}").prop_map(|(id, name)| {
            KeyComponent::from(serde_json::json!({ "id": id, "name": name }))
        })
    }

    pub fn arb_components() -> impl Strategy<Value = Vec<KeyComponent>> {
        prop::collection::vec(arb_key_component(), 0..8)
    }

    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        arb_components().prop_map(|components| {
            let mut builder = CacheKey::builder();
            builder.update_all(components);
            builder.build()
        })
    }

    pub fn arb_row() -> impl Strategy<Value = Row> {
        (0i64..10_000, "[A-Za-z]{1,12}").prop_map(|(id, name)| Row::new(id, name))
    }

    pub fn arb_eviction() -> impl Strategy<Value = EvictionPolicy> {
        prop_oneof![
            Just(EvictionPolicy::Lru),
            Just(EvictionPolicy::Fifo),
            Just(EvictionPolicy::Soft),
            Just(EvictionPolicy::Weak),
        ]
    }

    /// Valid settings for a non-blocking cache. WEAK is always read-only.
    pub fn arb_settings() -> impl Strategy<Value = CacheSettings> {
        (arb_eviction(), 1usize..64, any::<bool>()).prop_map(|(eviction, size, read_only)| {
            CacheSettings::new()
                .with_eviction(eviction)
                .with_size(size)
                .with_read_only(read_only || eviction == EvictionPolicy::Weak)
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built rows and statements for common scenarios.

    use super::*;
    use tessera_query::{ParameterMapping, ParameterMode, StatementKind, StatementType};

    pub fn sample_rows() -> Vec<Row> {
        vec![
            Row::new(1, "ada"),
            Row::new(2, "grace"),
            Row::new(3, "edsger"),
        ]
    }

    /// `users.findById`, cached in `cache`.
    pub fn select_by_id(cache: &Arc<dyn Cache>) -> MappedStatement {
        MappedStatement::builder(
            "users.findById",
            StatementKind::Select,
            "SELECT id, name FROM users WHERE id = ?",
        )
        .cache(Arc::clone(cache))
        .parameter(ParameterMapping::new("id"))
        .build()
    }

    /// `users.findAll`, cached in `cache`.
    pub fn select_all(cache: &Arc<dyn Cache>) -> MappedStatement {
        MappedStatement::builder("users.findAll", StatementKind::Select, "SELECT id, name FROM users")
            .cache(Arc::clone(cache))
            .build()
    }

    /// `users.rename`, flushing `cache`.
    pub fn rename(cache: &Arc<dyn Cache>) -> MappedStatement {
        MappedStatement::builder(
            "users.rename",
            StatementKind::Update,
            "UPDATE users SET name = ? WHERE id = ?",
        )
        .cache(Arc::clone(cache))
        .parameter(ParameterMapping::new("name"))
        .parameter(ParameterMapping::new("id"))
        .build()
    }

    /// Stored procedure with an OUT parameter, attached to `cache`.
    pub fn balance_procedure(cache: &Arc<dyn Cache>) -> MappedStatement {
        MappedStatement::builder(
            "accounts.balance",
            StatementKind::Select,
            "{call account_balance(?, ?)}",
        )
        .statement_type(StatementType::Callable)
        .cache(Arc::clone(cache))
        .parameter(ParameterMapping::new("id"))
        .parameter(ParameterMapping::new("balance").with_mode(ParameterMode::Out))
        .build()
    }

    /// Caching executor over a session bound to `runner`.
    pub fn caching_session(runner: &ScriptedRunner) -> CachingExecutor<SessionExecutor<ScriptedRunner>> {
        CachingExecutor::new(SessionExecutor::new(runner.clone()))
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for Tessera results.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_cache_error<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(TesseraError::Cache(_)) => {}
            other => panic!("Expected Cache error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(TesseraError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_executor_closed<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(TesseraError::Executor(ExecutorError::Closed)) => {}
            other => panic!("Expected Closed executor error, got: {:?}", other),
        }
    }

    /// Assert a lock timeout raised by the cache `cache_id`.
    #[track_caller]
    pub fn assert_lock_timeout<T: std::fmt::Debug>(result: &CacheResult<T>, cache_id: &str) {
        match result {
            Err(CacheError::LockTimeout { cache_id: id, .. }) => {
                assert_eq!(id, cache_id, "Wrong cache in LockTimeout error");
            }
            other => panic!("Expected LockTimeout from {}, got: {:?}", cache_id, other),
        }
    }

    /// Assert that a query result holds exactly `expected`.
    #[track_caller]
    pub fn assert_rows(value: &CacheValue, expected: &[Row]) {
        match value.downcast_ref::<Vec<Row>>() {
            Some(rows) => assert_eq!(rows.as_slice(), expected),
            None => panic!("Expected Vec<Row>, got value of type {}", value.type_name()),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_scripted_runner_filters_by_id() {
        let cache: Arc<dyn Cache> = CacheBuilder::new("users").build().unwrap();
        let statement = fixtures::select_by_id(&cache);
        let mut runner = ScriptedRunner::new();

        let value = runner
            .run_query(&statement, &statement.bind([2i64]), RowBounds::default())
            .unwrap();
        assertions::assert_rows(&value, &[Row::new(2, "grace")]);
        assert_eq!(runner.counters().queries(), 1);
    }

    #[test]
    fn test_scripted_runner_pages_full_scan() {
        let cache: Arc<dyn Cache> = CacheBuilder::new("users").build().unwrap();
        let statement = fixtures::select_all(&cache);
        let mut runner = ScriptedRunner::new();

        let value = runner
            .run_query(&statement, &statement.bind(Vec::<i64>::new()), RowBounds::new(1, 1))
            .unwrap();
        assertions::assert_rows(&value, &[Row::new(2, "grace")]);
    }

    #[test]
    fn test_clones_share_table() {
        let cache: Arc<dyn Cache> = CacheBuilder::new("users").build().unwrap();
        let statement = fixtures::rename(&cache);
        let runner = ScriptedRunner::new();
        let mut writer = runner.clone();

        let affected = writer
            .run_update(&statement, &statement.bind([KeyComponent::from("ada l."), KeyComponent::from(1i64)]))
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(runner.row(1), Some(Row::new(1, "ada l.")));
        assert_eq!(runner.counters().updates(), 1);
    }

    #[test]
    fn test_failing_statement() {
        let cache: Arc<dyn Cache> = CacheBuilder::new("users").build().unwrap();
        let statement = fixtures::select_by_id(&cache);
        let mut runner = ScriptedRunner::new().failing_on("users.findById");

        let result = runner.run_query(&statement, &statement.bind([1i64]), RowBounds::default());
        assert!(matches!(
            result,
            Err(TesseraError::Executor(ExecutorError::StatementFailed { .. }))
        ));
    }

    proptest! {
        #[test]
        fn prop_generated_settings_validate(settings in generators::arb_settings()) {
            prop_assert!(settings.validate().is_ok());
        }

        #[test]
        fn prop_generated_keys_equal_their_rebuild(key in generators::arb_cache_key()) {
            let rebuilt = {
                let mut builder = CacheKey::builder();
                builder.update_all(key.components().iter().cloned());
                builder.build()
            };
            prop_assert_eq!(key, rebuilt);
        }
    }
}
