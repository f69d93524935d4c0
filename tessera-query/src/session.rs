//! Session executor with a first-level (local) cache.

use std::fmt;
use std::str::FromStr;

use tessera_cache::{Cache, PerpetualCache};
use tessera_core::{
    CacheKey, CacheValue, ConfigError, ExecutorError, TesseraResult,
};

use crate::executor::{Executor, ResultHandler, StatementRunner};
use crate::statement::{BoundStatement, MappedStatement, RowBounds};

const LOCAL_CACHE_ID: &str = "LocalCache";

/// Lifetime of local cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LocalCacheScope {
    /// Entries live until the next update, commit, rollback or close.
    #[default]
    Session,
    /// Entries are dropped as soon as the outermost query returns.
    Statement,
}

impl fmt::Display for LocalCacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalCacheScope::Session => write!(f, "SESSION"),
            LocalCacheScope::Statement => write!(f, "STATEMENT"),
        }
    }
}

impl FromStr for LocalCacheScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SESSION" => Ok(LocalCacheScope::Session),
            "STATEMENT" => Ok(LocalCacheScope::Statement),
            _ => Err(ConfigError::InvalidValue {
                field: "local_cache_scope".to_string(),
                value: s.to_string(),
                reason: "expected SESSION or STATEMENT".to_string(),
            }),
        }
    }
}

/// Executes statements for one session through a [`StatementRunner`],
/// memoizing query results in a session-local cache.
pub struct SessionExecutor<R: StatementRunner> {
    runner: R,
    local_cache: PerpetualCache,
    local_cache_scope: LocalCacheScope,
    environment_id: Option<String>,
    query_stack: usize,
    closed: bool,
}

impl<R: StatementRunner> SessionExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            local_cache: PerpetualCache::new(LOCAL_CACHE_ID),
            local_cache_scope: LocalCacheScope::default(),
            environment_id: None,
            query_stack: 0,
            closed: false,
        }
    }

    pub fn with_local_cache_scope(mut self, scope: LocalCacheScope) -> Self {
        self.local_cache_scope = scope;
        self
    }

    /// Environment folded into every cache key, so that identical queries
    /// against different databases never share entries.
    pub fn with_environment(mut self, environment_id: impl Into<String>) -> Self {
        self.environment_id = Some(environment_id.into());
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn runner_mut(&mut self) -> &mut R {
        &mut self.runner
    }

    pub fn local_cache_size(&self) -> usize {
        self.local_cache.len()
    }

    fn ensure_open(&self) -> TesseraResult<()> {
        if self.closed {
            return Err(ExecutorError::Closed.into());
        }
        Ok(())
    }

    fn query_from_database(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
        key: &CacheKey,
    ) -> TesseraResult<CacheValue> {
        let result = self.runner.run_query(statement, bound, bounds)?;
        self.local_cache.put(key.clone(), Some(result.clone()))?;
        Ok(result)
    }
}

impl<R: StatementRunner> Executor for SessionExecutor<R> {
    fn query_with_key(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
        key: &CacheKey,
    ) -> TesseraResult<CacheValue> {
        self.ensure_open()?;
        if self.query_stack == 0 && statement.is_flush_cache_required() {
            self.clear_local_cache();
        }

        self.query_stack += 1;
        let result = match self.local_cache.get(key) {
            Ok(Some(cached)) => {
                tracing::trace!(statement_id = %statement.id(), "Local cache hit");
                Ok(cached)
            }
            Ok(None) => self.query_from_database(statement, bound, bounds, key),
            Err(e) => Err(e.into()),
        };
        self.query_stack -= 1;

        if self.query_stack == 0 && self.local_cache_scope == LocalCacheScope::Statement {
            self.clear_local_cache();
        }
        result
    }

    fn query_with_handler(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> TesseraResult<()> {
        self.ensure_open()?;
        if statement.is_flush_cache_required() {
            self.clear_local_cache();
        }
        let result = self.runner.run_query(statement, bound, bounds)?;
        handler.handle_result(&result);
        Ok(())
    }

    fn query_cursor(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
    ) -> TesseraResult<CacheValue> {
        self.ensure_open()?;
        self.runner.run_query(statement, bound, bounds)
    }

    fn update(&mut self, statement: &MappedStatement, bound: &BoundStatement) -> TesseraResult<u64> {
        self.ensure_open()?;
        self.clear_local_cache();
        self.runner.run_update(statement, bound)
    }

    fn commit(&mut self, required: bool) -> TesseraResult<()> {
        self.ensure_open()?;
        self.clear_local_cache();
        if required {
            self.runner.commit()?;
        }
        Ok(())
    }

    fn rollback(&mut self, required: bool) -> TesseraResult<()> {
        if self.closed {
            return Ok(());
        }
        self.clear_local_cache();
        if required {
            self.runner.rollback()?;
        }
        Ok(())
    }

    fn close(&mut self, force_rollback: bool) -> TesseraResult<()> {
        if self.closed {
            return Ok(());
        }
        if let Err(e) = self.rollback(force_rollback) {
            tracing::warn!(error = %e, "Unexpected failure rolling back while closing executor");
        }
        self.runner.close();
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn create_cache_key(
        &self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
    ) -> TesseraResult<CacheKey> {
        self.ensure_open()?;
        let mut builder = CacheKey::builder();
        builder
            .update(statement.id())
            .update(bounds.offset)
            .update(bounds.limit)
            .update(bound.sql.as_str());
        builder.update_all(bound.key_values().cloned());
        if let Some(environment_id) = &self.environment_id {
            builder.update(environment_id.as_str());
        }
        Ok(builder.build())
    }

    fn is_cached(&self, _statement: &MappedStatement, key: &CacheKey) -> bool {
        self.local_cache.contains_key(key)
    }

    fn clear_local_cache(&mut self) {
        if !self.closed {
            self.local_cache.clear_entries();
        }
    }
}

impl<R: StatementRunner> fmt::Debug for SessionExecutor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionExecutor")
            .field("local_cache_scope", &self.local_cache_scope)
            .field("environment_id", &self.environment_id)
            .field("local_cache", &self.local_cache_size())
            .field("closed", &self.closed)
            .finish()
    }
}
