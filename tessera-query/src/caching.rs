//! Second-level caching executor.
//!
//! Wraps another [`Executor`] and routes cacheable queries through the
//! statement's shared cache. Every read and write goes through a
//! [`TransactionalCacheManager`], so entries only become visible to other
//! units of work when this one commits.

use std::sync::Arc;

use tessera_cache::{Cache, TransactionalCacheManager};
use tessera_core::{CacheKey, CacheValue, ConfigError, TesseraResult};
use uuid::Uuid;

use crate::executor::{Executor, ResultHandler};
use crate::statement::{BoundStatement, MappedStatement, RowBounds};

/// Executor decorator that consults the shared second-level cache.
#[derive(Debug)]
pub struct CachingExecutor<E: Executor> {
    delegate: E,
    tcm: TransactionalCacheManager,
}

impl<E: Executor> CachingExecutor<E> {
    pub fn new(delegate: E) -> Self {
        Self {
            delegate,
            tcm: TransactionalCacheManager::new(),
        }
    }

    pub fn delegate(&self) -> &E {
        &self.delegate
    }

    pub fn delegate_mut(&mut self) -> &mut E {
        &mut self.delegate
    }

    /// Identifier of the current unit of work.
    pub fn unit_id(&self) -> Uuid {
        self.tcm.unit_id()
    }

    // ========================================================================
    // UNIT-OF-WORK CONTRACT
    // ========================================================================

    /// A statement reads the shared cache only when it has one and opts in.
    pub fn is_cache_applicable(statement: &MappedStatement) -> Option<&Arc<dyn Cache>> {
        statement
            .cache()
            .filter(|_| statement.is_use_cache())
    }

    /// Schedule a clear of the statement's cache when it asks for a flush.
    /// The clear takes effect at commit.
    pub fn flush_if_required(&mut self, statement: &MappedStatement) {
        if let Some(cache) = statement.cache() {
            if statement.is_flush_cache_required() {
                tracing::trace!(
                    statement_id = %statement.id(),
                    cache_id = %cache.id(),
                    "Scheduling shared cache flush"
                );
                self.tcm.clear(cache);
            }
        }
    }

    pub fn get_cached(
        &mut self,
        cache: &Arc<dyn Cache>,
        key: &CacheKey,
    ) -> TesseraResult<Option<CacheValue>> {
        Ok(self.tcm.get_object(cache, key)?)
    }

    pub fn put_cached(&mut self, cache: &Arc<dyn Cache>, key: CacheKey, value: CacheValue) {
        self.tcm.put_object(cache, key, Some(value));
    }

    pub fn commit_unit_of_work(&mut self) -> TesseraResult<()> {
        Ok(self.tcm.commit()?)
    }

    pub fn rollback_unit_of_work(&mut self) {
        self.tcm.rollback();
    }

    fn ensure_no_output_parameters(statement: &MappedStatement) -> TesseraResult<()> {
        if statement.has_output_parameters() {
            return Err(ConfigError::OutputParametersNotCacheable {
                statement_id: statement.id().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl<E: Executor> Executor for CachingExecutor<E> {
    fn query_with_key(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
        key: &CacheKey,
    ) -> TesseraResult<CacheValue> {
        self.flush_if_required(statement);

        let Some(cache) = Self::is_cache_applicable(statement) else {
            return self.delegate.query_with_key(statement, bound, bounds, key);
        };

        Self::ensure_no_output_parameters(statement)?;
        if let Some(cached) = self.get_cached(cache, key)? {
            tracing::trace!(
                statement_id = %statement.id(),
                cache_id = %cache.id(),
                "Shared cache hit"
            );
            return Ok(cached);
        }

        let result = self.delegate.query_with_key(statement, bound, bounds, key)?;
        self.put_cached(cache, key.clone(), result.clone());
        Ok(result)
    }

    fn query_with_handler(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> TesseraResult<()> {
        self.flush_if_required(statement);
        self.delegate.query_with_handler(statement, bound, bounds, handler)
    }

    fn query_cursor(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
    ) -> TesseraResult<CacheValue> {
        self.flush_if_required(statement);
        self.delegate.query_cursor(statement, bound, bounds)
    }

    fn update(&mut self, statement: &MappedStatement, bound: &BoundStatement) -> TesseraResult<u64> {
        self.flush_if_required(statement);
        self.delegate.update(statement, bound)
    }

    fn commit(&mut self, required: bool) -> TesseraResult<()> {
        self.delegate.commit(required)?;
        self.commit_unit_of_work()
    }

    fn rollback(&mut self, required: bool) -> TesseraResult<()> {
        let result = self.delegate.rollback(required);
        if required {
            self.rollback_unit_of_work();
        }
        result
    }

    fn close(&mut self, force_rollback: bool) -> TesseraResult<()> {
        let unit_result = if force_rollback {
            self.rollback_unit_of_work();
            Ok(())
        } else {
            self.commit_unit_of_work()
        };
        let close_result = self.delegate.close(force_rollback);
        unit_result.and(close_result)
    }

    fn is_closed(&self) -> bool {
        self.delegate.is_closed()
    }

    fn create_cache_key(
        &self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
    ) -> TesseraResult<CacheKey> {
        self.delegate.create_cache_key(statement, bound, bounds)
    }

    fn is_cached(&self, statement: &MappedStatement, key: &CacheKey) -> bool {
        self.delegate.is_cached(statement, key)
    }

    fn clear_local_cache(&mut self) {
        self.delegate.clear_local_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionExecutor;
    use crate::statement::{ParameterMapping, ParameterMode, StatementKind, StatementType};
    use crate::StatementRunner;
    use tessera_cache::PerpetualCache;
    use tessera_core::{ExecutorError, TesseraError};

    #[derive(Default)]
    struct EchoRunner {
        queries: usize,
        fail_commit: bool,
    }

    impl StatementRunner for EchoRunner {
        fn run_query(
            &mut self,
            _statement: &MappedStatement,
            bound: &BoundStatement,
            _bounds: RowBounds,
        ) -> TesseraResult<CacheValue> {
            self.queries += 1;
            Ok(CacheValue::new(format!("{:?}", bound.parameters[0].value)))
        }

        fn run_update(
            &mut self,
            _statement: &MappedStatement,
            _bound: &BoundStatement,
        ) -> TesseraResult<u64> {
            Ok(1)
        }

        fn commit(&mut self) -> TesseraResult<()> {
            if self.fail_commit {
                return Err(ExecutorError::StatementFailed {
                    statement_id: "commit".to_string(),
                    reason: "connection lost".to_string(),
                }
                .into());
            }
            Ok(())
        }
    }

    fn shared() -> Arc<dyn Cache> {
        Arc::new(PerpetualCache::new("users"))
    }

    fn select(cache: &Arc<dyn Cache>) -> MappedStatement {
        MappedStatement::builder("users.find", StatementKind::Select, "SELECT * FROM users WHERE id = ?")
            .cache(Arc::clone(cache))
            .parameter(ParameterMapping::new("id"))
            .build()
    }

    fn update(cache: &Arc<dyn Cache>) -> MappedStatement {
        MappedStatement::builder("users.rename", StatementKind::Update, "UPDATE users SET name = ?")
            .cache(Arc::clone(cache))
            .parameter(ParameterMapping::new("name"))
            .build()
    }

    fn executor() -> CachingExecutor<SessionExecutor<EchoRunner>> {
        CachingExecutor::new(SessionExecutor::new(EchoRunner::default()))
    }

    #[test]
    fn test_result_reaches_shared_cache_only_on_commit() {
        let cache = shared();
        let statement = select(&cache);
        let bound = statement.bind([1i64]);
        let mut session = executor();

        session.query(&statement, &bound, RowBounds::default()).unwrap();
        assert_eq!(cache.size().unwrap(), 0);

        session.commit(true).unwrap();
        assert_eq!(cache.size().unwrap(), 1);
    }

    #[test]
    fn test_second_session_hits_shared_cache() {
        let cache = shared();
        let statement = select(&cache);
        let bound = statement.bind([1i64]);

        let mut first = executor();
        first.query(&statement, &bound, RowBounds::default()).unwrap();
        first.close(false).unwrap();

        let mut second = executor();
        let value = second.query(&statement, &bound, RowBounds::default()).unwrap();
        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("Int(1)"));
        assert_eq!(second.delegate().runner().queries, 0);
    }

    #[test]
    fn test_update_flush_hides_entries_until_commit() {
        let cache = shared();
        let statement = select(&cache);
        let bound = statement.bind([1i64]);

        let mut warm = executor();
        warm.query(&statement, &bound, RowBounds::default()).unwrap();
        warm.commit(true).unwrap();

        let mut writer = executor();
        writer.update(&update(&cache), &update(&cache).bind(["ada"])).unwrap();
        assert_eq!(cache.size().unwrap(), 1);

        writer.query(&statement, &bound, RowBounds::default()).unwrap();
        assert_eq!(writer.delegate().runner().queries, 1);

        writer.commit(true).unwrap();
        assert_eq!(cache.size().unwrap(), 1);
    }

    #[test]
    fn test_rollback_discards_pending_entries() {
        let cache = shared();
        let statement = select(&cache);
        let bound = statement.bind([1i64]);
        let mut session = executor();

        session.query(&statement, &bound, RowBounds::default()).unwrap();
        session.rollback(true).unwrap();
        session.commit(true).unwrap();
        assert_eq!(cache.size().unwrap(), 0);
    }

    #[test]
    fn test_statement_without_use_cache_skips_shared_cache() {
        let cache = shared();
        let statement = MappedStatement::builder("users.raw", StatementKind::Select, "SELECT 1")
            .cache(Arc::clone(&cache))
            .use_cache(false)
            .parameter(ParameterMapping::new("id"))
            .build();
        let bound = statement.bind([1i64]);
        let mut session = executor();

        session.query(&statement, &bound, RowBounds::default()).unwrap();
        session.commit(true).unwrap();
        assert_eq!(cache.size().unwrap(), 0);
        assert!(CachingExecutor::<SessionExecutor<EchoRunner>>::is_cache_applicable(&statement).is_none());
    }

    #[test]
    fn test_callable_with_output_parameters_rejected() {
        let cache = shared();
        let statement = MappedStatement::builder("accounts.balance", StatementKind::Select, "{call balance(?, ?)}")
            .statement_type(StatementType::Callable)
            .cache(Arc::clone(&cache))
            .parameter(ParameterMapping::new("id"))
            .parameter(ParameterMapping::new("balance").with_mode(ParameterMode::Out))
            .build();
        let bound = statement.bind([1i64]);
        let mut session = executor();

        let err = session
            .query(&statement, &bound, RowBounds::default())
            .unwrap_err();
        assert_eq!(
            err,
            TesseraError::Config(ConfigError::OutputParametersNotCacheable {
                statement_id: "accounts.balance".to_string()
            })
        );
    }

    #[test]
    fn test_failed_delegate_commit_keeps_pending_entries() {
        let cache = shared();
        let statement = select(&cache);
        let bound = statement.bind([1i64]);
        let mut session = CachingExecutor::new(SessionExecutor::new(EchoRunner {
            fail_commit: true,
            ..EchoRunner::default()
        }));

        session.query(&statement, &bound, RowBounds::default()).unwrap();
        assert!(session.commit(true).is_err());
        assert_eq!(cache.size().unwrap(), 0);

        session.delegate_mut().runner_mut().fail_commit = false;
        session.commit(true).unwrap();
        assert_eq!(cache.size().unwrap(), 1);
    }

    #[test]
    fn test_close_with_force_rollback_discards_entries() {
        let cache = shared();
        let statement = select(&cache);
        let bound = statement.bind([1i64]);
        let mut session = executor();

        session.query(&statement, &bound, RowBounds::default()).unwrap();
        session.close(true).unwrap();

        assert!(session.is_closed());
        assert_eq!(cache.size().unwrap(), 0);
    }

    #[test]
    fn test_unit_id_changes_per_unit_of_work() {
        let mut session = executor();
        let first = session.unit_id();
        session.commit(false).unwrap();
        assert_ne!(first, session.unit_id());
    }
}
