//! Executor and statement-runner traits.

use tessera_core::{CacheKey, CacheValue, TesseraResult};

use crate::statement::{BoundStatement, MappedStatement, RowBounds};

/// Runs statements against the database.
///
/// This is the boundary to SQL execution and result mapping, which live
/// outside this crate. A query result is one opaque [`CacheValue`], usually
/// a serializable list of mapped rows.
pub trait StatementRunner {
    fn run_query(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
    ) -> TesseraResult<CacheValue>;

    /// Returns the number of affected rows.
    fn run_update(&mut self, statement: &MappedStatement, bound: &BoundStatement)
        -> TesseraResult<u64>;

    fn commit(&mut self) -> TesseraResult<()> {
        Ok(())
    }

    fn rollback(&mut self) -> TesseraResult<()> {
        Ok(())
    }

    fn close(&mut self) {}
}

/// Receives query results on the streaming path instead of having them
/// returned (and cached).
pub trait ResultHandler {
    fn handle_result(&mut self, result: &CacheValue);
}

impl<F: FnMut(&CacheValue)> ResultHandler for F {
    fn handle_result(&mut self, result: &CacheValue) {
        self(result)
    }
}

/// Per-unit-of-work statement executor.
pub trait Executor {
    /// Run a query, building its cache key first.
    fn query(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
    ) -> TesseraResult<CacheValue> {
        let key = self.create_cache_key(statement, bound, bounds)?;
        self.query_with_key(statement, bound, bounds, &key)
    }

    fn query_with_key(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
        key: &CacheKey,
    ) -> TesseraResult<CacheValue>;

    /// Run a query and hand the result to `handler`. Never cached.
    fn query_with_handler(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> TesseraResult<()>;

    /// Run a streaming query. Never cached.
    fn query_cursor(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
    ) -> TesseraResult<CacheValue>;

    fn update(&mut self, statement: &MappedStatement, bound: &BoundStatement)
        -> TesseraResult<u64>;

    /// Commit the unit of work. `required` controls whether the underlying
    /// transaction is committed as well.
    fn commit(&mut self, required: bool) -> TesseraResult<()>;

    fn rollback(&mut self, required: bool) -> TesseraResult<()>;

    fn close(&mut self, force_rollback: bool) -> TesseraResult<()>;

    fn is_closed(&self) -> bool;

    fn create_cache_key(
        &self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: RowBounds,
    ) -> TesseraResult<CacheKey>;

    /// True if `key` is held in this executor's local cache.
    fn is_cached(&self, statement: &MappedStatement, key: &CacheKey) -> bool;

    fn clear_local_cache(&mut self);
}
