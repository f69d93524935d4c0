//! Tessera Query - Executor Integration
//!
//! Mapped statements, the session executor with its first-level cache and
//! the caching executor that routes cacheable queries through a shared
//! second-level cache inside a unit of work.
//!
//! # Example
//!
//! ```ignore
//! let users = registry.build_cache("users", &CacheSettings::default())?;
//! let find = MappedStatement::builder("users.find", StatementKind::Select, sql)
//!     .cache(users)
//!     .parameter(ParameterMapping::new("id"))
//!     .build();
//!
//! let mut executor = CachingExecutor::new(SessionExecutor::new(runner));
//! let rows = executor.query(&find, &find.bind([42i64]), RowBounds::default())?;
//! executor.commit(true)?;
//! ```

pub mod caching;
pub mod executor;
pub mod session;
pub mod statement;

pub use caching::CachingExecutor;
pub use executor::{Executor, ResultHandler, StatementRunner};
pub use session::{LocalCacheScope, SessionExecutor};
pub use statement::{
    BoundParameter, BoundStatement, MappedStatement, MappedStatementBuilder, ParameterMapping,
    ParameterMode, RowBounds, StatementKind, StatementType,
};
