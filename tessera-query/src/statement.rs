//! Mapped statement model.
//!
//! A [`MappedStatement`] is the configured form of one SQL statement: its id,
//! kind, the shared cache it belongs to (if any) and its caching flags. A
//! [`BoundStatement`] is one execution of it with concrete parameter values.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tessera_cache::Cache;
use tessera_core::{ConfigError, KeyComponent};

// ============================================================================
// ENUMS
// ============================================================================

/// SQL command kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn is_select(&self) -> bool {
        matches!(self, StatementKind::Select)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StatementKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SELECT" => Ok(StatementKind::Select),
            "INSERT" => Ok(StatementKind::Insert),
            "UPDATE" => Ok(StatementKind::Update),
            "DELETE" => Ok(StatementKind::Delete),
            _ => Err(ConfigError::InvalidValue {
                field: "kind".to_string(),
                value: s.to_string(),
                reason: "expected SELECT, INSERT, UPDATE or DELETE".to_string(),
            }),
        }
    }
}

/// How the statement is sent to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatementType {
    Statement,
    #[default]
    Prepared,
    /// Stored procedure call
    Callable,
}

/// Direction of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParameterMode {
    #[default]
    In,
    Out,
    InOut,
}

impl ParameterMode {
    /// True for modes that produce an output binding.
    pub fn is_output(&self) -> bool {
        !matches!(self, ParameterMode::In)
    }
}

/// Declared parameter of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterMapping {
    pub property: String,
    pub mode: ParameterMode,
}

impl ParameterMapping {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            mode: ParameterMode::In,
        }
    }

    pub fn with_mode(mut self, mode: ParameterMode) -> Self {
        self.mode = mode;
        self
    }
}

// ============================================================================
// ROW BOUNDS
// ============================================================================

/// Paging window applied to a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowBounds {
    pub offset: usize,
    pub limit: usize,
}

impl RowBounds {
    pub const NO_ROW_OFFSET: usize = 0;
    pub const NO_ROW_LIMIT: usize = i32::MAX as usize;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self {
            offset: Self::NO_ROW_OFFSET,
            limit: Self::NO_ROW_LIMIT,
        }
    }
}

// ============================================================================
// MAPPED STATEMENT
// ============================================================================

/// Configured statement.
#[derive(Clone)]
pub struct MappedStatement {
    id: String,
    kind: StatementKind,
    statement_type: StatementType,
    sql: String,
    cache: Option<Arc<dyn Cache>>,
    flush_cache_required: bool,
    use_cache: bool,
    parameter_mappings: Vec<ParameterMapping>,
}

impl MappedStatement {
    /// Start building a statement. Selects default to using the cache
    /// without flushing it; every other kind flushes and never reads it.
    pub fn builder(
        id: impl Into<String>,
        kind: StatementKind,
        sql: impl Into<String>,
    ) -> MappedStatementBuilder {
        let is_select = kind.is_select();
        MappedStatementBuilder {
            statement: MappedStatement {
                id: id.into(),
                kind,
                statement_type: StatementType::default(),
                sql: sql.into(),
                cache: None,
                flush_cache_required: !is_select,
                use_cache: is_select,
                parameter_mappings: Vec::new(),
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    pub fn is_flush_cache_required(&self) -> bool {
        self.flush_cache_required
    }

    pub fn is_use_cache(&self) -> bool {
        self.use_cache
    }

    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.parameter_mappings
    }

    /// True for stored-procedure calls that declare OUT or INOUT parameters.
    pub fn has_output_parameters(&self) -> bool {
        self.statement_type == StatementType::Callable
            && self.parameter_mappings.iter().any(|p| p.mode.is_output())
    }

    /// Pair `values` with the declared parameters, in order.
    ///
    /// Missing trailing values bind as null; extra values are ignored.
    pub fn bind<I, V>(&self, values: I) -> BoundStatement
    where
        I: IntoIterator<Item = V>,
        V: Into<KeyComponent>,
    {
        let mut values = values.into_iter();
        let parameters = self
            .parameter_mappings
            .iter()
            .map(|mapping| BoundParameter {
                property: mapping.property.clone(),
                mode: mapping.mode,
                value: values.next().map(Into::into).unwrap_or(KeyComponent::Null),
            })
            .collect();
        BoundStatement {
            sql: self.sql.clone(),
            parameters,
        }
    }
}

impl fmt::Debug for MappedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedStatement")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("statement_type", &self.statement_type)
            .field("cache", &self.cache.as_ref().map(|c| c.id().to_string()))
            .field("flush_cache_required", &self.flush_cache_required)
            .field("use_cache", &self.use_cache)
            .field("parameter_mappings", &self.parameter_mappings)
            .finish()
    }
}

/// Builder for [`MappedStatement`].
#[derive(Debug)]
pub struct MappedStatementBuilder {
    statement: MappedStatement,
}

impl MappedStatementBuilder {
    pub fn statement_type(mut self, statement_type: StatementType) -> Self {
        self.statement.statement_type = statement_type;
        self
    }

    /// Attach the shared cache, usually the namespace's own or one resolved
    /// through a cache reference.
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.statement.cache = Some(cache);
        self
    }

    pub fn flush_cache_required(mut self, flush: bool) -> Self {
        self.statement.flush_cache_required = flush;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.statement.use_cache = use_cache;
        self
    }

    pub fn parameter(mut self, mapping: ParameterMapping) -> Self {
        self.statement.parameter_mappings.push(mapping);
        self
    }

    pub fn build(self) -> MappedStatement {
        self.statement
    }
}

// ============================================================================
// BOUND STATEMENT
// ============================================================================

/// One parameter value bound for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub property: String,
    pub mode: ParameterMode,
    pub value: KeyComponent,
}

/// SQL text plus the parameter values for one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub parameters: Vec<BoundParameter>,
}

impl BoundStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(
        mut self,
        property: impl Into<String>,
        mode: ParameterMode,
        value: impl Into<KeyComponent>,
    ) -> Self {
        self.parameters.push(BoundParameter {
            property: property.into(),
            mode,
            value: value.into(),
        });
        self
    }

    /// Values that participate in the cache key: everything except pure OUT
    /// parameters, in declaration order.
    pub fn key_values(&self) -> impl Iterator<Item = &KeyComponent> {
        self.parameters
            .iter()
            .filter(|p| p.mode != ParameterMode::Out)
            .map(|p| &p.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_cache::PerpetualCache;

    #[test]
    fn test_defaults_follow_statement_kind() {
        let select = MappedStatement::builder("users.find", StatementKind::Select, "SELECT 1").build();
        assert!(select.is_use_cache());
        assert!(!select.is_flush_cache_required());
        assert_eq!(select.statement_type(), StatementType::Prepared);

        for kind in [StatementKind::Insert, StatementKind::Update, StatementKind::Delete] {
            let write = MappedStatement::builder("users.write", kind, "UPDATE").build();
            assert!(!write.is_use_cache());
            assert!(write.is_flush_cache_required());
        }
    }

    #[test]
    fn test_builder_overrides() {
        let cache: Arc<dyn Cache> = Arc::new(PerpetualCache::new("users"));
        let statement = MappedStatement::builder("users.find", StatementKind::Select, "SELECT 1")
            .cache(cache)
            .flush_cache_required(true)
            .use_cache(false)
            .build();

        assert_eq!(statement.cache().unwrap().id(), "users");
        assert!(statement.is_flush_cache_required());
        assert!(!statement.is_use_cache());
    }

    #[test]
    fn test_output_parameters_only_count_for_callables() {
        let prepared = MappedStatement::builder("a.b", StatementKind::Select, "SELECT ?")
            .parameter(ParameterMapping::new("out").with_mode(ParameterMode::Out))
            .build();
        assert!(!prepared.has_output_parameters());

        let callable = MappedStatement::builder("a.call", StatementKind::Select, "{call p(?, ?)}")
            .statement_type(StatementType::Callable)
            .parameter(ParameterMapping::new("id"))
            .parameter(ParameterMapping::new("balance").with_mode(ParameterMode::InOut))
            .build();
        assert!(callable.has_output_parameters());
    }

    #[test]
    fn test_bind_pairs_values_with_mappings() {
        let statement = MappedStatement::builder("users.find", StatementKind::Select, "SELECT ?, ?")
            .parameter(ParameterMapping::new("id"))
            .parameter(ParameterMapping::new("name"))
            .build();

        let bound = statement.bind([7i64]);
        assert_eq!(bound.sql, "SELECT ?, ?");
        assert_eq!(bound.parameters.len(), 2);
        assert_eq!(bound.parameters[0].value, KeyComponent::Int(7));
        assert_eq!(bound.parameters[1].value, KeyComponent::Null);
    }

    #[test]
    fn test_key_values_skip_out_parameters() {
        let bound = BoundStatement::new("{call p(?, ?, ?)}")
            .with_parameter("a", ParameterMode::In, 1i64)
            .with_parameter("b", ParameterMode::Out, KeyComponent::Null)
            .with_parameter("c", ParameterMode::InOut, "x");

        let values: Vec<_> = bound.key_values().cloned().collect();
        assert_eq!(values, vec![KeyComponent::Int(1), KeyComponent::from("x")]);
    }

    #[test]
    fn test_row_bounds_default() {
        let bounds = RowBounds::default();
        assert_eq!(bounds.offset, 0);
        assert_eq!(bounds.limit, i32::MAX as usize);
    }

    #[test]
    fn test_statement_kind_parse() {
        assert_eq!("select".parse::<StatementKind>().unwrap(), StatementKind::Select);
        assert_eq!(StatementKind::Delete.to_string(), "DELETE");
        assert!("merge".parse::<StatementKind>().is_err());
    }
}
