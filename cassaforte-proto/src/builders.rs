/// Constructors for frequently built protocol messages
use crate::*;
use std::collections::HashMap;

impl ColumnParent {
    /// Parent addressing a whole row of a column family
    pub fn new(column_family: impl Into<String>) -> Self {
        Self {
            column_family: column_family.into(),
            super_column: Vec::new(),
        }
    }

    /// Parent addressing the sub-columns of one super column
    pub fn super_column(column_family: impl Into<String>, super_column: &[u8]) -> Self {
        Self {
            column_family: column_family.into(),
            super_column: super_column.to_vec(),
        }
    }
}

impl ColumnPath {
    /// Path to a single column
    pub fn column(column_family: impl Into<String>, column: &[u8]) -> Self {
        Self {
            column_family: column_family.into(),
            super_column: Vec::new(),
            column: column.to_vec(),
        }
    }

    /// Path to a whole row (used by removals)
    pub fn row(column_family: impl Into<String>) -> Self {
        Self {
            column_family: column_family.into(),
            super_column: Vec::new(),
            column: Vec::new(),
        }
    }
}

impl Column {
    pub fn new(name: &[u8], value: &[u8], timestamp: i64) -> Self {
        Self {
            name: name.to_vec(),
            value: value.to_vec(),
            timestamp,
            ttl: 0,
        }
    }

    /// Set the time to live in seconds
    pub fn with_ttl(mut self, ttl: i32) -> Self {
        self.ttl = ttl;
        self
    }
}

impl CounterColumn {
    pub fn new(name: &[u8], value: i64) -> Self {
        Self {
            name: name.to_vec(),
            value,
        }
    }
}

impl ColumnOrSuperColumn {
    pub fn from_column(column: Column) -> Self {
        Self {
            column: Some(column),
            ..Default::default()
        }
    }

    pub fn from_counter(counter: CounterColumn) -> Self {
        Self {
            counter_column: Some(counter),
            ..Default::default()
        }
    }
}

impl SlicePredicate {
    /// Select columns by name
    pub fn names<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: AsRef<[u8]>,
    {
        Self {
            column_names: names.into_iter().map(|n| n.as_ref().to_vec()).collect(),
            slice_range: None,
        }
    }

    /// Select a contiguous range of columns; empty bounds are open
    pub fn range(start: &[u8], finish: &[u8], reversed: bool, count: i32) -> Self {
        Self {
            column_names: Vec::new(),
            slice_range: Some(SliceRange {
                start: start.to_vec(),
                finish: finish.to_vec(),
                reversed,
                count,
            }),
        }
    }

    /// Select the first `count` columns of a row
    pub fn all(count: i32) -> Self {
        Self::range(&[], &[], false, count)
    }
}

impl KeyRange {
    /// Range bounded by row keys; empty bounds are open
    pub fn keys(start_key: &[u8], end_key: &[u8], count: i32) -> Self {
        Self {
            start_key: start_key.to_vec(),
            end_key: end_key.to_vec(),
            count,
            ..Default::default()
        }
    }

    /// Range bounded by partitioner tokens
    pub fn tokens(start_token: impl Into<String>, end_token: impl Into<String>, count: i32) -> Self {
        Self {
            start_token: start_token.into(),
            end_token: end_token.into(),
            count,
            ..Default::default()
        }
    }
}

impl IndexExpression {
    pub fn new(column_name: &[u8], op: IndexOperator, value: &[u8]) -> Self {
        Self {
            column_name: column_name.to_vec(),
            op: op as i32,
            value: value.to_vec(),
        }
    }
}

impl Deletion {
    /// Delete the named columns of a row
    pub fn columns<I, N>(timestamp: i64, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: AsRef<[u8]>,
    {
        Self {
            timestamp,
            super_column: Vec::new(),
            predicate: Some(SlicePredicate::names(names)),
        }
    }
}

impl Mutation {
    pub fn insert(column: Column) -> Self {
        Self {
            column_or_supercolumn: Some(ColumnOrSuperColumn::from_column(column)),
            deletion: None,
        }
    }

    pub fn delete(deletion: Deletion) -> Self {
        Self {
            column_or_supercolumn: None,
            deletion: Some(deletion),
        }
    }
}

impl AuthenticationRequest {
    /// Username/password credentials as understood by the password authenticator
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        let mut credentials = HashMap::new();
        credentials.insert("username".to_string(), username.into());
        credentials.insert("password".to_string(), password.into());
        Self { credentials }
    }
}

impl KsDef {
    /// Keyspace replicated with `SimpleStrategy`
    pub fn simple(name: impl Into<String>, replication_factor: u32) -> Self {
        let mut strategy_options = HashMap::new();
        strategy_options.insert(
            "replication_factor".to_string(),
            replication_factor.to_string(),
        );

        Self {
            name: name.into(),
            strategy_class: "org.apache.cassandra.locator.SimpleStrategy".to_string(),
            strategy_options,
            durable_writes: true,
            ..Default::default()
        }
    }

    /// Add a column family definition
    pub fn with_cf(mut self, cf_def: CfDef) -> Self {
        self.cf_defs.push(cf_def);
        self
    }
}

impl CfDef {
    pub fn new(keyspace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            name: name.into(),
            column_type: "Standard".to_string(),
            comparator_type: "BytesType".to_string(),
            ..Default::default()
        }
    }

    /// Column family holding counter columns
    pub fn counter(keyspace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            default_validation_class: "CounterColumnType".to_string(),
            ..Self::new(keyspace, name)
        }
    }

    pub fn is_counter(&self) -> bool {
        self.default_validation_class.ends_with("CounterColumnType")
    }
}

impl CqlResult {
    /// Result of a statement that returns nothing
    pub fn void() -> Self {
        Self {
            result_type: CqlResultType::Void as i32,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_enums() {
        assert_eq!(GetRequest::default().consistency_level(), ConsistencyLevel::One);
        assert_eq!(CqlQueryRequest::default().compression(), Compression::None);
        assert_eq!(CqlResult::default().result_type(), CqlResultType::Rows);
        assert_eq!(CqlResult::void().result_type(), CqlResultType::Void);
    }

    #[test]
    fn test_slice_predicates() {
        let names = SlicePredicate::names(["a", "b"]);
        assert_eq!(names.column_names, vec![b"a".to_vec(), b"b".to_vec()]);
        assert!(names.slice_range.is_none());

        let range = SlicePredicate::all(10);
        let slice = range.slice_range.unwrap();
        assert!(slice.start.is_empty());
        assert!(slice.finish.is_empty());
        assert_eq!(slice.count, 10);
    }

    #[test]
    fn test_simple_keyspace() {
        let ks = KsDef::simple("app", 3).with_cf(CfDef::new("app", "users"));
        assert_eq!(ks.strategy_options.get("replication_factor").unwrap(), "3");
        assert_eq!(ks.cf_defs.len(), 1);
        assert!(ks.durable_writes);
    }

    #[test]
    fn test_counter_column_family() {
        assert!(CfDef::counter("app", "hits").is_counter());
        assert!(!CfDef::new("app", "users").is_counter());
    }

    #[test]
    fn test_password_credentials() {
        let auth = AuthenticationRequest::password("cassandra", "secret");
        assert_eq!(auth.credentials.get("username").unwrap(), "cassandra");
        assert_eq!(auth.credentials.get("password").unwrap(), "secret");
    }

    #[test]
    fn test_messages_serialize_to_json() {
        let column = Column::new(b"name", b"Alice", 42).with_ttl(60);
        let json = serde_json::to_value(&column).unwrap();
        assert_eq!(json["timestamp"], 42);
        assert_eq!(json["ttl"], 60);
    }
}
