/// Remote operations of a Cassandra node
use crate::error::Result;
use cassaforte_proto::{
    AuthenticationRequest, CfDef, Column, ColumnOrSuperColumn, ColumnParent, ColumnPath,
    Compression, ConsistencyLevel, CounterColumn, CqlPreparedResult, CqlResult, IndexClause,
    KeyRange, KeySlice, KsDef, Mutation, SlicePredicate, TokenRange,
};
use std::collections::HashMap;

/// Mutations grouped by row key, then by column family
pub type MutationMap = HashMap<Vec<u8>, HashMap<String, Vec<Mutation>>>;

/// One method per remote operation.
///
/// Implemented by the generated-stub binding (`RemoteCassandra`); the
/// client wrapper forwards to whatever implementation it is given. Every
/// call blocks until the node answers.
pub trait CassandraApi {
    /// Authenticate the connection
    fn login(&mut self, auth_request: AuthenticationRequest) -> Result<()>;

    /// Set the keyspace used by subsequent calls
    fn set_keyspace(&mut self, keyspace: String) -> Result<()>;

    /// Select the CQL version used by CQL calls on this connection
    fn set_cql_version(&mut self, version: String) -> Result<()>;

    /// Read a single column or super column
    fn get(
        &mut self,
        key: Vec<u8>,
        column_path: ColumnPath,
        consistency_level: ConsistencyLevel,
    ) -> Result<ColumnOrSuperColumn>;

    /// Read the columns of one row selected by a predicate
    fn get_slice(
        &mut self,
        key: Vec<u8>,
        column_parent: ColumnParent,
        predicate: SlicePredicate,
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<ColumnOrSuperColumn>>;

    /// Count the columns of one row selected by a predicate
    fn get_count(
        &mut self,
        key: Vec<u8>,
        column_parent: ColumnParent,
        predicate: SlicePredicate,
        consistency_level: ConsistencyLevel,
    ) -> Result<i32>;

    /// `get_slice` over several rows
    fn multiget_slice(
        &mut self,
        keys: Vec<Vec<u8>>,
        column_parent: ColumnParent,
        predicate: SlicePredicate,
        consistency_level: ConsistencyLevel,
    ) -> Result<HashMap<Vec<u8>, Vec<ColumnOrSuperColumn>>>;

    /// `get_count` over several rows
    fn multiget_count(
        &mut self,
        keys: Vec<Vec<u8>>,
        column_parent: ColumnParent,
        predicate: SlicePredicate,
        consistency_level: ConsistencyLevel,
    ) -> Result<HashMap<Vec<u8>, i32>>;

    /// Read a range of rows
    fn get_range_slices(
        &mut self,
        column_parent: ColumnParent,
        predicate: SlicePredicate,
        range: KeyRange,
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<KeySlice>>;

    /// Read a range of rows, starting the first row at `start_column`
    fn get_paged_slice(
        &mut self,
        column_family: String,
        range: KeyRange,
        start_column: Vec<u8>,
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<KeySlice>>;

    /// Read rows matching secondary index expressions
    fn get_indexed_slices(
        &mut self,
        column_parent: ColumnParent,
        index_clause: IndexClause,
        column_predicate: SlicePredicate,
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<KeySlice>>;

    /// Write one column
    fn insert(
        &mut self,
        key: Vec<u8>,
        column_parent: ColumnParent,
        column: Column,
        consistency_level: ConsistencyLevel,
    ) -> Result<()>;

    /// Increment a counter column
    fn add(
        &mut self,
        key: Vec<u8>,
        column_parent: ColumnParent,
        column: CounterColumn,
        consistency_level: ConsistencyLevel,
    ) -> Result<()>;

    /// Delete a column, super column or row
    fn remove(
        &mut self,
        key: Vec<u8>,
        column_path: ColumnPath,
        timestamp: i64,
        consistency_level: ConsistencyLevel,
    ) -> Result<()>;

    /// Delete a counter column
    fn remove_counter(
        &mut self,
        key: Vec<u8>,
        path: ColumnPath,
        consistency_level: ConsistencyLevel,
    ) -> Result<()>;

    /// Apply inserts and deletions across rows and column families
    fn batch_mutate(
        &mut self,
        mutation_map: MutationMap,
        consistency_level: ConsistencyLevel,
    ) -> Result<()>;

    /// Remove all data of a column family
    fn truncate(&mut self, column_family: String) -> Result<()>;

    /// Schema version → endpoints that report it
    fn describe_schema_versions(&mut self) -> Result<HashMap<String, Vec<String>>>;

    fn describe_keyspaces(&mut self) -> Result<Vec<KsDef>>;

    fn describe_cluster_name(&mut self) -> Result<String>;

    /// Version of the remote API
    fn describe_version(&mut self) -> Result<String>;

    /// Token ranges and their replicas for a keyspace
    fn describe_ring(&mut self, keyspace: String) -> Result<Vec<TokenRange>>;

    fn describe_partitioner(&mut self) -> Result<String>;

    fn describe_snitch(&mut self) -> Result<String>;

    fn describe_keyspace(&mut self, keyspace: String) -> Result<KsDef>;

    /// Split a token range into sub-ranges of roughly `keys_per_split` keys
    fn describe_splits(
        &mut self,
        column_family: String,
        start_token: String,
        end_token: String,
        keys_per_split: i32,
    ) -> Result<Vec<String>>;

    /// The system_* calls return the resulting schema version
    fn system_add_column_family(&mut self, cf_def: CfDef) -> Result<String>;

    fn system_drop_column_family(&mut self, column_family: String) -> Result<String>;

    fn system_add_keyspace(&mut self, ks_def: KsDef) -> Result<String>;

    fn system_drop_keyspace(&mut self, keyspace: String) -> Result<String>;

    fn system_update_keyspace(&mut self, ks_def: KsDef) -> Result<String>;

    fn system_update_column_family(&mut self, cf_def: CfDef) -> Result<String>;

    fn execute_cql_query(&mut self, query: Vec<u8>, compression: Compression) -> Result<CqlResult>;

    fn execute_cql3_query(
        &mut self,
        query: Vec<u8>,
        compression: Compression,
        consistency: ConsistencyLevel,
    ) -> Result<CqlResult>;

    fn prepare_cql_query(
        &mut self,
        query: Vec<u8>,
        compression: Compression,
    ) -> Result<CqlPreparedResult>;

    fn prepare_cql3_query(
        &mut self,
        query: Vec<u8>,
        compression: Compression,
    ) -> Result<CqlPreparedResult>;

    fn execute_prepared_cql_query(&mut self, item_id: i32, values: Vec<Vec<u8>>) -> Result<CqlResult>;

    fn execute_prepared_cql3_query(
        &mut self,
        item_id: i32,
        values: Vec<Vec<u8>>,
        consistency: ConsistencyLevel,
    ) -> Result<CqlResult>;
}
