/// Cassandra client wrapper
///
/// `CassandraClient` mirrors the remote operations of its delegate and the
/// lifecycle of its transport. Arguments, results and errors pass through
/// unchanged.
use crate::api::{CassandraApi, MutationMap};
use crate::config::ClientConfig;
use crate::error::{Result, TransportError};
use crate::remote::{self, RemoteCassandra};
use crate::transport::{SocketTransport, Transport};
use cassaforte_proto::{
    AuthenticationRequest, CfDef, Column, ColumnOrSuperColumn, ColumnParent, ColumnPath,
    Compression, ConsistencyLevel, CounterColumn, CqlPreparedResult, CqlResult, IndexClause,
    KeyRange, KeySlice, KsDef, SlicePredicate, TokenRange, DEFAULT_PORT,
};
use std::collections::HashMap;

/// Cassandra client
pub struct CassandraClient<C = RemoteCassandra, T = SocketTransport> {
    client: C,
    transport: T,
    hostname: Option<String>,
    port: Option<u16>,
}

impl CassandraClient {
    /// Connect to a node on the default port
    ///
    /// Opens the transport and requests the default CQL version.
    ///
    /// # Example
    /// ```no_run
    /// # use cassaforte_client::CassandraClient;
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut client = CassandraClient::connect("localhost")?;
    /// println!("Connected to {}", client.describe_cluster_name()?);
    /// client.close();
    /// # Ok(())
    /// # }
    /// ```
    pub fn connect(hostname: impl Into<String>) -> Result<Self> {
        Self::connect_with_port(hostname, DEFAULT_PORT)
    }

    /// Connect to a node on an explicit port
    pub fn connect_with_port(hostname: impl Into<String>, port: u16) -> Result<Self> {
        Self::with_config(ClientConfig::new(hostname).with_port(port))
    }

    /// Connect using a full configuration
    ///
    /// # Example
    /// ```no_run
    /// # use cassaforte_client::{CassandraClient, ClientConfig};
    /// # use std::time::Duration;
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ClientConfig::new("10.0.0.5")
    ///     .with_port(9170)
    ///     .with_connect_timeout(Duration::from_secs(5));
    ///
    /// let client = CassandraClient::with_config(config)?;
    /// assert!(client.is_open());
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let (mut client, mut transport) = remote::bind(&config)?;

        transport.open()?;
        client.set_cql_version(config.cql_version.clone())?;

        Ok(Self {
            client,
            transport,
            hostname: Some(config.hostname),
            port: Some(config.port),
        })
    }
}

impl<C: CassandraApi, T: Transport> CassandraClient<C, T> {
    /// Wrap a delegate and a transport that were set up by the caller
    ///
    /// Hostname and port are unknown to a client built this way.
    pub fn new(client: C, transport: T) -> Self {
        Self {
            client,
            transport,
            hostname: None,
            port: None,
        }
    }

    /// Host this client connected to
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Same as `hostname`
    pub fn host(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Port this client connected to
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Give back the delegate and the transport
    pub fn into_parts(self) -> (C, T) {
        (self.client, self.transport)
    }

    /// Execute a CQL query without compression
    pub fn execute_cql(&mut self, query: &str) -> Result<CqlResult> {
        self.execute_cql_with_compression(query, Compression::None)
    }

    /// Execute a CQL query with the given compression
    pub fn execute_cql_with_compression(
        &mut self,
        query: &str,
        compression: Compression,
    ) -> Result<CqlResult> {
        self.client.execute_cql_query(query.as_bytes().to_vec(), compression)
    }

    // ------------------------------------------------------------------------
    // Delegate operations
    // ------------------------------------------------------------------------

    /// Authenticate the session
    pub fn login(&mut self, auth_request: AuthenticationRequest) -> Result<()> {
        self.client.login(auth_request)
    }

    /// Use a keyspace for the rest of the session
    pub fn set_keyspace(&mut self, keyspace: String) -> Result<()> {
        self.client.set_keyspace(keyspace)
    }

    /// Ask the node for a CQL version
    pub fn set_cql_version(&mut self, version: String) -> Result<()> {
        self.client.set_cql_version(version)
    }

    /// Get a column or super column by path
    pub fn get(
        &mut self,
        key: Vec<u8>,
        column_path: ColumnPath,
        consistency_level: ConsistencyLevel,
    ) -> Result<ColumnOrSuperColumn> {
        self.client.get(key, column_path, consistency_level)
    }

    /// Columns of one row matched by a predicate
    pub fn get_slice(
        &mut self,
        key: Vec<u8>,
        column_parent: ColumnParent,
        predicate: SlicePredicate,
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<ColumnOrSuperColumn>> {
        self.client
            .get_slice(key, column_parent, predicate, consistency_level)
    }

    /// Count the columns `get_slice` would return
    pub fn get_count(
        &mut self,
        key: Vec<u8>,
        column_parent: ColumnParent,
        predicate: SlicePredicate,
        consistency_level: ConsistencyLevel,
    ) -> Result<i32> {
        self.client
            .get_count(key, column_parent, predicate, consistency_level)
    }

    /// Slice several rows at once, keyed by row key
    pub fn multiget_slice(
        &mut self,
        keys: Vec<Vec<u8>>,
        column_parent: ColumnParent,
        predicate: SlicePredicate,
        consistency_level: ConsistencyLevel,
    ) -> Result<HashMap<Vec<u8>, Vec<ColumnOrSuperColumn>>> {
        self.client
            .multiget_slice(keys, column_parent, predicate, consistency_level)
    }

    /// Column counts for several rows
    pub fn multiget_count(
        &mut self,
        keys: Vec<Vec<u8>>,
        column_parent: ColumnParent,
        predicate: SlicePredicate,
        consistency_level: ConsistencyLevel,
    ) -> Result<HashMap<Vec<u8>, i32>> {
        self.client
            .multiget_count(keys, column_parent, predicate, consistency_level)
    }

    /// Slices of the rows within a key or token range
    pub fn get_range_slices(
        &mut self,
        column_parent: ColumnParent,
        predicate: SlicePredicate,
        range: KeyRange,
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<KeySlice>> {
        self.client
            .get_range_slices(column_parent, predicate, range, consistency_level)
    }

    /// Page through a column family starting at a row and column
    pub fn get_paged_slice(
        &mut self,
        column_family: String,
        range: KeyRange,
        start_column: Vec<u8>,
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<KeySlice>> {
        self.client
            .get_paged_slice(column_family, range, start_column, consistency_level)
    }

    /// Rows matched by a secondary index clause
    pub fn get_indexed_slices(
        &mut self,
        column_parent: ColumnParent,
        index_clause: IndexClause,
        column_predicate: SlicePredicate,
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<KeySlice>> {
        self.client.get_indexed_slices(
            column_parent,
            index_clause,
            column_predicate,
            consistency_level,
        )
    }

    /// Insert a column under the given parent and key
    pub fn insert(
        &mut self,
        key: Vec<u8>,
        column_parent: ColumnParent,
        column: Column,
        consistency_level: ConsistencyLevel,
    ) -> Result<()> {
        self.client
            .insert(key, column_parent, column, consistency_level)
    }

    /// Increment a counter column
    pub fn add(
        &mut self,
        key: Vec<u8>,
        column_parent: ColumnParent,
        column: CounterColumn,
        consistency_level: ConsistencyLevel,
    ) -> Result<()> {
        self.client.add(key, column_parent, column, consistency_level)
    }

    /// Delete a column, super column or row
    pub fn remove(
        &mut self,
        key: Vec<u8>,
        column_path: ColumnPath,
        timestamp: i64,
        consistency_level: ConsistencyLevel,
    ) -> Result<()> {
        self.client
            .remove(key, column_path, timestamp, consistency_level)
    }

    /// Delete a counter column
    pub fn remove_counter(
        &mut self,
        key: Vec<u8>,
        path: ColumnPath,
        consistency_level: ConsistencyLevel,
    ) -> Result<()> {
        self.client.remove_counter(key, path, consistency_level)
    }

    /// Apply mutations across rows and column families
    pub fn batch_mutate(
        &mut self,
        mutation_map: MutationMap,
        consistency_level: ConsistencyLevel,
    ) -> Result<()> {
        self.client.batch_mutate(mutation_map, consistency_level)
    }

    /// Remove all data from a column family
    pub fn truncate(&mut self, column_family: String) -> Result<()> {
        self.client.truncate(column_family)
    }

    /// Schema versions and the endpoints reporting each
    pub fn describe_schema_versions(&mut self) -> Result<HashMap<String, Vec<String>>> {
        self.client.describe_schema_versions()
    }

    /// Definitions of every keyspace
    pub fn describe_keyspaces(&mut self) -> Result<Vec<KsDef>> {
        self.client.describe_keyspaces()
    }

    /// Name of the cluster
    pub fn describe_cluster_name(&mut self) -> Result<String> {
        self.client.describe_cluster_name()
    }

    /// Remote API version of the node
    pub fn describe_version(&mut self) -> Result<String> {
        self.client.describe_version()
    }

    /// Token ranges and their endpoints for a keyspace
    pub fn describe_ring(&mut self, keyspace: String) -> Result<Vec<TokenRange>> {
        self.client.describe_ring(keyspace)
    }

    /// Partitioner class of the cluster
    pub fn describe_partitioner(&mut self) -> Result<String> {
        self.client.describe_partitioner()
    }

    /// Snitch class of the cluster
    pub fn describe_snitch(&mut self) -> Result<String> {
        self.client.describe_snitch()
    }

    /// Definition of one keyspace
    pub fn describe_keyspace(&mut self, keyspace: String) -> Result<KsDef> {
        self.client.describe_keyspace(keyspace)
    }

    /// Tokens splitting a range into chunks of about `keys_per_split` keys
    pub fn describe_splits(
        &mut self,
        column_family: String,
        start_token: String,
        end_token: String,
        keys_per_split: i32,
    ) -> Result<Vec<String>> {
        self.client
            .describe_splits(column_family, start_token, end_token, keys_per_split)
    }

    /// Create a column family; returns the new schema version
    pub fn system_add_column_family(&mut self, cf_def: CfDef) -> Result<String> {
        self.client.system_add_column_family(cf_def)
    }

    /// Drop a column family; returns the new schema version
    pub fn system_drop_column_family(&mut self, column_family: String) -> Result<String> {
        self.client.system_drop_column_family(column_family)
    }

    /// Create a keyspace; returns the new schema version
    pub fn system_add_keyspace(&mut self, ks_def: KsDef) -> Result<String> {
        self.client.system_add_keyspace(ks_def)
    }

    /// Drop a keyspace and everything in it
    pub fn system_drop_keyspace(&mut self, keyspace: String) -> Result<String> {
        self.client.system_drop_keyspace(keyspace)
    }

    /// Alter a keyspace definition
    pub fn system_update_keyspace(&mut self, ks_def: KsDef) -> Result<String> {
        self.client.system_update_keyspace(ks_def)
    }

    /// Alter a column family definition
    pub fn system_update_column_family(&mut self, cf_def: CfDef) -> Result<String> {
        self.client.system_update_column_family(cf_def)
    }

    /// Execute a raw CQL 2 query
    pub fn execute_cql_query(&mut self, query: Vec<u8>, compression: Compression) -> Result<CqlResult> {
        self.client.execute_cql_query(query, compression)
    }

    /// Execute a raw CQL 3 query at the given consistency
    pub fn execute_cql3_query(
        &mut self,
        query: Vec<u8>,
        compression: Compression,
        consistency: ConsistencyLevel,
    ) -> Result<CqlResult> {
        self.client
            .execute_cql3_query(query, compression, consistency)
    }

    /// Prepare a CQL 2 statement for repeated execution
    pub fn prepare_cql_query(
        &mut self,
        query: Vec<u8>,
        compression: Compression,
    ) -> Result<CqlPreparedResult> {
        self.client.prepare_cql_query(query, compression)
    }

    /// Prepare a CQL 3 statement
    pub fn prepare_cql3_query(
        &mut self,
        query: Vec<u8>,
        compression: Compression,
    ) -> Result<CqlPreparedResult> {
        self.client.prepare_cql3_query(query, compression)
    }

    /// Run a prepared CQL 2 statement with bound values
    pub fn execute_prepared_cql_query(
        &mut self,
        item_id: i32,
        values: Vec<Vec<u8>>,
    ) -> Result<CqlResult> {
        self.client.execute_prepared_cql_query(item_id, values)
    }

    /// Run a prepared CQL 3 statement with bound values
    pub fn execute_prepared_cql3_query(
        &mut self,
        item_id: i32,
        values: Vec<Vec<u8>>,
        consistency: ConsistencyLevel,
    ) -> Result<CqlResult> {
        self.client
            .execute_prepared_cql3_query(item_id, values, consistency)
    }

    // ------------------------------------------------------------------------
    // Transport operations
    // ------------------------------------------------------------------------

    /// Open the transport
    pub fn open(&mut self) -> std::result::Result<(), TransportError> {
        self.transport.open()
    }

    /// Close the transport; does nothing if it is already closed
    pub fn close(&mut self) {
        self.transport.close()
    }

    /// Flush the transport
    pub fn flush(&mut self) -> std::result::Result<(), TransportError> {
        self.transport.flush()
    }

    /// Whether the transport is open. A lost connection closes it.
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CassandraError;
    use cassaforte_proto::{CqlResultType, Mutation, TokenRange};

    /// Delegate that records every call and answers from its arguments
    #[derive(Default)]
    struct RecordingApi {
        calls: Vec<String>,
        fail_with: Option<fn() -> CassandraError>,
    }

    impl RecordingApi {
        fn failing(fail_with: fn() -> CassandraError) -> Self {
            Self {
                calls: Vec::new(),
                fail_with: Some(fail_with),
            }
        }

        fn record(&mut self, call: String) -> Result<()> {
            self.calls.push(call);
            match self.fail_with {
                Some(make_error) => Err(make_error()),
                None => Ok(()),
            }
        }
    }

    fn column(name: &[u8], value: &[u8]) -> ColumnOrSuperColumn {
        ColumnOrSuperColumn::from_column(Column::new(name, value, 1))
    }

    impl CassandraApi for RecordingApi {
        fn login(&mut self, auth_request: AuthenticationRequest) -> Result<()> {
            let mut credentials: Vec<_> = auth_request.credentials.into_iter().collect();
            credentials.sort();
            self.record(format!("login {:?}", credentials))
        }

        fn set_keyspace(&mut self, keyspace: String) -> Result<()> {
            self.record(format!("set_keyspace {}", keyspace))
        }

        fn set_cql_version(&mut self, version: String) -> Result<()> {
            self.record(format!("set_cql_version {}", version))
        }

        fn get(
            &mut self,
            key: Vec<u8>,
            column_path: ColumnPath,
            consistency_level: ConsistencyLevel,
        ) -> Result<ColumnOrSuperColumn> {
            self.record(format!("get {:?} {:?} {:?}", key, column_path, consistency_level))?;
            Ok(column(&column_path.column, &key))
        }

        fn get_slice(
            &mut self,
            key: Vec<u8>,
            column_parent: ColumnParent,
            predicate: SlicePredicate,
            consistency_level: ConsistencyLevel,
        ) -> Result<Vec<ColumnOrSuperColumn>> {
            self.record(format!(
                "get_slice {:?} {:?} {:?} {:?}",
                key, column_parent, predicate, consistency_level
            ))?;
            Ok(predicate
                .column_names
                .iter()
                .map(|name| column(name, &key))
                .collect())
        }

        fn get_count(
            &mut self,
            key: Vec<u8>,
            column_parent: ColumnParent,
            predicate: SlicePredicate,
            consistency_level: ConsistencyLevel,
        ) -> Result<i32> {
            self.record(format!(
                "get_count {:?} {:?} {:?} {:?}",
                key, column_parent, predicate, consistency_level
            ))?;
            Ok(predicate.column_names.len() as i32)
        }

        fn multiget_slice(
            &mut self,
            keys: Vec<Vec<u8>>,
            column_parent: ColumnParent,
            predicate: SlicePredicate,
            consistency_level: ConsistencyLevel,
        ) -> Result<HashMap<Vec<u8>, Vec<ColumnOrSuperColumn>>> {
            self.record(format!(
                "multiget_slice {:?} {:?} {:?} {:?}",
                keys, column_parent, predicate, consistency_level
            ))?;
            Ok(keys
                .into_iter()
                .map(|key| {
                    let columns = vec![column(b"k", &key)];
                    (key, columns)
                })
                .collect())
        }

        fn multiget_count(
            &mut self,
            keys: Vec<Vec<u8>>,
            column_parent: ColumnParent,
            predicate: SlicePredicate,
            consistency_level: ConsistencyLevel,
        ) -> Result<HashMap<Vec<u8>, i32>> {
            self.record(format!(
                "multiget_count {:?} {:?} {:?} {:?}",
                keys, column_parent, predicate, consistency_level
            ))?;
            Ok(keys.into_iter().map(|key| (key.clone(), key.len() as i32)).collect())
        }

        fn get_range_slices(
            &mut self,
            column_parent: ColumnParent,
            predicate: SlicePredicate,
            range: KeyRange,
            consistency_level: ConsistencyLevel,
        ) -> Result<Vec<KeySlice>> {
            self.record(format!(
                "get_range_slices {:?} {:?} {:?} {:?}",
                column_parent, predicate, range, consistency_level
            ))?;
            Ok(vec![KeySlice {
                key: range.start_key,
                columns: Vec::new(),
            }])
        }

        fn get_paged_slice(
            &mut self,
            column_family: String,
            range: KeyRange,
            start_column: Vec<u8>,
            consistency_level: ConsistencyLevel,
        ) -> Result<Vec<KeySlice>> {
            self.record(format!(
                "get_paged_slice {} {:?} {:?} {:?}",
                column_family, range, start_column, consistency_level
            ))?;
            Ok(vec![KeySlice {
                key: range.start_key,
                columns: vec![column(&start_column, b"")],
            }])
        }

        fn get_indexed_slices(
            &mut self,
            column_parent: ColumnParent,
            index_clause: IndexClause,
            column_predicate: SlicePredicate,
            consistency_level: ConsistencyLevel,
        ) -> Result<Vec<KeySlice>> {
            self.record(format!(
                "get_indexed_slices {:?} {:?} {:?} {:?}",
                column_parent, index_clause, column_predicate, consistency_level
            ))?;
            Ok(vec![KeySlice {
                key: index_clause.start_key,
                columns: Vec::new(),
            }])
        }

        fn insert(
            &mut self,
            key: Vec<u8>,
            column_parent: ColumnParent,
            column: Column,
            consistency_level: ConsistencyLevel,
        ) -> Result<()> {
            self.record(format!(
                "insert {:?} {:?} {:?} {:?}",
                key, column_parent, column, consistency_level
            ))
        }

        fn add(
            &mut self,
            key: Vec<u8>,
            column_parent: ColumnParent,
            column: CounterColumn,
            consistency_level: ConsistencyLevel,
        ) -> Result<()> {
            self.record(format!(
                "add {:?} {:?} {:?} {:?}",
                key, column_parent, column, consistency_level
            ))
        }

        fn remove(
            &mut self,
            key: Vec<u8>,
            column_path: ColumnPath,
            timestamp: i64,
            consistency_level: ConsistencyLevel,
        ) -> Result<()> {
            self.record(format!(
                "remove {:?} {:?} {} {:?}",
                key, column_path, timestamp, consistency_level
            ))
        }

        fn remove_counter(
            &mut self,
            key: Vec<u8>,
            path: ColumnPath,
            consistency_level: ConsistencyLevel,
        ) -> Result<()> {
            self.record(format!("remove_counter {:?} {:?} {:?}", key, path, consistency_level))
        }

        fn batch_mutate(
            &mut self,
            mutation_map: MutationMap,
            consistency_level: ConsistencyLevel,
        ) -> Result<()> {
            let mut rows: Vec<_> = mutation_map.keys().cloned().collect();
            rows.sort();
            self.record(format!("batch_mutate {:?} {:?}", rows, consistency_level))
        }

        fn truncate(&mut self, column_family: String) -> Result<()> {
            self.record(format!("truncate {}", column_family))
        }

        fn describe_schema_versions(&mut self) -> Result<HashMap<String, Vec<String>>> {
            self.record("describe_schema_versions".to_string())?;
            let mut versions = HashMap::new();
            versions.insert("v1".to_string(), vec!["127.0.0.1".to_string()]);
            Ok(versions)
        }

        fn describe_keyspaces(&mut self) -> Result<Vec<KsDef>> {
            self.record("describe_keyspaces".to_string())?;
            Ok(vec![KsDef::simple("system", 1)])
        }

        fn describe_cluster_name(&mut self) -> Result<String> {
            self.record("describe_cluster_name".to_string())?;
            Ok("Recording Cluster".to_string())
        }

        fn describe_version(&mut self) -> Result<String> {
            self.record("describe_version".to_string())?;
            Ok("19.36.0".to_string())
        }

        fn describe_ring(&mut self, keyspace: String) -> Result<Vec<TokenRange>> {
            self.record(format!("describe_ring {}", keyspace))?;
            Ok(vec![TokenRange {
                start_token: "0".to_string(),
                end_token: keyspace,
                ..Default::default()
            }])
        }

        fn describe_partitioner(&mut self) -> Result<String> {
            self.record("describe_partitioner".to_string())?;
            Ok("Murmur3Partitioner".to_string())
        }

        fn describe_snitch(&mut self) -> Result<String> {
            self.record("describe_snitch".to_string())?;
            Ok("SimpleSnitch".to_string())
        }

        fn describe_keyspace(&mut self, keyspace: String) -> Result<KsDef> {
            self.record(format!("describe_keyspace {}", keyspace))?;
            Ok(KsDef::simple(keyspace, 3))
        }

        fn describe_splits(
            &mut self,
            column_family: String,
            start_token: String,
            end_token: String,
            keys_per_split: i32,
        ) -> Result<Vec<String>> {
            self.record(format!(
                "describe_splits {} {} {} {}",
                column_family, start_token, end_token, keys_per_split
            ))?;
            Ok(vec![start_token, end_token])
        }

        fn system_add_column_family(&mut self, cf_def: CfDef) -> Result<String> {
            self.record(format!("system_add_column_family {:?}", cf_def))?;
            Ok(format!("added {}", cf_def.name))
        }

        fn system_drop_column_family(&mut self, column_family: String) -> Result<String> {
            self.record(format!("system_drop_column_family {}", column_family))?;
            Ok(format!("dropped {}", column_family))
        }

        fn system_add_keyspace(&mut self, ks_def: KsDef) -> Result<String> {
            self.record(format!("system_add_keyspace {}", ks_def.name))?;
            Ok(format!("added {}", ks_def.name))
        }

        fn system_drop_keyspace(&mut self, keyspace: String) -> Result<String> {
            self.record(format!("system_drop_keyspace {}", keyspace))?;
            Ok(format!("dropped {}", keyspace))
        }

        fn system_update_keyspace(&mut self, ks_def: KsDef) -> Result<String> {
            self.record(format!("system_update_keyspace {}", ks_def.name))?;
            Ok(format!("updated {}", ks_def.name))
        }

        fn system_update_column_family(&mut self, cf_def: CfDef) -> Result<String> {
            self.record(format!("system_update_column_family {}", cf_def.name))?;
            Ok(format!("updated {}", cf_def.name))
        }

        fn execute_cql_query(&mut self, query: Vec<u8>, compression: Compression) -> Result<CqlResult> {
            self.record(format!("execute_cql_query {:?} {:?}", query, compression))?;
            Ok(CqlResult {
                num: query.len() as i32,
                result_type: CqlResultType::Int as i32,
                ..Default::default()
            })
        }

        fn execute_cql3_query(
            &mut self,
            query: Vec<u8>,
            compression: Compression,
            consistency: ConsistencyLevel,
        ) -> Result<CqlResult> {
            self.record(format!(
                "execute_cql3_query {:?} {:?} {:?}",
                query, compression, consistency
            ))?;
            Ok(CqlResult::void())
        }

        fn prepare_cql_query(
            &mut self,
            query: Vec<u8>,
            compression: Compression,
        ) -> Result<CqlPreparedResult> {
            self.record(format!("prepare_cql_query {:?} {:?}", query, compression))?;
            Ok(CqlPreparedResult {
                item_id: 7,
                count: query.iter().filter(|b| **b == b'?').count() as i32,
                ..Default::default()
            })
        }

        fn prepare_cql3_query(
            &mut self,
            query: Vec<u8>,
            compression: Compression,
        ) -> Result<CqlPreparedResult> {
            self.record(format!("prepare_cql3_query {:?} {:?}", query, compression))?;
            Ok(CqlPreparedResult {
                item_id: 8,
                ..Default::default()
            })
        }

        fn execute_prepared_cql_query(&mut self, item_id: i32, values: Vec<Vec<u8>>) -> Result<CqlResult> {
            self.record(format!("execute_prepared_cql_query {} {:?}", item_id, values))?;
            Ok(CqlResult {
                num: item_id,
                ..Default::default()
            })
        }

        fn execute_prepared_cql3_query(
            &mut self,
            item_id: i32,
            values: Vec<Vec<u8>>,
            consistency: ConsistencyLevel,
        ) -> Result<CqlResult> {
            self.record(format!(
                "execute_prepared_cql3_query {} {:?} {:?}",
                item_id, values, consistency
            ))?;
            Ok(CqlResult {
                num: values.len() as i32,
                ..Default::default()
            })
        }
    }

    /// Transport that only tracks whether it is open
    #[derive(Default)]
    struct MemoryTransport {
        open: bool,
        flushes: usize,
    }

    impl Transport for MemoryTransport {
        fn open(&mut self) -> std::result::Result<(), TransportError> {
            if self.open {
                return Err(TransportError::AlreadyOpen);
            }
            self.open = true;
            Ok(())
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn flush(&mut self) -> std::result::Result<(), TransportError> {
            if !self.open {
                return Err(TransportError::NotOpen);
            }
            self.flushes += 1;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    fn wrapped() -> CassandraClient<RecordingApi, MemoryTransport> {
        CassandraClient::new(RecordingApi::default(), MemoryTransport::default())
    }

    /// Run `op` through the wrapper and directly on a fresh delegate, then
    /// compare results and the calls the delegate saw
    fn assert_passthrough<R, W, D>(wrapper_op: W, direct_op: D)
    where
        R: PartialEq + std::fmt::Debug,
        W: FnOnce(&mut CassandraClient<RecordingApi, MemoryTransport>) -> Result<R>,
        D: FnOnce(&mut RecordingApi) -> Result<R>,
    {
        let mut client = wrapped();
        let mut direct = RecordingApi::default();

        let through_wrapper = wrapper_op(&mut client).unwrap();
        let called_directly = direct_op(&mut direct).unwrap();
        assert_eq!(through_wrapper, called_directly);

        let (delegate, _) = client.into_parts();
        assert_eq!(delegate.calls, direct.calls);
        assert_eq!(delegate.calls.len(), 1);
    }

    #[test]
    fn test_reads_pass_through() {
        let cl = ConsistencyLevel::Quorum;

        assert_passthrough(
            |c| c.get(b"row".to_vec(), ColumnPath::column("users", b"name"), cl),
            |d| d.get(b"row".to_vec(), ColumnPath::column("users", b"name"), cl),
        );
        assert_passthrough(
            |c| c.get_slice(b"row".to_vec(), ColumnParent::new("users"), SlicePredicate::names(["a", "b"]), cl),
            |d| d.get_slice(b"row".to_vec(), ColumnParent::new("users"), SlicePredicate::names(["a", "b"]), cl),
        );
        assert_passthrough(
            |c| c.get_count(b"row".to_vec(), ColumnParent::new("users"), SlicePredicate::names(["a"]), cl),
            |d| d.get_count(b"row".to_vec(), ColumnParent::new("users"), SlicePredicate::names(["a"]), cl),
        );
        assert_passthrough(
            |c| c.multiget_slice(vec![b"r1".to_vec(), b"r2".to_vec()], ColumnParent::new("users"), SlicePredicate::all(10), cl),
            |d| d.multiget_slice(vec![b"r1".to_vec(), b"r2".to_vec()], ColumnParent::new("users"), SlicePredicate::all(10), cl),
        );
        assert_passthrough(
            |c| c.multiget_count(vec![b"r1".to_vec(), b"row2".to_vec()], ColumnParent::new("users"), SlicePredicate::all(10), cl),
            |d| d.multiget_count(vec![b"r1".to_vec(), b"row2".to_vec()], ColumnParent::new("users"), SlicePredicate::all(10), cl),
        );
        assert_passthrough(
            |c| c.get_range_slices(ColumnParent::new("users"), SlicePredicate::all(5), KeyRange::keys(b"a", b"z", 100), cl),
            |d| d.get_range_slices(ColumnParent::new("users"), SlicePredicate::all(5), KeyRange::keys(b"a", b"z", 100), cl),
        );
        assert_passthrough(
            |c| c.get_paged_slice("users".to_string(), KeyRange::keys(b"a", b"", 10), b"col".to_vec(), cl),
            |d| d.get_paged_slice("users".to_string(), KeyRange::keys(b"a", b"", 10), b"col".to_vec(), cl),
        );

        let clause = IndexClause {
            expressions: vec![cassaforte_proto::IndexExpression::new(
                b"state",
                cassaforte_proto::IndexOperator::Eq,
                b"CA",
            )],
            start_key: b"a".to_vec(),
            count: 10,
        };
        assert_passthrough(
            |c| c.get_indexed_slices(ColumnParent::new("users"), clause.clone(), SlicePredicate::all(3), cl),
            |d| d.get_indexed_slices(ColumnParent::new("users"), clause.clone(), SlicePredicate::all(3), cl),
        );
    }

    #[test]
    fn test_writes_pass_through() {
        let cl = ConsistencyLevel::All;

        assert_passthrough(
            |c| c.insert(b"row".to_vec(), ColumnParent::new("users"), Column::new(b"name", b"Alice", 10), cl),
            |d| d.insert(b"row".to_vec(), ColumnParent::new("users"), Column::new(b"name", b"Alice", 10), cl),
        );
        assert_passthrough(
            |c| c.add(b"row".to_vec(), ColumnParent::new("hits"), CounterColumn::new(b"home", 3), cl),
            |d| d.add(b"row".to_vec(), ColumnParent::new("hits"), CounterColumn::new(b"home", 3), cl),
        );
        assert_passthrough(
            |c| c.remove(b"row".to_vec(), ColumnPath::row("users"), 99, cl),
            |d| d.remove(b"row".to_vec(), ColumnPath::row("users"), 99, cl),
        );
        assert_passthrough(
            |c| c.remove_counter(b"row".to_vec(), ColumnPath::column("hits", b"home"), cl),
            |d| d.remove_counter(b"row".to_vec(), ColumnPath::column("hits", b"home"), cl),
        );

        let mutations = || {
            let mut by_family = HashMap::new();
            by_family.insert(
                "users".to_string(),
                vec![Mutation::insert(Column::new(b"name", b"Bob", 11))],
            );
            let mut map = MutationMap::new();
            map.insert(b"row1".to_vec(), by_family.clone());
            map.insert(b"row2".to_vec(), by_family);
            map
        };
        assert_passthrough(
            |c| c.batch_mutate(mutations(), cl),
            |d| d.batch_mutate(mutations(), cl),
        );
        assert_passthrough(
            |c| c.truncate("users".to_string()),
            |d| d.truncate("users".to_string()),
        );
    }

    #[test]
    fn test_introspection_passes_through() {
        assert_passthrough(|c| c.describe_schema_versions(), |d| d.describe_schema_versions());
        assert_passthrough(|c| c.describe_keyspaces(), |d| d.describe_keyspaces());
        assert_passthrough(|c| c.describe_cluster_name(), |d| d.describe_cluster_name());
        assert_passthrough(|c| c.describe_version(), |d| d.describe_version());
        assert_passthrough(|c| c.describe_partitioner(), |d| d.describe_partitioner());
        assert_passthrough(|c| c.describe_snitch(), |d| d.describe_snitch());
        assert_passthrough(
            |c| c.describe_ring("app".to_string()),
            |d| d.describe_ring("app".to_string()),
        );
        assert_passthrough(
            |c| c.describe_keyspace("app".to_string()),
            |d| d.describe_keyspace("app".to_string()),
        );
        assert_passthrough(
            |c| c.describe_splits("users".to_string(), "0".to_string(), "100".to_string(), 10),
            |d| d.describe_splits("users".to_string(), "0".to_string(), "100".to_string(), 10),
        );
    }

    #[test]
    fn test_schema_changes_pass_through() {
        assert_passthrough(
            |c| c.system_add_column_family(CfDef::new("app", "users")),
            |d| d.system_add_column_family(CfDef::new("app", "users")),
        );
        assert_passthrough(
            |c| c.system_drop_column_family("users".to_string()),
            |d| d.system_drop_column_family("users".to_string()),
        );
        assert_passthrough(
            |c| c.system_add_keyspace(KsDef::simple("app", 1)),
            |d| d.system_add_keyspace(KsDef::simple("app", 1)),
        );
        assert_passthrough(
            |c| c.system_drop_keyspace("app".to_string()),
            |d| d.system_drop_keyspace("app".to_string()),
        );
        assert_passthrough(
            |c| c.system_update_keyspace(KsDef::simple("app", 2)),
            |d| d.system_update_keyspace(KsDef::simple("app", 2)),
        );
        assert_passthrough(
            |c| c.system_update_column_family(CfDef::new("app", "users")),
            |d| d.system_update_column_family(CfDef::new("app", "users")),
        );
    }

    #[test]
    fn test_session_calls_pass_through() {
        assert_passthrough(
            |c| c.login(AuthenticationRequest::password("cassandra", "cassandra")),
            |d| d.login(AuthenticationRequest::password("cassandra", "cassandra")),
        );
        assert_passthrough(
            |c| c.set_keyspace("app".to_string()),
            |d| d.set_keyspace("app".to_string()),
        );
        assert_passthrough(
            |c| c.set_cql_version("3.0.0".to_string()),
            |d| d.set_cql_version("3.0.0".to_string()),
        );
    }

    #[test]
    fn test_cql_passes_through() {
        let query = b"SELECT * FROM users WHERE KEY = ?".to_vec();
        let cl = ConsistencyLevel::LocalQuorum;

        assert_passthrough(
            |c| c.execute_cql_query(query.clone(), Compression::Gzip),
            |d| d.execute_cql_query(query.clone(), Compression::Gzip),
        );
        assert_passthrough(
            |c| c.execute_cql3_query(query.clone(), Compression::None, cl),
            |d| d.execute_cql3_query(query.clone(), Compression::None, cl),
        );
        assert_passthrough(
            |c| c.prepare_cql_query(query.clone(), Compression::None),
            |d| d.prepare_cql_query(query.clone(), Compression::None),
        );
        assert_passthrough(
            |c| c.prepare_cql3_query(query.clone(), Compression::None),
            |d| d.prepare_cql3_query(query.clone(), Compression::None),
        );
        assert_passthrough(
            |c| c.execute_prepared_cql_query(7, vec![b"row".to_vec()]),
            |d| d.execute_prepared_cql_query(7, vec![b"row".to_vec()]),
        );
        assert_passthrough(
            |c| c.execute_prepared_cql3_query(8, vec![b"a".to_vec(), b"b".to_vec()], cl),
            |d| d.execute_prepared_cql3_query(8, vec![b"a".to_vec(), b"b".to_vec()], cl),
        );
    }

    #[test]
    fn test_execute_cql_encodes_utf8_without_compression() {
        let query = "SELECT * FROM straße";

        assert_passthrough(
            |c| c.execute_cql(query),
            |d| d.execute_cql_query(query.as_bytes().to_vec(), Compression::None),
        );
        assert_passthrough(
            |c| c.execute_cql_with_compression(query, Compression::Gzip),
            |d| d.execute_cql_query(query.as_bytes().to_vec(), Compression::Gzip),
        );
    }

    #[test]
    fn test_errors_propagate_unchanged() {
        let failures: [fn() -> CassandraError; 5] = [
            || CassandraError::InvalidRequest("bad column family".to_string()),
            || CassandraError::NotFound("no such column".to_string()),
            || CassandraError::Unavailable("1 replica alive".to_string()),
            || CassandraError::TimedOut("rpc timeout".to_string()),
            || CassandraError::SchemaDisagreement("2 versions".to_string()),
        ];

        for make_error in failures {
            let mut client = CassandraClient::new(
                RecordingApi::failing(make_error),
                MemoryTransport::default(),
            );
            let mut direct = RecordingApi::failing(make_error);

            let through_wrapper = client
                .get(b"row".to_vec(), ColumnPath::column("users", b"name"), ConsistencyLevel::One)
                .unwrap_err();
            let called_directly = direct
                .get(b"row".to_vec(), ColumnPath::column("users", b"name"), ConsistencyLevel::One)
                .unwrap_err();

            assert_eq!(through_wrapper.code(), called_directly.code());
            assert_eq!(through_wrapper.to_string(), called_directly.to_string());

            // No retry
            let (delegate, _) = client.into_parts();
            assert_eq!(delegate.calls.len(), 1);
        }
    }

    #[test]
    fn test_transport_lifecycle_passes_through() {
        let mut client = wrapped();
        assert!(!client.is_open());
        assert!(matches!(client.flush(), Err(TransportError::NotOpen)));

        client.open().unwrap();
        assert!(client.is_open());
        assert!(matches!(client.open(), Err(TransportError::AlreadyOpen)));

        client.flush().unwrap();
        client.flush().unwrap();

        client.close();
        assert!(!client.is_open());

        let (delegate, transport) = client.into_parts();
        assert_eq!(transport.flushes, 2);
        assert!(delegate.calls.is_empty());
    }

    #[test]
    fn test_parts_constructor_has_no_address() {
        let client = wrapped();
        assert_eq!(client.hostname(), None);
        assert_eq!(client.host(), None);
        assert_eq!(client.port(), None);
    }

    #[test]
    fn test_connection_parameters_are_stable() {
        let mut client = CassandraClient {
            client: RecordingApi::default(),
            transport: MemoryTransport::default(),
            hostname: Some("db1".to_string()),
            port: Some(9160),
        };

        client.open().unwrap();
        client.set_keyspace("app".to_string()).unwrap();
        client.describe_ring("app".to_string()).unwrap();
        client.close();

        assert_eq!(client.hostname(), Some("db1"));
        assert_eq!(client.host(), client.hostname());
        assert_eq!(client.port(), Some(9160));
    }

    #[test]
    fn test_connect_fails_without_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = CassandraClient::connect_with_port("127.0.0.1", port).err().unwrap();
        assert!(matches!(
            err,
            CassandraError::Transport(TransportError::ConnectFailed(_))
        ));
    }

    #[test]
    fn test_connect_rejects_invalid_config() {
        let err = CassandraClient::connect_with_port("127.0.0.1", 0).err().unwrap();
        assert!(matches!(
            err,
            CassandraError::Transport(TransportError::InvalidConfig(_))
        ));
    }
}
