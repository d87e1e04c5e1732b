/// CassandraApi over the generated gRPC stub
use crate::api::{CassandraApi, MutationMap};
use crate::config::ClientConfig;
use crate::error::{CassandraError, Result, TransportError};
use crate::transport::{error_chain, Socket, SocketTransport};
use cassaforte_proto::{
    self as proto, cassandra_client::CassandraClient as Stub, AuthenticationRequest, CfDef, Column,
    ColumnOrSuperColumn, ColumnParent, ColumnPath, Compression, ConsistencyLevel, CounterColumn,
    CqlPreparedResult, CqlResult, IndexClause, KeyRange, KeySlice, KsDef, SlicePredicate,
    TokenRange,
};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tonic::transport::{Channel, TimeoutExpired};
use tonic::{Response, Status};
use tracing::{debug, trace, warn};

/// Build a stub and its transport from one configuration.
///
/// The pair shares a single socket; nothing is connected until the
/// transport is opened.
pub fn bind(config: &ClientConfig) -> std::result::Result<(RemoteCassandra, SocketTransport), TransportError> {
    config.validate().map_err(TransportError::InvalidConfig)?;

    let socket = Arc::new(Socket::new(config)?);
    Ok((
        RemoteCassandra {
            socket: Arc::clone(&socket),
        },
        SocketTransport::new(socket),
    ))
}

/// Generated stub bound to a `SocketTransport`
pub struct RemoteCassandra {
    socket: Arc<Socket>,
}

impl RemoteCassandra {
    /// Issue one call on the open channel and wait for the answer
    fn call<R, F, Fut>(&self, method: &'static str, f: F) -> Result<R>
    where
        F: FnOnce(Stub<Channel>) -> Fut,
        Fut: Future<Output = std::result::Result<Response<R>, Status>>,
    {
        let channel = self.socket.channel()?;
        let stub = Stub::new(channel)
            .max_decoding_message_size(self.socket.max_frame_size())
            .max_encoding_message_size(self.socket.max_frame_size());

        trace!(method, "Remote call");
        match self.socket.block_on(f(stub)) {
            Ok(response) => Ok(response.into_inner()),
            Err(status) => {
                if let Some(err) = connection_failure(&status) {
                    warn!(method, address = self.socket.address(), error = %err, "Connection lost");
                    self.socket.disconnect();
                    return Err(TransportError::Io(err).into());
                }
                debug!(method, code = ?status.code(), error = status.message(), "Remote call failed");
                Err(status.into())
            }
        }
    }
}

/// Statuses raised by the local connection carry the underlying error as
/// their source; statuses sent by the node do not. An expired request
/// timeout leaves the connection usable and is reported as a status.
fn connection_failure(status: &Status) -> Option<io::Error> {
    let source = StdError::source(status)?;

    let mut kind = io::ErrorKind::ConnectionAborted;
    let mut cause = Some(source);
    while let Some(err) = cause {
        if err.is::<TimeoutExpired>() {
            return None;
        }
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            kind = io_err.kind();
        }
        cause = err.source();
    }

    Some(io::Error::new(kind, error_chain(source)))
}

fn missing_result(method: &str) -> CassandraError {
    CassandraError::Application(format!("{} failed: unknown result", method))
}

fn key_slices(slices: Vec<KeySlice>) -> HashMap<Vec<u8>, Vec<ColumnOrSuperColumn>> {
    slices.into_iter().map(|s| (s.key, s.columns)).collect()
}

impl CassandraApi for RemoteCassandra {
    fn login(&mut self, auth_request: AuthenticationRequest) -> Result<()> {
        let request = proto::LoginRequest {
            auth_request: Some(auth_request),
        };
        self.call("login", move |mut stub| async move { stub.login(request).await })
            .map(|_| ())
    }

    fn set_keyspace(&mut self, keyspace: String) -> Result<()> {
        let request = proto::SetKeyspaceRequest { keyspace };
        self.call("set_keyspace", move |mut stub| async move { stub.set_keyspace(request).await })
            .map(|_| ())
    }

    fn set_cql_version(&mut self, version: String) -> Result<()> {
        let request = proto::SetCqlVersionRequest { version };
        self.call("set_cql_version", move |mut stub| async move {
            stub.set_cql_version(request).await
        })
        .map(|_| ())
    }

    fn get(
        &mut self,
        key: Vec<u8>,
        column_path: ColumnPath,
        consistency_level: ConsistencyLevel,
    ) -> Result<ColumnOrSuperColumn> {
        let request = proto::GetRequest {
            key,
            column_path: Some(column_path),
            consistency_level: consistency_level as i32,
        };

        self.call("get", move |mut stub| async move { stub.get(request).await })?
            .column
            .ok_or_else(|| missing_result("get"))
    }

    fn get_slice(
        &mut self,
        key: Vec<u8>,
        column_parent: ColumnParent,
        predicate: SlicePredicate,
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<ColumnOrSuperColumn>> {
        let request = proto::GetSliceRequest {
            key,
            column_parent: Some(column_parent),
            predicate: Some(predicate),
            consistency_level: consistency_level as i32,
        };

        self.call("get_slice", move |mut stub| async move { stub.get_slice(request).await })
            .map(|response| response.columns)
    }

    fn get_count(
        &mut self,
        key: Vec<u8>,
        column_parent: ColumnParent,
        predicate: SlicePredicate,
        consistency_level: ConsistencyLevel,
    ) -> Result<i32> {
        let request = proto::GetCountRequest {
            key,
            column_parent: Some(column_parent),
            predicate: Some(predicate),
            consistency_level: consistency_level as i32,
        };

        self.call("get_count", move |mut stub| async move { stub.get_count(request).await })
            .map(|response| response.count)
    }

    fn multiget_slice(
        &mut self,
        keys: Vec<Vec<u8>>,
        column_parent: ColumnParent,
        predicate: SlicePredicate,
        consistency_level: ConsistencyLevel,
    ) -> Result<HashMap<Vec<u8>, Vec<ColumnOrSuperColumn>>> {
        let request = proto::MultigetSliceRequest {
            keys,
            column_parent: Some(column_parent),
            predicate: Some(predicate),
            consistency_level: consistency_level as i32,
        };

        self.call("multiget_slice", move |mut stub| async move {
            stub.multiget_slice(request).await
        })
        .map(|response| key_slices(response.slices))
    }

    fn multiget_count(
        &mut self,
        keys: Vec<Vec<u8>>,
        column_parent: ColumnParent,
        predicate: SlicePredicate,
        consistency_level: ConsistencyLevel,
    ) -> Result<HashMap<Vec<u8>, i32>> {
        let request = proto::MultigetCountRequest {
            keys,
            column_parent: Some(column_parent),
            predicate: Some(predicate),
            consistency_level: consistency_level as i32,
        };

        self.call("multiget_count", move |mut stub| async move {
            stub.multiget_count(request).await
        })
        .map(|response| {
            response
                .counts
                .into_iter()
                .map(|c| (c.key, c.count))
                .collect()
        })
    }

    fn get_range_slices(
        &mut self,
        column_parent: ColumnParent,
        predicate: SlicePredicate,
        range: KeyRange,
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<KeySlice>> {
        let request = proto::GetRangeSlicesRequest {
            column_parent: Some(column_parent),
            predicate: Some(predicate),
            range: Some(range),
            consistency_level: consistency_level as i32,
        };

        self.call("get_range_slices", move |mut stub| async move {
            stub.get_range_slices(request).await
        })
        .map(|response| response.slices)
    }

    fn get_paged_slice(
        &mut self,
        column_family: String,
        range: KeyRange,
        start_column: Vec<u8>,
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<KeySlice>> {
        let request = proto::GetPagedSliceRequest {
            column_family,
            range: Some(range),
            start_column,
            consistency_level: consistency_level as i32,
        };

        self.call("get_paged_slice", move |mut stub| async move {
            stub.get_paged_slice(request).await
        })
        .map(|response| response.slices)
    }

    fn get_indexed_slices(
        &mut self,
        column_parent: ColumnParent,
        index_clause: IndexClause,
        column_predicate: SlicePredicate,
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<KeySlice>> {
        let request = proto::GetIndexedSlicesRequest {
            column_parent: Some(column_parent),
            index_clause: Some(index_clause),
            column_predicate: Some(column_predicate),
            consistency_level: consistency_level as i32,
        };

        self.call("get_indexed_slices", move |mut stub| async move {
            stub.get_indexed_slices(request).await
        })
        .map(|response| response.slices)
    }

    fn insert(
        &mut self,
        key: Vec<u8>,
        column_parent: ColumnParent,
        column: Column,
        consistency_level: ConsistencyLevel,
    ) -> Result<()> {
        let request = proto::InsertRequest {
            key,
            column_parent: Some(column_parent),
            column: Some(column),
            consistency_level: consistency_level as i32,
        };

        self.call("insert", move |mut stub| async move { stub.insert(request).await })
            .map(|_| ())
    }

    fn add(
        &mut self,
        key: Vec<u8>,
        column_parent: ColumnParent,
        column: CounterColumn,
        consistency_level: ConsistencyLevel,
    ) -> Result<()> {
        let request = proto::AddRequest {
            key,
            column_parent: Some(column_parent),
            column: Some(column),
            consistency_level: consistency_level as i32,
        };

        self.call("add", move |mut stub| async move { stub.add(request).await })
            .map(|_| ())
    }

    fn remove(
        &mut self,
        key: Vec<u8>,
        column_path: ColumnPath,
        timestamp: i64,
        consistency_level: ConsistencyLevel,
    ) -> Result<()> {
        let request = proto::RemoveRequest {
            key,
            column_path: Some(column_path),
            timestamp,
            consistency_level: consistency_level as i32,
        };

        self.call("remove", move |mut stub| async move { stub.remove(request).await })
            .map(|_| ())
    }

    fn remove_counter(
        &mut self,
        key: Vec<u8>,
        path: ColumnPath,
        consistency_level: ConsistencyLevel,
    ) -> Result<()> {
        let request = proto::RemoveCounterRequest {
            key,
            path: Some(path),
            consistency_level: consistency_level as i32,
        };

        self.call("remove_counter", move |mut stub| async move {
            stub.remove_counter(request).await
        })
        .map(|_| ())
    }

    fn batch_mutate(
        &mut self,
        mutation_map: MutationMap,
        consistency_level: ConsistencyLevel,
    ) -> Result<()> {
        let mutation_map = mutation_map
            .into_iter()
            .map(|(key, by_family)| proto::KeyMutations {
                key,
                column_families: by_family
                    .into_iter()
                    .map(|(family, mutations)| (family, proto::MutationList { mutations }))
                    .collect(),
            })
            .collect();

        let request = proto::BatchMutateRequest {
            mutation_map,
            consistency_level: consistency_level as i32,
        };

        self.call("batch_mutate", move |mut stub| async move { stub.batch_mutate(request).await })
            .map(|_| ())
    }

    fn truncate(&mut self, column_family: String) -> Result<()> {
        let request = proto::TruncateRequest { column_family };
        self.call("truncate", move |mut stub| async move { stub.truncate(request).await })
            .map(|_| ())
    }

    fn describe_schema_versions(&mut self) -> Result<HashMap<String, Vec<String>>> {
        self.call("describe_schema_versions", |mut stub| async move {
            stub.describe_schema_versions(proto::DescribeRequest {}).await
        })
        .map(|response| {
            response
                .versions
                .into_iter()
                .map(|(version, endpoints)| (version, endpoints.values))
                .collect()
        })
    }

    fn describe_keyspaces(&mut self) -> Result<Vec<KsDef>> {
        self.call("describe_keyspaces", |mut stub| async move {
            stub.describe_keyspaces(proto::DescribeRequest {}).await
        })
        .map(|response| response.keyspaces)
    }

    fn describe_cluster_name(&mut self) -> Result<String> {
        self.call("describe_cluster_name", |mut stub| async move {
            stub.describe_cluster_name(proto::DescribeRequest {}).await
        })
        .map(|response| response.value)
    }

    fn describe_version(&mut self) -> Result<String> {
        self.call("describe_version", |mut stub| async move {
            stub.describe_version(proto::DescribeRequest {}).await
        })
        .map(|response| response.value)
    }

    fn describe_ring(&mut self, keyspace: String) -> Result<Vec<TokenRange>> {
        let request = proto::DescribeRingRequest { keyspace };
        self.call("describe_ring", move |mut stub| async move { stub.describe_ring(request).await })
            .map(|response| response.ranges)
    }

    fn describe_partitioner(&mut self) -> Result<String> {
        self.call("describe_partitioner", |mut stub| async move {
            stub.describe_partitioner(proto::DescribeRequest {}).await
        })
        .map(|response| response.value)
    }

    fn describe_snitch(&mut self) -> Result<String> {
        self.call("describe_snitch", |mut stub| async move {
            stub.describe_snitch(proto::DescribeRequest {}).await
        })
        .map(|response| response.value)
    }

    fn describe_keyspace(&mut self, keyspace: String) -> Result<KsDef> {
        let request = proto::DescribeKeyspaceRequest { keyspace };
        self.call("describe_keyspace", move |mut stub| async move {
            stub.describe_keyspace(request).await
        })
    }

    fn describe_splits(
        &mut self,
        column_family: String,
        start_token: String,
        end_token: String,
        keys_per_split: i32,
    ) -> Result<Vec<String>> {
        let request = proto::DescribeSplitsRequest {
            column_family,
            start_token,
            end_token,
            keys_per_split,
        };

        self.call("describe_splits", move |mut stub| async move {
            stub.describe_splits(request).await
        })
        .map(|response| response.values)
    }

    fn system_add_column_family(&mut self, cf_def: CfDef) -> Result<String> {
        self.call("system_add_column_family", move |mut stub| async move {
            stub.system_add_column_family(cf_def).await
        })
        .map(|response| response.value)
    }

    fn system_drop_column_family(&mut self, column_family: String) -> Result<String> {
        let request = proto::DropColumnFamilyRequest { column_family };
        self.call("system_drop_column_family", move |mut stub| async move {
            stub.system_drop_column_family(request).await
        })
        .map(|response| response.value)
    }

    fn system_add_keyspace(&mut self, ks_def: KsDef) -> Result<String> {
        self.call("system_add_keyspace", move |mut stub| async move {
            stub.system_add_keyspace(ks_def).await
        })
        .map(|response| response.value)
    }

    fn system_drop_keyspace(&mut self, keyspace: String) -> Result<String> {
        let request = proto::DropKeyspaceRequest { keyspace };
        self.call("system_drop_keyspace", move |mut stub| async move {
            stub.system_drop_keyspace(request).await
        })
        .map(|response| response.value)
    }

    fn system_update_keyspace(&mut self, ks_def: KsDef) -> Result<String> {
        self.call("system_update_keyspace", move |mut stub| async move {
            stub.system_update_keyspace(ks_def).await
        })
        .map(|response| response.value)
    }

    fn system_update_column_family(&mut self, cf_def: CfDef) -> Result<String> {
        self.call("system_update_column_family", move |mut stub| async move {
            stub.system_update_column_family(cf_def).await
        })
        .map(|response| response.value)
    }

    fn execute_cql_query(&mut self, query: Vec<u8>, compression: Compression) -> Result<CqlResult> {
        let request = proto::CqlQueryRequest {
            query,
            compression: compression as i32,
            consistency: ConsistencyLevel::One as i32,
        };

        self.call("execute_cql_query", move |mut stub| async move {
            stub.execute_cql_query(request).await
        })
    }

    fn execute_cql3_query(
        &mut self,
        query: Vec<u8>,
        compression: Compression,
        consistency: ConsistencyLevel,
    ) -> Result<CqlResult> {
        let request = proto::CqlQueryRequest {
            query,
            compression: compression as i32,
            consistency: consistency as i32,
        };

        self.call("execute_cql3_query", move |mut stub| async move {
            stub.execute_cql3_query(request).await
        })
    }

    fn prepare_cql_query(
        &mut self,
        query: Vec<u8>,
        compression: Compression,
    ) -> Result<CqlPreparedResult> {
        let request = proto::CqlQueryRequest {
            query,
            compression: compression as i32,
            consistency: ConsistencyLevel::One as i32,
        };

        self.call("prepare_cql_query", move |mut stub| async move {
            stub.prepare_cql_query(request).await
        })
    }

    fn prepare_cql3_query(
        &mut self,
        query: Vec<u8>,
        compression: Compression,
    ) -> Result<CqlPreparedResult> {
        let request = proto::CqlQueryRequest {
            query,
            compression: compression as i32,
            consistency: ConsistencyLevel::One as i32,
        };

        self.call("prepare_cql3_query", move |mut stub| async move {
            stub.prepare_cql3_query(request).await
        })
    }

    fn execute_prepared_cql_query(&mut self, item_id: i32, values: Vec<Vec<u8>>) -> Result<CqlResult> {
        let request = proto::ExecutePreparedRequest {
            item_id,
            values,
            consistency: ConsistencyLevel::One as i32,
        };

        self.call("execute_prepared_cql_query", move |mut stub| async move {
            stub.execute_prepared_cql_query(request).await
        })
    }

    fn execute_prepared_cql3_query(
        &mut self,
        item_id: i32,
        values: Vec<Vec<u8>>,
        consistency: ConsistencyLevel,
    ) -> Result<CqlResult> {
        let request = proto::ExecutePreparedRequest {
            item_id,
            values,
            consistency: consistency as i32,
        };

        self.call("execute_prepared_cql3_query", move |mut stub| async move {
            stub.execute_prepared_cql3_query(request).await
        })
    }
}
