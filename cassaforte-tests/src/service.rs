/// gRPC service of the test node
///
/// Implements the generated `Cassandra` service trait over an in-memory
/// `Store`. Session state (keyspace, CQL version, login) is shared by every
/// connection to the node.
use crate::cql::{self, Session, Token};
use crate::store::{Store, SYSTEM_KEYSPACE};
use cassaforte_proto::{self as proto, cassandra_server::Cassandra, Compression, CqlResult};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;
use tonic::{Code, Request, Response, Status};

pub const CLUSTER_NAME: &str = "Test Cluster";
pub const API_VERSION: &str = "19.36.0";
pub const PARTITIONER: &str = "org.apache.cassandra.dht.ByteOrderedPartitioner";
pub const SNITCH: &str = "org.apache.cassandra.locator.SimpleSnitch";
pub const NODE_ADDRESS: &str = "127.0.0.1";

/// Everything the node knows, guarded by one lock
pub struct NodeState {
    pub store: Store,
    pub keyspace: Option<String>,
    pub cql_version: Option<String>,
    pub credentials: Option<(String, String)>,
    pub authenticated: bool,
    pub calls: Vec<String>,
    pub faults: HashMap<String, (Code, String)>,
    prepared: Vec<Vec<Token>>,
}

impl NodeState {
    pub fn new() -> Self {
        Self {
            store: Store::new(),
            keyspace: None,
            cql_version: None,
            credentials: None,
            authenticated: false,
            calls: Vec::new(),
            faults: HashMap::new(),
            prepared: Vec::new(),
        }
    }

    fn keyspace(&self) -> Result<String, Status> {
        self.keyspace
            .clone()
            .ok_or_else(|| Status::invalid_argument("You have not set a keyspace for this session"))
    }

    fn execute(&mut self, tokens: Vec<Token>) -> Result<CqlResult, Status> {
        cql::execute(
            Session {
                store: &mut self.store,
                keyspace: &mut self.keyspace,
            },
            tokens,
        )
    }

    fn prepare(&mut self, query: &[u8]) -> Result<proto::CqlPreparedResult, Status> {
        let tokens = cql::tokenize(query)?;
        let count = cql::markers(&tokens);
        let item_id = self.prepared.len() as i32;
        self.prepared.push(tokens);

        Ok(proto::CqlPreparedResult {
            item_id,
            count: count as i32,
            variable_types: vec!["BytesType".to_string(); count],
            variable_names: Vec::new(),
        })
    }

    fn execute_prepared(&mut self, item_id: i32, values: Vec<Vec<u8>>) -> Result<CqlResult, Status> {
        let tokens = usize::try_from(item_id)
            .ok()
            .and_then(|id| self.prepared.get(id))
            .ok_or_else(|| {
                Status::invalid_argument(format!("Prepared query with id {} not found", item_id))
            })?;
        let bound = cql::bind(tokens, values)?;
        self.execute(bound)
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Test node gRPC service implementation
pub struct NodeService {
    state: Arc<Mutex<NodeState>>,
}

impl NodeService {
    pub fn new(state: Arc<Mutex<NodeState>>) -> Self {
        Self { state }
    }

    /// Record a call and fail it if a fault is injected for it
    fn enter(&self, method: &str) -> Result<MutexGuard<'_, NodeState>, Status> {
        let mut state = self.state.lock();
        state.calls.push(method.to_string());
        if let Some((code, message)) = state.faults.get(method) {
            return Err(Status::new(*code, message.clone()));
        }
        Ok(state)
    }

    /// `enter`, then require a login when the node checks credentials
    fn session(&self, method: &str) -> Result<MutexGuard<'_, NodeState>, Status> {
        let state = self.enter(method)?;
        if state.credentials.is_some() && !state.authenticated {
            return Err(Status::unauthenticated("You have not logged in"));
        }
        Ok(state)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn required<T>(value: Option<T>, field: &str) -> Result<T, Status> {
    value.ok_or_else(|| Status::invalid_argument(format!("{} is required", field)))
}

fn uncompressed(compression: Compression) -> Result<(), Status> {
    match compression {
        Compression::None => Ok(()),
        other => Err(Status::invalid_argument(format!(
            "Compression {:?} is not supported",
            other
        ))),
    }
}

fn schema_change(version: String) -> Response<proto::StringResponse> {
    Response::new(proto::StringResponse { value: version })
}

#[tonic::async_trait]
impl Cassandra for NodeService {
    async fn login(
        &self,
        request: Request<proto::LoginRequest>,
    ) -> Result<Response<proto::VoidResponse>, Status> {
        let auth = required(request.into_inner().auth_request, "auth_request")?;
        let mut state = self.enter("login")?;

        if let Some((username, password)) = &state.credentials {
            let valid = auth.credentials.get("username") == Some(username)
                && auth.credentials.get("password") == Some(password);
            if !valid {
                return Err(Status::unauthenticated(
                    "Username and/or password are incorrect",
                ));
            }
        }
        state.authenticated = true;
        Ok(Response::new(proto::VoidResponse {}))
    }

    async fn set_keyspace(
        &self,
        request: Request<proto::SetKeyspaceRequest>,
    ) -> Result<Response<proto::VoidResponse>, Status> {
        let keyspace = request.into_inner().keyspace;
        let mut state = self.session("set_keyspace")?;

        if state.store.keyspace(&keyspace).is_none() {
            return Err(Status::invalid_argument(format!(
                "Keyspace '{}' does not exist",
                keyspace
            )));
        }
        state.keyspace = Some(keyspace);
        Ok(Response::new(proto::VoidResponse {}))
    }

    async fn set_cql_version(
        &self,
        request: Request<proto::SetCqlVersionRequest>,
    ) -> Result<Response<proto::VoidResponse>, Status> {
        let version = request.into_inner().version;
        let mut state = self.enter("set_cql_version")?;

        if !(version.starts_with("2.") || version.starts_with("3.")) {
            return Err(Status::invalid_argument(format!(
                "Provided version {} is not supported by this server (supported: 2.0.0, 3.0.0)",
                version
            )));
        }
        state.cql_version = Some(version);
        Ok(Response::new(proto::VoidResponse {}))
    }

    async fn get(
        &self,
        request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::GetResponse>, Status> {
        let req = request.into_inner();
        let path = required(req.column_path, "column_path")?;
        let state = self.session("get")?;

        let column = state.store.get(&state.keyspace()?, &req.key, &path)?;
        Ok(Response::new(proto::GetResponse {
            column: Some(column),
        }))
    }

    async fn get_slice(
        &self,
        request: Request<proto::GetSliceRequest>,
    ) -> Result<Response<proto::ColumnsResponse>, Status> {
        let req = request.into_inner();
        let parent = required(req.column_parent, "column_parent")?;
        let predicate = required(req.predicate, "predicate")?;
        let state = self.session("get_slice")?;

        let columns = state
            .store
            .get_slice(&state.keyspace()?, &req.key, &parent, &predicate)?;
        Ok(Response::new(proto::ColumnsResponse { columns }))
    }

    async fn get_count(
        &self,
        request: Request<proto::GetCountRequest>,
    ) -> Result<Response<proto::CountResponse>, Status> {
        let req = request.into_inner();
        let parent = required(req.column_parent, "column_parent")?;
        let predicate = required(req.predicate, "predicate")?;
        let state = self.session("get_count")?;

        let columns = state
            .store
            .get_slice(&state.keyspace()?, &req.key, &parent, &predicate)?;
        Ok(Response::new(proto::CountResponse {
            count: columns.len() as i32,
        }))
    }

    async fn multiget_slice(
        &self,
        request: Request<proto::MultigetSliceRequest>,
    ) -> Result<Response<proto::KeySlicesResponse>, Status> {
        let req = request.into_inner();
        let parent = required(req.column_parent, "column_parent")?;
        let predicate = required(req.predicate, "predicate")?;
        let state = self.session("multiget_slice")?;
        let keyspace = state.keyspace()?;

        let slices = req
            .keys
            .into_iter()
            .map(|key| {
                let columns = state.store.get_slice(&keyspace, &key, &parent, &predicate)?;
                Ok(proto::KeySlice { key, columns })
            })
            .collect::<Result<Vec<_>, Status>>()?;
        Ok(Response::new(proto::KeySlicesResponse { slices }))
    }

    async fn multiget_count(
        &self,
        request: Request<proto::MultigetCountRequest>,
    ) -> Result<Response<proto::KeyCountsResponse>, Status> {
        let req = request.into_inner();
        let parent = required(req.column_parent, "column_parent")?;
        let predicate = required(req.predicate, "predicate")?;
        let state = self.session("multiget_count")?;
        let keyspace = state.keyspace()?;

        let counts = req
            .keys
            .into_iter()
            .map(|key| {
                let count = state.store.get_slice(&keyspace, &key, &parent, &predicate)?.len() as i32;
                Ok(proto::KeyCount { key, count })
            })
            .collect::<Result<Vec<_>, Status>>()?;
        Ok(Response::new(proto::KeyCountsResponse { counts }))
    }

    async fn get_range_slices(
        &self,
        request: Request<proto::GetRangeSlicesRequest>,
    ) -> Result<Response<proto::KeySlicesResponse>, Status> {
        let req = request.into_inner();
        let parent = required(req.column_parent, "column_parent")?;
        let predicate = required(req.predicate, "predicate")?;
        let range = required(req.range, "range")?;
        let state = self.session("get_range_slices")?;

        let slices = state
            .store
            .get_range_slices(&state.keyspace()?, &parent, &predicate, &range)?;
        Ok(Response::new(proto::KeySlicesResponse { slices }))
    }

    async fn get_paged_slice(
        &self,
        request: Request<proto::GetPagedSliceRequest>,
    ) -> Result<Response<proto::KeySlicesResponse>, Status> {
        let req = request.into_inner();
        let range = required(req.range, "range")?;
        let state = self.session("get_paged_slice")?;

        let slices = state.store.get_paged_slice(
            &state.keyspace()?,
            &req.column_family,
            &range,
            &req.start_column,
        )?;
        Ok(Response::new(proto::KeySlicesResponse { slices }))
    }

    async fn get_indexed_slices(
        &self,
        request: Request<proto::GetIndexedSlicesRequest>,
    ) -> Result<Response<proto::KeySlicesResponse>, Status> {
        let req = request.into_inner();
        let parent = required(req.column_parent, "column_parent")?;
        let clause = required(req.index_clause, "index_clause")?;
        let predicate = required(req.column_predicate, "column_predicate")?;
        let state = self.session("get_indexed_slices")?;

        let slices = state
            .store
            .get_indexed_slices(&state.keyspace()?, &parent, &clause, &predicate)?;
        Ok(Response::new(proto::KeySlicesResponse { slices }))
    }

    async fn insert(
        &self,
        request: Request<proto::InsertRequest>,
    ) -> Result<Response<proto::VoidResponse>, Status> {
        let req = request.into_inner();
        let parent = required(req.column_parent, "column_parent")?;
        let column = required(req.column, "column")?;
        let mut state = self.session("insert")?;

        let keyspace = state.keyspace()?;
        state.store.insert(&keyspace, &req.key, &parent, column)?;
        Ok(Response::new(proto::VoidResponse {}))
    }

    async fn add(
        &self,
        request: Request<proto::AddRequest>,
    ) -> Result<Response<proto::VoidResponse>, Status> {
        let req = request.into_inner();
        let parent = required(req.column_parent, "column_parent")?;
        let column = required(req.column, "column")?;
        let mut state = self.session("add")?;

        let keyspace = state.keyspace()?;
        state.store.add(&keyspace, &req.key, &parent, column)?;
        Ok(Response::new(proto::VoidResponse {}))
    }

    async fn remove(
        &self,
        request: Request<proto::RemoveRequest>,
    ) -> Result<Response<proto::VoidResponse>, Status> {
        let req = request.into_inner();
        let path = required(req.column_path, "column_path")?;
        let mut state = self.session("remove")?;

        let keyspace = state.keyspace()?;
        state.store.remove(&keyspace, &req.key, &path, req.timestamp)?;
        Ok(Response::new(proto::VoidResponse {}))
    }

    async fn remove_counter(
        &self,
        request: Request<proto::RemoveCounterRequest>,
    ) -> Result<Response<proto::VoidResponse>, Status> {
        let req = request.into_inner();
        let path = required(req.path, "path")?;
        let mut state = self.session("remove_counter")?;

        let keyspace = state.keyspace()?;
        state.store.remove_counter(&keyspace, &req.key, &path)?;
        Ok(Response::new(proto::VoidResponse {}))
    }

    async fn batch_mutate(
        &self,
        request: Request<proto::BatchMutateRequest>,
    ) -> Result<Response<proto::VoidResponse>, Status> {
        let req = request.into_inner();
        let mut state = self.session("batch_mutate")?;

        let keyspace = state.keyspace()?;
        state.store.batch_mutate(&keyspace, req.mutation_map)?;
        Ok(Response::new(proto::VoidResponse {}))
    }

    async fn truncate(
        &self,
        request: Request<proto::TruncateRequest>,
    ) -> Result<Response<proto::VoidResponse>, Status> {
        let column_family = request.into_inner().column_family;
        let mut state = self.session("truncate")?;

        let keyspace = state.keyspace()?;
        state.store.truncate(&keyspace, &column_family)?;
        Ok(Response::new(proto::VoidResponse {}))
    }

    async fn describe_schema_versions(
        &self,
        _request: Request<proto::DescribeRequest>,
    ) -> Result<Response<proto::SchemaVersionsResponse>, Status> {
        let state = self.enter("describe_schema_versions")?;

        let mut versions = HashMap::new();
        versions.insert(
            state.store.schema_version().to_string(),
            proto::StringList {
                values: vec![NODE_ADDRESS.to_string()],
            },
        );
        Ok(Response::new(proto::SchemaVersionsResponse { versions }))
    }

    async fn describe_keyspaces(
        &self,
        _request: Request<proto::DescribeRequest>,
    ) -> Result<Response<proto::KeyspacesResponse>, Status> {
        let state = self.session("describe_keyspaces")?;
        Ok(Response::new(proto::KeyspacesResponse {
            keyspaces: state.store.keyspaces(),
        }))
    }

    async fn describe_cluster_name(
        &self,
        _request: Request<proto::DescribeRequest>,
    ) -> Result<Response<proto::StringResponse>, Status> {
        let _state = self.enter("describe_cluster_name")?;
        Ok(Response::new(proto::StringResponse {
            value: CLUSTER_NAME.to_string(),
        }))
    }

    async fn describe_version(
        &self,
        _request: Request<proto::DescribeRequest>,
    ) -> Result<Response<proto::StringResponse>, Status> {
        let _state = self.enter("describe_version")?;
        Ok(Response::new(proto::StringResponse {
            value: API_VERSION.to_string(),
        }))
    }

    async fn describe_ring(
        &self,
        request: Request<proto::DescribeRingRequest>,
    ) -> Result<Response<proto::TokenRangesResponse>, Status> {
        let keyspace = request.into_inner().keyspace;
        let state = self.session("describe_ring")?;

        if keyspace == SYSTEM_KEYSPACE {
            return Err(Status::invalid_argument(format!(
                "There is no ring for the keyspace: {}",
                keyspace
            )));
        }
        if state.store.keyspace(&keyspace).is_none() {
            return Err(Status::invalid_argument(format!(
                "Keyspace '{}' does not exist",
                keyspace
            )));
        }

        // A single node owns the whole ring
        let range = proto::TokenRange {
            start_token: String::new(),
            end_token: String::new(),
            endpoints: vec![NODE_ADDRESS.to_string()],
            rpc_endpoints: vec![NODE_ADDRESS.to_string()],
            endpoint_details: vec![proto::EndpointDetails {
                host: NODE_ADDRESS.to_string(),
                datacenter: "datacenter1".to_string(),
                rack: "rack1".to_string(),
            }],
        };
        Ok(Response::new(proto::TokenRangesResponse {
            ranges: vec![range],
        }))
    }

    async fn describe_partitioner(
        &self,
        _request: Request<proto::DescribeRequest>,
    ) -> Result<Response<proto::StringResponse>, Status> {
        let _state = self.enter("describe_partitioner")?;
        Ok(Response::new(proto::StringResponse {
            value: PARTITIONER.to_string(),
        }))
    }

    async fn describe_snitch(
        &self,
        _request: Request<proto::DescribeRequest>,
    ) -> Result<Response<proto::StringResponse>, Status> {
        let _state = self.enter("describe_snitch")?;
        Ok(Response::new(proto::StringResponse {
            value: SNITCH.to_string(),
        }))
    }

    async fn describe_keyspace(
        &self,
        request: Request<proto::DescribeKeyspaceRequest>,
    ) -> Result<Response<proto::KsDef>, Status> {
        let keyspace = request.into_inner().keyspace;
        let state = self.session("describe_keyspace")?;

        state
            .store
            .keyspace(&keyspace)
            .cloned()
            .map(Response::new)
            .ok_or_else(|| Status::not_found(format!("Keyspace '{}' not found", keyspace)))
    }

    async fn describe_splits(
        &self,
        request: Request<proto::DescribeSplitsRequest>,
    ) -> Result<Response<proto::StringsResponse>, Status> {
        let req = request.into_inner();
        let state = self.session("describe_splits")?;

        state.store.cf_def(&state.keyspace()?, &req.column_family)?;
        if req.keys_per_split <= 0 {
            return Err(Status::invalid_argument("keys_per_split must be positive"));
        }

        // Rows are not sampled; the whole range is one split
        Ok(Response::new(proto::StringsResponse {
            values: vec![req.start_token, req.end_token],
        }))
    }

    async fn system_add_column_family(
        &self,
        request: Request<proto::CfDef>,
    ) -> Result<Response<proto::StringResponse>, Status> {
        let mut cf_def = request.into_inner();
        let mut state = self.session("system_add_column_family")?;

        if cf_def.keyspace.is_empty() {
            cf_def.keyspace = state.keyspace()?;
        }
        state.store.add_column_family(cf_def).map(schema_change)
    }

    async fn system_drop_column_family(
        &self,
        request: Request<proto::DropColumnFamilyRequest>,
    ) -> Result<Response<proto::StringResponse>, Status> {
        let column_family = request.into_inner().column_family;
        let mut state = self.session("system_drop_column_family")?;

        let keyspace = state.keyspace()?;
        state
            .store
            .drop_column_family(&keyspace, &column_family)
            .map(schema_change)
    }

    async fn system_add_keyspace(
        &self,
        request: Request<proto::KsDef>,
    ) -> Result<Response<proto::StringResponse>, Status> {
        let ks_def = request.into_inner();
        let mut state = self.session("system_add_keyspace")?;
        state.store.add_keyspace(ks_def).map(schema_change)
    }

    async fn system_drop_keyspace(
        &self,
        request: Request<proto::DropKeyspaceRequest>,
    ) -> Result<Response<proto::StringResponse>, Status> {
        let keyspace = request.into_inner().keyspace;
        let mut state = self.session("system_drop_keyspace")?;

        let version = state.store.drop_keyspace(&keyspace)?;
        if state.keyspace.as_deref() == Some(keyspace.as_str()) {
            state.keyspace = None;
        }
        Ok(schema_change(version))
    }

    async fn system_update_keyspace(
        &self,
        request: Request<proto::KsDef>,
    ) -> Result<Response<proto::StringResponse>, Status> {
        let ks_def = request.into_inner();
        let mut state = self.session("system_update_keyspace")?;
        state.store.update_keyspace(ks_def).map(schema_change)
    }

    async fn system_update_column_family(
        &self,
        request: Request<proto::CfDef>,
    ) -> Result<Response<proto::StringResponse>, Status> {
        let mut cf_def = request.into_inner();
        let mut state = self.session("system_update_column_family")?;

        if cf_def.keyspace.is_empty() {
            cf_def.keyspace = state.keyspace()?;
        }
        state.store.update_column_family(cf_def).map(schema_change)
    }

    async fn execute_cql_query(
        &self,
        request: Request<proto::CqlQueryRequest>,
    ) -> Result<Response<CqlResult>, Status> {
        let req = request.into_inner();
        let mut state = self.session("execute_cql_query")?;

        uncompressed(req.compression())?;
        let tokens = cql::tokenize(&req.query)?;
        state.execute(tokens).map(Response::new)
    }

    async fn execute_cql3_query(
        &self,
        request: Request<proto::CqlQueryRequest>,
    ) -> Result<Response<CqlResult>, Status> {
        let req = request.into_inner();
        let mut state = self.session("execute_cql3_query")?;

        uncompressed(req.compression())?;
        let tokens = cql::tokenize(&req.query)?;
        state.execute(tokens).map(Response::new)
    }

    async fn prepare_cql_query(
        &self,
        request: Request<proto::CqlQueryRequest>,
    ) -> Result<Response<proto::CqlPreparedResult>, Status> {
        let req = request.into_inner();
        let mut state = self.session("prepare_cql_query")?;

        uncompressed(req.compression())?;
        state.prepare(&req.query).map(Response::new)
    }

    async fn prepare_cql3_query(
        &self,
        request: Request<proto::CqlQueryRequest>,
    ) -> Result<Response<proto::CqlPreparedResult>, Status> {
        let req = request.into_inner();
        let mut state = self.session("prepare_cql3_query")?;

        uncompressed(req.compression())?;
        state.prepare(&req.query).map(Response::new)
    }

    async fn execute_prepared_cql_query(
        &self,
        request: Request<proto::ExecutePreparedRequest>,
    ) -> Result<Response<CqlResult>, Status> {
        let req = request.into_inner();
        let mut state = self.session("execute_prepared_cql_query")?;
        state.execute_prepared(req.item_id, req.values).map(Response::new)
    }

    async fn execute_prepared_cql3_query(
        &self,
        request: Request<proto::ExecutePreparedRequest>,
    ) -> Result<Response<CqlResult>, Status> {
        let req = request.into_inner();
        let mut state = self.session("execute_prepared_cql3_query")?;
        state.execute_prepared(req.item_id, req.values).map(Response::new)
    }
}
