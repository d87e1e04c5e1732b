/// A Cassandra node served over loopback for tests
use crate::service::{NodeService, NodeState, NODE_ADDRESS};
use anyhow::{anyhow, bail, Context, Result};
use cassaforte_client::{CassandraClient, ClientConfig};
use cassaforte_proto::cassandra_server::CassandraServer;
use cassaforte_proto::KsDef;
use parking_lot::Mutex;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::Code;
use tracing::info;

/// In-memory node listening on an ephemeral port.
///
/// The server runs on its own thread and runtime, so blocking clients can
/// be driven from plain `#[test]` functions. Dropping the node stops the
/// server and aborts open connections.
pub struct TestNode {
    port: u16,
    state: Arc<Mutex<NodeState>>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl TestNode {
    /// Start a node that accepts any client
    pub fn start() -> Result<Self> {
        Self::serve(NodeState::new(), 0)
    }

    /// Start a node on a fixed port, e.g. to stand in for one that went away
    pub fn start_on(port: u16) -> Result<Self> {
        Self::serve(NodeState::new(), port)
    }

    /// Start a node that requires a password login before any data call
    pub fn with_credentials(username: &str, password: &str) -> Result<Self> {
        let mut state = NodeState::new();
        state.credentials = Some((username.to_string(), password.to_string()));
        Self::serve(state, 0)
    }

    fn serve(state: NodeState, port: u16) -> Result<Self> {
        let state = Arc::new(Mutex::new(state));
        let service = NodeService::new(Arc::clone(&state));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = thread::Builder::new()
            .name("cassaforte-test-node".to_string())
            .spawn(move || -> Result<()> {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .enable_all()
                    .build()
                    .context("Failed to build test node runtime")?;

                runtime.block_on(async move {
                    let listener = TcpListener::bind((NODE_ADDRESS, port))
                        .await
                        .context("Failed to bind test node listener")?;
                    let addr = listener.local_addr()?;
                    info!("Test node listening on {}", addr);
                    // The receiver only goes away if start-up was abandoned
                    let _ = ready_tx.send(addr.port());

                    let server = Server::builder()
                        .add_service(CassandraServer::new(service))
                        .serve_with_incoming(TcpListenerStream::new(listener));

                    tokio::select! {
                        result = server => result.context("Test node server failed")?,
                        _ = shutdown_rx => info!("Test node stopping"),
                    }
                    Ok::<(), anyhow::Error>(())
                })
            })
            .context("Failed to spawn test node thread")?;

        let port = match ready_rx.recv() {
            Ok(port) => port,
            Err(_) => {
                handle
                    .join()
                    .map_err(|_| anyhow!("Test node thread panicked"))??;
                bail!("Test node stopped before listening");
            }
        };

        Ok(Self {
            port,
            state,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn host(&self) -> &'static str {
        NODE_ADDRESS
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Client configuration pointing at this node
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(NODE_ADDRESS).with_port(self.port)
    }

    /// Connect a client with the default settings
    pub fn connect(&self) -> Result<CassandraClient> {
        CassandraClient::with_config(self.config())
            .with_context(|| format!("Failed to connect to test node on port {}", self.port))
    }

    /// Add a keyspace without going through the wire
    pub fn seed_keyspace(&self, ks_def: KsDef) -> Result<()> {
        self.state
            .lock()
            .store
            .add_keyspace(ks_def)
            .map_err(|status| anyhow!("Failed to seed keyspace: {}", status.message()))?;
        Ok(())
    }

    /// Names of the remote methods called so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// CQL version requested by the last client
    pub fn cql_version(&self) -> Option<String> {
        self.state.lock().cql_version.clone()
    }

    /// Keyspace of the current session
    pub fn keyspace(&self) -> Option<String> {
        self.state.lock().keyspace.clone()
    }

    pub fn schema_version(&self) -> String {
        self.state.lock().store.schema_version().to_string()
    }

    /// Make every call to `method` fail with the given status
    pub fn inject(&self, method: &str, code: Code, message: &str) {
        self.state
            .lock()
            .faults
            .insert(method.to_string(), (code, message.to_string()));
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
