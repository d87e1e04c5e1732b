/// Cassaforte Cassandra Client Library
///
/// A blocking client for the Cassandra remote API. `CassandraClient` wraps a
/// delegate implementing every remote operation together with the transport
/// that carries it, and forwards calls to them without changing arguments,
/// results or errors.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod remote;
pub mod transport;

// Re-export key types
pub use api::{CassandraApi, MutationMap};
pub use cassaforte_proto as proto;
pub use client::CassandraClient;
pub use config::ClientConfig;
pub use error::{CassandraError, Result, TransportError};
pub use remote::{bind, RemoteCassandra};
pub use transport::{SocketTransport, Transport};
