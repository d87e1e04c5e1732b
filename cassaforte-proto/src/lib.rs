/// Protocol Buffers definitions for the Cassandra remote API
///
/// Generated messages, the `cassandra_client::CassandraClient` stub and the
/// `cassandra_server::Cassandra` service trait, plus a few constructors for
/// the messages callers build most often.

tonic::include_proto!("cassandra");

mod builders;

/// Standard listener port of the remote API
pub const DEFAULT_PORT: u16 = 9160;

/// CQL version requested when a connection is opened
pub const DEFAULT_CQL_VERSION: &str = "3.0.0";
