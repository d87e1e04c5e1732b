/// Test utilities for the Cassandra client
///
/// Provides `TestNode`, an in-memory Cassandra node served over loopback,
/// plus helpers to set up the data most tests need.

mod cql;
mod node;
mod service;
mod store;

pub use node::TestNode;
pub use service::{API_VERSION, CLUSTER_NAME, NODE_ADDRESS, PARTITIONER, SNITCH};
pub use store::{token_of, SYSTEM_KEYSPACE};

use cassaforte_proto::{CfDef, KsDef};

/// Keyspace created by `test_keyspace`
pub const TEST_KEYSPACE: &str = "cassaforte_test";

/// Keyspace with a standard `users` and a counter `hits` column family
pub fn test_keyspace() -> KsDef {
    KsDef::simple(TEST_KEYSPACE, 1)
        .with_cf(CfDef::new(TEST_KEYSPACE, "users"))
        .with_cf(CfDef::counter(TEST_KEYSPACE, "hits"))
}

/// Start a node that already holds `test_keyspace`
pub fn node_with_test_keyspace() -> anyhow::Result<TestNode> {
    let node = TestNode::start()?;
    node.seed_keyspace(test_keyspace())?;
    Ok(node)
}

/// Unique name for keyspaces created by a test
pub fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}
