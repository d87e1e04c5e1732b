use cassaforte_proto::{Compression, ConsistencyLevel, CqlResultType};
use cassaforte_test_utils::{node_with_test_keyspace, TEST_KEYSPACE};

#[test]
fn test_execute_cql_round_trip() {
    let node = node_with_test_keyspace().unwrap();
    let mut client = node.connect().unwrap();

    let result = client.execute_cql(&format!("USE {}", TEST_KEYSPACE)).unwrap();
    assert_eq!(result.result_type(), CqlResultType::Void);
    assert_eq!(node.keyspace().as_deref(), Some(TEST_KEYSPACE));

    client
        .execute_cql("INSERT INTO users (KEY, name, city) VALUES ('alice', 'Alice', 'Paris')")
        .unwrap();
    client
        .execute_cql("INSERT INTO users (KEY, name) VALUES ('bob', 'Bob') USING TIMESTAMP 5")
        .unwrap();

    let result = client
        .execute_cql("SELECT name FROM users WHERE KEY = 'alice'")
        .unwrap();
    assert_eq!(result.result_type(), CqlResultType::Rows);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].key, b"alice");
    assert_eq!(result.rows[0].columns.len(), 1);
    assert_eq!(result.rows[0].columns[0].value, b"Alice");

    let count = client.execute_cql("SELECT COUNT(*) FROM users").unwrap();
    assert_eq!(count.result_type(), CqlResultType::Int);
    assert_eq!(count.num, 2);

    client.execute_cql("DELETE FROM users WHERE KEY = 'alice'").unwrap();
    let all = client.execute_cql("SELECT * FROM users").unwrap();
    assert_eq!(all.rows.len(), 1);
    assert_eq!(all.rows[0].columns[0].timestamp, 5);
}

#[test]
fn test_cql3_query_sees_cql2_writes() {
    let node = node_with_test_keyspace().unwrap();
    let mut client = node.connect().unwrap();
    client.set_keyspace(TEST_KEYSPACE.to_string()).unwrap();

    client
        .execute_cql("INSERT INTO users (KEY, name) VALUES ('carol', 'Carol')")
        .unwrap();

    let result = client
        .execute_cql3_query(
            b"SELECT * FROM users LIMIT 10".to_vec(),
            Compression::None,
            ConsistencyLevel::Quorum,
        )
        .unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.schema.unwrap().default_name_type, "BytesType");
}

#[test]
fn test_prepared_statements() {
    let node = node_with_test_keyspace().unwrap();
    let mut client = node.connect().unwrap();
    client.set_keyspace(TEST_KEYSPACE.to_string()).unwrap();

    let insert = client
        .prepare_cql_query(
            b"INSERT INTO users (KEY, name) VALUES (?, ?)".to_vec(),
            Compression::None,
        )
        .unwrap();
    assert_eq!(insert.count, 2);
    assert_eq!(insert.variable_types.len(), 2);

    client
        .execute_prepared_cql_query(insert.item_id, vec![b"dave".to_vec(), b"Dave".to_vec()])
        .unwrap();

    let select = client
        .prepare_cql3_query(
            b"SELECT name FROM users WHERE KEY = ?".to_vec(),
            Compression::None,
        )
        .unwrap();
    assert_ne!(select.item_id, insert.item_id);

    let result = client
        .execute_prepared_cql3_query(select.item_id, vec![b"dave".to_vec()], ConsistencyLevel::One)
        .unwrap();
    assert_eq!(result.rows[0].columns[0].value, b"Dave");

    let err = client
        .execute_prepared_cql_query(insert.item_id, vec![b"only-one".to_vec()])
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");

    let err = client.execute_prepared_cql_query(99, Vec::new()).unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");
}

#[test]
fn test_compressed_queries_rejected() {
    let node = node_with_test_keyspace().unwrap();
    let mut client = node.connect().unwrap();

    let err = client
        .execute_cql_with_compression("USE cassaforte_test", Compression::Gzip)
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");
    assert_eq!(node.keyspace(), None);
}

#[test]
fn test_invalid_cql() {
    let node = node_with_test_keyspace().unwrap();
    let mut client = node.connect().unwrap();

    for query in [
        "CREATE TABLE things (KEY text PRIMARY KEY)",
        "SELECT * FROM users",
        "USE missing",
        "INSERT INTO users (name) VALUES ('x')",
        "SELECT * FROM users WHERE KEY = ?",
    ] {
        let err = client.execute_cql(query).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST", "query: {}", query);
    }

    let err = client
        .execute_cql_query(vec![0xff, 0xfe], Compression::None)
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");
}
