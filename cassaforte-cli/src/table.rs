/// Table formatting for node metadata and CQL results using comfy-table

use cassaforte_proto::{CqlResult, CqlResultType, CqlRow, KsDef, TokenRange};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Two-column name/value table
pub fn format_properties(rows: &[(&str, String)]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Property", "Value"]);
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    table.to_string()
}

/// One row per keyspace, sorted by name
pub fn format_keyspaces(keyspaces: &[KsDef]) -> String {
    if keyspaces.is_empty() {
        return "No keyspaces found".to_string();
    }

    let mut keyspaces: Vec<&KsDef> = keyspaces.iter().collect();
    keyspaces.sort_by(|a, b| a.name.cmp(&b.name));

    let mut table = new_table();
    table.set_header(vec!["Keyspace", "Strategy", "Options", "Column families"]);
    for ks in keyspaces {
        let strategy = ks
            .strategy_class
            .rsplit('.')
            .next()
            .unwrap_or(&ks.strategy_class);

        let mut options: Vec<String> = ks
            .strategy_options
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        options.sort();

        let mut cfs: Vec<&str> = ks.cf_defs.iter().map(|cf| cf.name.as_str()).collect();
        cfs.sort();

        table.add_row(vec![
            Cell::new(&ks.name),
            Cell::new(strategy),
            Cell::new(options.join(", ")),
            Cell::new(cfs.join(", ")),
        ]);
    }
    table.to_string()
}

pub fn format_ring(ranges: &[TokenRange]) -> String {
    if ranges.is_empty() {
        return "No token ranges".to_string();
    }

    let mut table = new_table();
    table.set_header(vec!["Start token", "End token", "Endpoints", "Datacenters"]);
    for range in ranges {
        let datacenters: BTreeSet<&str> = range
            .endpoint_details
            .iter()
            .map(|d| d.datacenter.as_str())
            .collect();
        table.add_row(vec![
            Cell::new(token_or_open(&range.start_token)),
            Cell::new(token_or_open(&range.end_token)),
            Cell::new(range.endpoints.join(", ")),
            Cell::new(datacenters.into_iter().collect::<Vec<_>>().join(", ")),
        ]);
    }
    table.to_string()
}

pub fn format_schema_versions(versions: &HashMap<String, Vec<String>>) -> String {
    let mut versions: Vec<_> = versions.iter().collect();
    versions.sort();

    let mut table = new_table();
    table.set_header(vec!["Schema version", "Endpoints"]);
    for (version, endpoints) in versions {
        table.add_row(vec![Cell::new(version), Cell::new(endpoints.join(", "))]);
    }
    table.to_string()
}

/// Format CQL rows as a table
///
/// Collects all column names across rows as table columns. Row keys go in
/// the first column; columns missing from a row are shown as "-".
pub fn format_rows(rows: &[CqlRow]) -> String {
    if rows.is_empty() {
        return "No rows found".to_string();
    }

    let names: BTreeSet<&[u8]> = rows
        .iter()
        .flat_map(|row| row.columns.iter().map(|c| c.name.as_slice()))
        .collect();

    let mut table = new_table();
    let mut header = vec![Cell::new("KEY")];
    header.extend(names.iter().map(|name| Cell::new(display_bytes(name))));
    table.set_header(header);

    for row in rows {
        let mut cells = vec![Cell::new(display_bytes(&row.key))];
        cells.extend(names.iter().map(|name| {
            match row.columns.iter().find(|c| c.name.as_slice() == *name) {
                Some(column) => Cell::new(display_bytes(&column.value)),
                None => Cell::new("-"),
            }
        }));
        table.add_row(cells);
    }
    table.to_string()
}

/// JSON rendering of a CQL result; byte strings are shown as text when
/// they are valid UTF-8
pub fn result_to_json(result: &CqlResult) -> Value {
    match result.result_type() {
        CqlResultType::Void => json!({ "type": "void" }),
        CqlResultType::Int => json!({ "type": "int", "num": result.num }),
        CqlResultType::Rows => {
            let rows: Vec<Value> = result
                .rows
                .iter()
                .map(|row| {
                    let columns: Map<String, Value> = row
                        .columns
                        .iter()
                        .map(|c| (display_bytes(&c.name), Value::String(display_bytes(&c.value))))
                        .collect();
                    json!({ "key": display_bytes(&row.key), "columns": columns })
                })
                .collect();
            json!({ "type": "rows", "rows": rows })
        }
    }
}

/// Text when valid UTF-8, hex otherwise
fn display_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            format!("0x{}", hex)
        }
    }
}

fn token_or_open(token: &str) -> &str {
    if token.is_empty() {
        "(open)"
    } else {
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cassaforte_proto::{CfDef, Column};

    fn row(key: &str, columns: &[(&str, &str)]) -> CqlRow {
        CqlRow {
            key: key.as_bytes().to_vec(),
            columns: columns
                .iter()
                .map(|(n, v)| Column::new(n.as_bytes(), v.as_bytes(), 1))
                .collect(),
        }
    }

    #[test]
    fn test_format_empty_rows() {
        assert_eq!(format_rows(&[]), "No rows found");
    }

    #[test]
    fn test_format_rows_with_missing_columns() {
        let rows = vec![
            row("alice", &[("name", "Alice"), ("city", "Paris")]),
            row("bob", &[("name", "Bob")]),
        ];

        let output = format_rows(&rows);
        assert!(output.contains("KEY"));
        assert!(output.contains("alice"));
        assert!(output.contains("Paris"));
        assert!(output.contains("Bob"));
        assert!(output.contains("-"));
    }

    #[test]
    fn test_binary_values_shown_as_hex() {
        assert_eq!(display_bytes(b"text"), "text");
        assert_eq!(display_bytes(&[0xff, 0x00]), "0xff00");
    }

    #[test]
    fn test_format_keyspaces() {
        let keyspaces = vec![
            KsDef::simple("zoo", 1),
            KsDef::simple("app", 3).with_cf(CfDef::new("app", "users")),
        ];

        let output = format_keyspaces(&keyspaces);
        assert!(output.contains("SimpleStrategy"));
        assert!(output.contains("replication_factor=3"));
        assert!(output.contains("users"));
        assert!(output.find("app").unwrap() < output.find("zoo").unwrap());
    }

    #[test]
    fn test_result_to_json() {
        let result = CqlResult {
            rows: vec![row("alice", &[("name", "Alice")])],
            ..Default::default()
        };

        let json = result_to_json(&result);
        assert_eq!(json["type"], "rows");
        assert_eq!(json["rows"][0]["key"], "alice");
        assert_eq!(json["rows"][0]["columns"]["name"], "Alice");

        assert_eq!(result_to_json(&CqlResult::void())["type"], "void");
    }
}
