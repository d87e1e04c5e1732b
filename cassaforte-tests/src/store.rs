/// In-memory storage behind the test node
///
/// Rows are kept in key order, so the node behaves like a cluster running an
/// order-preserving partitioner: the token of a row is the hex encoding of
/// its key.
use cassaforte_proto::{
    CfDef, Column, ColumnOrSuperColumn, ColumnParent, ColumnPath, CounterColumn, CqlRow,
    IndexClause, IndexExpression, IndexOperator, KeyMutations, KeyRange, KeySlice, KsDef,
    Mutation, SlicePredicate,
};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tonic::Status;
use uuid::Uuid;

pub const SYSTEM_KEYSPACE: &str = "system";

type Row<V> = BTreeMap<Vec<u8>, V>;
type Rows<V> = BTreeMap<Vec<u8>, Row<V>>;

/// A stored cell: a regular column or a counter value
trait Cell {
    fn value_bytes(&self) -> Vec<u8>;
    fn output(&self, name: &[u8]) -> ColumnOrSuperColumn;
    fn as_column(&self, name: &[u8]) -> Column;
}

impl Cell for Column {
    fn value_bytes(&self) -> Vec<u8> {
        self.value.clone()
    }

    fn output(&self, _name: &[u8]) -> ColumnOrSuperColumn {
        ColumnOrSuperColumn::from_column(self.clone())
    }

    fn as_column(&self, _name: &[u8]) -> Column {
        self.clone()
    }
}

impl Cell for i64 {
    fn value_bytes(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn output(&self, name: &[u8]) -> ColumnOrSuperColumn {
        ColumnOrSuperColumn::from_counter(CounterColumn::new(name, *self))
    }

    fn as_column(&self, name: &[u8]) -> Column {
        Column::new(name, &self.value_bytes(), 0)
    }
}

enum Table {
    Standard(Rows<Column>),
    Counter(Rows<i64>),
}

impl Table {
    fn for_def(cf_def: &CfDef) -> Self {
        if cf_def.is_counter() {
            Table::Counter(Rows::new())
        } else {
            Table::Standard(Rows::new())
        }
    }

    fn clear(&mut self) {
        match self {
            Table::Standard(rows) => rows.clear(),
            Table::Counter(rows) => rows.clear(),
        }
    }

    fn row_count(&self) -> usize {
        match self {
            Table::Standard(rows) => rows.len(),
            Table::Counter(rows) => rows.len(),
        }
    }
}

/// Keyspaces, column families and their rows
pub struct Store {
    keyspaces: BTreeMap<String, KsDef>,
    tables: HashMap<String, HashMap<String, Table>>,
    schema_version: String,
}

impl Store {
    pub fn new() -> Self {
        let mut keyspaces = BTreeMap::new();
        keyspaces.insert(
            SYSTEM_KEYSPACE.to_string(),
            KsDef {
                name: SYSTEM_KEYSPACE.to_string(),
                strategy_class: "org.apache.cassandra.locator.LocalStrategy".to_string(),
                durable_writes: true,
                ..Default::default()
            },
        );

        let mut tables = HashMap::new();
        tables.insert(SYSTEM_KEYSPACE.to_string(), HashMap::new());

        Self {
            keyspaces,
            tables,
            schema_version: Uuid::new_v4().to_string(),
        }
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    fn new_schema_version(&mut self) -> String {
        self.schema_version = Uuid::new_v4().to_string();
        self.schema_version.clone()
    }

    // ------------------------------------------------------------------------
    // Schema
    // ------------------------------------------------------------------------

    pub fn keyspaces(&self) -> Vec<KsDef> {
        self.keyspaces.values().cloned().collect()
    }

    pub fn keyspace(&self, name: &str) -> Option<&KsDef> {
        self.keyspaces.get(name)
    }

    pub fn cf_def(&self, keyspace: &str, column_family: &str) -> Result<&CfDef, Status> {
        self.keyspaces
            .get(keyspace)
            .and_then(|ks| ks.cf_defs.iter().find(|cf| cf.name == column_family))
            .ok_or_else(|| unconfigured(column_family))
    }

    pub fn add_keyspace(&mut self, mut ks_def: KsDef) -> Result<String, Status> {
        validate_name("Keyspace", &ks_def.name)?;
        if self.keyspaces.contains_key(&ks_def.name) {
            return Err(Status::invalid_argument(format!(
                "Keyspace '{}' already exists",
                ks_def.name
            )));
        }

        let mut tables = HashMap::new();
        for cf_def in &mut ks_def.cf_defs {
            validate_name("Column family", &cf_def.name)?;
            if cf_def.keyspace.is_empty() {
                cf_def.keyspace = ks_def.name.clone();
            } else if cf_def.keyspace != ks_def.name {
                return Err(Status::invalid_argument(format!(
                    "Column family '{}' belongs to keyspace '{}'",
                    cf_def.name, cf_def.keyspace
                )));
            }
            if tables.insert(cf_def.name.clone(), Table::for_def(cf_def)).is_some() {
                return Err(Status::invalid_argument(format!(
                    "Duplicate column family '{}'",
                    cf_def.name
                )));
            }
        }

        self.tables.insert(ks_def.name.clone(), tables);
        self.keyspaces.insert(ks_def.name.clone(), ks_def);
        Ok(self.new_schema_version())
    }

    pub fn drop_keyspace(&mut self, name: &str) -> Result<String, Status> {
        if name == SYSTEM_KEYSPACE {
            return Err(Status::invalid_argument("Cannot drop the system keyspace"));
        }
        if self.keyspaces.remove(name).is_none() {
            return Err(missing_keyspace(name));
        }
        self.tables.remove(name);
        Ok(self.new_schema_version())
    }

    pub fn update_keyspace(&mut self, mut ks_def: KsDef) -> Result<String, Status> {
        if !ks_def.cf_defs.is_empty() {
            return Err(Status::invalid_argument(
                "Keyspace update must not contain any column family definitions",
            ));
        }
        let existing = self
            .keyspaces
            .get_mut(&ks_def.name)
            .ok_or_else(|| missing_keyspace(&ks_def.name))?;

        ks_def.cf_defs = std::mem::take(&mut existing.cf_defs);
        *existing = ks_def;
        Ok(self.new_schema_version())
    }

    pub fn add_column_family(&mut self, cf_def: CfDef) -> Result<String, Status> {
        validate_name("Column family", &cf_def.name)?;
        let ks_def = self
            .keyspaces
            .get_mut(&cf_def.keyspace)
            .ok_or_else(|| missing_keyspace(&cf_def.keyspace))?;
        if ks_def.cf_defs.iter().any(|cf| cf.name == cf_def.name) {
            return Err(Status::invalid_argument(format!(
                "Column family '{}' already exists in keyspace '{}'",
                cf_def.name, cf_def.keyspace
            )));
        }

        self.tables
            .entry(cf_def.keyspace.clone())
            .or_default()
            .insert(cf_def.name.clone(), Table::for_def(&cf_def));
        ks_def.cf_defs.push(cf_def);
        Ok(self.new_schema_version())
    }

    pub fn drop_column_family(&mut self, keyspace: &str, name: &str) -> Result<String, Status> {
        let ks_def = self
            .keyspaces
            .get_mut(keyspace)
            .ok_or_else(|| missing_keyspace(keyspace))?;
        let before = ks_def.cf_defs.len();
        ks_def.cf_defs.retain(|cf| cf.name != name);
        if ks_def.cf_defs.len() == before {
            return Err(unconfigured(name));
        }

        if let Some(tables) = self.tables.get_mut(keyspace) {
            tables.remove(name);
        }
        Ok(self.new_schema_version())
    }

    pub fn update_column_family(&mut self, cf_def: CfDef) -> Result<String, Status> {
        let existing = self
            .keyspaces
            .get_mut(&cf_def.keyspace)
            .ok_or_else(|| missing_keyspace(&cf_def.keyspace))?
            .cf_defs
            .iter_mut()
            .find(|cf| cf.name == cf_def.name)
            .ok_or_else(|| unconfigured(&cf_def.name))?;

        if existing.is_counter() != cf_def.is_counter() {
            return Err(Status::invalid_argument(
                "Cannot change the default validation class to or from counters",
            ));
        }
        *existing = cf_def;
        Ok(self.new_schema_version())
    }

    fn table(&self, keyspace: &str, column_family: &str) -> Result<&Table, Status> {
        self.tables
            .get(keyspace)
            .and_then(|tables| tables.get(column_family))
            .ok_or_else(|| unconfigured(column_family))
    }

    fn table_mut(&mut self, keyspace: &str, column_family: &str) -> Result<&mut Table, Status> {
        self.tables
            .get_mut(keyspace)
            .and_then(|tables| tables.get_mut(column_family))
            .ok_or_else(|| unconfigured(column_family))
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn get(
        &self,
        keyspace: &str,
        key: &[u8],
        path: &ColumnPath,
    ) -> Result<ColumnOrSuperColumn, Status> {
        validate_key(key)?;
        reject_super_column(&path.super_column)?;
        if path.column.is_empty() {
            return Err(Status::invalid_argument(
                "column parameter is not optional for standard column families",
            ));
        }

        let found = match self.table(keyspace, &path.column_family)? {
            Table::Standard(rows) => lookup(rows, key, &path.column),
            Table::Counter(rows) => lookup(rows, key, &path.column),
        };
        found.ok_or_else(|| Status::not_found("Column not found"))
    }

    pub fn get_slice(
        &self,
        keyspace: &str,
        key: &[u8],
        parent: &ColumnParent,
        predicate: &SlicePredicate,
    ) -> Result<Vec<ColumnOrSuperColumn>, Status> {
        validate_key(key)?;
        reject_super_column(&parent.super_column)?;
        validate_predicate(predicate)?;

        Ok(match self.table(keyspace, &parent.column_family)? {
            Table::Standard(rows) => output(rows.get(key), predicate),
            Table::Counter(rows) => output(rows.get(key), predicate),
        })
    }

    pub fn get_range_slices(
        &self,
        keyspace: &str,
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        range: &KeyRange,
    ) -> Result<Vec<KeySlice>, Status> {
        reject_super_column(&parent.super_column)?;
        validate_predicate(predicate)?;
        let bounds = key_bounds(range)?;
        let count = positive_count(range.count, "Key range count")?;

        Ok(match self.table(keyspace, &parent.column_family)? {
            Table::Standard(rows) => range_slices(rows, bounds, &range.row_filter, predicate, count),
            Table::Counter(rows) => range_slices(rows, bounds, &range.row_filter, predicate, count),
        })
    }

    /// Rows of a key range, the first one starting at `start_column`.
    /// The range count limits the total number of columns returned.
    pub fn get_paged_slice(
        &self,
        keyspace: &str,
        column_family: &str,
        range: &KeyRange,
        start_column: &[u8],
    ) -> Result<Vec<KeySlice>, Status> {
        let bounds = key_bounds(range)?;
        let count = positive_count(range.count, "Key range count")?;

        Ok(match self.table(keyspace, column_family)? {
            Table::Standard(rows) => paged_slice(rows, bounds, start_column, count),
            Table::Counter(rows) => paged_slice(rows, bounds, start_column, count),
        })
    }

    pub fn get_indexed_slices(
        &self,
        keyspace: &str,
        parent: &ColumnParent,
        clause: &IndexClause,
        predicate: &SlicePredicate,
    ) -> Result<Vec<KeySlice>, Status> {
        reject_super_column(&parent.super_column)?;
        validate_predicate(predicate)?;
        if !clause.expressions.iter().any(|e| e.op() == IndexOperator::Eq) {
            return Err(Status::invalid_argument(
                "No indexed columns present in index clause with operator EQ",
            ));
        }
        let count = positive_count(clause.count, "Index clause count")?;
        let bounds = (Bound::Included(clause.start_key.clone()), Bound::Unbounded);

        Ok(match self.table(keyspace, &parent.column_family)? {
            Table::Standard(rows) => range_slices(rows, bounds, &clause.expressions, predicate, count),
            Table::Counter(rows) => range_slices(rows, bounds, &clause.expressions, predicate, count),
        })
    }

    /// Rows of a column family as CQL rows
    pub fn select(
        &self,
        keyspace: &str,
        column_family: &str,
        key: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<CqlRow>, Status> {
        Ok(match self.table(keyspace, column_family)? {
            Table::Standard(rows) => cql_rows(rows, key, limit),
            Table::Counter(rows) => cql_rows(rows, key, limit),
        })
    }

    pub fn row_count(&self, keyspace: &str, column_family: &str) -> Result<usize, Status> {
        Ok(self.table(keyspace, column_family)?.row_count())
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    pub fn insert(
        &mut self,
        keyspace: &str,
        key: &[u8],
        parent: &ColumnParent,
        column: Column,
    ) -> Result<(), Status> {
        validate_key(key)?;
        reject_super_column(&parent.super_column)?;
        match self.table_mut(keyspace, &parent.column_family)? {
            Table::Standard(rows) => insert_column(rows, key, column),
            Table::Counter(_) => Err(Status::invalid_argument(
                "Column family only supports counter columns",
            )),
        }
    }

    pub fn add(
        &mut self,
        keyspace: &str,
        key: &[u8],
        parent: &ColumnParent,
        counter: CounterColumn,
    ) -> Result<(), Status> {
        validate_key(key)?;
        reject_super_column(&parent.super_column)?;
        match self.table_mut(keyspace, &parent.column_family)? {
            Table::Counter(rows) => add_counter(rows, key, counter),
            Table::Standard(_) => Err(Status::invalid_argument(
                "Counter columns require a counter column family",
            )),
        }
    }

    pub fn remove(
        &mut self,
        keyspace: &str,
        key: &[u8],
        path: &ColumnPath,
        timestamp: i64,
    ) -> Result<(), Status> {
        validate_key(key)?;
        reject_super_column(&path.super_column)?;
        let names = (!path.column.is_empty()).then(|| vec![path.column.clone()]);
        match self.table_mut(keyspace, &path.column_family)? {
            Table::Standard(rows) => {
                delete_columns(rows, key, names.as_deref(), |c| c.timestamp <= timestamp);
                Ok(())
            }
            Table::Counter(_) => Err(Status::invalid_argument(
                "Use remove_counter to delete counter columns",
            )),
        }
    }

    pub fn remove_counter(&mut self, keyspace: &str, key: &[u8], path: &ColumnPath) -> Result<(), Status> {
        validate_key(key)?;
        reject_super_column(&path.super_column)?;
        let names = (!path.column.is_empty()).then(|| vec![path.column.clone()]);
        match self.table_mut(keyspace, &path.column_family)? {
            Table::Counter(rows) => {
                delete_columns(rows, key, names.as_deref(), |_| true);
                Ok(())
            }
            Table::Standard(_) => Err(Status::invalid_argument(
                "Column family does not hold counter columns",
            )),
        }
    }

    /// Apply a batch. Every mutation is checked before any is applied.
    pub fn batch_mutate(&mut self, keyspace: &str, batch: Vec<KeyMutations>) -> Result<(), Status> {
        for row in &batch {
            validate_key(&row.key)?;
            for (column_family, list) in &row.column_families {
                let counter = matches!(self.table(keyspace, column_family)?, Table::Counter(_));
                for mutation in &list.mutations {
                    check_mutation(mutation, counter)?;
                }
            }
        }

        for row in batch {
            for (column_family, list) in row.column_families {
                let table = self.table_mut(keyspace, &column_family)?;
                for mutation in list.mutations {
                    apply_mutation(table, &row.key, mutation)?;
                }
            }
        }
        Ok(())
    }

    pub fn truncate(&mut self, keyspace: &str, column_family: &str) -> Result<(), Status> {
        self.table_mut(keyspace, column_family)?.clear();
        Ok(())
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn unconfigured(column_family: &str) -> Status {
    Status::invalid_argument(format!("unconfigured columnfamily {}", column_family))
}

fn missing_keyspace(name: &str) -> Status {
    Status::invalid_argument(format!("Keyspace '{}' does not exist", name))
}

fn validate_name(kind: &str, name: &str) -> Result<(), Status> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Status::invalid_argument(format!(
            "{} name must not be empty and may only contain alphanumerical characters or underscores (got '{}')",
            kind, name
        )));
    }
    Ok(())
}

fn validate_key(key: &[u8]) -> Result<(), Status> {
    if key.is_empty() {
        return Err(Status::invalid_argument("Key may not be empty"));
    }
    Ok(())
}

fn reject_super_column(super_column: &[u8]) -> Result<(), Status> {
    if !super_column.is_empty() {
        return Err(Status::invalid_argument("Super columns are not supported"));
    }
    Ok(())
}

fn positive_count(count: i32, what: &str) -> Result<usize, Status> {
    if count <= 0 {
        return Err(Status::invalid_argument(format!("{} must be positive", what)));
    }
    Ok(count as usize)
}

fn validate_predicate(predicate: &SlicePredicate) -> Result<(), Status> {
    match (&predicate.slice_range, predicate.column_names.is_empty()) {
        (None, true) => Err(Status::invalid_argument(
            "A SlicePredicate must be given column_names or slice_range",
        )),
        (Some(_), false) => Err(Status::invalid_argument(
            "A SlicePredicate may not have both column_names and slice_range",
        )),
        (None, false) => Ok(()),
        (Some(range), true) => {
            if range.count < 0 {
                return Err(Status::invalid_argument("get_slice requires non-negative count"));
            }
            let bounded = !range.start.is_empty() && !range.finish.is_empty();
            let inverted = if range.reversed {
                range.start < range.finish
            } else {
                range.start > range.finish
            };
            if bounded && inverted {
                return Err(Status::invalid_argument(
                    "range finish must come after start in the order of traversal",
                ));
            }
            Ok(())
        }
    }
}

/// Token of a row key under the order-preserving partitioner
pub fn token_of(key: &[u8]) -> String {
    key.iter().map(|b| format!("{:02x}", b)).collect()
}

fn key_of(token: &str) -> Result<Vec<u8>, Status> {
    let invalid = || Status::invalid_argument(format!("Invalid token '{}'", token));
    if token.len() % 2 != 0 {
        return Err(invalid());
    }
    (0..token.len())
        .step_by(2)
        .map(|i| {
            token
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(invalid)
        })
        .collect()
}

type KeyBounds = (Bound<Vec<u8>>, Bound<Vec<u8>>);

/// Key bounds of a range. Key bounds are inclusive, token ranges exclude
/// their start.
fn key_bounds(range: &KeyRange) -> Result<KeyBounds, Status> {
    let by_key = !range.start_key.is_empty() || !range.end_key.is_empty();
    let by_token = !range.start_token.is_empty() || !range.end_token.is_empty();
    if by_key && by_token {
        return Err(Status::invalid_argument(
            "Exactly one of {start key, end key} or {start token, end token} must be specified",
        ));
    }

    let (start, end) = if by_token {
        let start = match range.start_token.as_str() {
            "" => Bound::Unbounded,
            token => Bound::Excluded(key_of(token)?),
        };
        let end = match range.end_token.as_str() {
            "" => Bound::Unbounded,
            token => Bound::Included(key_of(token)?),
        };
        (start, end)
    } else {
        let bound = |key: &[u8]| {
            if key.is_empty() {
                Bound::Unbounded
            } else {
                Bound::Included(key.to_vec())
            }
        };
        (bound(&range.start_key), bound(&range.end_key))
    };

    if let (Bound::Included(s) | Bound::Excluded(s), Bound::Included(e)) = (&start, &end) {
        if s > e {
            return Err(Status::invalid_argument(
                "start key must sort before (or equal to) finish key",
            ));
        }
    }
    Ok((start, end))
}

fn lookup<V: Cell>(rows: &Rows<V>, key: &[u8], name: &[u8]) -> Option<ColumnOrSuperColumn> {
    rows.get(key)
        .and_then(|row| row.get(name))
        .map(|cell| cell.output(name))
}

/// Columns of a row selected by an already validated predicate
fn select<'a, V>(row: &'a Row<V>, predicate: &SlicePredicate) -> Vec<(&'a [u8], &'a V)> {
    let Some(range) = &predicate.slice_range else {
        return predicate
            .column_names
            .iter()
            .filter_map(|name| row.get_key_value(name))
            .map(|(name, cell)| (name.as_slice(), cell))
            .collect();
    };

    let count = range.count.max(0) as usize;
    let lower = |key: &[u8]| if key.is_empty() { Bound::Unbounded } else { Bound::Included(key.to_vec()) };
    let selected = if range.reversed {
        row.range((lower(&range.finish), lower(&range.start)))
            .rev()
            .take(count)
            .map(|(name, cell)| (name.as_slice(), cell))
            .collect()
    } else {
        row.range((lower(&range.start), lower(&range.finish)))
            .take(count)
            .map(|(name, cell)| (name.as_slice(), cell))
            .collect()
    };
    selected
}

fn output<V: Cell>(row: Option<&Row<V>>, predicate: &SlicePredicate) -> Vec<ColumnOrSuperColumn> {
    row.map(|row| {
        select(row, predicate)
            .into_iter()
            .map(|(name, cell)| cell.output(name))
            .collect()
    })
    .unwrap_or_default()
}

fn matches_expression<V: Cell>(row: &Row<V>, expression: &IndexExpression) -> bool {
    let Some(cell) = row.get(&expression.column_name) else {
        return false;
    };
    let value = cell.value_bytes();
    match expression.op() {
        IndexOperator::Eq => value == expression.value,
        IndexOperator::Gte => value >= expression.value,
        IndexOperator::Gt => value > expression.value,
        IndexOperator::Lte => value <= expression.value,
        IndexOperator::Lt => value < expression.value,
    }
}

fn range_slices<V: Cell>(
    rows: &Rows<V>,
    bounds: KeyBounds,
    filter: &[IndexExpression],
    predicate: &SlicePredicate,
    count: usize,
) -> Vec<KeySlice> {
    rows.range(bounds)
        .filter(|(_, row)| filter.iter().all(|e| matches_expression(row, e)))
        .take(count)
        .map(|(key, row)| KeySlice {
            key: key.clone(),
            columns: output(Some(row), predicate),
        })
        .collect()
}

fn paged_slice<V: Cell>(rows: &Rows<V>, bounds: KeyBounds, start_column: &[u8], count: usize) -> Vec<KeySlice> {
    let mut remaining = count;
    let mut slices = Vec::new();

    for (i, (key, row)) in rows.range(bounds).enumerate() {
        if remaining == 0 {
            break;
        }
        let first = if i == 0 && !start_column.is_empty() {
            Bound::Included(start_column.to_vec())
        } else {
            Bound::Unbounded
        };
        let columns: Vec<_> = row
            .range((first, Bound::Unbounded))
            .take(remaining)
            .map(|(name, cell)| cell.output(name))
            .collect();
        remaining -= columns.len();
        slices.push(KeySlice {
            key: key.clone(),
            columns,
        });
    }
    slices
}

fn cql_rows<V: Cell>(rows: &Rows<V>, key: Option<&[u8]>, limit: usize) -> Vec<CqlRow> {
    let to_row = |(key, row): (&Vec<u8>, &Row<V>)| CqlRow {
        key: key.clone(),
        columns: row.iter().map(|(name, cell)| cell.as_column(name)).collect(),
    };
    match key {
        Some(key) => rows.get_key_value(key).map(to_row).into_iter().collect(),
        None => rows.iter().take(limit).map(to_row).collect(),
    }
}

fn insert_column(rows: &mut Rows<Column>, key: &[u8], column: Column) -> Result<(), Status> {
    if column.name.is_empty() {
        return Err(Status::invalid_argument("Column name must not be empty"));
    }
    if column.ttl < 0 {
        return Err(Status::invalid_argument("ttl must be positive"));
    }

    let row = rows.entry(key.to_vec()).or_default();
    match row.get(&column.name) {
        Some(existing) if existing.timestamp > column.timestamp => {}
        _ => {
            row.insert(column.name.clone(), column);
        }
    }
    Ok(())
}

fn add_counter(rows: &mut Rows<i64>, key: &[u8], counter: CounterColumn) -> Result<(), Status> {
    if counter.name.is_empty() {
        return Err(Status::invalid_argument("Column name must not be empty"));
    }
    *rows
        .entry(key.to_vec())
        .or_default()
        .entry(counter.name)
        .or_insert(0) += counter.value;
    Ok(())
}

/// Delete the named columns of a row, or the whole row when no names are
/// given, keeping cells for which `deletable` is false
fn delete_columns<V>(rows: &mut Rows<V>, key: &[u8], names: Option<&[Vec<u8>]>, deletable: impl Fn(&V) -> bool) {
    let Some(row) = rows.get_mut(key) else {
        return;
    };
    match names {
        Some(names) => {
            for name in names {
                if row.get(name).is_some_and(&deletable) {
                    row.remove(name);
                }
            }
        }
        None => row.retain(|_, cell| !deletable(&*cell)),
    }
    if row.is_empty() {
        rows.remove(key);
    }
}

fn check_mutation(mutation: &Mutation, counter: bool) -> Result<(), Status> {
    match (&mutation.column_or_supercolumn, &mutation.deletion) {
        (Some(cosc), None) => {
            let ok = match (&cosc.column, &cosc.counter_column) {
                (Some(_), None) => !counter,
                (None, Some(_)) => counter,
                _ => false,
            };
            if !ok || cosc.super_column.is_some() || cosc.counter_super_column.is_some() {
                return Err(Status::invalid_argument(
                    "Mutation must hold exactly one column of the column family's kind",
                ));
            }
            Ok(())
        }
        (None, Some(deletion)) => {
            reject_super_column(&deletion.super_column)?;
            if deletion
                .predicate
                .as_ref()
                .is_some_and(|p| p.slice_range.is_some())
            {
                return Err(Status::invalid_argument(
                    "Deletion does not support SliceRange predicates",
                ));
            }
            Ok(())
        }
        _ => Err(Status::invalid_argument(
            "Mutation must have one and only one of column_or_supercolumn or deletion",
        )),
    }
}

fn apply_mutation(table: &mut Table, key: &[u8], mutation: Mutation) -> Result<(), Status> {
    if let Some(deletion) = mutation.deletion {
        let names = deletion.predicate.map(|p| p.column_names);
        match table {
            Table::Standard(rows) => {
                delete_columns(rows, key, names.as_deref(), |c| c.timestamp <= deletion.timestamp)
            }
            Table::Counter(rows) => delete_columns(rows, key, names.as_deref(), |_| true),
        }
        return Ok(());
    }

    let Some(cosc) = mutation.column_or_supercolumn else {
        return Ok(());
    };
    match (table, cosc.column, cosc.counter_column) {
        (Table::Standard(rows), Some(column), _) => insert_column(rows, key, column),
        (Table::Counter(rows), _, Some(counter)) => add_counter(rows, key, counter),
        _ => Err(Status::invalid_argument("Mutation does not match the column family")),
    }
}
