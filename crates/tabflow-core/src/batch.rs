//! The columnar batch model: typed column arrays, null bitmaps, and a
//! per-batch arena owning all variable-length (string) data.

use arcstr::ArcStr;

use crate::arena::{Arena, StrRef};
use crate::value::{DataType, Value};

/// Column names + types. `known = false` marks "cannot be determined
/// until runtime", the state every decoder's output schema starts in.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    names: Vec<ArcStr>,
    types: Vec<DataType>,
    known: bool,
}

impl Schema {
    pub fn new(columns: Vec<(ArcStr, DataType)>, known: bool) -> Self {
        let (names, types) = columns.into_iter().unzip();
        Schema { names, types, known }
    }

    pub fn empty() -> Self {
        Schema {
            names: Vec::new(),
            types: Vec::new(),
            known: false,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[ArcStr] {
        &self.names
    }

    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    pub fn known(&self) -> bool {
        self.known
    }

    pub fn set_known(&mut self, known: bool) {
        self.known = known;
    }

    pub fn name(&self, col: usize) -> &ArcStr {
        &self.names[col]
    }

    pub fn type_of(&self, col: usize) -> DataType {
        self.types[col]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.as_str() == name)
    }

    pub fn push(&mut self, name: ArcStr, ty: DataType) {
        self.names.push(name);
        self.types.push(ty);
    }

    pub fn set(&mut self, col: usize, name: ArcStr, ty: DataType) {
        self.names[col] = name;
        self.types[col] = ty;
    }
}

/// Per-column backing storage, struct-of-arrays style: one typed array
/// per column.
#[derive(Debug, Clone)]
pub enum ColumnData {
    Bool(Vec<bool>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    String(Vec<StrRef>),
    Date(Vec<i32>),
    Timestamp(Vec<i64>),
}

impl ColumnData {
    fn new(ty: DataType, capacity: usize) -> Self {
        match ty {
            DataType::Null | DataType::Bool => ColumnData::Bool(vec![false; capacity]),
            DataType::Int64 => ColumnData::Int64(vec![0; capacity]),
            DataType::Float64 => ColumnData::Float64(vec![0.0; capacity]),
            DataType::String => ColumnData::String(vec![StrRef::default(); capacity]),
            DataType::Date => ColumnData::Date(vec![0; capacity]),
            DataType::Timestamp => ColumnData::Timestamp(vec![0; capacity]),
        }
    }

    fn len(&self) -> usize {
        match self {
            ColumnData::Bool(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::String(v) => v.len(),
            ColumnData::Date(v) => v.len(),
            ColumnData::Timestamp(v) => v.len(),
        }
    }

    fn resize(&mut self, capacity: usize) {
        match self {
            ColumnData::Bool(v) => v.resize(capacity, false),
            ColumnData::Int64(v) => v.resize(capacity, 0),
            ColumnData::Float64(v) => v.resize(capacity, 0.0),
            ColumnData::String(v) => v.resize(capacity, StrRef::default()),
            ColumnData::Date(v) => v.resize(capacity, 0),
            ColumnData::Timestamp(v) => v.resize(capacity, 0),
        }
    }
}

/// The unit of work: column arrays + null bitmaps for a contiguous block
/// of rows, owning its string storage via an arena.
pub struct Batch {
    schema: Schema,
    row_count: usize,
    capacity: usize,
    columns: Vec<ColumnData>,
    nulls: Vec<Vec<u8>>,
    arena: Arena,
}

impl Batch {
    /// Allocate column arrays sized for `capacity` rows, zero the null
    /// markers, and create an owning arena. Columns start as `Null`-typed
    /// placeholders; call `set_schema` before writing data.
    pub fn create(n_cols: usize, capacity: usize) -> Self {
        Batch {
            schema: Schema::new(vec![(ArcStr::from(""), DataType::Null); n_cols], false),
            row_count: 0,
            capacity,
            columns: (0..n_cols)
                .map(|_| ColumnData::new(DataType::Null, capacity))
                .collect(),
            nulls: vec![vec![0u8; capacity]; n_cols],
            arena: Arena::new(),
        }
    }

    pub fn with_capacity_for(schema: Schema, capacity: usize) -> Self {
        let n_cols = schema.len();
        let columns = schema
            .types()
            .iter()
            .map(|ty| ColumnData::new(*ty, capacity))
            .collect();
        Batch {
            schema,
            row_count: 0,
            capacity,
            columns,
            nulls: vec![vec![0u8; capacity]; n_cols],
            arena: Arena::new(),
        }
    }

    /// Assign a column's name and type. Only meaningful before data is
    /// written to that column; re-typing a written column discards its
    /// backing array.
    pub fn set_schema(&mut self, col: usize, name: &str, ty: DataType) {
        self.schema.set(col, ArcStr::from(name), ty);
        self.columns[col] = ColumnData::new(ty, self.capacity);
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn set_row_count(&mut self, n: usize) {
        debug_assert!(n <= self.capacity);
        self.row_count = n;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Grow backing arrays in place to hold at least `n_rows`; existing
    /// contents are preserved and newly added null markers default to
    /// null (the row hasn't been written yet).
    pub fn ensure_capacity(&mut self, n_rows: usize) {
        if n_rows <= self.capacity {
            return;
        }
        let new_cap = n_rows.max(self.capacity * 2).max(1);
        for col in self.columns.iter_mut() {
            col.resize(new_cap);
        }
        for col_nulls in self.nulls.iter_mut() {
            col_nulls.resize(new_cap, 1);
        }
        self.capacity = new_cap;
    }

    pub fn is_null(&self, row: usize, col: usize) -> bool {
        self.nulls[col][row] != 0
    }

    pub fn set_null(&mut self, row: usize, col: usize) {
        self.nulls[col][row] = 1;
    }

    fn set_non_null(&mut self, row: usize, col: usize) {
        self.nulls[col][row] = 0;
    }

    pub fn set_bool(&mut self, row: usize, col: usize, v: bool) {
        if let ColumnData::Bool(a) = &mut self.columns[col] {
            a[row] = v;
        } else {
            panic!("column {col} is not Bool");
        }
        self.set_non_null(row, col);
    }

    pub fn get_bool(&self, row: usize, col: usize) -> bool {
        match &self.columns[col] {
            ColumnData::Bool(a) => a[row],
            _ => panic!("column {col} is not Bool"),
        }
    }

    pub fn set_int64(&mut self, row: usize, col: usize, v: i64) {
        if let ColumnData::Int64(a) = &mut self.columns[col] {
            a[row] = v;
        } else {
            panic!("column {col} is not Int64");
        }
        self.set_non_null(row, col);
    }

    pub fn get_int64(&self, row: usize, col: usize) -> i64 {
        match &self.columns[col] {
            ColumnData::Int64(a) => a[row],
            _ => panic!("column {col} is not Int64"),
        }
    }

    pub fn set_float64(&mut self, row: usize, col: usize, v: f64) {
        if let ColumnData::Float64(a) = &mut self.columns[col] {
            a[row] = v;
        } else {
            panic!("column {col} is not Float64");
        }
        self.set_non_null(row, col);
    }

    pub fn get_float64(&self, row: usize, col: usize) -> f64 {
        match &self.columns[col] {
            ColumnData::Float64(a) => a[row],
            _ => panic!("column {col} is not Float64"),
        }
    }

    pub fn set_date(&mut self, row: usize, col: usize, v: i32) {
        if let ColumnData::Date(a) = &mut self.columns[col] {
            a[row] = v;
        } else {
            panic!("column {col} is not Date");
        }
        self.set_non_null(row, col);
    }

    pub fn get_date(&self, row: usize, col: usize) -> i32 {
        match &self.columns[col] {
            ColumnData::Date(a) => a[row],
            _ => panic!("column {col} is not Date"),
        }
    }

    pub fn set_timestamp(&mut self, row: usize, col: usize, v: i64) {
        if let ColumnData::Timestamp(a) = &mut self.columns[col] {
            a[row] = v;
        } else {
            panic!("column {col} is not Timestamp");
        }
        self.set_non_null(row, col);
    }

    pub fn get_timestamp(&self, row: usize, col: usize) -> i64 {
        match &self.columns[col] {
            ColumnData::Timestamp(a) => a[row],
            _ => panic!("column {col} is not Timestamp"),
        }
    }

    /// Duplicate `s` into this batch's arena and record the handle.
    pub fn set_string(&mut self, row: usize, col: usize, s: &str) {
        let handle = self.arena.alloc_str(s.as_bytes());
        if let ColumnData::String(a) = &mut self.columns[col] {
            a[row] = handle;
        } else {
            panic!("column {col} is not String");
        }
        self.set_non_null(row, col);
    }

    pub fn get_str(&self, row: usize, col: usize) -> &str {
        match &self.columns[col] {
            ColumnData::String(a) => self.arena.resolve(a[row]),
            _ => panic!("column {col} is not String"),
        }
    }

    /// Box a cell out as a dynamically-typed `Value`, for code (the
    /// expression evaluator, key-building operators) that needs to
    /// treat every column uniformly.
    pub fn get_value(&self, row: usize, col: usize) -> Value {
        if self.is_null(row, col) {
            return Value::Null;
        }
        match self.schema.type_of(col) {
            DataType::Null => Value::Null,
            DataType::Bool => Value::Bool(self.get_bool(row, col)),
            DataType::Int64 => Value::Int64(self.get_int64(row, col)),
            DataType::Float64 => Value::Float64(self.get_float64(row, col)),
            DataType::String => Value::String(self.get_str(row, col).to_string()),
            DataType::Date => Value::Date(self.get_date(row, col)),
            DataType::Timestamp => Value::Timestamp(self.get_timestamp(row, col)),
        }
    }

    /// Write a dynamically-typed `Value` into a cell, used by operators
    /// that build derived columns generically (derive, group-agg, stats).
    pub fn set_value(&mut self, row: usize, col: usize, v: &Value) {
        match v {
            Value::Null => self.set_null(row, col),
            Value::Bool(b) => self.set_bool(row, col, *b),
            Value::Int64(i) => self.set_int64(row, col, *i),
            Value::Float64(f) => self.set_float64(row, col, *f),
            Value::String(s) => self.set_string(row, col, s),
            Value::Date(d) => self.set_date(row, col, *d),
            Value::Timestamp(t) => self.set_timestamp(row, col, *t),
        }
    }

    /// Deep-copy one row from `src` into `dst_row` of `self`, duplicating
    /// any string cell into this batch's own arena.
    pub fn copy_row(&mut self, dst_row: usize, src: &Batch, src_row: usize) {
        let n = self.n_cols().min(src.n_cols());
        for col in 0..n {
            if src.is_null(src_row, col) {
                self.set_null(dst_row, col);
                continue;
            }
            match src.schema.type_of(col) {
                DataType::Null => self.set_null(dst_row, col),
                DataType::Bool => self.set_bool(dst_row, col, src.get_bool(src_row, col)),
                DataType::Int64 => self.set_int64(dst_row, col, src.get_int64(src_row, col)),
                DataType::Float64 => self.set_float64(dst_row, col, src.get_float64(src_row, col)),
                DataType::String => self.set_string(dst_row, col, src.get_str(src_row, col)),
                DataType::Date => self.set_date(dst_row, col, src.get_date(src_row, col)),
                DataType::Timestamp => {
                    self.set_timestamp(dst_row, col, src.get_timestamp(src_row, col))
                }
            }
        }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema2(a: DataType, b: DataType) -> Schema {
        Schema::new(
            vec![(ArcStr::from("a"), a), (ArcStr::from("b"), b)],
            true,
        )
    }

    #[test]
    fn write_and_read_typed_cells() {
        let mut batch = Batch::with_capacity_for(schema2(DataType::Int64, DataType::String), 4);
        batch.set_row_count(2);
        batch.set_int64(0, 0, 42);
        batch.set_string(0, 1, "hello");
        batch.set_null(1, 0);
        batch.set_string(1, 1, "world");

        assert_eq!(batch.get_int64(0, 0), 42);
        assert_eq!(batch.get_str(0, 1), "hello");
        assert!(batch.is_null(1, 0));
        assert_eq!(batch.get_str(1, 1), "world");
    }

    #[test]
    fn ensure_capacity_preserves_existing_rows() {
        let mut batch = Batch::with_capacity_for(schema2(DataType::Int64, DataType::Int64), 2);
        batch.set_row_count(2);
        batch.set_int64(0, 0, 1);
        batch.set_int64(1, 0, 2);
        batch.ensure_capacity(10);
        assert_eq!(batch.get_int64(0, 0), 1);
        assert_eq!(batch.get_int64(1, 0), 2);
        assert!(batch.capacity() >= 10);
    }

    #[test]
    fn copy_row_duplicates_strings_into_destination_arena() {
        let mut src = Batch::with_capacity_for(schema2(DataType::Int64, DataType::String), 1);
        src.set_row_count(1);
        src.set_int64(0, 0, 7);
        src.set_string(0, 1, "copied");

        let mut dst = Batch::with_capacity_for(schema2(DataType::Int64, DataType::String), 1);
        dst.set_row_count(1);
        dst.copy_row(0, &src, 0);

        assert_eq!(dst.get_int64(0, 0), 7);
        assert_eq!(dst.get_str(0, 1), "copied");
    }

    #[test]
    fn get_value_respects_null_marker() {
        let mut batch = Batch::with_capacity_for(schema2(DataType::Int64, DataType::Int64), 1);
        batch.set_row_count(1);
        batch.set_null(0, 0);
        assert_eq!(batch.get_value(0, 0), Value::Null);
    }
}
