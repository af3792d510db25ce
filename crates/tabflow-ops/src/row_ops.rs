//! Row-at-a-time, non-aggregating operators: filter, derive, select,
//! rename, unique, passthrough, clean, grep.

use std::collections::{HashMap, HashSet};

use arcstr::ArcStr;
use tabflow_core::batch::{Batch, Schema};
use tabflow_core::expr::{parse, Evaluator, Expr};
use tabflow_core::ir::CompiledOp;
use tabflow_core::value::{DataType, Value};
use tabflow_core::{ArgTree, Result, Transform};

use crate::common::{coerce_to, copy_whole_batch};
use crate::key::build_key;

pub struct Filter {
    expr: Expr,
    evaluator: Evaluator,
}

impl Filter {
    pub fn new(expr_src: &str) -> anyhow::Result<Self> {
        Ok(Filter {
            expr: parse(expr_src).map_err(|e| anyhow::anyhow!(e))?,
            evaluator: Evaluator::new(),
        })
    }
}

impl Transform for Filter {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        let mut out = Batch::with_capacity_for(input.schema().clone(), input.row_count().max(1));
        let mut out_row = 0;
        for row in 0..input.row_count() {
            let truthy = self
                .evaluator
                .eval(&self.expr, input, row)
                .map(|v| v.is_truthy())
                .unwrap_or(false);
            if truthy {
                out.ensure_capacity(out_row + 1);
                out.copy_row(out_row, input, row);
                out_row += 1;
            }
        }
        out.set_row_count(out_row);
        Ok(if out_row == 0 { None } else { Some(out) })
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

pub struct DeriveColumn {
    pub name: String,
    pub expr: Expr,
}

/// On the first non-empty batch, resolves each derivation's output type
/// from row 0 (falling back to Float64 for a null result). Every
/// subsequent row coerces across the Int64/Float64 boundary; anything
/// else incompatible with the resolved type writes null.
pub struct Derive {
    columns: Vec<DeriveColumn>,
    evaluator: Evaluator,
    resolved_types: Option<Vec<DataType>>,
}

impl Derive {
    pub fn new(columns: Vec<DeriveColumn>) -> Self {
        Derive {
            columns,
            evaluator: Evaluator::new(),
            resolved_types: None,
        }
    }
}

impl Transform for Derive {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        if input.row_count() == 0 {
            return Ok(None);
        }
        if self.resolved_types.is_none() {
            let types = self
                .columns
                .iter()
                .map(|c| {
                    let v = self.evaluator.eval(&c.expr, input, 0).unwrap_or(Value::Null);
                    match v.type_of() {
                        DataType::Null => DataType::Float64,
                        t => t,
                    }
                })
                .collect();
            self.resolved_types = Some(types);
        }
        let types = self.resolved_types.clone().unwrap();

        let mut schema = input.schema().clone();
        for (col, ty) in self.columns.iter().zip(&types) {
            schema.push(ArcStr::from(col.name.as_str()), *ty);
        }
        let base_cols = input.n_cols();
        let mut out = Batch::with_capacity_for(schema, input.row_count());
        out.set_row_count(input.row_count());
        for row in 0..input.row_count() {
            out.copy_row(row, input, row);
            for (i, col) in self.columns.iter().enumerate() {
                let v = self.evaluator.eval(&col.expr, input, row).unwrap_or(Value::Null);
                match coerce_to(&v, types[i]) {
                    Some(v) => out.set_value(row, base_cols + i, &v),
                    None => out.set_null(row, base_cols + i),
                }
            }
        }
        Ok(Some(out))
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

pub struct Select {
    columns: Vec<String>,
}

impl Select {
    pub fn new(columns: Vec<String>) -> Self {
        Select { columns }
    }
}

impl Transform for Select {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        if input.row_count() == 0 {
            return Ok(None);
        }
        let mut schema = Schema::empty();
        let mut sources: Vec<Option<usize>> = Vec::with_capacity(self.columns.len());
        for name in &self.columns {
            match input.schema().index_of(name) {
                Some(idx) => {
                    schema.push(ArcStr::from(name.as_str()), input.schema().type_of(idx));
                    sources.push(Some(idx));
                }
                None => {
                    tracing::warn!(column = %name, "select: missing column, emitting all-null");
                    schema.push(ArcStr::from(name.as_str()), DataType::Null);
                    sources.push(None);
                }
            }
        }
        let mut out = Batch::with_capacity_for(schema, input.row_count());
        out.set_row_count(input.row_count());
        for row in 0..input.row_count() {
            for (out_col, src) in sources.iter().enumerate() {
                match src {
                    Some(src_col) if !input.is_null(row, *src_col) => {
                        out.set_value(row, out_col, &input.get_value(row, *src_col));
                    }
                    _ => out.set_null(row, out_col),
                }
            }
        }
        Ok(Some(out))
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

pub struct Rename {
    mapping: HashMap<String, String>,
}

impl Rename {
    pub fn new(mapping: HashMap<String, String>) -> Self {
        Rename { mapping }
    }
}

impl Transform for Rename {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        if input.row_count() == 0 {
            return Ok(None);
        }
        let mut schema = input.schema().clone();
        for col in 0..schema.len() {
            if let Some(new_name) = self.mapping.get(schema.name(col).as_str()) {
                let ty = schema.type_of(col);
                schema.set(col, ArcStr::from(new_name.as_str()), ty);
            }
        }
        let mut out = Batch::with_capacity_for(schema, input.row_count());
        out.set_row_count(input.row_count());
        for row in 0..input.row_count() {
            out.copy_row(row, input, row);
        }
        Ok(Some(out))
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

/// Dedup by a key over `columns` (or every column, if none given).
/// Key-present rows drop; key-absent rows pass and are remembered.
pub struct Unique {
    columns: Option<Vec<String>>,
    seen: HashSet<String>,
}

impl Unique {
    pub fn new(columns: Option<Vec<String>>) -> Self {
        Unique {
            columns,
            seen: HashSet::new(),
        }
    }
}

impl Transform for Unique {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        let cols: Vec<usize> = match &self.columns {
            Some(names) => names.iter().filter_map(|n| input.schema().index_of(n)).collect(),
            None => (0..input.n_cols()).collect(),
        };
        let mut out = Batch::with_capacity_for(input.schema().clone(), input.row_count().max(1));
        let mut out_row = 0;
        for row in 0..input.row_count() {
            let key = build_key(input, row, &cols);
            if self.seen.insert(key) {
                out.ensure_capacity(out_row + 1);
                out.copy_row(out_row, input, row);
                out_row += 1;
            }
        }
        out.set_row_count(out_row);
        Ok(if out_row == 0 { None } else { Some(out) })
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

#[derive(Default)]
pub struct Passthrough;

impl Transform for Passthrough {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        if input.row_count() == 0 {
            return Ok(None);
        }
        Ok(Some(copy_whole_batch(input)))
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

pub enum CaseFold {
    Lower,
    Upper,
    Title,
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut c = w.chars();
            match c.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().collect::<String>() + c.as_str(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Supplemental op (not named in the core op list, grounded in the
/// teacher's row-cleaning pass): drops rows with any null, trims
/// strings, and/or normalizes string case.
pub struct Clean {
    pub remove_nulls: bool,
    pub trim_strings: bool,
    pub normalize_case: Option<CaseFold>,
}

impl Transform for Clean {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        let mut out = Batch::with_capacity_for(input.schema().clone(), input.row_count().max(1));
        let mut out_row = 0;
        'rows: for row in 0..input.row_count() {
            if self.remove_nulls {
                for col in 0..input.n_cols() {
                    if input.is_null(row, col) {
                        continue 'rows;
                    }
                }
            }
            out.ensure_capacity(out_row + 1);
            out.copy_row(out_row, input, row);
            if self.trim_strings || self.normalize_case.is_some() {
                for col in 0..input.n_cols() {
                    if input.schema().type_of(col) != DataType::String || out.is_null(out_row, col) {
                        continue;
                    }
                    let mut s = out.get_str(out_row, col).to_string();
                    if self.trim_strings {
                        s = s.trim().to_string();
                    }
                    match &self.normalize_case {
                        Some(CaseFold::Lower) => s = s.to_lowercase(),
                        Some(CaseFold::Upper) => s = s.to_uppercase(),
                        Some(CaseFold::Title) => s = title_case(&s),
                        None => {}
                    }
                    out.set_string(out_row, col, &s);
                }
            }
            out_row += 1;
        }
        out.set_row_count(out_row);
        Ok(if out_row == 0 { None } else { Some(out) })
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

/// Supplemental op backing the DSL's `grep [-v] [-r] pattern` shape:
/// keeps rows where any column's string representation matches
/// `pattern` (plain substring, or a regex when `regex` is set),
/// inverted when `invert` is set.
pub enum GrepPattern {
    Substring(String),
    Regex(regex::Regex),
}

pub struct Grep {
    pattern: GrepPattern,
    invert: bool,
}

impl Grep {
    pub fn new(pattern: &str, regex_mode: bool, invert: bool) -> anyhow::Result<Self> {
        let pattern = if regex_mode {
            GrepPattern::Regex(regex::Regex::new(pattern)?)
        } else {
            GrepPattern::Substring(pattern.to_string())
        };
        Ok(Grep { pattern, invert })
    }

    fn row_matches(&self, input: &Batch, row: usize) -> bool {
        (0..input.n_cols()).any(|col| {
            if input.is_null(row, col) {
                return false;
            }
            let text = input.get_value(row, col).to_string();
            match &self.pattern {
                GrepPattern::Substring(needle) => text.contains(needle.as_str()),
                GrepPattern::Regex(re) => re.is_match(&text),
            }
        })
    }
}

impl Transform for Grep {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        let mut out = Batch::with_capacity_for(input.schema().clone(), input.row_count().max(1));
        let mut out_row = 0;
        for row in 0..input.row_count() {
            if self.row_matches(input, row) != self.invert {
                out.ensure_capacity(out_row + 1);
                out.copy_row(out_row, input, row);
                out_row += 1;
            }
        }
        out.set_row_count(out_row);
        Ok(if out_row == 0 { None } else { Some(out) })
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

fn split_csv_list(s: &str) -> Vec<String> {
    s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect()
}

pub fn construct_filter(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let expr = args
        .get("expr")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("filter requires `expr`"))?;
    Ok(CompiledOp::Transform(Box::new(Filter::new(expr)?)))
}

pub fn construct_derive(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let columns = args
        .get("columns")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("derive requires `columns`"))?;
    let mut cols = Vec::new();
    for c in columns {
        let name = c
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("derive column missing `name`"))?;
        let expr_src = c
            .get("expr")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("derive column missing `expr`"))?;
        let expr = parse(expr_src).map_err(|e| anyhow::anyhow!(e))?;
        cols.push(DeriveColumn {
            name: name.to_string(),
            expr,
        });
    }
    Ok(CompiledOp::Transform(Box::new(Derive::new(cols))))
}

pub fn construct_select(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let columns = args
        .get("columns")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("select requires `columns`"))?
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    Ok(CompiledOp::Transform(Box::new(Select::new(columns))))
}

pub fn construct_rename(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let mapping_obj = args
        .get("mapping")
        .and_then(|v| v.as_object())
        .ok_or_else(|| anyhow::anyhow!("rename requires `mapping`"))?;
    let mapping = mapping_obj
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
        .collect();
    Ok(CompiledOp::Transform(Box::new(Rename::new(mapping))))
}

pub fn construct_unique(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let columns = args
        .get("columns")
        .and_then(|v| v.as_str())
        .map(split_csv_list);
    Ok(CompiledOp::Transform(Box::new(Unique::new(columns))))
}

pub fn construct_passthrough(_args: &ArgTree) -> anyhow::Result<CompiledOp> {
    Ok(CompiledOp::Transform(Box::new(Passthrough)))
}

pub fn construct_clean(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let normalize_case = match args.get("normalize_case").and_then(|v| v.as_str()) {
        Some("lower") => Some(CaseFold::Lower),
        Some("upper") => Some(CaseFold::Upper),
        Some("title") => Some(CaseFold::Title),
        _ => None,
    };
    Ok(CompiledOp::Transform(Box::new(Clean {
        remove_nulls: args.get("remove_nulls").and_then(|v| v.as_bool()).unwrap_or(false),
        trim_strings: args.get("trim_strings").and_then(|v| v.as_bool()).unwrap_or(false),
        normalize_case,
    })))
}

pub fn construct_grep(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let pattern = args
        .get("pattern")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("grep requires `pattern`"))?;
    let invert = args.get("invert").and_then(|v| v.as_bool()).unwrap_or(false);
    let regex_mode = args.get("regex").and_then(|v| v.as_bool()).unwrap_or(false);
    Ok(CompiledOp::Transform(Box::new(Grep::new(pattern, regex_mode, invert)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabflow_core::value::DataType;

    fn sample() -> Batch {
        let schema = Schema::new(
            vec![
                (ArcStr::from("name"), DataType::String),
                (ArcStr::from("age"), DataType::Int64),
            ],
            true,
        );
        let mut b = Batch::with_capacity_for(schema, 3);
        b.set_row_count(3);
        b.set_string(0, 0, "Alice");
        b.set_int64(0, 1, 30);
        b.set_string(1, 0, "Bob");
        b.set_int64(1, 1, 20);
        b.set_string(2, 0, "Carol");
        b.set_int64(2, 1, 40);
        b
    }

    #[test]
    fn filter_keeps_matching_rows_in_order() {
        let mut f = Filter::new("col(age) > 25").unwrap();
        let batch = sample();
        let out = f.process(&batch).unwrap().unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.get_str(0, 0), "Alice");
        assert_eq!(out.get_str(1, 0), "Carol");
    }

    #[test]
    fn derive_resolves_type_from_first_row() {
        let schema = Schema::new(
            vec![
                (ArcStr::from("price"), DataType::Int64),
                (ArcStr::from("qty"), DataType::Int64),
            ],
            true,
        );
        let mut batch = Batch::with_capacity_for(schema, 2);
        batch.set_row_count(2);
        batch.set_int64(0, 0, 2);
        batch.set_int64(0, 1, 3);
        batch.set_int64(1, 0, 5);
        batch.set_int64(1, 1, 4);

        let mut derive = Derive::new(vec![DeriveColumn {
            name: "total".to_string(),
            expr: parse("col(price) * col(qty)").unwrap(),
        }]);
        let out = derive.process(&batch).unwrap().unwrap();
        assert_eq!(out.get_int64(0, 2), 6);
        assert_eq!(out.get_int64(1, 2), 20);
    }

    #[test]
    fn select_emits_requested_columns_in_order() {
        let mut select = Select::new(vec!["age".to_string(), "name".to_string()]);
        let out = select.process(&sample()).unwrap().unwrap();
        assert_eq!(out.schema().name(0).as_str(), "age");
        assert_eq!(out.get_int64(0, 0), 30);
    }

    #[test]
    fn select_missing_column_is_all_null() {
        let mut select = Select::new(vec!["missing".to_string()]);
        let out = select.process(&sample()).unwrap().unwrap();
        assert!(out.is_null(0, 0));
    }

    #[test]
    fn unique_drops_repeated_keys() {
        let schema = Schema::new(vec![(ArcStr::from("a"), DataType::Int64)], true);
        let mut batch = Batch::with_capacity_for(schema, 3);
        batch.set_row_count(3);
        batch.set_int64(0, 0, 1);
        batch.set_int64(1, 0, 1);
        batch.set_int64(2, 0, 2);
        let mut unique = Unique::new(None);
        let out = unique.process(&batch).unwrap().unwrap();
        assert_eq!(out.row_count(), 2);
    }

    #[test]
    fn grep_keeps_rows_matching_substring() {
        let mut grep = Grep::new("li", false, false).unwrap();
        let out = grep.process(&sample()).unwrap().unwrap();
        assert_eq!(out.row_count(), 1);
        assert_eq!(out.get_str(0, 0), "Alice");
    }

    #[test]
    fn grep_invert_keeps_non_matching_rows() {
        let mut grep = Grep::new("li", false, true).unwrap();
        let out = grep.process(&sample()).unwrap().unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.get_str(0, 0), "Bob");
        assert_eq!(out.get_str(1, 0), "Carol");
    }

    #[test]
    fn grep_regex_mode_matches_pattern() {
        let mut grep = Grep::new("^[AB]", true, false).unwrap();
        let out = grep.process(&sample()).unwrap().unwrap();
        assert_eq!(out.row_count(), 2);
    }
}
