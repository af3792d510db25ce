//! The pipe-separated surface DSL and the on-disk `.tfp` JSON plan form,
//! both producing a [`tabflow_core::ir::Plan`]. Neither form is
//! validated here — that's `Plan::validate`'s job once the caller has a
//! registry to validate against.

use serde_json::{json, Map, Value as Json};
use tabflow_core::ir::Plan;
use tabflow_core::ArgTree;

/// Split `pipeline = stage ("|" stage)+` respecting double-quoted
/// strings (a `|` inside quotes does not end a stage).
fn split_stages(source: &str) -> Vec<String> {
    split_unquoted(source, '|')
}

fn split_unquoted(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match quote {
            Some(q) => {
                cur.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                cur.push(c);
            }
            None if c == sep => {
                parts.push(std::mem::take(&mut cur));
            }
            None => cur.push(c),
        }
    }
    parts.push(cur);
    parts
}

/// Strip a single layer of matching quotes, if present.
fn unquote(s: &str) -> String {
    let t = s.trim();
    let b = t.as_bytes();
    if b.len() >= 2 && ((b[0] == b'"' && b[b.len() - 1] == b'"') || (b[0] == b'\'' && b[b.len() - 1] == b'\'')) {
        t[1..t.len() - 1].to_string()
    } else {
        t.to_string()
    }
}

/// Whitespace tokens, respecting quoted substrings as single tokens
/// (quotes are stripped from the token they enclose).
fn whitespace_tokens(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut cur = String::new();
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    cur.push(c);
                }
            }
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c.is_whitespace() => {
                if !cur.is_empty() {
                    tokens.push(std::mem::take(&mut cur));
                }
            }
            None => cur.push(c),
        }
    }
    if !cur.is_empty() {
        tokens.push(cur);
    }
    tokens
}

/// Split on commas only outside quotes and outside parens, so a
/// `concat(a, b)` inside a derive expression doesn't get sliced apart.
fn split_top_level_commas(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match quote {
            Some(q) => {
                cur.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    cur.push(c);
                }
                '(' => {
                    depth += 1;
                    cur.push(c);
                }
                ')' => {
                    depth -= 1;
                    cur.push(c);
                }
                ',' if depth == 0 => parts.push(std::mem::take(&mut cur)),
                _ => cur.push(c),
            },
        }
    }
    parts.push(cur);
    parts.into_iter().map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect()
}

/// `select a,b,c` (one comma-joined bare token) or `select a b c`
/// (several whitespace-separated bare tokens) both yield the same list.
fn comma_or_space_list(rest: &str) -> Vec<String> {
    let toks = whitespace_tokens(rest);
    if toks.len() == 1 && toks[0].contains(',') && !toks[0].contains('=') {
        split_top_level_commas(&toks[0])
    } else {
        toks
    }
}

/// Coerce a bare scalar token into the JSON type a constructor expects:
/// `true`/`false` become booleans, integers/floats become numbers,
/// anything else stays a string.
fn coerce_scalar(raw: &str) -> Json {
    let v = unquote(raw);
    match v.as_str() {
        "true" => return json!(true),
        "false" => return json!(false),
        _ => {}
    }
    if let Ok(i) = v.parse::<i64>() {
        return json!(i);
    }
    if let Ok(f) = v.parse::<f64>() {
        return json!(f);
    }
    json!(v)
}

/// Generic `key=value key2=value2 …` token map, used for every op whose
/// representative shape in spec.md §4.4 is left to the registry's own
/// argument names (stats, codecs, window/step/lead/…, clean, …).
/// `aliases` maps a DSL-facing key spelling to the registry arg name it
/// really is (e.g. `window`'s `col`/`size`/`result` → `column`/`k`/`as`).
fn kv_args(rest: &str, aliases: &[(&str, &str)]) -> ArgTree {
    let mut map = Map::new();
    for token in whitespace_tokens(rest) {
        if let Some((k, v)) = token.split_once('=') {
            let key = aliases.iter().find(|(from, _)| *from == k).map(|(_, to)| *to).unwrap_or(k);
            map.insert(key.to_string(), coerce_scalar(v));
        }
    }
    Json::Object(map)
}

fn build_filter_args(rest: &str) -> ArgTree {
    json!({ "expr": unquote(rest) })
}

fn build_select_args(rest: &str) -> ArgTree {
    json!({ "columns": comma_or_space_list(rest) })
}

fn build_rename_args(rest: &str) -> ArgTree {
    let mut mapping = Map::new();
    for pair in split_top_level_commas(rest) {
        if let Some((from, to)) = pair.split_once('=') {
            mapping.insert(from.trim().to_string(), json!(to.trim()));
        }
    }
    json!({ "mapping": mapping })
}

fn build_n_args(rest: &str) -> ArgTree {
    let n: i64 = whitespace_tokens(rest).first().and_then(|t| t.parse().ok()).unwrap_or(0);
    json!({ "n": n })
}

fn build_sort_args(rest: &str) -> ArgTree {
    let columns: Vec<Json> = comma_or_space_list(rest)
        .into_iter()
        .map(|tok| {
            if let Some(name) = tok.strip_prefix('-') {
                json!({ "name": name, "desc": true })
            } else if let Some(name) = tok.strip_prefix('+') {
                json!({ "name": name, "desc": false })
            } else {
                json!({ "name": tok, "desc": false })
            }
        })
        .collect();
    json!({ "columns": columns })
}

fn build_top_args(rest: &str) -> ArgTree {
    let tokens = whitespace_tokens(rest);
    let n: i64 = tokens.first().and_then(|t| t.parse().ok()).unwrap_or(0);
    let (column, desc) = match tokens.get(1) {
        Some(tok) if tok.starts_with('+') => (tok[1..].to_string(), false),
        Some(tok) if tok.starts_with('-') => (tok[1..].to_string(), true),
        Some(tok) => (tok.clone(), true),
        None => (String::new(), true),
    };
    json!({ "n": n, "column": column, "desc": desc })
}

fn build_derive_args(rest: &str) -> ArgTree {
    let columns: Vec<Json> = split_top_level_commas(rest)
        .into_iter()
        .filter_map(|piece| {
            let (name, expr) = piece.split_once('=')?;
            Some(json!({ "name": name.trim(), "expr": unquote(expr) }))
        })
        .collect();
    json!({ "columns": columns })
}

fn build_grep_args(rest: &str) -> ArgTree {
    let mut invert = false;
    let mut regex = false;
    let mut pattern_tokens = Vec::new();
    for tok in whitespace_tokens(rest) {
        match tok.as_str() {
            "-v" => invert = true,
            "-r" => regex = true,
            other => pattern_tokens.push(other.to_string()),
        }
    }
    json!({ "pattern": unquote(&pattern_tokens.join(" ")), "invert": invert, "regex": regex })
}

fn build_join_args(rest: &str) -> ArgTree {
    let tokens = whitespace_tokens(rest);
    let file = tokens.first().cloned().map(|t| unquote(&t)).unwrap_or_default();
    let mut how = "inner".to_string();
    let mut spec_token = String::new();
    for tok in tokens.iter().skip(1) {
        if tok == "on" {
            continue;
        }
        if tok == "--left" {
            how = "left".to_string();
            continue;
        }
        spec_token = tok.clone();
    }
    let (left_on, right_on) = match spec_token.split_once('=') {
        Some((l, r)) => (l.to_string(), r.to_string()),
        None => (spec_token.clone(), spec_token),
    };
    json!({ "file": file, "left_on": left_on, "right_on": right_on, "how": how })
}

fn build_group_agg_args(rest: &str) -> ArgTree {
    let tokens = whitespace_tokens(rest);
    let group_by = tokens.first().cloned().unwrap_or_default();
    let aggs: Vec<Json> = tokens
        .iter()
        .skip(1)
        .map(|tok| {
            let mut parts = tok.splitn(3, ':');
            let column = parts.next().unwrap_or("").to_string();
            let func = parts.next().unwrap_or("").to_string();
            let name = parts.next().map(str::to_string);
            match name {
                Some(n) => json!({ "column": column, "func": func, "as": n }),
                None => json!({ "column": column, "func": func }),
            }
        })
        .collect();
    json!({ "group_by": group_by, "aggs": aggs })
}

/// DSL key spellings used by the one spec.md §8 scenario (`window col=x
/// size=3 func=avg result=w`) that diverges from the registry's own
/// argument names.
const WINDOW_ALIASES: &[(&str, &str)] = &[("col", "column"), ("size", "k"), ("result", "as")];

fn build_args(op: &str, rest: &str) -> ArgTree {
    match op {
        "filter" | "validate" => build_filter_args(rest),
        "select" => build_select_args(rest),
        "rename" => build_rename_args(rest),
        "head" | "skip" | "tail" | "sample" => build_n_args(rest),
        "sort" => build_sort_args(rest),
        "top" => build_top_args(rest),
        "derive" => build_derive_args(rest),
        "grep" => build_grep_args(rest),
        "join" => build_join_args(rest),
        "group-agg" => build_group_agg_args(rest),
        "window" => kv_args(rest, WINDOW_ALIASES),
        _ => kv_args(rest, &[]),
    }
}

/// Codec shortcuts at the endpoints: `csv`/`jsonl`/`text` expand to
/// `codec.<fmt>.decode` at position 0 and `codec.<fmt>.encode` at the
/// last position; `table` only expands (to `codec.table.encode`) at
/// the last position.
fn resolve_op_name(op: &str, position: usize, last: usize) -> String {
    if position == 0 {
        if let "csv" | "jsonl" | "text" = op {
            return format!("codec.{op}.decode");
        }
    }
    if position == last {
        if let "csv" | "jsonl" | "text" = op {
            return format!("codec.{op}.encode");
        }
        if op == "table" {
            return "codec.table.encode".to_string();
        }
    }
    op.to_string()
}

/// Parse the pipe-separated surface DSL into an (unvalidated) `Plan`.
pub fn parse_dsl(source: &str) -> anyhow::Result<Plan> {
    let stages: Vec<String> = split_stages(source).into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    if stages.is_empty() {
        anyhow::bail!("empty pipeline");
    }
    let last = stages.len() - 1;
    let mut plan = Plan::new();
    for (i, stage) in stages.iter().enumerate() {
        let mut split = stage.splitn(2, char::is_whitespace);
        let raw_op = split.next().unwrap_or("").trim();
        let rest = split.next().unwrap_or("").trim();
        if raw_op.is_empty() {
            anyhow::bail!("empty stage at position {i}");
        }
        let op = resolve_op_name(raw_op, i, last);
        let args = build_args(raw_op, rest);
        plan.add_node(op, args);
    }
    Ok(plan)
}

/// Parse the on-disk `.tfp` JSON plan form:
/// `{ "steps": [ { "op": "...", "args": { ... } }, ... ] }`. `args` is
/// optional per step (missing means `{}`).
pub fn parse_json_plan(source: &str) -> anyhow::Result<Plan> {
    let root: Json = serde_json::from_str(source)?;
    let steps = root
        .get("steps")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("plan JSON must have a `steps` array"))?;
    let mut plan = Plan::new();
    for step in steps {
        let op = step
            .get("op")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("plan step missing `op`"))?;
        let args = step.get("args").cloned().unwrap_or_else(|| json!({}));
        plan.add_node(op, args);
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_shortcuts_expand_at_endpoints() {
        let plan = parse_dsl("csv | filter col(age)>25 | csv").unwrap();
        assert_eq!(plan.nodes[0].op, "codec.csv.decode");
        assert_eq!(plan.nodes[2].op, "codec.csv.encode");
        assert_eq!(plan.nodes[1].op, "filter");
    }

    #[test]
    fn select_accepts_comma_and_space_lists() {
        let plan = parse_dsl("csv | select name,age | csv").unwrap();
        assert_eq!(plan.nodes[1].args, json!({ "columns": ["name", "age"] }));
        let plan2 = parse_dsl("csv | select name age | csv").unwrap();
        assert_eq!(plan2.nodes[1].args, json!({ "columns": ["name", "age"] }));
    }

    #[test]
    fn rename_parses_multiple_mappings() {
        let plan = parse_dsl("csv | rename old=new,old2=new2 | csv").unwrap();
        assert_eq!(plan.nodes[1].args, json!({ "mapping": { "old": "new", "old2": "new2" } }));
    }

    #[test]
    fn sort_reads_desc_prefix() {
        let plan = parse_dsl("csv | sort a,-b | csv").unwrap();
        assert_eq!(
            plan.nodes[1].args,
            json!({ "columns": [{ "name": "a", "desc": false }, { "name": "b", "desc": true }] })
        );
    }

    #[test]
    fn top_reads_asc_prefix() {
        let plan = parse_dsl("csv | top 5 +score | csv").unwrap();
        assert_eq!(plan.nodes[1].args, json!({ "n": 5, "column": "score", "desc": false }));
    }

    #[test]
    fn derive_keeps_commas_inside_calls() {
        let plan = parse_dsl("csv | derive total=price*qty,tag=concat(a,b) | csv").unwrap();
        assert_eq!(
            plan.nodes[1].args,
            json!({ "columns": [
                { "name": "total", "expr": "price*qty" },
                { "name": "tag", "expr": "concat(a,b)" },
            ]})
        );
    }

    #[test]
    fn group_agg_parses_col_func_name() {
        let plan = parse_dsl("csv | group-agg city sales:sum:total | csv").unwrap();
        assert_eq!(
            plan.nodes[1].args,
            json!({ "group_by": "city", "aggs": [{ "column": "sales", "func": "sum", "as": "total" }] })
        );
    }

    #[test]
    fn window_applies_dsl_aliases() {
        let plan = parse_dsl("csv | window col=x size=3 func=avg result=w | csv").unwrap();
        assert_eq!(plan.nodes[1].args, json!({ "column": "x", "k": 3, "func": "avg", "as": "w" }));
    }

    #[test]
    fn join_parses_distinct_left_right_and_how() {
        let plan = parse_dsl("csv | join lookup.csv on uid=id --left | csv").unwrap();
        assert_eq!(
            plan.nodes[1].args,
            json!({ "file": "lookup.csv", "left_on": "uid", "right_on": "id", "how": "left" })
        );
    }

    #[test]
    fn json_plan_defaults_missing_args_to_object() {
        let plan = parse_json_plan(r#"{"steps":[{"op":"codec.csv.decode"},{"op":"codec.csv.encode","args":{}}]}"#).unwrap();
        assert_eq!(plan.nodes.len(), 2);
        assert_eq!(plan.nodes[0].args, json!({}));
    }
}
