//! Best-effort extraction of the units a view reads from, by scanning its stored definition
//! for `FROM` / `JOIN` references. Lossy: subqueries, CTE names and functions are not understood.

use regex::Regex;
use std::sync::OnceLock;

const IDENT: &str = r#"(?:"(?:[^"]|"")+"|[A-Za-z_][A-Za-z0-9_$]*)"#;

/// Words that can follow FROM/JOIN without naming a relation.
const NOT_RELATIONS: &[&str] = &["select", "lateral", "only", "values", "unnest", "with"];

fn reference_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(r"(?i)\b(?:from|join)\s+\(*\s*({IDENT}(?:\s*\.\s*{IDENT})?)");
        Regex::new(&pattern).expect("static view reference pattern")
    })
}

/// Strip quotes from a quoted identifier; fold an unquoted one to lower case.
fn normalize_ident(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        raw[1..raw.len() - 1].replace("\"\"", "\"")
    } else {
        raw.to_lowercase()
    }
}

/// Relation names referenced after FROM/JOIN, schema qualifier dropped, first occurrence order.
pub fn referenced_relations(definition: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in reference_pattern().captures_iter(definition) {
        let Some(m) = caps.get(1) else { continue };
        let qualified = m.as_str();
        let last = split_qualified(qualified).pop().unwrap_or_default();
        let name = normalize_ident(&last);
        if name.is_empty() || NOT_RELATIONS.contains(&name.as_str()) {
            continue;
        }
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Split `a . "b.c"` into its dotted parts, respecting quotes.
fn split_qualified(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    for c in s.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                cur.push(c);
            }
            '.' if !in_quotes => {
                parts.push(cur.trim().to_string());
                cur.clear();
            }
            _ => cur.push(c),
        }
    }
    parts.push(cur.trim().to_string());
    parts
}
