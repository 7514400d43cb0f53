//! Query command implementation.

use crate::fixture::{object_to_json, parse_date, Fixture};
use serde::Serialize;
use serde_json::Value as Json;
use std::path::Path;
use tessera_core::{SortSpec, Value};
use tracing::debug;

/// Query result.
#[derive(Debug, Serialize)]
pub struct QueryResult {
    /// Queried type.
    pub object_type: String,
    /// Number of matches before `limit`.
    pub total: usize,
    /// Matching objects.
    pub objects: Vec<Json>,
}

/// Options for the query command.
#[derive(Debug, Default)]
pub struct QueryOptions<'a> {
    /// Predicate to filter by.
    pub filter: Option<&'a str>,
    /// Values bound to `$0`, `$1`, ... in the filter.
    pub args: &'a [String],
    /// Sort keys as `path` or `path:desc`.
    pub sort: &'a [String],
    /// Maximum number of objects to print.
    pub limit: Option<usize>,
}

/// Runs the query command.
pub fn run(
    path: &Path,
    object_type: &str,
    options: &QueryOptions<'_>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = Fixture::from_path(path)?.open()?;

    let mut results = db.objects(object_type)?;
    if let Some(filter) = options.filter {
        let args: Vec<Value> = options.args.iter().map(|a| parse_arg(a)).collect();
        results = results.filtered_with(filter, &args)?;
    }
    if !options.sort.is_empty() {
        results = results.sorted(parse_sort(options.sort)?)?;
    }

    let total = results.len()?;
    let limit = options.limit.unwrap_or(total);
    debug!(object_type, total, limit, "query evaluated");

    let objects = results
        .iter()?
        .take(limit)
        .map(|object| object_to_json(&object))
        .collect::<Result<Vec<_>, _>>()?;

    let result = QueryResult {
        object_type: object_type.to_string(),
        total,
        objects,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Parses `path`, `path:asc` or `path:desc` sort keys.
pub fn parse_sort(keys: &[String]) -> Result<SortSpec, String> {
    let mut spec = SortSpec::new();
    for key in keys {
        let (path, descending) = match key.rsplit_once(':') {
            Some((path, "desc")) => (path, true),
            Some((path, "asc")) => (path, false),
            Some((_, other)) => return Err(format!("invalid sort direction '{other}' in '{key}'")),
            None => (key.as_str(), false),
        };
        spec = spec.then(path, descending);
    }
    Ok(spec)
}

/// Reads a filter argument: JSON scalars keep their type, dates in
/// RFC 3339 or `YYYY-MM-DD` form become dates, anything else is a string.
pub fn parse_arg(text: &str) -> Value {
    if let Some(date) = parse_date(text) {
        return Value::Date(date);
    }
    match serde_json::from_str::<Json>(text) {
        Ok(Json::Null) => Value::Null,
        Ok(Json::Bool(b)) => Value::Bool(b),
        Ok(Json::Number(n)) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map_or(Value::Null, Value::Double),
        },
        Ok(Json::String(s)) => Value::String(s),
        _ => Value::from(text),
    }
}

fn print_text_output(result: &QueryResult) {
    println!(
        "{} {} object(s), showing {}",
        result.total,
        result.object_type,
        result.objects.len()
    );
    for (index, object) in result.objects.iter().enumerate() {
        let values = object.get("values").cloned().unwrap_or(Json::Null);
        println!("  [{index}] {values}");
    }
}
