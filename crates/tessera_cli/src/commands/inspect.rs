//! Inspect command implementation.

use crate::fixture::Fixture;
use serde::Serialize;
use std::path::Path;
use tessera_core::{Database, StatsSnapshot, Value};

/// Fixture inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Fixture path.
    pub path: String,
    /// Schema version.
    pub schema_version: u64,
    /// Total live objects.
    pub object_count: usize,
    /// Per-type statistics.
    pub types: Vec<TypeStats>,
    /// Counters after loading.
    pub stats: StatsSnapshot,
}

/// Statistics for a single object type.
#[derive(Debug, Serialize)]
pub struct TypeStats {
    /// Type name.
    pub name: String,
    /// Number of objects.
    pub object_count: usize,
    /// Inbound links (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backlinks: Option<Vec<BacklinkStats>>,
}

/// Links arriving through one forward property.
#[derive(Debug, Serialize)]
pub struct BacklinkStats {
    /// Source type.
    pub source_type: String,
    /// Forward property on the source type.
    pub property: String,
    /// Number of source objects with at least one link set.
    pub linking_objects: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_backlinks: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = Fixture::from_path(path)?.open()?;
    let registry = db.schema()?;

    let mut types = Vec::new();
    for schema in registry.top_level() {
        let backlinks = if show_backlinks {
            let mut links = Vec::new();
            for (source, property) in registry.inbound_links(&schema.name) {
                links.push(BacklinkStats {
                    linking_objects: count_linking(&db, &source.name, &property)?,
                    source_type: source.name.clone(),
                    property,
                });
            }
            Some(links)
        } else {
            None
        };
        types.push(TypeStats {
            name: schema.name.clone(),
            object_count: db.objects(&schema.name)?.len()?,
            backlinks,
        });
    }

    let result = InspectResult {
        path: path.display().to_string(),
        schema_version: registry.version(),
        object_count: db.object_count(),
        types,
        stats: db.stats().snapshot(),
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

fn count_linking(db: &Database, source: &str, property: &str) -> Result<usize, Box<dyn std::error::Error>> {
    let mut count = 0;
    for object in db.objects(source)?.iter()? {
        match object.get(property)? {
            Value::Null => {}
            Value::List(items) if items.is_empty() => {}
            _ => count += 1,
        }
    }
    Ok(count)
}

fn print_text_output(result: &InspectResult) {
    println!("Tessera Fixture Inspection");
    println!("==========================");
    println!();
    println!("Path: {}", result.path);
    println!("Schema version: {}", result.schema_version);
    println!("Objects: {}", result.object_count);
    println!();
    println!("Types:");
    for ty in &result.types {
        println!("  {} ({} objects)", ty.name, ty.object_count);
        if let Some(backlinks) = &ty.backlinks {
            for link in backlinks {
                println!(
                    "    <- {}.{}: {} linking objects",
                    link.source_type, link.property, link.linking_objects
                );
            }
        }
    }
    println!();
    println!("Activity:");
    println!("  Objects created:        {}", result.stats.objects_created);
    println!("  Transactions committed: {}", result.stats.transactions_committed);
    println!("  Errors:                 {}", result.stats.errors);
}
