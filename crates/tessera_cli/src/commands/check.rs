//! Check command implementation.

use crate::fixture::Fixture;
use serde::Serialize;
use std::path::Path;

/// Fixture check result.
#[derive(Debug, Serialize)]
pub struct CheckResult {
    /// Fixture path.
    pub path: String,
    /// Declared schema version.
    pub schema_version: u64,
    /// Declared object types.
    pub types: Vec<TypeSummary>,
    /// Number of objects loaded.
    pub objects_loaded: usize,
}

/// Summary of one object type.
#[derive(Debug, Serialize)]
pub struct TypeSummary {
    /// Type name.
    pub name: String,
    /// Whether the type is embedded.
    pub embedded: bool,
    /// Primary key property, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    /// `name: type` for each property.
    pub properties: Vec<String>,
}

/// Runs the check command.
///
/// Validates the schema, then loads every object into a scratch database.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let fixture = Fixture::from_path(path)?;
    let registry = fixture.registry()?;
    fixture.open()?;

    let result = CheckResult {
        path: path.display().to_string(),
        schema_version: registry.version(),
        types: registry
            .iter()
            .map(|schema| TypeSummary {
                name: schema.name.clone(),
                embedded: schema.embedded,
                primary_key: schema.primary_key.clone(),
                properties: schema
                    .properties
                    .iter()
                    .map(|p| format!("{}: {}", p.name, p.type_spec()))
                    .collect(),
            })
            .collect(),
        objects_loaded: fixture.objects.len(),
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

fn print_text_output(result: &CheckResult) {
    println!("Fixture: {}", result.path);
    println!("Schema version: {}", result.schema_version);
    println!();
    for ty in &result.types {
        let mut header = ty.name.clone();
        if ty.embedded {
            header.push_str(" (embedded)");
        }
        if let Some(pk) = &ty.primary_key {
            header.push_str(&format!(" [primary key: {pk}]"));
        }
        println!("{header}");
        for prop in &ty.properties {
            println!("  {prop}");
        }
    }
    println!();
    println!("OK: {} objects loaded", result.objects_loaded);
}
