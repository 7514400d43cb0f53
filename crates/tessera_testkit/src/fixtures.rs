//! Sample object models and database helpers.
//!
//! The models mirror the ones used by the SDK documentation snippets:
//! a to-do list (`Task` assigned to a `Person`), a blog (`User` owning
//! `Post`s), a game `Character` with primitive collections, and a
//! `Business` with embedded contact details.

use chrono::{TimeZone, Utc};
use tessera_core::{Config, Database, Object, ObjectId, ObjectSchema, Results, Value};

/// `Task` and `Person`.
///
/// `Person.tasks` is the declared inverse of `Task.assignee`.
pub fn task_schema() -> Vec<ObjectSchema> {
    vec![
        ObjectSchema::from_shorthand(
            "Task",
            Some("_id"),
            &[
                ("_id", "int"),
                ("name", "string"),
                ("status", "string?"),
                ("priority", "int"),
                ("progressMinutes", "int"),
                ("assignee", "Person?"),
            ],
        )
        .expect("valid Task schema"),
        ObjectSchema::from_shorthand(
            "Person",
            Some("_id"),
            &[
                ("_id", "objectId"),
                ("name", "string"),
                ("age", "int?"),
                ("tasks", "linkingObjects<Task.assignee>"),
            ],
        )
        .expect("valid Person schema"),
    ]
}

/// `User` and `Post`; `Post.author` is the declared inverse of `User.posts`.
pub fn user_post_schema() -> Vec<ObjectSchema> {
    vec![
        ObjectSchema::from_shorthand(
            "User",
            Some("_id"),
            &[
                ("_id", "objectId"),
                ("name", "string"),
                ("birthdate", "date"),
                ("posts", "Post[]"),
            ],
        )
        .expect("valid User schema"),
        ObjectSchema::from_shorthand(
            "Post",
            Some("_id"),
            &[
                ("_id", "objectId"),
                ("title", "string"),
                ("author", "linkingObjects<User.posts>"),
            ],
        )
        .expect("valid Post schema"),
    ]
}

/// `Character` with a set of completed levels and a list of items.
pub fn character_schema() -> Vec<ObjectSchema> {
    vec![ObjectSchema::from_shorthand(
        "Character",
        Some("_id"),
        &[
            ("_id", "objectId"),
            ("name", "string"),
            ("levelsCompleted", "int<>"),
            ("inventory", "string[]"),
        ],
    )
    .expect("valid Character schema")]
}

/// JSON form of the `Business` model, in the format accepted by
/// [`ObjectSchema`]'s serde implementation.
pub const BUSINESS_SCHEMA_JSON: &str = r#"[
  {
    "name": "Business",
    "primaryKey": "_id",
    "properties": [
      { "name": "_id", "type": "objectId" },
      { "name": "name", "type": "string" },
      { "name": "contactDetails", "type": "ContactDetails?" },
      { "name": "branches", "type": "Address[]" }
    ]
  },
  {
    "name": "ContactDetails",
    "embedded": true,
    "properties": [
      { "name": "emailAddress", "type": "string" },
      { "name": "phoneNumber", "type": "string?" },
      { "name": "address", "type": "Address?" }
    ]
  },
  {
    "name": "Address",
    "embedded": true,
    "properties": [
      { "name": "street", "type": "string" },
      { "name": "city", "type": "string" }
    ]
  }
]"#;

/// `Business` with embedded `ContactDetails` and `Address` objects.
pub fn business_schema() -> Vec<ObjectSchema> {
    serde_json::from_str(BUSINESS_SCHEMA_JSON).expect("valid Business schema JSON")
}

/// Opens an in-memory database with the given object types.
pub fn open_db(schema: Vec<ObjectSchema>) -> Database {
    Database::open(Config::new().schema(schema)).expect("Failed to open database")
}

/// Runs a test with a database holding the `Task`/`Person` model.
///
/// # Example
///
/// ```rust
/// use tessera_testkit::with_task_db;
///
/// with_task_db(|db| {
///     assert!(db.objects("Task").unwrap().is_empty().unwrap());
/// });
/// ```
pub fn with_task_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let db = open_db(task_schema());
    f(&db)
}

/// Runs a test with a database holding the `User`/`Post` model.
pub fn with_user_post_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let db = open_db(user_post_schema());
    f(&db)
}

/// A UTC date at midnight.
pub fn date(year: i32, month: u32, day: u32) -> Value {
    Value::Date(
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
            .single()
            .expect("valid calendar date"),
    )
}

/// Property values of a `Task`.
pub fn task_values(id: i64, name: &str, priority: i64, progress: i64) -> Vec<(&'static str, Value)> {
    vec![
        ("_id", Value::Int(id)),
        ("name", Value::from(name)),
        ("priority", Value::Int(priority)),
        ("progressMinutes", Value::Int(progress)),
    ]
}

/// Creates one `Task` per `(name, priority, progressMinutes)` row, in one
/// commit. Primary keys are the row positions, starting at 1.
pub fn seed_tasks(db: &Database, rows: &[(&str, i64, i64)]) -> Vec<Object> {
    db.write(|txn| {
        rows.iter()
            .zip(1..)
            .map(|(&(name, priority, progress), id)| {
                txn.create("Task", task_values(id, name, priority, progress))
            })
            .collect()
    })
    .expect("Failed to seed tasks")
}

/// Creates a `Person`.
pub fn create_person(db: &Database, name: &str) -> Object {
    db.write(|txn| {
        txn.create(
            "Person",
            [("_id", Value::from(ObjectId::new())), ("name", Value::from(name))],
        )
    })
    .expect("Failed to create person")
}

/// Creates a `User` born on `birthdate` who authored one post per title.
pub fn create_author(db: &Database, name: &str, birthdate: Value, titles: &[&str]) -> Object {
    db.write(|txn| {
        let mut posts = Vec::with_capacity(titles.len());
        for title in titles {
            let post = txn.create(
                "Post",
                [("_id", Value::from(ObjectId::new())), ("title", Value::from(*title))],
            )?;
            posts.push(Value::Link(post.id()));
        }
        txn.create(
            "User",
            [
                ("_id", Value::from(ObjectId::new())),
                ("name", Value::from(name)),
                ("birthdate", birthdate),
                ("posts", Value::List(posts)),
            ],
        )
    })
    .expect("Failed to create author")
}

/// Reads a string property from every object in `results`.
pub fn strings(results: &Results, property: &str) -> Vec<String> {
    results
        .map(|object| {
            object
                .get(property)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()
        })
        .expect("Failed to read results")
}

/// Reads an int property from every object in `results`.
pub fn ints(results: &Results, property: &str) -> Vec<i64> {
    results
        .map(|object| {
            object
                .get(property)
                .ok()
                .and_then(|v| v.as_int())
                .unwrap_or_default()
        })
        .expect("Failed to read results")
}
