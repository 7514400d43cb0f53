//! Schema changes on an open database.

use tessera_core::{
    Config, CoreError, Database, MigrationPolicy, ObjectSchema, PropertyDef, SchemaChange, Value,
};
use tessera_testkit::prelude::*;

fn with_property(mut schema: Vec<ObjectSchema>, object_type: &str, name: &str, spec: &str) -> Vec<ObjectSchema> {
    let property = PropertyDef::parse(name, spec).unwrap();
    for s in &mut schema {
        if s.name == object_type {
            s.properties.push(property.clone());
        }
    }
    schema
}

#[test]
fn additive_changes_apply_to_existing_objects() {
    with_task_db(|db| {
        seed_tasks(db, &[("a", 1, 1)]);
        let live = db.objects("Task").unwrap();

        let next = with_property(task_schema(), "Task", "labels", "string<>");
        let next = with_property(next, "Task", "deadline", "date?");
        let plan = db.update_schema(next, 2).unwrap();

        assert_eq!(plan.from_version, 0);
        assert_eq!(plan.to_version, 2);
        assert_eq!(plan.changes.len(), 2);
        assert!(plan.changes.iter().all(|c| !c.is_breaking()));
        assert!(plan.reset_types.is_empty());

        let task = db.object("Task", 1).unwrap().unwrap();
        assert_eq!(task.get("labels").unwrap(), Value::List(Vec::new()));
        assert_eq!(task.get("deadline").unwrap(), Value::Null);
        // live results survive and can use the new properties
        assert_eq!(live.filtered("labels.@count == 0").unwrap().len().unwrap(), 1);
    });
}

#[test]
fn new_object_types_can_be_added() {
    with_task_db(|db| {
        let mut next = task_schema();
        next.extend(character_schema());
        let plan = db.update_schema(next, 1).unwrap();
        assert!(plan
            .changes
            .iter()
            .any(|c| matches!(c, SchemaChange::AddType { object_type } if object_type == "Character")));
        assert!(db.objects("Character").unwrap().is_empty().unwrap());
    });
}

#[test]
fn required_property_on_populated_type_needs_migration() {
    with_task_db(|db| {
        seed_tasks(db, &[("a", 1, 1)]);
        let next = with_property(task_schema(), "Task", "owner", "string");
        let err = db.update_schema(next.clone(), 1).unwrap_err();
        assert!(matches!(err, CoreError::MigrationRequired { ref object_type, .. } if object_type == "Task"));
        assert!(db.schema().unwrap().resolve("Task").unwrap().get_property("owner").is_none());

        // an empty type takes the same change without complaint
        db.write(|txn| txn.delete_all("Task")).unwrap();
        db.update_schema(next, 1).unwrap();
    });
}

#[test]
fn reset_policy_drops_affected_data_only() {
    let db = Database::open(
        Config::new()
            .schema(task_schema())
            .migration_policy(MigrationPolicy::ResetOnMismatch),
    )
    .unwrap();
    seed_tasks(&db, &[("a", 1, 1), ("b", 2, 2)]);
    create_person(&db, "Ann");
    let feed = db.subscribe();

    let next = with_property(task_schema(), "Task", "owner", "string");
    let plan = db.update_schema(next, 5).unwrap();

    assert_eq!(plan.reset_types, vec!["Task".to_string()]);
    assert!(db.objects("Task").unwrap().is_empty().unwrap());
    assert_eq!(db.objects("Person").unwrap().len().unwrap(), 1);
    assert_eq!(feed.try_iter().count(), 2);
    assert_eq!(db.schema().unwrap().version(), 5);
}

#[test]
fn schema_version_cannot_go_backwards() {
    let db = Database::open(Config::new().schema(task_schema()).schema_version(4)).unwrap();
    let err = db.update_schema(task_schema(), 3).unwrap_err();
    assert!(matches!(err, CoreError::Schema { .. }));
    assert_eq!(db.schema().unwrap().version(), 4);
}

#[test]
fn invalid_new_schema_is_rejected_up_front() {
    with_task_db(|db| {
        let next = with_property(task_schema(), "Task", "reviewer", "Reviewer?");
        assert!(matches!(db.update_schema(next, 1), Err(CoreError::Schema { .. })));
    });
}
