//! End-to-end scenarios over the sample models.

use tessera_core::{CoreError, Fields, ObjectId, PrimaryKey, SortDescriptor, SortSpec, Value};
use tessera_testkit::prelude::*;

fn embedded(pairs: &[(&str, Value)]) -> Value {
    Value::Embedded(
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect::<Fields>(),
    )
}

#[test]
fn created_object_visible_after_commit_only() {
    with_task_db(|db| {
        db.write(|txn| {
            txn.create("Task", task_values(142_339, "Ship", 1, 0))?;
            // the writing thread reads its own changes
            assert!(txn.object("Task", 142_339)?.is_some());

            let elsewhere = std::thread::scope(|s| {
                s.spawn(|| db.object("Task", 142_339).map(|o| o.is_some()))
                    .join()
                    .unwrap()
            });
            assert!(!elsewhere?);
            Ok(())
        })
        .unwrap();

        let task = db.object("Task", 142_339).unwrap().unwrap();
        assert_eq!(task.get("name").unwrap(), Value::from("Ship"));
        assert_eq!(task.get("status").unwrap(), Value::Null);
    });
}

#[test]
fn failed_write_leaves_no_trace() {
    with_task_db(|db| {
        let tasks = seed_tasks(db, &[("Wash the dishes", 3, 5), ("Do the laundry", 4, 30)]);
        let before: Vec<Fields> = tasks.iter().map(|t| t.values().unwrap()).collect();
        let seq = db.committed_seq();

        let result: Result<(), CoreError> = db.write(|txn| {
            txn.create("Task", task_values(3, "Gym Workout", 3, 7))?;
            txn.set(&tasks[0], "priority", 10)?;
            txn.delete(&tasks[1])?;
            Err(CoreError::validation("Task", "name", "rejected by caller"))
        });
        assert!(matches!(result, Err(CoreError::Validation { .. })));

        let after: Vec<Fields> = tasks.iter().map(|t| t.values().unwrap()).collect();
        assert_eq!(before, after);
        assert!(db.object("Task", 3).unwrap().is_none());
        assert_eq!(db.objects("Task").unwrap().len().unwrap(), 2);
        assert_eq!(db.committed_seq(), seq);
    });
}

#[test]
fn duplicate_primary_key_rejected() {
    with_task_db(|db| {
        seed_tasks(db, &[("Wash the dishes", 3, 5)]);
        let result = db.write(|txn| txn.create("Task", task_values(1, "Again", 1, 1)));
        assert!(matches!(result, Err(CoreError::DuplicatePrimaryKey { .. })));
    });
}

#[test]
fn create_or_update_merges_by_primary_key() {
    with_task_db(|db| {
        seed_tasks(db, &[("Wash the dishes", 3, 5)]);
        db.write(|txn| {
            txn.create_or_update(
                "Task",
                [("_id", Value::Int(1)), ("status", Value::from("Done"))],
            )
        })
        .unwrap();

        let task = db.object("Task", 1).unwrap().unwrap();
        assert_eq!(task.get("status").unwrap(), Value::from("Done"));
        assert_eq!(task.get("name").unwrap(), Value::from("Wash the dishes"));
        assert_eq!(db.objects("Task").unwrap().len().unwrap(), 1);
    });
}

#[test]
fn nested_write_fails() {
    with_task_db(|db| {
        let result = db.write(|_| db.write(|txn| txn.delete_all("Task")));
        assert!(matches!(result, Err(CoreError::Transaction { .. })));
        // the outer transaction released the lock
        assert!(db.begin_write().is_ok());
    });
}

#[test]
fn writes_outside_a_transaction_fail() {
    with_task_db(|db| {
        let result = db.create("Task", task_values(1, "Loose", 1, 1));
        assert!(matches!(result, Err(CoreError::Transaction { .. })));

        let tasks = seed_tasks(db, &[("Wash the dishes", 3, 5)]);
        assert!(matches!(db.delete(&tasks[0]), Err(CoreError::Transaction { .. })));
    });
}

#[test]
fn sort_by_priority_then_name() {
    with_task_db(|db| {
        seed_tasks(
            db,
            &[("Wash the dishes", 3, 0), ("Do the laundry", 4, 0), ("Gym Workout", 3, 0)],
        );
        let sorted = db
            .objects("Task")
            .unwrap()
            .sorted(vec![("priority", true), ("name", false)])
            .unwrap();
        assert_eq!(
            strings(&sorted, "name"),
            vec!["Do the laundry", "Gym Workout", "Wash the dishes"]
        );

        let by_descriptor = db
            .objects("Task")
            .unwrap()
            .sorted(SortSpec::from(SortDescriptor::descending("priority")).then("name", false))
            .unwrap();
        assert_eq!(strings(&by_descriptor, "name"), strings(&sorted, "name"));
    });
}

#[test]
fn sort_by_single_key_is_stable() {
    with_task_db(|db| {
        seed_tasks(db, &[("c", 1, 0), ("a", 2, 0), ("b", 1, 0)]);
        let sorted = db.objects("Task").unwrap().sorted("priority").unwrap();
        assert_eq!(strings(&sorted, "name"), vec!["c", "b", "a"]);

        let desc = db.objects("Task").unwrap().sorted(("priority", true)).unwrap();
        assert_eq!(strings(&desc, "name"), vec!["a", "c", "b"]);
    });
}

#[test]
fn sort_through_link() {
    with_task_db(|db| {
        let bob = create_person(db, "Bob");
        let ann = create_person(db, "Ann");
        let tasks = seed_tasks(db, &[("first", 1, 0), ("second", 1, 0), ("third", 1, 0)]);
        db.write(|txn| {
            txn.set(&tasks[0], "assignee", Value::Link(bob.id()))?;
            txn.set(&tasks[1], "assignee", Value::Link(ann.id()))?;
            Ok(())
        })
        .unwrap();

        let sorted = db.objects("Task").unwrap().sorted("assignee.name").unwrap();
        // unassigned sorts first
        assert_eq!(strings(&sorted, "name"), vec!["third", "second", "first"]);
    });
}

#[test]
fn invalid_sort_keys() {
    with_user_post_db(|db| {
        let users = db.objects("User").unwrap();
        assert!(matches!(users.sorted("posts"), Err(CoreError::InvalidSort { .. })));
        assert!(matches!(users.sorted("posts.title"), Err(CoreError::InvalidSort { .. })));
        assert!(matches!(users.sorted("nickname"), Err(CoreError::UnknownProperty { .. })));
        assert!(matches!(users.sorted("name."), Err(CoreError::InvalidSort { .. })));
    });
}

#[test]
fn range_filter_keeps_insertion_order() {
    with_task_db(|db| {
        seed_tasks(db, &[("five", 1, 5), ("thirty", 1, 30), ("seven", 1, 7)]);
        let tasks = db.objects("Task").unwrap();

        let chained = tasks
            .filtered("1 <= progressMinutes && progressMinutes < 10")
            .unwrap();
        assert_eq!(ints(&chained, "progressMinutes"), vec![5, 7]);

        let with_args = tasks
            .filtered_with(
                "progressMinutes >= $0 AND progressMinutes < $1",
                &[Value::Int(1), Value::Int(10)],
            )
            .unwrap();
        assert_eq!(strings(&with_args, "name"), vec!["five", "seven"]);
    });
}

#[test]
fn filters_compose() {
    with_task_db(|db| {
        seed_tasks(db, &[("a", 1, 5), ("b", 2, 5), ("c", 2, 50)]);
        let narrowed = db
            .objects("Task")
            .unwrap()
            .filtered("priority == 2")
            .unwrap()
            .filtered("progressMinutes < 10")
            .unwrap();
        assert_eq!(strings(&narrowed, "name"), vec!["b"]);
    });
}

#[test]
fn backlink_predicate_is_existential() {
    with_user_post_db(|db| {
        create_author(db, "Old", date(1999, 12, 31), &["before"]);
        create_author(db, "Young", date(2001, 1, 1), &["after", "later"]);

        let posts = db.objects("Post").unwrap();
        let young = posts
            .filtered("@links.User.posts.birthdate >= 2000-01-01@00:00:00:0")
            .unwrap();
        assert_eq!(strings(&young, "title"), vec!["after", "later"]);

        // the declared inverse traverses the same relationship
        let declared = posts.filtered("author.birthdate >= 2000-01-01").unwrap();
        assert_eq!(strings(&declared, "title"), vec!["after", "later"]);

        let orphans = posts.filtered("@links.User.posts.@count == 0").unwrap();
        assert!(orphans.is_empty().unwrap());
    });
}

#[test]
fn link_count_predicate() {
    with_user_post_db(|db| {
        create_author(db, "Prolific", date(1990, 5, 5), &["a", "b", "c"]);
        create_author(db, "Quiet", date(1990, 5, 5), &["d"]);
        let busy = db
            .objects("User")
            .unwrap()
            .filtered("posts.@count > 1")
            .unwrap();
        assert_eq!(strings(&busy, "name"), vec!["Prolific"]);
    });
}

#[test]
fn backlinks_follow_forward_links() {
    with_task_db(|db| {
        let ann = create_person(db, "Ann");
        let tasks = seed_tasks(db, &[("one", 1, 0), ("two", 1, 0)]);
        db.write(|txn| {
            for task in &tasks {
                txn.set(task, "assignee", Value::Link(ann.id()))?;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(ann.get_objects("tasks").unwrap().len(), 2);
        assert_eq!(ann.linking_objects("Task", "assignee").unwrap().len(), 2);

        db.write(|txn| txn.set(&tasks[0], "assignee", Value::Null)).unwrap();
        let remaining = ann.get_objects("tasks").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id(), tasks[1].id());
    });
}

#[test]
fn delete_invalidates_handles_and_links() {
    with_task_db(|db| {
        let ann = create_person(db, "Ann");
        let tasks = seed_tasks(db, &[("keep", 1, 0), ("drop", 1, 0)]);
        db.write(|txn| txn.set(&tasks[0], "assignee", Value::Link(ann.id())))
            .unwrap();

        let all = db.objects("Task").unwrap();
        let unassigned = all.filtered("assignee == null").unwrap();
        assert_eq!(strings(&unassigned, "name"), vec!["drop"]);

        db.write(|txn| {
            txn.delete(&tasks[1])?;
            txn.delete(&ann)
        })
        .unwrap();

        assert_eq!(strings(&all, "name"), vec!["keep"]);
        assert_eq!(strings(&unassigned, "name"), vec!["keep"]);
        assert!(!tasks[1].is_valid());
        assert!(matches!(
            tasks[1].get("name"),
            Err(CoreError::DanglingReference { .. })
        ));
        assert!(matches!(ann.get("name"), Err(CoreError::DanglingReference { .. })));
        assert_eq!(tasks[0].get("assignee").unwrap(), Value::Null);
        assert!(tasks[0].get_link("assignee").unwrap().is_none());
    });
}

#[test]
fn deleted_objects_leave_lists() {
    with_user_post_db(|db| {
        let user = create_author(db, "Ann", date(2001, 1, 1), &["one", "two"]);
        let posts = user.get_objects("posts").unwrap();
        db.write(|txn| txn.delete(&posts[0])).unwrap();

        let left = user.get_objects("posts").unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].get("title").unwrap(), Value::from("two"));
    });
}

#[test]
fn linking_to_a_missing_object_fails() {
    with_task_db(|db| {
        let result = db.write(|txn| {
            let mut values = task_values(1, "orphan", 1, 1);
            values.push(("assignee", Value::Link(ObjectId::new())));
            txn.create("Task", values)
        });
        assert!(matches!(result, Err(CoreError::DanglingReference { .. })));
    });
}

#[test]
fn primitive_sets_and_lists() {
    let db = open_db(character_schema());
    let hero = db
        .write(|txn| {
            txn.create(
                "Character",
                [
                    ("_id", Value::from(ObjectId::new())),
                    ("name", Value::from("Hero")),
                    ("levelsCompleted", Value::from(vec![1i64, 3, 3])),
                    ("inventory", Value::from(vec!["sword", "sword", "shield"])),
                ],
            )
        })
        .unwrap();

    assert_eq!(hero.get("levelsCompleted").unwrap(), Value::from(vec![1i64, 3]));
    db.write(|txn| {
        txn.push(&hero, "levelsCompleted", 3)?;
        txn.push(&hero, "levelsCompleted", 5)?;
        txn.push(&hero, "inventory", "sword")
    })
    .unwrap();
    assert_eq!(hero.get("levelsCompleted").unwrap(), Value::from(vec![1i64, 3, 5]));
    assert_eq!(
        hero.get("inventory").unwrap().as_list().map(<[Value]>::len),
        Some(4)
    );

    let characters = db.objects("Character").unwrap();
    assert_eq!(characters.filtered("levelsCompleted == 3").unwrap().len().unwrap(), 1);
    assert_eq!(characters.filtered("levelsCompleted > 5").unwrap().len().unwrap(), 0);
    assert_eq!(characters.filtered("inventory.@count == 4").unwrap().len().unwrap(), 1);
}

#[test]
fn embedded_objects_filter_and_sort() {
    let db = open_db(business_schema());
    db.write(|txn| {
        for (name, email, city) in [
            ("Beta", "beta@example.com", "Oslo"),
            ("Alpha", "alpha@example.org", "Lima"),
            ("Gamma", "gamma@example.com", "Kyiv"),
        ] {
            txn.create(
                "Business",
                [
                    ("_id", Value::from(ObjectId::new())),
                    ("name", Value::from(name)),
                    (
                        "contactDetails",
                        embedded(&[
                            ("emailAddress", Value::from(email)),
                            (
                                "address",
                                embedded(&[("street", Value::from("Main")), ("city", Value::from(city))]),
                            ),
                        ]),
                    ),
                ],
            )?;
        }
        Ok(())
    })
    .unwrap();

    let businesses = db.objects("Business").unwrap();
    let dot_com = businesses
        .filtered("contactDetails.emailAddress ENDSWITH '.com'")
        .unwrap();
    assert_eq!(strings(&dot_com, "name"), vec!["Beta", "Gamma"]);

    let by_city = businesses.sorted("contactDetails.address.city").unwrap();
    assert_eq!(strings(&by_city, "name"), vec!["Gamma", "Alpha", "Beta"]);

    assert!(matches!(db.objects("ContactDetails"), Err(CoreError::Schema { .. })));
}

#[test]
fn embedded_objects_validate_their_fields() {
    let db = open_db(business_schema());
    let result = db.write(|txn| {
        txn.create(
            "Business",
            [
                ("_id", Value::from(ObjectId::new())),
                ("name", Value::from("Broken")),
                ("contactDetails", embedded(&[("phoneNumber", Value::from("555"))])),
            ],
        )
    });
    assert!(matches!(result, Err(CoreError::Validation { .. })));
}

#[test]
fn malformed_predicates() {
    with_task_db(|db| {
        let tasks = db.objects("Task").unwrap();
        assert!(matches!(
            tasks.filtered("priority >"),
            Err(CoreError::PredicateSyntax { ref token, .. }) if token == "end of input"
        ));
        assert!(matches!(
            tasks.filtered("priority == 3 &&& name == 'x'"),
            Err(CoreError::PredicateSyntax { .. })
        ));
        assert!(matches!(
            tasks.filtered("deadline < 2020-01-01"),
            Err(CoreError::UnknownProperty { ref property, .. }) if property == "deadline"
        ));
        assert!(matches!(
            tasks.filtered("priority == $0"),
            Err(CoreError::PredicateSyntax { .. })
        ));
        assert!(db.stats().errors() >= 4);
    });
}

#[test]
fn deeply_nested_predicate_is_rejected() {
    with_task_db(|db| {
        let tasks = db.objects("Task").unwrap();
        let negated = format!("{}priority > 1", "!".repeat(200_000));
        assert!(matches!(
            tasks.filtered(&negated),
            Err(CoreError::PredicateSyntax { .. })
        ));
        let grouped = format!("{}priority > 1{}", "(".repeat(5_000), ")".repeat(5_000));
        assert!(matches!(
            tasks.filtered(&grouped),
            Err(CoreError::PredicateSyntax { .. })
        ));
    });
}

#[test]
fn unknown_object_type() {
    with_task_db(|db| {
        assert!(matches!(
            db.objects("Project"),
            Err(CoreError::UnknownObjectType { .. })
        ));
        let result = db.write(|txn| txn.create("Project", task_values(1, "x", 1, 1)));
        assert!(matches!(result, Err(CoreError::UnknownObjectType { .. })));
    });
}

#[test]
fn change_feed_reports_commits_in_order() {
    with_task_db(|db| {
        let feed = db.subscribe();
        let tasks = seed_tasks(db, &[("a", 1, 1)]);
        db.write(|txn| txn.set(&tasks[0], "priority", 2)).unwrap();
        db.write(|txn| txn.delete(&tasks[0])).unwrap();

        let kinds: Vec<_> = feed
            .try_iter()
            .map(|e| (e.sequence, e.change_type))
            .collect();
        use tessera_core::ChangeType::*;
        assert_eq!(kinds, vec![(1, Insert), (2, Update), (3, Delete)]);

        let polled = db.poll_changes(1, 10);
        assert_eq!(polled.len(), 2);
        assert_eq!(polled[0].primary_key, Some(PrimaryKey::Int(1)));
    });
}
