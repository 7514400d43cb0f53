//! Live results and change notifications.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_core::{CollectionChange, Database, ObjectId, Value};
use tessera_testkit::prelude::*;

type Log = Arc<Mutex<Vec<CollectionChange>>>;

fn recorder() -> (Log, impl FnMut(&tessera_core::Results, &CollectionChange) + Send + 'static) {
    let log: Log = Arc::default();
    let sink = Arc::clone(&log);
    (log, move |_: &tessera_core::Results, change: &CollectionChange| {
        sink.lock().push(change.clone());
    })
}

#[test]
fn results_follow_commits() {
    with_task_db(|db| {
        let all = db.objects("Task").unwrap();
        let quick = all.filtered("progressMinutes < 10").unwrap();
        assert!(all.is_empty().unwrap());

        let tasks = seed_tasks(db, &[("a", 1, 5), ("b", 1, 30)]);
        assert_eq!(all.len().unwrap(), 2);
        assert_eq!(strings(&quick, "name"), vec!["a"]);

        db.write(|txn| txn.set(&tasks[1], "progressMinutes", 2)).unwrap();
        assert_eq!(strings(&quick, "name"), vec!["a", "b"]);

        db.write(|txn| txn.delete(&tasks[0])).unwrap();
        assert_eq!(strings(&quick, "name"), vec!["b"]);
        assert_eq!(all.len().unwrap(), 1);
    });
}

#[test]
fn iteration_restarts_against_current_state() {
    with_task_db(|db| {
        seed_tasks(db, &[("a", 1, 1)]);
        let all = db.objects("Task").unwrap();
        let first_pass = all.iter().unwrap();
        assert_eq!(first_pass.len(), 1);

        db.write(|txn| txn.create("Task", task_values(2, "b", 1, 1)))
            .unwrap();
        // an iterator in flight keeps its view
        assert_eq!(first_pass.count(), 1);
        assert_eq!((&all).into_iter().count(), 2);
        assert_eq!(all.last().unwrap().unwrap().get("name").unwrap(), Value::from("b"));
    });
}

#[test]
fn writer_sees_uncommitted_changes_in_results() {
    with_task_db(|db| {
        let all = db.objects("Task").unwrap();
        let mut txn = db.begin_write().unwrap();
        txn.create("Task", task_values(1, "pending", 1, 1)).unwrap();
        assert_eq!(all.len().unwrap(), 1);

        std::thread::scope(|s| {
            s.spawn(|| assert_eq!(all.len().unwrap(), 0));
        });
        txn.abort();
        assert_eq!(all.len().unwrap(), 0);
    });
}

#[test]
fn observer_receives_index_changes() {
    with_task_db(|db| {
        let all = db.objects("Task").unwrap();
        let (log, callback) = recorder();
        let token = all.observe(callback).unwrap();

        let tasks = seed_tasks(db, &[("a", 1, 1), ("b", 1, 1)]);
        db.write(|txn| txn.set(&tasks[1], "priority", 5)).unwrap();
        db.write(|txn| txn.delete(&tasks[0])).unwrap();

        let changes = log.lock().clone();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].insertions, vec![0, 1]);
        assert_eq!(changes[1].modifications, vec![1]);
        assert_eq!(changes[2].deletions, vec![0]);
        assert!(changes[2].insertions.is_empty());
        drop(token);
    });
}

#[test]
fn filtered_observer_ignores_unrelated_changes() {
    with_task_db(|db| {
        let urgent = db.objects("Task").unwrap().filtered("priority >= 5").unwrap();
        let (log, callback) = recorder();
        let _token = urgent.observe(callback).unwrap();

        let tasks = seed_tasks(db, &[("low", 1, 1)]);
        create_person(db, "Ann");
        assert!(log.lock().is_empty());

        db.write(|txn| txn.set(&tasks[0], "priority", 9)).unwrap();
        let changes = log.lock().clone();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].insertions, vec![0]);
    });
}

#[test]
fn sorted_observer_reports_moves() {
    with_task_db(|db| {
        seed_tasks(db, &[("a", 1, 1), ("b", 2, 1), ("c", 3, 1)]);
        let by_priority = db.objects("Task").unwrap().sorted("priority").unwrap();
        let (log, callback) = recorder();
        let _token = by_priority.observe(callback).unwrap();

        let c = db.object("Task", 3).unwrap().unwrap();
        db.write(|txn| txn.set(&c, "priority", 0)).unwrap();

        assert_eq!(strings(&by_priority, "name"), vec!["c", "a", "b"]);
        let changes = log.lock().clone();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].deletions, vec![2]);
        assert_eq!(changes[0].insertions, vec![0]);
    });
}

#[test]
fn observer_sees_changes_through_links() {
    with_task_db(|db| {
        let ann = create_person(db, "Ann");
        let tasks = seed_tasks(db, &[("mine", 1, 1)]);
        db.write(|txn| txn.set(&tasks[0], "assignee", Value::Link(ann.id())))
            .unwrap();

        let anns = db
            .objects("Task")
            .unwrap()
            .filtered("assignee.name == 'Ann'")
            .unwrap();
        let (log, callback) = recorder();
        let _token = anns.observe(callback).unwrap();

        db.write(|txn| txn.set(&ann, "name", "Anna")).unwrap();
        assert!(anns.is_empty().unwrap());
        assert_eq!(log.lock().len(), 1);
        assert_eq!(log.lock()[0].deletions, vec![0]);
    });
}

#[test]
fn dropped_token_stops_notifications() {
    with_task_db(|db| {
        let all = db.objects("Task").unwrap();
        let (log, callback) = recorder();
        let token = all.observe(callback).unwrap();

        seed_tasks(db, &[("a", 1, 1)]);
        token.unsubscribe();
        db.write(|txn| txn.create("Task", task_values(2, "b", 1, 1)))
            .unwrap();

        assert_eq!(log.lock().len(), 1);
    });
}

#[test]
fn rolled_back_writes_do_not_notify() {
    with_task_db(|db| {
        let all = db.objects("Task").unwrap();
        let (log, callback) = recorder();
        let _token = all.observe(callback).unwrap();

        let txn = db.begin_write().unwrap();
        db.create("Task", task_values(1, "never", 1, 1)).unwrap();
        drop(txn);

        assert!(log.lock().is_empty());
        assert!(all.is_empty().unwrap());
    });
}

#[test]
fn panicking_observer_does_not_stop_delivery() {
    with_task_db(|db| {
        let all = db.objects("Task").unwrap();
        let _failing = all
            .observe(|_, _| panic!("observer failure"))
            .unwrap();
        let (log, callback) = recorder();
        let _token = all.observe(callback).unwrap();

        seed_tasks(db, &[("a", 1, 1)]);
        db.write(|txn| txn.create("Task", task_values(2, "b", 1, 1)))
            .unwrap();
        db.write(|txn| txn.create("Task", task_values(3, "c", 1, 1)))
            .unwrap();

        assert_eq!(log.lock().len(), 3);
        assert_eq!(db.poll_changes(0, 10).len(), 3);
        assert_eq!(all.len().unwrap(), 3);
    });
}

#[test]
fn observers_may_write() {
    let db = Arc::new(open_db(task_schema()));
    let order: Arc<Mutex<Vec<String>>> = Arc::default();

    let people = db.objects("Person").unwrap();
    let people_order = Arc::clone(&order);
    let _people_token = people
        .observe(move |_, change| {
            people_order
                .lock()
                .push(format!("person +{}", change.insertions.len()));
        })
        .unwrap();

    let tasks = db.objects("Task").unwrap();
    let task_order = Arc::clone(&order);
    let writer = Arc::clone(&db);
    let done = AtomicBool::new(false);
    let task_token = tasks
        .observe(move |_, change| {
            task_order
                .lock()
                .push(format!("task +{}", change.insertions.len()));
            if !done.swap(true, Ordering::SeqCst) {
                writer
                    .write(|txn| {
                        txn.create(
                            "Person",
                            [("_id", Value::from(ObjectId::new())), ("name", Value::from("Helper"))],
                        )
                    })
                    .unwrap();
            }
        })
        .unwrap();

    seed_tasks(&db, &[("a", 1, 1)]);
    assert_eq!(people.len().unwrap(), 1);
    // the nested commit is delivered after the current one finishes
    assert_eq!(*order.lock(), vec!["task +1".to_string(), "person +1".to_string()]);
    drop(task_token);
}

#[test]
fn commits_from_other_threads_reach_observers_in_order() {
    let db = open_db(task_schema());
    let seen: Arc<Mutex<Vec<u64>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let all = db.objects("Task").unwrap();
    let _token = all
        .observe(move |results, _| {
            sink.lock().push(results.len().unwrap_or_default() as u64);
        })
        .unwrap();

    std::thread::scope(|s| {
        for worker in 0..4i64 {
            let db = &db;
            s.spawn(move || {
                for i in 0..5 {
                    db.write(|txn| txn.create("Task", task_values(worker * 100 + i, "t", 1, 1)))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(all.len().unwrap(), 20);
    let seen = seen.lock();
    assert_eq!(seen.len(), 20);
    assert_eq!(*seen.last().unwrap(), 20);
}

#[test]
fn stats_count_activity() {
    with_task_db(|db: &Database| {
        let all = db.objects("Task").unwrap();
        let _token = all.observe(|_, _| {}).unwrap();
        seed_tasks(db, &[("a", 1, 1), ("b", 1, 1)]);
        let _ = db.write(|txn| txn.create("Task", task_values(1, "dup", 1, 1)));

        let stats = db.stats().snapshot();
        assert_eq!(stats.objects_created, 2);
        assert_eq!(stats.transactions_committed, 1);
        assert_eq!(stats.transactions_aborted, 1);
        assert_eq!(stats.notifications_delivered, 1);
        assert!(stats.errors >= 1);
    });
}
