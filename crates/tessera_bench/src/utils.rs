//! Benchmark utilities.

use rand::seq::SliceRandom;
use rand::Rng;
use tessera_core::{Database, ObjectId, Value};
use tessera_testkit::fixtures::{open_db, task_schema, task_values};

const WORDS: &[&str] = &["wash", "gym", "laundry", "groceries", "taxes", "garden", "read"];

/// Generate a random task name.
pub fn random_name(rng: &mut impl Rng) -> String {
    let first = WORDS.choose(rng).copied().unwrap_or("task");
    let second = WORDS.choose(rng).copied().unwrap_or("task");
    format!("{first} {second}")
}

/// Generate `count` random `Task` rows with primary keys starting at `first_id`.
pub fn generate_tasks(first_id: i64, count: usize) -> Vec<Vec<(&'static str, Value)>> {
    let mut rng = rand::thread_rng();
    (0..count as i64)
        .map(|i| {
            let name = random_name(&mut rng);
            task_values(first_id + i, &name, rng.gen_range(0..10), rng.gen_range(0..120))
        })
        .collect()
}

/// Open a task database holding `count` random tasks.
pub fn populated_db(count: usize) -> Database {
    let db = open_db(task_schema());
    let rows = generate_tasks(1, count);
    db.write(|txn| {
        for row in rows {
            txn.create("Task", row)?;
        }
        Ok(())
    })
    .unwrap();
    db
}

/// Create `people` persons and assign every task to one of them at random.
pub fn assign_people(db: &Database, people: usize) -> Vec<ObjectId> {
    let mut rng = rand::thread_rng();
    let tasks = db.objects("Task").unwrap().to_vec().unwrap();
    db.write(|txn| {
        let mut ids = Vec::with_capacity(people);
        for i in 0..people {
            let person = txn.create(
                "Person",
                [
                    ("_id", Value::from(ObjectId::new())),
                    ("name", Value::from(format!("person {i}"))),
                    ("age", Value::Int(rng.gen_range(18..70))),
                ],
            )?;
            ids.push(person.id());
        }
        for task in &tasks {
            if let Some(id) = ids.choose(&mut rng) {
                txn.set(task, "assignee", Value::Link(*id))?;
            }
        }
        Ok(ids)
    })
    .unwrap()
}
