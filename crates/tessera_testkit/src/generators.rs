//! Property-based test generators using proptest.
//!
//! Provides strategies for generating `Task` rows and write sequences
//! against the [`task_schema`](crate::fixtures::task_schema) model.

use proptest::prelude::*;
use tessera_core::Value;

/// A generated `Task`: name, priority and progress in minutes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    /// Task name.
    pub name: String,
    /// Priority, drawn from a small range so ties are common.
    pub priority: i64,
    /// Progress in minutes.
    pub progress: i64,
}

impl TaskRow {
    /// Property values for `Task` with the given primary key.
    pub fn values(&self, id: i64) -> Vec<(&'static str, Value)> {
        crate::fixtures::task_values(id, &self.name, self.priority, self.progress)
    }
}

/// Strategy for generating task names.
pub fn task_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-d]{1,3}").expect("Invalid regex")
}

/// Strategy for generating one task row.
pub fn task_row_strategy() -> impl Strategy<Value = TaskRow> {
    (task_name_strategy(), 0i64..4, 0i64..60).prop_map(|(name, priority, progress)| TaskRow {
        name,
        priority,
        progress,
    })
}

/// Strategy for generating a batch of task rows.
pub fn task_rows_strategy(min: usize, max: usize) -> impl Strategy<Value = Vec<TaskRow>> {
    prop::collection::vec(task_row_strategy(), min..max)
}

/// A write applied to the `Task` table. Indices pick an existing task
/// modulo the number of live tasks; they are ignored when there is none.
#[derive(Debug, Clone)]
pub enum TaskOperation {
    /// Create a task.
    Create(TaskRow),
    /// Change the priority of a task.
    SetPriority {
        /// Which task.
        index: usize,
        /// New priority.
        priority: i64,
    },
    /// Delete a task.
    Delete {
        /// Which task.
        index: usize,
    },
}

/// Strategy for generating task operations.
pub fn task_operation_strategy() -> impl Strategy<Value = TaskOperation> {
    prop_oneof![
        3 => task_row_strategy().prop_map(TaskOperation::Create),
        2 => (any::<usize>(), 0i64..4)
            .prop_map(|(index, priority)| TaskOperation::SetPriority { index, priority }),
        1 => any::<usize>().prop_map(|index| TaskOperation::Delete { index }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<TaskOperation>> {
    prop::collection::vec(task_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn task_rows_stay_in_range(row in task_row_strategy()) {
            prop_assert!((0..4).contains(&row.priority));
            prop_assert!((0..60).contains(&row.progress));
            prop_assert!(!row.name.is_empty());
        }

        #[test]
        fn task_rows_have_requested_length(rows in task_rows_strategy(2, 6)) {
            prop_assert!((2..6).contains(&rows.len()));
        }
    }
}
