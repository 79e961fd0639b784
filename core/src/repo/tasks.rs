use super::{RemoteTable, RepoState};
use crate::model::{date_only, NewTask, Task, TASKS_RELATION};
use crate::provider::{AuthProvider, DataProvider};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Chores owned by the signed-in parent.
#[derive(Clone)]
pub struct TaskRepository {
    table: RemoteTable<Task>,
}

impl TaskRepository {
    pub fn new(auth: Arc<dyn AuthProvider>, data: Arc<dyn DataProvider>) -> Self {
        Self {
            table: RemoteTable::new(TASKS_RELATION, auth, data),
        }
    }

    pub fn snapshot(&self) -> RepoState<Task> {
        self.table.snapshot()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.table.items()
    }

    pub fn clear_error(&self) {
        self.table.clear_error();
    }

    pub fn assigned_to(&self, child_id: Uuid) -> Vec<Task> {
        self.table
            .state
            .read()
            .items
            .iter()
            .filter(|task| task.child_id == Some(child_id))
            .cloned()
            .collect()
    }

    /// Points from completed chores assigned to `child_id`.
    pub fn points_earned(&self, child_id: Uuid) -> i64 {
        self.table
            .state
            .read()
            .items
            .iter()
            .filter(|task| task.child_id == Some(child_id) && task.is_completed)
            .map(|task| i64::from(task.points))
            .sum()
    }

    pub async fn load(&self) {
        let _turn = self.table.begin().await;
        if let Err(err) = self.table.reload().await {
            self.table.report("load", &err);
        }
    }

    pub async fn add(&self, task: NewTask) {
        let _turn = self.table.begin().await;
        let result = async {
            let owner = self.table.current_user_id().await?;
            let id = Uuid::new_v4();
            let row = json!({
                "id": id,
                "parent_user_id": owner,
                "child_id": task.child_id,
                "title": task.title,
                "notes": task.notes,
                "due_date": task.due_date.map(date_only::format),
                "points": task.points,
                "is_completed": false,
            });
            self.table.insert(row).await?;
            info!(task_id = %id, "task created");
            self.table.reload().await
        }
        .await;
        if let Err(err) = result {
            self.table.report("add", &err);
        }
    }

    /// Replace every mutable column of an existing task.
    pub async fn update(&self, task: &Task) {
        let _turn = self.table.begin().await;
        let changes = json!({
            "child_id": task.child_id,
            "title": task.title,
            "notes": task.notes,
            "due_date": task.due_date.map(date_only::format),
            "points": task.points,
            "is_completed": task.is_completed,
            "completed_at": task.completed_at,
        });
        let result = async {
            self.table.update_by_id(task.id, changes).await?;
            self.table.reload().await
        }
        .await;
        if let Err(err) = result {
            self.table.report("update", &err);
        }
    }

    /// Mark a task done or not done; completion time follows the flag.
    pub async fn set_completed(&self, id: Uuid, done: bool) {
        let _turn = self.table.begin().await;
        let completed_at = done.then(Utc::now);
        let result = async {
            self.table
                .update_by_id(
                    id,
                    json!({ "is_completed": done, "completed_at": completed_at }),
                )
                .await?;
            self.table.reload().await
        }
        .await;
        if let Err(err) = result {
            self.table.report("set completed", &err);
        }
    }

    pub async fn delete(&self, id: Uuid) {
        let _turn = self.table.begin().await;
        let result = async {
            self.table.delete_by_id(id).await?;
            info!(task_id = %id, "task deleted");
            self.table.reload().await
        }
        .await;
        if let Err(err) = result {
            self.table.report("delete", &err);
        }
    }
}
