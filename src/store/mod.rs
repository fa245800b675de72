pub mod sqlite;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::models::{ImageUpload, NewTodo, Todo, TodoChange};

pub use sqlite::SqliteTodoStore;

/// CRUD access to the `todos` table.
#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;

    /// Rows owned by `user_id`, newest first.
    async fn list(&self, user_id: &str) -> Result<Vec<Todo>, AppError>;

    /// Inserts all rows in one call. Nothing is written if any row fails.
    async fn insert_many(&self, rows: Vec<NewTodo>) -> Result<Vec<Todo>, AppError>;

    async fn set_completed(&self, id: &str, completed: bool) -> Result<Todo, AppError>;

    async fn delete(&self, id: &str) -> Result<(), AppError>;

    async fn insert(&self, row: NewTodo) -> Result<Todo, AppError> {
        self.insert_many(vec![row])
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::InternalServerError)
    }
}

/// Push subscription over row changes.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, user_id: &str) -> Result<Subscription, AppError>;
}

/// Public file storage for attachments.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Uploads the image and returns its public URL.
    async fn upload(&self, user_id: &str, image: &ImageUpload) -> Result<String, AppError>;
}

/// Stream of changes for one user. Dropping it stops the forwarder task.
pub struct Subscription {
    rx: mpsc::Receiver<TodoChange>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<TodoChange>, task: JoinHandle<()>) -> Self {
        Self { rx, task }
    }

    pub async fn next(&mut self) -> Option<TodoChange> {
        self.rx.recv().await
    }

    /// A change that is already waiting, `Ok(None)` when there is none yet.
    /// Fails once the feed has ended and every buffered change was taken.
    pub fn try_next(&mut self) -> Result<Option<TodoChange>, AppError> {
        match self.rx.try_recv() {
            Ok(change) => Ok(Some(change)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(AppError::Realtime("Live updates disconnected".to_string()))
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn todo(id: &str) -> Todo {
        Todo {
            id: id.to_string(),
            user_id: "u1".to_string(),
            title: id.to_string(),
            completed: false,
            image_url: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn try_next_separates_empty_from_closed() {
        let (tx, rx) = mpsc::channel(4);
        let mut subscription = Subscription::new(rx, tokio::spawn(async {}));

        assert_eq!(subscription.try_next().unwrap(), None);

        tx.send(TodoChange::Inserted(todo("t1"))).await.unwrap();
        drop(tx);

        assert!(matches!(
            subscription.try_next(),
            Ok(Some(TodoChange::Inserted(ref t))) if t.id == "t1"
        ));
        assert!(matches!(subscription.try_next(), Err(AppError::Realtime(_))));
    }
}
