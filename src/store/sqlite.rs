use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewTodo, Todo, TodoChange};
use crate::store::{ChangeFeed, Subscription, TodoStore};

const CHANGE_BUFFER: usize = 256;

#[derive(Clone, Debug)]
struct OwnedChange {
    user_id: String,
    change: TodoChange,
}

/// Local todo table with an in-process change feed.
#[derive(Clone)]
pub struct SqliteTodoStore {
    db: SqlitePool,
    changes: broadcast::Sender<OwnedChange>,
}

impl SqliteTodoStore {
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Single-connection in-memory database; every connection would otherwise get its own.
    pub async fn in_memory() -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, AppError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Ok(Self { db: pool, changes })
    }

    async fn find(&self, id: &str) -> Result<Option<Todo>, AppError> {
        let todo = sqlx::query_as::<_, Todo>(
            "SELECT id, user_id, title, completed, image_url, created_at FROM todos WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(todo)
    }

    fn publish(&self, user_id: &str, change: TodoChange) {
        // No subscribers is not an error.
        let _ = self.changes.send(OwnedChange {
            user_id: user_id.to_string(),
            change,
        });
    }
}

#[async_trait]
impl TodoStore for SqliteTodoStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("select 1").execute(&self.db).await?;
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Todo>, AppError> {
        let todos = sqlx::query_as::<_, Todo>(
            r#"
            SELECT id, user_id, title, completed, image_url, created_at
            FROM todos
            WHERE user_id = ?1
            ORDER BY created_at DESC, rowid ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(todos)
    }

    async fn insert_many(&self, rows: Vec<NewTodo>) -> Result<Vec<Todo>, AppError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let mut inserted = Vec::with_capacity(rows.len());

        for row in rows {
            let todo = Todo {
                id: Uuid::new_v4().to_string(),
                user_id: row.user_id,
                title: row.title,
                completed: row.completed,
                image_url: row.image_url,
                created_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO todos (id, user_id, title, completed, image_url, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&todo.id)
            .bind(&todo.user_id)
            .bind(&todo.title)
            .bind(todo.completed)
            .bind(&todo.image_url)
            .bind(todo.created_at)
            .execute(&mut *tx)
            .await?;

            inserted.push(todo);
        }

        tx.commit().await?;
        debug!("inserted {} todos", inserted.len());

        for todo in &inserted {
            self.publish(&todo.user_id, TodoChange::Inserted(todo.clone()));
        }
        Ok(inserted)
    }

    async fn set_completed(&self, id: &str, completed: bool) -> Result<Todo, AppError> {
        let result = sqlx::query("UPDATE todos SET completed = ?1 WHERE id = ?2")
            .bind(completed)
            .bind(id)
            .execute(&self.db)
            .await?
            .rows_affected();

        if result == 0 {
            return Err(AppError::NotFound);
        }

        let todo = self.find(id).await?.ok_or(AppError::NotFound)?;
        self.publish(&todo.user_id, TodoChange::Updated(todo.clone()));
        Ok(todo)
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        let Some(existing) = self.find(id).await? else {
            return Err(AppError::NotFound);
        };

        sqlx::query("DELETE FROM todos WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;

        self.publish(
            &existing.user_id,
            TodoChange::Deleted {
                id: existing.id.clone(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for SqliteTodoStore {
    async fn subscribe(&self, user_id: &str) -> Result<Subscription, AppError> {
        let mut changes = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(CHANGE_BUFFER);
        let user_id = user_id.to_string();

        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(owned) if owned.user_id == user_id => {
                        if tx.send(owned.change).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("change feed for {} lagged, skipped {} events", user_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(rx, task))
    }
}
