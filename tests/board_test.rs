use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use babeat::board::{BoardServices, TodoBoard};
use babeat::error::AppError;
use babeat::models::{
    AuthUser, GenerateTodosRequest, GenerateTodosResponse, ImageUpload, NewTodo, Session, Todo,
};
use babeat::services::TodoGenerator;
use babeat::store::{ChangeFeed, ImageStore, SqliteTodoStore, Subscription, TodoStore};

/// Delegates to SQLite but can be told to fail mutations.
struct FlakyStore {
    inner: SqliteTodoStore,
    fail_mutations: AtomicBool,
}

#[async_trait]
impl TodoStore for FlakyStore {
    async fn ping(&self) -> Result<(), AppError> {
        self.inner.ping().await
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Todo>, AppError> {
        self.inner.list(user_id).await
    }

    async fn insert_many(&self, rows: Vec<NewTodo>) -> Result<Vec<Todo>, AppError> {
        self.inner.insert_many(rows).await
    }

    async fn set_completed(&self, id: &str, completed: bool) -> Result<Todo, AppError> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(AppError::Backend("network unreachable".to_string()));
        }
        self.inner.set_completed(id, completed).await
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(AppError::Backend("network unreachable".to_string()));
        }
        self.inner.delete(id).await
    }
}

/// Records requests and inserts one row per line of text through the store.
struct RecordingGenerator {
    store: SqliteTodoStore,
    requests: Mutex<Vec<GenerateTodosRequest>>,
}

#[async_trait]
impl TodoGenerator for RecordingGenerator {
    async fn generate(&self, req: GenerateTodosRequest) -> Result<GenerateTodosResponse, AppError> {
        self.requests.lock().await.push(req.clone());
        let user_id = req.user_id.clone().unwrap_or_default();
        let rows: Vec<NewTodo> = req
            .text
            .unwrap_or_default()
            .lines()
            .map(|line| NewTodo::new(user_id.clone(), line))
            .collect();
        if rows.is_empty() {
            return Ok(GenerateTodosResponse::nothing_found());
        }
        let inserted = self.store.insert_many(rows).await?;
        Ok(GenerateTodosResponse::created(inserted.len()))
    }
}

struct MemoryImages {
    uploads: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageStore for MemoryImages {
    async fn upload(&self, user_id: &str, image: &ImageUpload) -> Result<String, AppError> {
        let url = format!("https://cdn.example.com/{}/{}", user_id, image.file_name);
        self.uploads.lock().await.push(url.clone());
        Ok(url)
    }
}

struct Fixture {
    sqlite: SqliteTodoStore,
    store: Arc<FlakyStore>,
    generator: Arc<RecordingGenerator>,
    images: Arc<MemoryImages>,
    board: TodoBoard,
}

fn session() -> Session {
    Session {
        access_token: "jwt".to_string(),
        refresh_token: Some("refresh".to_string()),
        expires_in: Some(3600),
        user: AuthUser {
            id: "u1".to_string(),
            email: Some("u1@example.com".to_string()),
        },
    }
}

async fn fixture(session: Option<&Session>) -> Fixture {
    let sqlite = SqliteTodoStore::in_memory()
        .await
        .expect("Failed to create database");
    let store = Arc::new(FlakyStore {
        inner: sqlite.clone(),
        fail_mutations: AtomicBool::new(false),
    });
    let generator = Arc::new(RecordingGenerator {
        store: sqlite.clone(),
        requests: Mutex::new(Vec::new()),
    });
    let images = Arc::new(MemoryImages {
        uploads: Mutex::new(Vec::new()),
    });

    let services = BoardServices {
        store: store.clone(),
        images: Some(images.clone()),
        generator: generator.clone(),
    };
    let board = TodoBoard::mount(session, services).await.unwrap();

    Fixture {
        sqlite,
        store,
        generator,
        images,
        board,
    }
}

#[tokio::test]
async fn mount_loads_existing_rows_for_the_user() {
    let seeded = SqliteTodoStore::in_memory().await.unwrap();
    seeded.insert(NewTodo::new("u1", "existing")).await.unwrap();
    let services = BoardServices {
        store: Arc::new(seeded.clone()),
        images: None,
        generator: Arc::new(RecordingGenerator {
            store: seeded.clone(),
            requests: Mutex::new(Vec::new()),
        }),
    };

    let board = TodoBoard::mount(Some(&session()), services).await.unwrap();
    assert_eq!(board.todos().len(), 1);
    assert_eq!(board.todos()[0].title, "existing");
}

#[tokio::test]
async fn signed_out_board_is_empty_and_refuses_writes() {
    let mut f = fixture(None).await;
    assert!(f.board.user().is_none());
    assert!(f.board.todos().is_empty());

    let err = f.board.add("buy milk", None).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
    let err = f.board.submit_with_ai("buy milk", None).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
}

#[tokio::test]
async fn add_inserts_and_ignores_blank_titles() {
    let mut f = fixture(Some(&session())).await;

    assert!(f.board.add("   ", None).await.unwrap().is_none());

    let image = ImageUpload::new("receipt.png", "image/png", vec![1, 2, 3]);
    let todo = f.board.add(" pay rent ", Some(image)).await.unwrap().unwrap();
    assert_eq!(todo.title, "pay rent");
    assert_eq!(todo.image_url.as_deref(), Some("https://cdn.example.com/u1/receipt.png"));
    assert_eq!(f.board.todos().len(), 1);

    // The realtime echo of the same row does not duplicate it.
    f.board.apply_change(babeat::models::TodoChange::Inserted(todo));
    assert_eq!(f.board.todos().len(), 1);
}

#[tokio::test]
async fn toggle_is_optimistic_and_persists() {
    let mut f = fixture(Some(&session())).await;
    let todo = f.board.add("walk the dog", None).await.unwrap().unwrap();

    f.board.toggle(&todo.id).await.unwrap();
    assert!(f.board.todos()[0].completed);
    assert!(f.sqlite.list("u1").await.unwrap()[0].completed);
}

#[tokio::test]
async fn failed_toggle_rolls_back_and_surfaces_notice() {
    let mut f = fixture(Some(&session())).await;
    let todo = f.board.add("walk the dog", None).await.unwrap().unwrap();
    f.store.fail_mutations.store(true, Ordering::SeqCst);

    let err = f.board.toggle(&todo.id).await.unwrap_err();
    assert!(matches!(err, AppError::Backend(_)));
    assert!(!f.board.todos()[0].completed);
    assert_eq!(f.board.take_notice().as_deref(), Some("network unreachable"));
    assert!(f.board.notice().is_none());
}

#[tokio::test]
async fn failed_delete_restores_the_row() {
    let mut f = fixture(Some(&session())).await;
    let todo = f.board.add("call mom", None).await.unwrap().unwrap();
    f.store.fail_mutations.store(true, Ordering::SeqCst);

    assert!(f.board.delete(&todo.id).await.is_err());
    assert_eq!(f.board.todos().len(), 1);
    assert_eq!(f.board.todos()[0].id, todo.id);

    f.store.fail_mutations.store(false, Ordering::SeqCst);
    f.board.delete(&todo.id).await.unwrap();
    assert!(f.board.todos().is_empty());
    assert!(f.sqlite.list("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let mut f = fixture(Some(&session())).await;
    assert!(matches!(f.board.toggle("missing").await, Err(AppError::NotFound)));
    assert!(matches!(f.board.delete("missing").await, Err(AppError::NotFound)));
}

#[tokio::test]
async fn ai_submission_relies_on_the_change_feed() {
    let mut f = fixture(Some(&session())).await;
    let mut subscription = f.sqlite.subscribe("u1").await.unwrap();

    let response = f
        .board
        .submit_with_ai("buy milk\nmeeting at 3pm", None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response, GenerateTodosResponse::created(2));
    assert!(f.board.todos().is_empty());

    for _ in 0..2 {
        let change = tokio::time::timeout(Duration::from_secs(1), subscription.next())
            .await
            .unwrap()
            .unwrap();
        f.board.apply_change(change);
    }
    assert_eq!(f.board.todos().len(), 2);
    assert_eq!(f.board.progress().total, 2);
}

#[tokio::test]
async fn ai_submission_with_image_uploads_and_inlines_it() {
    let mut f = fixture(Some(&session())).await;
    let image = ImageUpload::new("note.png", "image/png", b"abc".to_vec());

    f.board.submit_with_ai("", Some(image)).await.unwrap();

    let requests = f.generator.requests.lock().await;
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.user_id.as_deref(), Some("u1"));
    assert!(req.text.is_none());
    assert_eq!(req.image_url.as_deref(), Some("https://cdn.example.com/u1/note.png"));
    assert_eq!(req.base64_image.as_deref(), Some("data:image/png;base64,YWJj"));
    assert_eq!(f.images.uploads.lock().await.len(), 1);
    assert_eq!(f.board.notice(), Some("No todos found"));
}

#[tokio::test]
async fn empty_ai_submission_does_nothing() {
    let mut f = fixture(Some(&session())).await;
    assert!(f.board.submit_with_ai("  ", None).await.unwrap().is_none());
    assert!(f.generator.requests.lock().await.is_empty());
}

#[tokio::test]
async fn drain_applies_pending_changes_and_sign_out_clears() {
    let mut f = fixture(Some(&session())).await;
    let mut subscription = f.sqlite.subscribe("u1").await.unwrap();
    f.sqlite.insert(NewTodo::new("u1", "from another device")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(f.board.drain(&mut subscription), 1);
    assert_eq!(f.board.todos()[0].title, "from another device");

    f.board.sign_out();
    assert!(f.board.user().is_none());
    assert!(f.board.todos().is_empty());
}

#[tokio::test]
async fn drain_reports_a_closed_feed() {
    let mut f = fixture(Some(&session())).await;
    let pushed = f.sqlite.insert(NewTodo::new("u1", "last update")).await.unwrap();
    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let mut subscription = Subscription::new(rx, tokio::spawn(async {}));

    tx.send(babeat::models::TodoChange::Inserted(pushed)).await.unwrap();
    drop(tx);

    assert_eq!(f.board.drain(&mut subscription), 1);
    assert_eq!(f.board.todos()[0].title, "last update");
    assert_eq!(f.board.notice(), Some("Live updates disconnected"));
}
