//! Headless todo page state.
//!
//! A [`TodoBoard`] is owned by one view and mutated from its event loop: user actions
//! (`add`, `toggle`, `delete`, `submit_with_ai`) and realtime pushes (`apply_change`) all
//! go through `&mut self`, so updates are applied one at a time in arrival order.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::AppError;
use crate::models::{
    AuthUser, GenerateTodosRequest, GenerateTodosResponse, ImageUpload, NewTodo, Session, Todo,
    TodoChange,
};
use crate::services::TodoGenerator;
use crate::store::{ImageStore, Subscription, TodoStore};

/// Backends the board talks to.
#[derive(Clone)]
pub struct BoardServices {
    /// Runs as the signed-in user.
    pub store: Arc<dyn TodoStore>,
    pub images: Option<Arc<dyn ImageStore>>,
    pub generator: Arc<dyn TodoGenerator>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
}

pub struct TodoBoard {
    user: Option<AuthUser>,
    todos: Vec<Todo>,
    theme: Theme,
    notice: Option<String>,
    services: BoardServices,
}

impl TodoBoard {
    /// Builds the board from the session read at mount time and loads the user's list.
    pub async fn mount(session: Option<&Session>, services: BoardServices) -> Result<Self, AppError> {
        let mut board = Self {
            user: session.map(|s| s.user.clone()),
            todos: Vec::new(),
            theme: Theme::default(),
            notice: None,
            services,
        };
        board.reload().await?;
        Ok(board)
    }

    pub async fn reload(&mut self) -> Result<(), AppError> {
        let todos = match &self.user {
            Some(user) => self.services.store.list(&user.id).await,
            None => Ok(Vec::new()),
        };
        self.todos = self.surface(todos)?;
        Ok(())
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn toggle_theme(&mut self) {
        self.theme = match self.theme {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        };
    }

    /// Last message for the user, if any.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    pub fn progress(&self) -> Progress {
        let total = self.todos.len();
        let completed = self.todos.iter().filter(|t| t.completed).count();
        let percent = if total == 0 {
            0
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u8
        };
        Progress {
            completed,
            total,
            percent,
        }
    }

    pub fn sign_out(&mut self) {
        self.user = None;
        self.todos.clear();
        self.notice = None;
    }

    fn require_user(&self) -> Result<String, AppError> {
        self.user
            .as_ref()
            .map(|u| u.id.clone())
            .ok_or_else(|| AppError::Unauthorized("Please sign in first".to_string()))
    }

    fn surface<T>(&mut self, result: Result<T, AppError>) -> Result<T, AppError> {
        if let Err(e) = &result {
            warn!("board action failed: {}", e);
            self.notice = Some(e.user_message());
        }
        result
    }

    /// Adds one todo directly. A blank title does nothing.
    pub async fn add(&mut self, title: &str, image: Option<ImageUpload>) -> Result<Option<Todo>, AppError> {
        let user_id = self.require_user()?;
        let title = title.trim();
        if title.is_empty() {
            return Ok(None);
        }

        let image_url = match image {
            Some(image) => {
                let uploaded = match &self.services.images {
                    Some(images) => images.upload(&user_id, &image).await,
                    None => Err(AppError::Config("Image storage is not configured".to_string())),
                };
                Some(self.surface(uploaded)?)
            }
            None => None,
        };

        let inserted = self
            .services
            .store
            .insert(NewTodo::new(user_id, title).with_image(image_url))
            .await;
        let todo = self.surface(inserted)?;
        self.apply_change(TodoChange::Inserted(todo.clone()));
        Ok(Some(todo))
    }

    /// Flips completion locally, then remotely; restores the previous list on failure.
    pub async fn toggle(&mut self, id: &str) -> Result<(), AppError> {
        let Some(pos) = self.todos.iter().position(|t| t.id == id) else {
            return Err(AppError::NotFound);
        };

        let snapshot = self.todos.clone();
        let completed = !self.todos[pos].completed;
        self.todos[pos].completed = completed;

        if let Err(e) = self.services.store.set_completed(id, completed).await {
            self.todos = snapshot;
            return self.surface(Err(e));
        }
        Ok(())
    }

    /// Removes locally, then remotely; restores the previous list on failure.
    pub async fn delete(&mut self, id: &str) -> Result<(), AppError> {
        if !self.todos.iter().any(|t| t.id == id) {
            return Err(AppError::NotFound);
        }

        let snapshot = self.todos.clone();
        self.todos.retain(|t| t.id != id);

        if let Err(e) = self.services.store.delete(id).await {
            self.todos = snapshot;
            return self.surface(Err(e));
        }
        Ok(())
    }

    /// Sends text and/or an image to AI extraction. New rows arrive through the change feed.
    ///
    /// Returns `Ok(None)` when there is nothing to submit.
    pub async fn submit_with_ai(
        &mut self,
        text: &str,
        image: Option<ImageUpload>,
    ) -> Result<Option<GenerateTodosResponse>, AppError> {
        let user_id = self.require_user()?;
        let text = text.trim();
        if text.is_empty() && image.is_none() {
            return Ok(None);
        }

        let (image_url, base64_image) = match image {
            Some(image) => {
                let image = Arc::new(image);
                let encode = {
                    let image = image.clone();
                    tokio::task::spawn_blocking(move || image.to_data_url())
                };
                let upload = async {
                    match &self.services.images {
                        Some(images) => images.upload(&user_id, &image).await.map(Some),
                        None => Ok(None),
                    }
                };

                let (uploaded, encoded) = tokio::join!(upload, encode);
                let encoded = encoded.map_err(|_| AppError::InternalServerError);
                let image_url = self.surface(uploaded)?;
                (image_url, Some(self.surface(encoded)?))
            }
            None => (None, None),
        };

        let req = GenerateTodosRequest {
            text: (!text.is_empty()).then(|| text.to_string()),
            user_id: Some(user_id),
            image_url,
            base64_image,
        };
        let generated = self.services.generator.generate(req).await;
        let response = self.surface(generated)?;

        match &response {
            GenerateTodosResponse::Created { count, .. } => {
                info!("AI created {} todos", count);
                self.notice = Some(format!("Added {} todos", count));
            }
            GenerateTodosResponse::NothingFound { message } => {
                self.notice = Some(message.clone());
            }
        }
        Ok(Some(response))
    }

    /// Reconciles one pushed change into the list.
    pub fn apply_change(&mut self, change: TodoChange) {
        let owner = self.user.as_ref().map(|u| u.id.as_str());

        match change {
            TodoChange::Inserted(todo) => {
                if owner != Some(todo.user_id.as_str()) || self.todos.iter().any(|t| t.id == todo.id) {
                    return;
                }
                let pos = self
                    .todos
                    .iter()
                    .position(|t| t.created_at < todo.created_at)
                    .unwrap_or(self.todos.len());
                self.todos.insert(pos, todo);
            }
            TodoChange::Updated(todo) => {
                if let Some(existing) = self.todos.iter_mut().find(|t| t.id == todo.id) {
                    existing.title = todo.title;
                    existing.completed = todo.completed;
                }
            }
            TodoChange::Deleted { id } => {
                self.todos.retain(|t| t.id != id);
            }
        }
    }

    /// Applies every change already waiting on `subscription`. Returns how many were applied.
    ///
    /// A feed that has ended leaves a notice so the view can offer a reload.
    pub fn drain(&mut self, subscription: &mut Subscription) -> usize {
        let mut applied = 0;
        loop {
            match subscription.try_next() {
                Ok(Some(change)) => {
                    self.apply_change(change);
                    applied += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = self.surface::<()>(Err(e));
                    break;
                }
            }
        }
        applied
    }
}
