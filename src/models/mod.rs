pub mod generate;
pub mod image;
pub mod session;
pub mod todo;

pub use generate::{GenerateTodosRequest, GenerateTodosResponse};
pub use image::ImageUpload;
pub use session::{AuthUser, Session};
pub use todo::{NewTodo, Todo, TodoChange};
