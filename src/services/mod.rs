pub mod generate;

pub use generate::{GenerateService, HttpTodoGenerator, TodoGenerator};
