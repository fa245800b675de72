use std::sync::Arc;

use crate::services::TodoGenerator;
use crate::store::TodoStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TodoStore>,
    pub generator: Arc<dyn TodoGenerator>,
}
