// Application state for HTTP handlers
use crate::application::ingestion_service::IngestionService;

#[derive(Clone)]
pub struct AppState {
    pub ingestion_service: IngestionService,
}
