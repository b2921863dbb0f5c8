use std::sync::Arc;

use crate::config::Config;
use crate::crawler::Crawler;
use crate::enricher::Enricher;
use crate::repositories::NewsRepository;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn NewsRepository>,
    pub crawler: Arc<Crawler>,
    pub enricher: Arc<Enricher>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn NewsRepository>,
        crawler: Arc<Crawler>,
        enricher: Arc<Enricher>,
        config: Config,
    ) -> Self {
        Self {
            store,
            crawler,
            enricher,
            config: Arc::new(config),
        }
    }
}
