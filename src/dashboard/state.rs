use std::path::PathBuf;
use std::sync::Arc;

use crate::advice::AdviceClient;
use crate::config::Settings;

#[derive(Clone)]
pub struct DashboardState {
    pub log_path: PathBuf,
    pub settings: Arc<Settings>,
    pub advice: Arc<AdviceClient>,
}

impl DashboardState {
    pub fn new(settings: Settings, advice: AdviceClient) -> Self {
        Self {
            log_path: settings.log_path.clone(),
            settings: Arc::new(settings),
            advice: Arc::new(advice),
        }
    }
}
