use crate::domain::model::Project;
use crate::utils::error::Result;
use async_trait::async_trait;

/// Remote project store.
///
/// Every method returns the unwrapped success payload. Failures are either
/// `ProjectError::Store` (the store explained itself) or any other variant
/// (the request or the response went wrong).
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// YAML text of the stored project.
    async fn get_project(&self, experiment_id: &str, pipeline: &str) -> Result<String>;

    async fn save_project(
        &self,
        experiment_id: &str,
        pipeline: &str,
        document: &str,
    ) -> Result<serde_json::Value>;

    async fn check_project(
        &self,
        experiment_id: &str,
        pipeline: &str,
        document: &str,
    ) -> Result<serde_json::Value>;

    async fn get_available_channels(&self, experiment_id: &str) -> Result<serde_json::Value>;

    async fn get_module_figure(
        &self,
        experiment_id: &str,
        pipeline: &str,
        module: &str,
        job_id: u64,
    ) -> Result<serde_json::Value>;

    /// The store builds jobs from its last saved state; `snapshot` is the
    /// submitted copy with unconfigured layers already removed.
    async fn create_joblist(
        &self,
        experiment_id: &str,
        pipeline: &str,
        snapshot: &Project,
    ) -> Result<serde_json::Value>;
}

pub trait ConfigProvider: Send + Sync {
    fn base_url(&self) -> &str;
    fn timeout_seconds(&self) -> Option<u64>;
    fn headers(&self) -> Vec<(String, String)>;
    fn ordered_submissions(&self) -> bool;
}
