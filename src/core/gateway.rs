use crate::domain::model::Project;
use crate::domain::ports::ProjectStore;
use crate::utils::error::{ProjectError, Rejection};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

/// One acquisition channel an experiment offers as pipeline input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Figure a module rendered for one job, passed on untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FigureDocument(pub serde_json::Value);

pub type GatewayResult<T> = std::result::Result<T, Rejection>;

/// The only door between a project and the remote store.
///
/// Submissions work on a deep copy taken before anything is awaited, so the
/// caller's project is never modified and may be edited while a request is
/// in flight. Overlapping submissions are not ordered unless
/// [`with_ordered_submissions`](Self::with_ordered_submissions) is enabled.
pub struct ProjectGateway<S: ProjectStore> {
    store: S,
    submission_lock: Option<Mutex<()>>,
}

impl<S: ProjectStore> ProjectGateway<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            submission_lock: None,
        }
    }

    /// Runs save, check and joblist submissions one at a time, in the order
    /// they were issued.
    pub fn with_ordered_submissions(mut self, ordered: bool) -> Self {
        self.submission_lock = if ordered { Some(Mutex::new(())) } else { None };
        self
    }

    pub async fn fetch_project(&self, experiment_id: &str, pipeline: &str) -> GatewayResult<Project> {
        tracing::debug!("fetching project '{}' of experiment {}", pipeline, experiment_id);
        let document = self
            .store
            .get_project(experiment_id, pipeline)
            .await
            .map_err(|e| reject("fetch project", e))?;

        let project = Project::from_yaml(experiment_id, &document)
            .map_err(|e| reject("fetch project", e))?;
        if let Err(e) = project.verify_lockstep() {
            tracing::warn!("project '{}' loaded with inconsistent structure: {}", pipeline, e);
        }

        tracing::info!(
            "loaded project '{}' with {} module(s)",
            project.name,
            project.handles.len()
        );
        Ok(project)
    }

    pub async fn fetch_available_channels(
        &self,
        experiment_id: &str,
    ) -> GatewayResult<Vec<ChannelDescriptor>> {
        let payload = self
            .store
            .get_available_channels(experiment_id)
            .await
            .map_err(|e| reject("fetch channels", e))?;

        serde_json::from_value(payload)
            .map_err(|e| reject("fetch channels", ProjectError::Json(e)))
    }

    pub async fn fetch_module_figure(
        &self,
        experiment_id: &str,
        pipeline: &str,
        module: &str,
        job_id: u64,
    ) -> GatewayResult<FigureDocument> {
        self.store
            .get_module_figure(experiment_id, pipeline, module, job_id)
            .await
            .map(FigureDocument)
            .map_err(|e| reject("fetch figure", e))
    }

    pub async fn save_project(&self, project: &Project) -> GatewayResult<serde_json::Value> {
        let document = serialize(project).map_err(|e| reject("save project", e))?;
        let _turn = self.wait_for_turn().await;

        tracing::info!("saving project '{}'", project.name);
        self.store
            .save_project(&project.experiment_id, &project.name, &document)
            .await
            .map_err(|e| reject("save project", e))
    }

    /// Same submission as [`save_project`](Self::save_project), validated
    /// by the store without being persisted.
    pub async fn check_project(&self, project: &Project) -> GatewayResult<serde_json::Value> {
        let document = serialize(project).map_err(|e| reject("check project", e))?;
        let _turn = self.wait_for_turn().await;

        tracing::info!("checking project '{}'", project.name);
        self.store
            .check_project(&project.experiment_id, &project.name, &document)
            .await
            .map_err(|e| reject("check project", e))
    }

    pub async fn create_joblist(&self, project: &Project) -> GatewayResult<serde_json::Value> {
        let snapshot = project.joblist_snapshot();
        let _turn = self.wait_for_turn().await;

        tracing::info!(
            "creating joblist for '{}' over {} layer(s)",
            snapshot.name,
            snapshot.layers().len()
        );
        self.store
            .create_joblist(&snapshot.experiment_id, &snapshot.name, &snapshot)
            .await
            .map_err(|e| reject("create joblist", e))
    }

    async fn wait_for_turn(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.submission_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }
}

/// Snapshot, coerce, dump.
fn serialize(project: &Project) -> crate::utils::error::Result<String> {
    project.coerced_snapshot()?.to_yaml()
}

fn reject(operation: &str, err: ProjectError) -> Rejection {
    match &err {
        ProjectError::Store { message } => {
            tracing::warn!("{} rejected by store: {}", operation, message)
        }
        other => tracing::error!("{} failed: {}", operation, other),
    }
    Rejection::from(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SlotValue;
    use crate::utils::error::{Result, UNKNOWN_ERROR_MESSAGE};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    const PROJECT: &str = r#"
name: count_cells
pipe:
  description:
    pipeline: null
    images:
      layers:
        - name: a
        - name: ''
        - name: b
handles:
  - name: threshold
    description:
      input:
        - name: level
          value: 10
        - name: channels
          value: null
"#;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Save(String),
        Check(String),
        Joblist(Vec<String>),
    }

    /// Records submissions and answers with a canned outcome.
    #[derive(Clone)]
    struct MockStore {
        calls: Arc<std::sync::Mutex<Vec<Call>>>,
        failure: Option<fn() -> ProjectError>,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                calls: Arc::new(std::sync::Mutex::new(Vec::new())),
                failure: None,
            }
        }

        fn failing(failure: fn() -> ProjectError) -> Self {
            Self {
                failure: Some(failure),
                ..Self::new()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn answer(&self, call: Call) -> Result<serde_json::Value> {
            self.calls.lock().unwrap().push(call);
            match self.failure {
                Some(failure) => Err(failure()),
                None => Ok(json!({"success": true})),
            }
        }
    }

    #[async_trait]
    impl ProjectStore for MockStore {
        async fn get_project(&self, _experiment_id: &str, _pipeline: &str) -> Result<String> {
            match self.failure {
                Some(failure) => Err(failure()),
                None => Ok(PROJECT.to_string()),
            }
        }

        async fn save_project(&self, _e: &str, _p: &str, document: &str) -> Result<serde_json::Value> {
            // Slower than a check, so an unordered check overtakes it.
            tokio::task::yield_now().await;
            self.answer(Call::Save(document.to_string()))
        }

        async fn check_project(&self, _e: &str, _p: &str, document: &str) -> Result<serde_json::Value> {
            self.answer(Call::Check(document.to_string()))
        }

        async fn get_available_channels(&self, _experiment_id: &str) -> Result<serde_json::Value> {
            Ok(json!([{"name": "DAPI", "wavelength": 405}, {"name": "GFP"}]))
        }

        async fn get_module_figure(
            &self,
            _e: &str,
            _p: &str,
            module: &str,
            job_id: u64,
        ) -> Result<serde_json::Value> {
            Ok(json!({"module": module, "job": job_id}))
        }

        async fn create_joblist(&self, _e: &str, _p: &str, snapshot: &Project) -> Result<serde_json::Value> {
            let layers = snapshot.layers().iter().map(|l| l.name.clone()).collect();
            self.answer(Call::Joblist(layers))
        }
    }

    #[tokio::test]
    async fn test_fetch_project_substitutes_empty_pipeline() {
        let gateway = ProjectGateway::new(MockStore::new());

        let project = gateway.fetch_project("exp-7", "count_cells").await.unwrap();

        assert_eq!(project.experiment_id, "exp-7");
        assert!(project.pipe.description.pipeline.is_empty());
        assert_eq!(project.handles.len(), 1);
    }

    #[tokio::test]
    async fn test_save_submits_coerced_copy() {
        let store = MockStore::new();
        let gateway = ProjectGateway::new(store.clone());
        let mut project = gateway.fetch_project("exp-7", "count_cells").await.unwrap();
        project
            .set_raw("threshold", "channels", Some("1,2,3".to_string()))
            .unwrap();

        let payload = gateway.save_project(&project).await.unwrap();
        assert_eq!(payload, json!({"success": true}));

        let calls = store.calls();
        let document = match &calls[0] {
            Call::Save(document) => document.clone(),
            other => panic!("unexpected call: {:?}", other),
        };
        let submitted = Project::from_yaml("exp-7", &document).unwrap();
        assert_eq!(
            submitted
                .module("threshold")
                .unwrap()
                .parameter("channels")
                .unwrap()
                .value,
            SlotValue::Typed(serde_yaml::Value::Sequence(vec![
                serde_yaml::Value::from(1),
                serde_yaml::Value::from(2),
                serde_yaml::Value::from(3)
            ]))
        );

        // Edits made afterwards do not reach what was already submitted.
        project
            .set_raw("threshold", "channels", Some("9".to_string()))
            .unwrap();
        assert_eq!(store.calls()[0], Call::Save(document));
        assert!(project.module("threshold").unwrap().parameter("channels").unwrap().is_edited());
    }

    #[tokio::test]
    async fn test_check_uses_check_endpoint() {
        let store = MockStore::new();
        let gateway = ProjectGateway::new(store.clone());
        let project = Project::from_yaml("exp-7", PROJECT).unwrap();

        gateway.check_project(&project).await.unwrap();

        assert!(matches!(store.calls()[0], Call::Check(_)));
    }

    #[tokio::test]
    async fn test_joblist_submission_skips_unconfigured_layers() {
        let store = MockStore::new();
        let gateway = ProjectGateway::new(store.clone());
        let project = Project::from_yaml("exp-7", PROJECT).unwrap();

        gateway.create_joblist(&project).await.unwrap();

        assert_eq!(
            store.calls(),
            vec![Call::Joblist(vec!["a".to_string(), "b".to_string()])]
        );
        assert_eq!(project.layers().len(), 3);
    }

    #[tokio::test]
    async fn test_store_message_becomes_rejection_reason() {
        let gateway = ProjectGateway::new(MockStore::failing(|| ProjectError::Store {
            message: "bad channel".to_string(),
        }));
        let project = Project::from_yaml("exp-7", PROJECT).unwrap();

        let rejection = gateway.save_project(&project).await.unwrap_err();

        assert_eq!(rejection.reason, "bad channel");
    }

    #[tokio::test]
    async fn test_unexplained_failure_becomes_generic_reason() {
        let gateway = ProjectGateway::new(MockStore::failing(|| {
            ProjectError::UnrecognizedResponse { status: 500 }
        }));

        let rejection = gateway.fetch_project("exp-7", "count_cells").await.unwrap_err();

        assert_eq!(rejection.reason, UNKNOWN_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_coercion_failure_is_not_submitted() {
        let store = MockStore::new();
        let gateway = ProjectGateway::new(store.clone());
        let mut project = Project::from_yaml("exp-7", PROJECT).unwrap();
        project
            .set_raw("threshold", "level", Some("{broken".to_string()))
            .unwrap();

        let rejection = gateway.save_project(&project).await.unwrap_err();

        assert!(rejection.reason.contains("level"));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_channels_and_figures() {
        let gateway = ProjectGateway::new(MockStore::new());

        let channels = gateway.fetch_available_channels("exp-7").await.unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].name, "DAPI");
        assert_eq!(channels[0].extra.get("wavelength"), Some(&json!(405)));

        let figure = gateway
            .fetch_module_figure("exp-7", "count_cells", "threshold", 3)
            .await
            .unwrap();
        assert_eq!(figure, FigureDocument(json!({"module": "threshold", "job": 3})));
    }

    async fn save_then_check(ordered: bool) -> Vec<Call> {
        let store = MockStore::new();
        let gateway = ProjectGateway::new(store.clone()).with_ordered_submissions(ordered);
        let project = Project::from_yaml("exp-7", PROJECT).unwrap();

        let (saved, checked) = tokio::join!(
            gateway.save_project(&project),
            gateway.check_project(&project)
        );

        assert!(saved.is_ok());
        assert!(checked.is_ok());
        store.calls()
    }

    #[tokio::test]
    async fn test_ordered_submissions_run_in_issue_order() {
        let calls = save_then_check(true).await;

        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], Call::Save(_)));
        assert!(matches!(calls[1], Call::Check(_)));
    }

    #[tokio::test]
    async fn test_unordered_check_overtakes_pending_save() {
        let calls = save_then_check(false).await;

        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], Call::Check(_)));
        assert!(matches!(calls[1], Call::Save(_)));
    }
}
