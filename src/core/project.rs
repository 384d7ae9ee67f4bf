use crate::core::coercion::coerce_project;
use crate::domain::model::Project;
use crate::utils::error::Result;

impl Project {
    /// Deep copy with every binding coerced, ready to be serialized.
    /// The resident project keeps its raw edits whether this succeeds or not.
    pub fn coerced_snapshot(&self) -> Result<Project> {
        let mut snapshot = self.snapshot();
        coerce_project(&mut snapshot)?;
        Ok(snapshot)
    }

    /// Deep copy without unconfigured layers, as submitted for job creation.
    pub fn joblist_snapshot(&self) -> Project {
        let mut snapshot = self.snapshot();
        let pruned = snapshot.prune_unconfigured_layers();
        if pruned > 0 {
            tracing::debug!(
                "dropped {} unconfigured layer(s) from joblist submission of '{}'",
                pruned,
                self.name
            );
        }
        snapshot
    }
}
