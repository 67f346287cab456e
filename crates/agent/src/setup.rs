//! Session start: resolve ownership and derive what stays fixed for the run.

use std::sync::Arc;
use tracing::{debug, warn};
use turnstile_core::error::SetupError;
use turnstile_core::{AccountId, Capabilities, Project, ProjectId, SessionResolver, ThreadId};

/// Everything the loop needs that does not change between turns.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSession {
    pub thread_id: ThreadId,
    pub account_id: AccountId,
    pub project: Project,
    pub capabilities: Capabilities,
}

/// Resolves a `(thread, project)` pair into a [`PreparedSession`].
///
/// Failures here are fatal and surface before any turn runs.
pub struct SessionSetup {
    resolver: Arc<dyn SessionResolver>,
    capabilities: Capabilities,
}

impl SessionSetup {
    pub fn new(resolver: Arc<dyn SessionResolver>) -> Self {
        Self {
            resolver,
            capabilities: Capabilities::default(),
        }
    }

    /// Set the optional tools every session prepared here gets.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub async fn prepare(
        &self,
        thread_id: ThreadId,
        project_id: &ProjectId,
    ) -> turnstile_core::Result<PreparedSession> {
        let account_id = self
            .resolver
            .account_for_thread(&thread_id)
            .await?
            .ok_or_else(|| SetupError::SessionNotFound(thread_id.clone()))?;

        let project = self
            .resolver
            .project(project_id)
            .await?
            .ok_or_else(|| SetupError::ProjectNotFound(project_id.clone()))?;

        if project.sandbox_id().is_none() {
            warn!(project_id = %project_id, "Project has no compute environment");
            return Err(SetupError::MissingComputeEnvironment(project_id.clone()).into());
        }

        debug!(
            thread_id = %thread_id,
            account_id = %account_id,
            tools = ?self.capabilities.tool_names(),
            "Session prepared"
        );

        Ok(PreparedSession {
            thread_id,
            account_id,
            project,
            capabilities: self.capabilities,
        })
    }
}
