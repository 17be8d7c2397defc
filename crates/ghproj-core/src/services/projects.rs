use crate::graphql::{
    GithubGraphqlClient, GraphqlResult, Owner, OwnerKind, ProjectSummary,
};

/// Sentinel login that resolves to the authenticated user.
pub const CURRENT_USER: &str = "@me";

/// Provides higher-level helpers around project and owner resolution.
#[derive(Clone)]
pub struct ProjectService {
    client: GithubGraphqlClient,
}

impl ProjectService {
    pub fn new(client: GithubGraphqlClient) -> Self {
        Self { client }
    }

    /// Resolve an owner login, mapping the `@me` sentinel to the viewer.
    pub async fn resolve_owner(&self, login: &str) -> GraphqlResult<Owner> {
        if login == CURRENT_USER {
            let viewer = self.client.viewer().await?;
            return Ok(Owner {
                id: viewer.id,
                login: viewer.login,
                kind: OwnerKind::User,
            });
        }
        self.client.repository_owner(login).await
    }

    pub async fn get(&self, owner: &Owner, number: i32) -> GraphqlResult<ProjectSummary> {
        self.client.project_by_number(owner, number).await
    }

    /// List the owner's most recently updated open projects.
    pub async fn list(&self, owner: &Owner, limit: usize) -> GraphqlResult<Vec<ProjectSummary>> {
        let first = if limit == 0 { 20 } else { limit.min(100) };
        let projects = self.client.list_projects(owner, first).await?;
        Ok(projects.into_iter().filter(|p| !p.closed).collect())
    }
}
