use crate::graphql::{
    GithubGraphqlClient, GraphqlResult, Owner, RepositorySummary, TeamSummary,
};

/// Links projects to repositories and teams.
///
/// Each call performs exactly one lookup followed by exactly one mutation;
/// failures propagate to the caller without retries.
#[derive(Clone)]
pub struct LinkService {
    client: GithubGraphqlClient,
}

impl LinkService {
    pub fn new(client: GithubGraphqlClient) -> Self {
        Self { client }
    }

    /// Link the project to a repository owned by `owner`.
    pub async fn link_repository(
        &self,
        owner: &Owner,
        project_id: &str,
        repo_name: &str,
    ) -> GraphqlResult<RepositorySummary> {
        let repo = self.client.repository(&owner.login, repo_name).await?;
        self.client
            .link_project_to_repository(project_id, &repo.id)
            .await
    }

    /// Link the project to a team under the `owner` organization.
    pub async fn link_team(
        &self,
        owner: &Owner,
        project_id: &str,
        team_slug: &str,
    ) -> GraphqlResult<TeamSummary> {
        let team = self.client.team(&owner.login, team_slug).await?;
        self.client.link_project_to_team(project_id, &team.id).await
    }
}
