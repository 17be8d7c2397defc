use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::auth::AuthSession;

const DEFAULT_ENDPOINT: &str = "https://api.github.com/graphql";
const USER_AGENT: &str = "ghproj/0.1.0";

/// Errors returned by the GraphQL client.
#[derive(Debug, Error)]
pub enum GraphqlError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status} body: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("invalid GraphQL endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("GraphQL returned errors: {0:?}")]
    ResponseErrors(Vec<GraphqlResponseError>),
    #[error("failed to deserialize response: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("response carried no data payload")]
    MissingData,
    #[error("{0} not found")]
    NotFound(String),
    #[error("unexpected owner type '{0}'")]
    UnexpectedOwnerType(String),
}

pub type GraphqlResult<T> = Result<T, GraphqlError>;

/// Minimal GraphQL client for interacting with the GitHub API.
#[derive(Debug, Clone)]
pub struct GithubGraphqlClient {
    http: Client,
    endpoint: Url,
    auth_header: String,
}

impl GithubGraphqlClient {
    /// Build a client targeting the default GitHub GraphQL endpoint for the given session.
    pub fn from_session(session: &AuthSession) -> GraphqlResult<Self> {
        Self::with_endpoint(session, DEFAULT_ENDPOINT)
    }

    /// Build a client with a custom GraphQL endpoint (useful for testing).
    pub fn with_endpoint(session: &AuthSession, endpoint: &str) -> GraphqlResult<Self> {
        let endpoint = Url::parse(endpoint)?;
        let auth_header = session.authorization_header();
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            endpoint,
            auth_header,
        })
    }

    /// Fetch the current user (`viewer`) object.
    pub async fn viewer(&self) -> GraphqlResult<Viewer> {
        #[derive(Serialize)]
        struct Request<'a> {
            query: &'a str,
            variables: (),
        }

        #[derive(Deserialize)]
        struct ViewerEnvelope {
            viewer: Viewer,
        }

        const QUERY: &str = r#"
            query Viewer {
                viewer {
                    id
                    login
                    name
                }
            }
        "#;

        let data: ViewerEnvelope = self
            .request(Request {
                query: QUERY,
                variables: (),
            })
            .await?;
        Ok(data.viewer)
    }

    /// Resolve an owner login to its identifier and account kind.
    pub async fn repository_owner(&self, login: &str) -> GraphqlResult<Owner> {
        #[derive(Serialize)]
        struct Variables<'a> {
            login: &'a str,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            query: &'a str,
            variables: Variables<'a>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct OwnerEnvelope {
            repository_owner: Option<OwnerNode>,
        }

        #[derive(Deserialize)]
        struct OwnerNode {
            #[serde(rename = "__typename")]
            typename: String,
            id: String,
            login: String,
        }

        const QUERY: &str = r#"
            query RepositoryOwner($login: String!) {
                repositoryOwner(login: $login) {
                    __typename
                    id
                    login
                }
            }
        "#;

        let data: OwnerEnvelope = self
            .request(Request {
                query: QUERY,
                variables: Variables { login },
            })
            .await?;

        let node = data
            .repository_owner
            .ok_or_else(|| GraphqlError::NotFound(format!("owner '{login}'")))?;
        let kind = match node.typename.as_str() {
            "User" => OwnerKind::User,
            "Organization" => OwnerKind::Organization,
            other => return Err(GraphqlError::UnexpectedOwnerType(other.to_owned())),
        };
        Ok(Owner {
            id: node.id,
            login: node.login,
            kind,
        })
    }

    /// Fetch a single project by number under the given owner.
    pub async fn project_by_number(
        &self,
        owner: &Owner,
        number: i32,
    ) -> GraphqlResult<ProjectSummary> {
        #[derive(Serialize)]
        struct Variables<'a> {
            login: &'a str,
            number: i32,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            query: &'a str,
            variables: Variables<'a>,
        }

        #[derive(Deserialize)]
        struct ProjectEnvelope {
            user: Option<ProjectHolder>,
            organization: Option<ProjectHolder>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ProjectHolder {
            project_v2: Option<ProjectSummary>,
        }

        const USER_QUERY: &str = r#"
            query UserProject($login: String!, $number: Int!) {
                user(login: $login) {
                    projectV2(number: $number) {
                        id
                        number
                        title
                        url
                        closed
                        updatedAt
                    }
                }
            }
        "#;

        const ORG_QUERY: &str = r#"
            query OrgProject($login: String!, $number: Int!) {
                organization(login: $login) {
                    projectV2(number: $number) {
                        id
                        number
                        title
                        url
                        closed
                        updatedAt
                    }
                }
            }
        "#;

        let query = match owner.kind {
            OwnerKind::User => USER_QUERY,
            OwnerKind::Organization => ORG_QUERY,
        };

        let data: ProjectEnvelope = self
            .request(Request {
                query,
                variables: Variables {
                    login: &owner.login,
                    number,
                },
            })
            .await?;

        data.user
            .or(data.organization)
            .and_then(|holder| holder.project_v2)
            .ok_or_else(|| {
                GraphqlError::NotFound(format!("project {number} for owner '{}'", owner.login))
            })
    }

    /// Fetch the owner's most recently updated projects.
    pub async fn list_projects(
        &self,
        owner: &Owner,
        first: usize,
    ) -> GraphqlResult<Vec<ProjectSummary>> {
        #[derive(Serialize)]
        struct Variables<'a> {
            login: &'a str,
            first: i64,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            query: &'a str,
            variables: Variables<'a>,
        }

        #[derive(Deserialize)]
        struct ProjectsEnvelope {
            user: Option<ProjectsHolder>,
            organization: Option<ProjectsHolder>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ProjectsHolder {
            projects_v2: ProjectConnection,
        }

        #[derive(Deserialize)]
        struct ProjectConnection {
            nodes: Vec<ProjectSummary>,
        }

        const USER_QUERY: &str = r#"
            query UserProjects($login: String!, $first: Int!) {
                user(login: $login) {
                    projectsV2(first: $first, orderBy: { field: UPDATED_AT, direction: DESC }) {
                        nodes {
                            id
                            number
                            title
                            url
                            closed
                            updatedAt
                        }
                    }
                }
            }
        "#;

        const ORG_QUERY: &str = r#"
            query OrgProjects($login: String!, $first: Int!) {
                organization(login: $login) {
                    projectsV2(first: $first, orderBy: { field: UPDATED_AT, direction: DESC }) {
                        nodes {
                            id
                            number
                            title
                            url
                            closed
                            updatedAt
                        }
                    }
                }
            }
        "#;

        let query = match owner.kind {
            OwnerKind::User => USER_QUERY,
            OwnerKind::Organization => ORG_QUERY,
        };

        let data: ProjectsEnvelope = self
            .request(Request {
                query,
                variables: Variables {
                    login: &owner.login,
                    first: first as i64,
                },
            })
            .await?;

        let holder = data
            .user
            .or(data.organization)
            .ok_or_else(|| GraphqlError::NotFound(format!("owner '{}'", owner.login)))?;
        Ok(holder.projects_v2.nodes)
    }

    /// Look up a repository by name under the given owner.
    pub async fn repository(
        &self,
        owner_login: &str,
        name: &str,
    ) -> GraphqlResult<RepositorySummary> {
        #[derive(Serialize)]
        struct Variables<'a> {
            owner: &'a str,
            name: &'a str,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            query: &'a str,
            variables: Variables<'a>,
        }

        #[derive(Deserialize)]
        struct RepositoryEnvelope {
            repository: Option<RepositorySummary>,
        }

        const QUERY: &str = r#"
            query Repository($owner: String!, $name: String!) {
                repository(owner: $owner, name: $name) {
                    id
                    name
                    url
                }
            }
        "#;

        let data: RepositoryEnvelope = self
            .request(Request {
                query: QUERY,
                variables: Variables { owner: owner_login, name },
            })
            .await?;

        data.repository
            .ok_or_else(|| GraphqlError::NotFound(format!("repository '{owner_login}/{name}'")))
    }

    /// Look up a team by slug under the given organization.
    pub async fn team(&self, org_login: &str, slug: &str) -> GraphqlResult<TeamSummary> {
        #[derive(Serialize)]
        struct Variables<'a> {
            login: &'a str,
            slug: &'a str,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            query: &'a str,
            variables: Variables<'a>,
        }

        #[derive(Deserialize)]
        struct TeamEnvelope {
            organization: Option<TeamHolder>,
        }

        #[derive(Deserialize)]
        struct TeamHolder {
            team: Option<TeamSummary>,
        }

        const QUERY: &str = r#"
            query OrgTeam($login: String!, $slug: String!) {
                organization(login: $login) {
                    team(slug: $slug) {
                        id
                        name
                        slug
                        url
                    }
                }
            }
        "#;

        let data: TeamEnvelope = self
            .request(Request {
                query: QUERY,
                variables: Variables {
                    login: org_login,
                    slug,
                },
            })
            .await?;

        data.organization
            .ok_or_else(|| GraphqlError::NotFound(format!("organization '{org_login}'")))?
            .team
            .ok_or_else(|| GraphqlError::NotFound(format!("team '{org_login}/{slug}'")))
    }

    /// Link a project to a repository and return the echoed repository.
    pub async fn link_project_to_repository(
        &self,
        project_id: &str,
        repository_id: &str,
    ) -> GraphqlResult<RepositorySummary> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Variables<'a> {
            project_id: &'a str,
            repository_id: &'a str,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            query: &'a str,
            variables: Variables<'a>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct MutationEnvelope {
            link_project_v2_to_repository: Option<RepositoryPayload>,
        }

        #[derive(Deserialize)]
        struct RepositoryPayload {
            repository: RepositorySummary,
        }

        const MUTATION: &str = r#"
            mutation LinkProjectV2ToRepository($projectId: ID!, $repositoryId: ID!) {
                linkProjectV2ToRepository(
                    input: { projectId: $projectId, repositoryId: $repositoryId }
                ) {
                    repository {
                        id
                        name
                        url
                    }
                }
            }
        "#;

        let data: MutationEnvelope = self
            .request(Request {
                query: MUTATION,
                variables: Variables {
                    project_id,
                    repository_id,
                },
            })
            .await?;

        data.link_project_v2_to_repository
            .map(|payload| payload.repository)
            .ok_or(GraphqlError::MissingData)
    }

    /// Link a project to a team and return the echoed team.
    pub async fn link_project_to_team(
        &self,
        project_id: &str,
        team_id: &str,
    ) -> GraphqlResult<TeamSummary> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Variables<'a> {
            project_id: &'a str,
            team_id: &'a str,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            query: &'a str,
            variables: Variables<'a>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct MutationEnvelope {
            link_project_v2_to_team: Option<TeamPayload>,
        }

        #[derive(Deserialize)]
        struct TeamPayload {
            team: TeamSummary,
        }

        const MUTATION: &str = r#"
            mutation LinkProjectV2ToTeam($projectId: ID!, $teamId: ID!) {
                linkProjectV2ToTeam(input: { projectId: $projectId, teamId: $teamId }) {
                    team {
                        id
                        name
                        slug
                        url
                    }
                }
            }
        "#;

        let data: MutationEnvelope = self
            .request(Request {
                query: MUTATION,
                variables: Variables {
                    project_id,
                    team_id,
                },
            })
            .await?;

        data.link_project_v2_to_team
            .map(|payload| payload.team)
            .ok_or(GraphqlError::MissingData)
    }

    async fn request<T, R>(&self, body: T) -> GraphqlResult<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let response: GraphqlEnvelope<R> = self.post(body).await?;
        if let Some(errors) = response.errors {
            return Err(GraphqlError::ResponseErrors(errors));
        }
        response.data.ok_or(GraphqlError::MissingData)
    }

    async fn post<T, R>(&self, body: T) -> GraphqlResult<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header("Authorization", &self.auth_header)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GraphqlError::HttpStatus { status, body: text });
        }

        let payload = response.json::<R>().await?;
        Ok(payload)
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlEnvelope<T> {
    data: Option<T>,
    errors: Option<Vec<GraphqlResponseError>>,
}

/// Account kind a login resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnerKind {
    User,
    Organization,
}

/// A user or organization account that namespaces projects and targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub login: String,
    pub kind: OwnerKind,
}

/// Subset of viewer fields useful for identity-aware commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewer {
    pub id: String,
    pub login: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: String,
    pub number: i32,
    pub title: String,
    pub url: String,
    pub closed: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub id: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSummary {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlResponseError {
    pub message: String,
    #[serde(default)]
    pub path: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthSession;
    use httpmock::prelude::*;

    fn sample_session() -> AuthSession {
        AuthSession::new("ghp_test".into()).unwrap()
    }

    fn client_for(server: &MockServer) -> GithubGraphqlClient {
        GithubGraphqlClient::with_endpoint(
            &sample_session(),
            &format!("{}{}", server.base_url(), "/graphql"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn viewer_success() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/graphql")
                .header("Authorization", "Bearer ghp_test");
            then.status(200).json_body_obj(&serde_json::json!({
                "data": {
                    "viewer": {
                        "id": "U_1",
                        "login": "monalisa",
                        "name": "Mona Lisa"
                    }
                }
            }));
        });

        let viewer = client_for(&server).viewer().await.unwrap();
        mock.assert();
        assert_eq!(viewer.id, "U_1");
        assert_eq!(viewer.login, "monalisa");
    }

    #[tokio::test]
    async fn repository_owner_detects_organization() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body_obj(&serde_json::json!({
                "data": {
                    "repositoryOwner": {
                        "__typename": "Organization",
                        "id": "O_1",
                        "login": "acme"
                    }
                }
            }));
        });

        let owner = client_for(&server).repository_owner("acme").await.unwrap();
        assert_eq!(owner.kind, OwnerKind::Organization);
        assert_eq!(owner.id, "O_1");
    }

    #[tokio::test]
    async fn repository_owner_missing_is_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body_obj(&serde_json::json!({
                "data": { "repositoryOwner": null }
            }));
        });

        let err = client_for(&server)
            .repository_owner("ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, GraphqlError::NotFound(_)));
    }

    #[tokio::test]
    async fn project_by_number_success() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body_obj(&serde_json::json!({
                "data": {
                    "user": {
                        "projectV2": {
                            "id": "PVT_1",
                            "number": 1,
                            "title": "Roadmap",
                            "url": "https://github.com/users/monalisa/projects/1",
                            "closed": false,
                            "updatedAt": "2024-07-01T12:00:00Z"
                        }
                    }
                }
            }));
        });

        let owner = Owner {
            id: "U_1".into(),
            login: "monalisa".into(),
            kind: OwnerKind::User,
        };
        let project = client_for(&server)
            .project_by_number(&owner, 1)
            .await
            .unwrap();
        assert_eq!(project.id, "PVT_1");
        assert_eq!(project.number, 1);
    }

    #[tokio::test]
    async fn project_by_number_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body_obj(&serde_json::json!({
                "data": { "user": { "projectV2": null } }
            }));
        });

        let owner = Owner {
            id: "U_1".into(),
            login: "monalisa".into(),
            kind: OwnerKind::User,
        };
        let err = client_for(&server)
            .project_by_number(&owner, 42)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphqlError::NotFound(_)));
    }

    #[tokio::test]
    async fn team_missing_organization_is_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body_obj(&serde_json::json!({
                "data": { "organization": null }
            }));
        });

        let err = client_for(&server).team("acme", "core").await.unwrap_err();
        assert!(matches!(err, GraphqlError::NotFound(_)));
    }

    #[tokio::test]
    async fn link_repository_sends_both_ids() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/graphql").json_body_partial(
                r#"{ "variables": { "projectId": "PVT_1", "repositoryId": "R_1" } }"#,
            );
            then.status(200).json_body_obj(&serde_json::json!({
                "data": {
                    "linkProjectV2ToRepository": {
                        "repository": {
                            "id": "R_1",
                            "name": "my_repo",
                            "url": "https://github.com/monalisa/my_repo"
                        }
                    }
                }
            }));
        });

        let repo = client_for(&server)
            .link_project_to_repository("PVT_1", "R_1")
            .await
            .unwrap();
        mock.assert();
        assert_eq!(repo.url, "https://github.com/monalisa/my_repo");
    }

    #[tokio::test]
    async fn link_team_sends_both_ids() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/graphql").json_body_partial(
                r#"{ "variables": { "projectId": "PVT_1", "teamId": "T_1" } }"#,
            );
            then.status(200).json_body_obj(&serde_json::json!({
                "data": {
                    "linkProjectV2ToTeam": {
                        "team": {
                            "id": "T_1",
                            "name": "Core",
                            "slug": "core",
                            "url": "https://github.com/orgs/acme/teams/core"
                        }
                    }
                }
            }));
        });

        let team = client_for(&server)
            .link_project_to_team("PVT_1", "T_1")
            .await
            .unwrap();
        mock.assert();
        assert_eq!(team.slug, "core");
    }

    #[tokio::test]
    async fn response_errors_propagate() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body_obj(&serde_json::json!({
                "data": null,
                "errors": [
                    { "message": "Resource not accessible by integration" }
                ]
            }));
        });

        let err = client_for(&server)
            .link_project_to_repository("PVT_1", "R_1")
            .await
            .unwrap_err();
        match err {
            GraphqlError::ResponseErrors(errors) => {
                assert_eq!(errors[0].message, "Resource not accessible by integration");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_failure_surfaces_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql");
            then.status(502).body("bad gateway");
        });

        let err = client_for(&server).viewer().await.unwrap_err();
        assert!(matches!(
            err,
            GraphqlError::HttpStatus {
                status: StatusCode::BAD_GATEWAY,
                ..
            }
        ));
    }
}
