mod client;

pub use client::{
    GithubGraphqlClient, GraphqlError, GraphqlResponseError, GraphqlResult, Owner, OwnerKind,
    ProjectSummary, RepositorySummary, TeamSummary, Viewer,
};
