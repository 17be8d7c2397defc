use std::io::{IsTerminal, Write};

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use ghproj_core::auth::{AuthSession, CredentialStore, FileCredentialStore};
use ghproj_core::graphql::{GithubGraphqlClient, Owner, ProjectSummary};
use ghproj_core::services::links::LinkService;
use ghproj_core::services::projects::{ProjectService, CURRENT_USER};
use serde::Serialize;
use tokio::task;

const DEFAULT_PROFILE: &str = "default";

#[derive(Parser, Debug)]
#[command(author, version, about = "GitHub Projects terminal CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authentication related commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Project metadata
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Link a project to a repository or a team
    Link(LinkArgs),
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Store a GitHub token for later use
    Login(LoginArgs),
    /// Forget stored credentials for a profile
    Logout(LogoutArgs),
}

#[derive(Subcommand, Debug)]
enum ProjectCommand {
    /// List recent projects for an owner
    List(ProjectListArgs),
}

#[derive(Args, Debug)]
struct LoginArgs {
    /// Personal access token; prompted for on stdin when omitted
    #[arg(long)]
    token: Option<String>,
    /// Profile name for stored credentials
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: String,
}

#[derive(Args, Debug)]
struct LogoutArgs {
    /// Profile name for stored credentials
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: String,
}

#[derive(Args, Debug)]
struct ProjectListArgs {
    /// Login of the owner; use "@me" for the current user
    #[arg(long, default_value = CURRENT_USER)]
    owner: String,
    /// Maximum number of projects to return
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..=100))]
    limit: u64,
    /// Output format for the project list
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
    /// Profile name for stored credentials
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: String,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["repo", "team"])))]
struct LinkArgs {
    /// Project number; prompts for a selection when omitted on a terminal
    number: Option<i32>,
    /// Login of the owner; use "@me" for the current user
    #[arg(long, default_value = CURRENT_USER)]
    owner: String,
    /// The repository to be linked to this project
    #[arg(long, short = 'R')]
    repo: Option<String>,
    /// The team to be linked to this project
    #[arg(long, short = 'T')]
    team: Option<String>,
    /// Output format for the mutation result
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
    /// Profile name for stored credentials
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Auth(cmd) => match cmd {
            AuthCommand::Login(args) => auth_login(args).await?,
            AuthCommand::Logout(args) => auth_logout(args)?,
        },
        Commands::Project(cmd) => match cmd {
            ProjectCommand::List(args) => project_list(args).await?,
        },
        Commands::Link(args) => link(args).await?,
    }
    Ok(())
}

async fn auth_login(args: LoginArgs) -> Result<()> {
    let token = match args.token {
        Some(token) => token,
        None => prompt_line("Paste your GitHub token: ").await?,
    };
    let session = AuthSession::new(token).context("invalid token")?;

    let store = FileCredentialStore::with_default_locator()
        .context("unable to initialise credential store")?;
    store
        .save(&args.profile, &session)
        .context("failed to store credentials")?;
    println!("Token stored for profile '{}'.", args.profile);
    Ok(())
}

fn auth_logout(args: LogoutArgs) -> Result<()> {
    let store = FileCredentialStore::with_default_locator()
        .context("unable to initialise credential store")?;
    store
        .delete(&args.profile)
        .context("failed to remove stored credentials")?;
    println!("Deleted credentials for profile '{}'.", args.profile);
    Ok(())
}

async fn project_list(args: ProjectListArgs) -> Result<()> {
    let service = ProjectService::new(build_client(&args.profile)?);
    let owner = service
        .resolve_owner(&args.owner)
        .await
        .context("failed to resolve owner")?;
    let projects = service
        .list(&owner, args.limit as usize)
        .await
        .context("GraphQL request failed")?;

    match args.format {
        Some(OutputFormat::Json) => println!("{}", serde_json::to_string_pretty(&projects)?),
        None => render_project_list(&projects),
    }
    Ok(())
}

async fn link(args: LinkArgs) -> Result<()> {
    let client = build_client(&args.profile)?;
    let projects = ProjectService::new(client.clone());
    let links = LinkService::new(client);

    let owner = projects
        .resolve_owner(&args.owner)
        .await
        .context("failed to resolve owner")?;

    let project = match args.number {
        Some(number) => projects
            .get(&owner, number)
            .await
            .context("failed to resolve project")?,
        None => select_project(&projects, &owner).await?,
    };

    if let Some(repo_name) = &args.repo {
        let repo = links
            .link_repository(&owner, &project.id, repo_name)
            .await
            .context("failed to link repository")?;
        print_result(args.format, &repo, &repo.url)?;
    } else if let Some(team_slug) = &args.team {
        let team = links
            .link_team(&owner, &project.id, team_slug)
            .await
            .context("failed to link team")?;
        print_result(args.format, &team, &team.url)?;
    }

    Ok(())
}

/// Prompt the user to pick one of the owner's recent projects.
///
/// Only available when attached to a terminal; otherwise an explicit
/// project number is required.
async fn select_project(service: &ProjectService, owner: &Owner) -> Result<ProjectSummary> {
    if !std::io::stdin().is_terminal() || !std::io::stderr().is_terminal() {
        bail!("project number is required when not running interactively");
    }

    let projects = service
        .list(owner, 30)
        .await
        .context("GraphQL request failed")?;
    if projects.is_empty() {
        bail!("no open projects found for owner '{}'", owner.login);
    }

    eprintln!("Select a project to link:");
    for (index, project) in projects.iter().enumerate() {
        eprintln!("  {:>2}. #{} {}", index + 1, project.number, project.title);
    }

    let input = prompt_line("Enter a choice: ").await?;
    let choice = parse_selection(&input, projects.len())
        .ok_or_else(|| anyhow!("invalid selection '{}'", input.trim()))?;
    projects
        .into_iter()
        .nth(choice)
        .ok_or_else(|| anyhow!("selection out of range"))
}

/// Parse a 1-based selection into a vector index.
fn parse_selection(input: &str, len: usize) -> Option<usize> {
    let choice: usize = input.trim().parse().ok()?;
    if choice >= 1 && choice <= len {
        Some(choice - 1)
    } else {
        None
    }
}

fn print_result<T: Serialize>(
    format: Option<OutputFormat>,
    entity: &T,
    url: &str,
) -> Result<()> {
    let mut stdout = std::io::stdout();
    let is_tty = stdout.is_terminal();
    write_result(&mut stdout, is_tty, format, entity, url)
}

fn write_result<W: Write, T: Serialize>(
    out: &mut W,
    is_tty: bool,
    format: Option<OutputFormat>,
    entity: &T,
    url: &str,
) -> Result<()> {
    match format {
        Some(OutputFormat::Json) => {
            writeln!(out, "{}", serde_json::to_string_pretty(entity)?)?;
        }
        None => {
            // Silent success when piped; scripts check the exit code.
            if is_tty {
                writeln!(out, "{url}")?;
            }
        }
    }
    Ok(())
}

fn build_client(profile: &str) -> Result<GithubGraphqlClient> {
    let session = load_session(profile)?;
    GithubGraphqlClient::from_session(&session).context("failed to build GraphQL client")
}

fn load_session(profile: &str) -> Result<AuthSession> {
    if let Some(session) = AuthSession::from_env() {
        return Ok(session);
    }
    let store = FileCredentialStore::with_default_locator()
        .context("unable to initialise credential store")?;
    store
        .load(profile)
        .context("failed to read stored credentials")?
        .ok_or_else(|| {
            anyhow!(
                "no credentials stored for profile '{}'; run `ghproj auth login`",
                profile
            )
        })
}

async fn prompt_line(prompt: &'static str) -> Result<String> {
    task::spawn_blocking(move || {
        use std::io::{self, Write};
        eprint!("{prompt}");
        io::stderr().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok::<_, std::io::Error>(input.trim().to_owned())
    })
    .await
    .context("prompt task failed")?
    .context("failed to read input")
}

fn render_project_list(projects: &[ProjectSummary]) {
    println!("{:<8} {:<40} {:<24}", "NUMBER", "TITLE", "UPDATED");
    println!("{}", "-".repeat(76));
    for project in projects {
        println!(
            "{:<8} {:<40} {:<24}",
            project.number,
            truncate(&project.title, 40),
            project.updated_at.to_rfc3339()
        );
    }
}

fn truncate(value: &str, max_len: usize) -> String {
    let mut chars = value.chars();
    let mut collected = String::new();
    for _ in 0..max_len.saturating_sub(1) {
        match chars.next() {
            Some(ch) => collected.push(ch),
            None => return value.to_owned(),
        }
    }
    if chars.next().is_some() {
        collected.push('…');
        collected
    } else {
        value.to_owned()
    }
}
