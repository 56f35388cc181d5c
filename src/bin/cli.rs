//! Binary entry point for the follow-graph service and its admin commands.
#![forbid(unsafe_code)]

#[path = "cli/ui.rs"]
mod ui;

use std::error::Error;
use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use follow_graph::{
    admin::{self, VerifyReport, VerifySeverity},
    config::ServiceConfig,
    logging::install_tracing_subscriber,
    server::{self, FollowService, MutationAck, ServeOptions, UserList},
    Context, FollowGraph, GraphError, NewUser, StoreOptions, User,
};

use ui::{ColorChoice, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "follow-graph",
    version,
    about = "Follow graph service and administration tools",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "FOLLOW_GRAPH_CONFIG",
        value_name = "FILE",
        help = "Configuration file (TOML)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "DATABASE_PATH",
        value_name = "FILE",
        help = "SQLite database path, overriding the config file"
    )]
    db: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = ColorChoice::Auto,
        help = "Colorize text output"
    )]
    color: ColorChoice,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API until interrupted.
    Serve(ServeCmd),
    /// Apply pending schema migrations.
    Migrate,
    /// Provision a user.
    CreateUser {
        /// Unique handle.
        username: String,
        /// Unique email address.
        email: String,
    },
    /// Provision users from a CSV file with `username,email` columns.
    ImportUsers {
        /// Source CSV file.
        #[arg(value_name = "CSV")]
        path: PathBuf,
    },
    /// Write every follow edge to a CSV file.
    ExportFollows {
        /// Destination CSV file.
        #[arg(value_name = "CSV")]
        path: PathBuf,
    },
    /// Make FOLLOWER follow FOLLOWING.
    Follow(EdgeArgs),
    /// Remove the edge FOLLOWER -> FOLLOWING.
    Unfollow(EdgeArgs),
    /// Show one user.
    User {
        /// User id.
        id: i64,
    },
    /// List users by ascending id.
    Users(PageArgs),
    /// List users following ID, most recent first.
    Followers {
        /// User id.
        id: i64,
        #[command(flatten)]
        page: PageArgs,
    },
    /// List users ID follows, most recent first.
    Following {
        /// User id.
        id: i64,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Check stored counters against the edge set.
    Verify {
        /// Rewrite drifted counters from the edge set.
        #[arg(long)]
        repair: bool,
    },
    /// Create three demo users and a few edges.
    SeedDemo,
}

#[derive(Args, Debug)]
struct ServeCmd {
    #[arg(long, help = "Interface to bind (default from config)")]
    host: Option<IpAddr>,

    #[arg(long, env = "PORT", help = "Port to listen on (default from config)")]
    port: Option<u16>,

    #[arg(long, help = "Reject follow and unfollow requests")]
    read_only: bool,

    #[arg(
        long = "allow-origin",
        value_name = "ORIGIN",
        help = "Additional CORS origin; repeatable"
    )]
    allow_origins: Vec<String>,
}

#[derive(Args, Debug)]
struct EdgeArgs {
    /// Id of the user doing the following.
    follower: i64,
    /// Id of the user being followed.
    following: i64,
}

#[derive(Args, Debug, Clone, Copy)]
struct PageArgs {
    #[arg(long, allow_negative_numbers = true, help = "Page size")]
    limit: Option<i64>,
    #[arg(long, allow_negative_numbers = true, help = "Rows to skip")]
    offset: Option<i64>,
}

#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    let ui = Ui::new(cli.color);

    match cli.command {
        Command::Serve(cmd) => {
            install_tracing_subscriber(&config.logging.filter)?;
            if let Some(host) = cmd.host {
                config.server.host = host;
            }
            if let Some(port) = cmd.port {
                config.server.port = port;
            }
            config.server.read_only |= cmd.read_only;
            config.server.allow_origins.extend(cmd.allow_origins);
            let graph = open_graph(config.database.store_options()).await?;
            server::serve(graph, ServeOptions::from_config(&config)).await?;
        }
        Command::Migrate => {
            install_tracing_subscriber("warn")?;
            let graph = open_graph(config.database.store_options().migrate(false)).await?;
            let report = offload(&graph, |graph, ctx| graph.store().migrate(ctx)).await?;
            emit(cli.format, &report, || {
                if report.applied() {
                    ui.success(&format!(
                        "migrated schema from version {} to {}",
                        report.from, report.to
                    ));
                } else {
                    ui.success(&format!("schema already at version {}", report.to));
                }
            })?;
        }
        command => {
            install_tracing_subscriber("warn")?;
            let graph = open_graph(config.database.store_options()).await?;
            let service = FollowService::new(
                graph,
                config.pagination,
                config.server.request_timeout(),
            );
            run_graph_command(command, &service, cli.format, &ui).await?;
        }
    }

    Ok(())
}

async fn run_graph_command(
    command: Command,
    service: &FollowService,
    format: OutputFormat,
    ui: &Ui,
) -> Result<(), Box<dyn Error>> {
    let graph = service.graph();
    match command {
        Command::CreateUser { username, email } => {
            let new_user = NewUser::new(username, email);
            let user = offload(graph, move |graph, ctx| {
                admin::create_user(graph, ctx, &new_user)
            })
            .await?;
            emit(format, &user, || print_user(ui, "Created user", &user))?;
        }
        Command::ImportUsers { path } => {
            let summary =
                offload(graph, move |graph, ctx| admin::import_users(graph, ctx, &path)).await?;
            emit(format, &summary, || {
                ui.success(&format!(
                    "imported {} users ({} duplicates skipped)",
                    summary.users_created, summary.duplicates_skipped
                ))
            })?;
        }
        Command::ExportFollows { path } => {
            let summary =
                offload(graph, move |graph, ctx| admin::export_follows(graph, ctx, &path)).await?;
            emit(format, &summary, || {
                ui.success(&format!(
                    "exported {} follows to {}",
                    summary.follows_exported,
                    summary.path.display()
                ))
            })?;
        }
        Command::Follow(edge) => {
            let ack = service.follow(edge.follower, edge.following).await?;
            emit(format, &ack, || print_ack(ui, &ack))?;
        }
        Command::Unfollow(edge) => {
            let ack = service.unfollow(edge.follower, edge.following).await?;
            emit(format, &ack, || print_ack(ui, &ack))?;
        }
        Command::User { id } => {
            let user = service.get_user(id).await?;
            emit(format, &user, || print_user(ui, "User", &user))?;
        }
        Command::Users(page) => {
            let list = service.list_users(page.limit, page.offset).await?;
            emit(format, &list, || print_list(ui, "Users", &list))?;
        }
        Command::Followers { id, page } => {
            let list = service.get_followers(id, page.limit, page.offset).await?;
            emit(format, &list, || {
                print_list(ui, &format!("Followers of {id}"), &list)
            })?;
        }
        Command::Following { id, page } => {
            let list = service.get_following(id, page.limit, page.offset).await?;
            emit(format, &list, || {
                print_list(ui, &format!("Followed by {id}"), &list)
            })?;
        }
        Command::Verify { repair } => {
            let (report, fixed) = offload(graph, move |graph, ctx| {
                let report = admin::verify(graph, ctx)?;
                if !repair || report.drift.is_empty() {
                    return Ok((report, None));
                }
                let fixed = admin::repair_counters(graph, ctx)?;
                Ok::<_, GraphError>((admin::verify(graph, ctx)?, Some(fixed)))
            })
            .await?;
            if let Some(fixed) = fixed {
                ui.warn(&format!("repaired counters of {fixed} users"));
            }
            emit(format, &report, || print_verify(ui, &report))?;
            if !report.success {
                std::process::exit(2);
            }
        }
        Command::SeedDemo => {
            let summary = offload(graph, admin::seed_demo).await?;
            emit(format, &summary, || {
                ui.success(&format!(
                    "seeded {} users and {} follows",
                    summary.users_created, summary.follows_created
                ))
            })?;
        }
        // Dispatched by `run` before a graph is opened.
        Command::Serve(_) | Command::Migrate => {}
    }
    Ok(())
}

async fn open_graph(options: StoreOptions) -> Result<FollowGraph, Box<dyn Error>> {
    let graph = tokio::task::spawn_blocking(move || FollowGraph::open(options)).await??;
    Ok(graph)
}

/// Runs a blocking admin call on the blocking pool.
async fn offload<T, E, F>(graph: &FollowGraph, op: F) -> Result<T, Box<dyn Error>>
where
    T: Send + 'static,
    E: Error + Send + 'static,
    F: FnOnce(&FollowGraph, &Context) -> Result<T, E> + Send + 'static,
{
    let graph = graph.clone();
    let value =
        tokio::task::spawn_blocking(move || op(&graph, &Context::background())).await??;
    Ok(value)
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_user(ui: &Ui, title: &str, user: &User) {
    ui.section(
        title,
        [
            ("id", user.id.to_string()),
            ("username", user.username.clone()),
            ("email", user.email.clone()),
            ("followers", user.followers_count.to_string()),
            ("following", user.following_count.to_string()),
            ("created_at", user.created_at.to_string()),
        ],
    );
}

fn print_list(ui: &Ui, title: &str, list: &UserList) {
    ui.list(
        &format!("{title} ({} shown of {})", list.users.len(), list.total),
        list.users.iter().map(|user| {
            format!(
                "{} {} (followers={}, following={})",
                user.id, user.username, user.followers_count, user.following_count
            )
        }),
    );
}

fn print_ack(ui: &Ui, ack: &MutationAck) {
    ui.success(&ack.message);
}

fn print_verify(ui: &Ui, report: &VerifyReport) {
    ui.section(
        "Verify",
        [
            ("success", report.success.to_string()),
            ("users_checked", report.counts.users_checked.to_string()),
            ("edges_found", report.counts.edges_found.to_string()),
            ("users_with_drift", report.counts.users_with_drift.to_string()),
            ("self_loops", report.counts.self_loops.to_string()),
            ("dangling_edges", report.counts.dangling_edges.to_string()),
        ],
    );
    for finding in &report.findings {
        match finding.severity {
            VerifySeverity::Error => ui.error(&finding.message),
            VerifySeverity::Warning => ui.warn(&finding.message),
            VerifySeverity::Info => println!("  {}", finding.message),
        }
    }
}
