//! Site.ai CLI
//!
//! Manage chats and send prompts from the terminal.

mod logging;
mod output;
mod paths;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use siteai_client::{ClientConfig, ClientError, HttpGateway, Navigator, OpenOutcome, UserId};
use tracing::info;

use crate::output::ErrorReporter;

#[derive(Parser)]
#[command(name = "siteai", version)]
#[command(about = "Site.ai CLI - build pages by chatting with the Site.ai backend", long_about = None)]
struct Cli {
    /// Backend base URL (falls back to SITEAI_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Signed-in user id
    #[arg(long, global = true, env = "SITEAI_USER_ID")]
    user_id: Option<String>,

    /// Data directory for logs
    #[arg(long, global = true, env = "SITEAI_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Per-request timeout in seconds (falls back to SITEAI_REQUEST_TIMEOUT_SECS)
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List your chats, newest first
    List,
    /// Create a chat, optionally sending a first prompt
    Create {
        #[arg(short, long, default_value = "")]
        name: String,
        #[arg(short, long)]
        prompt: Option<String>,
    },
    /// Show a chat's transcript and generated code
    Show { chat_id: String },
    /// Send a prompt to a chat
    Send { chat_id: String, prompt: String },
    /// Rename a chat
    Rename { chat_id: String, name: String },
    /// Delete a chat
    Delete { chat_id: String },
    /// Read or store your model API token
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Print whether a token is stored
    Get,
    /// Store a token
    Set { token: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let data_dir = match paths::resolve_data_dir(cli.data_dir.as_deref()) {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("{} {err:#}", style("error:").red().bold());
            return ExitCode::FAILURE;
        }
    };
    // Logging is best effort; the CLI still works without a writable data dir.
    let _log_guard = logging::init_logging(&paths::log_dir(&data_dir)).ok();

    let nav = match build_navigator(&cli) {
        Ok(nav) => nav,
        Err(err) => {
            eprintln!("{} {err:#}", style("error:").red().bold());
            return ExitCode::FAILURE;
        }
    };
    let user = cli.user_id.as_deref().and_then(UserId::parse);

    let mut reporter = ErrorReporter::new();
    let result = run(cli.command, &nav, user.as_ref()).await;
    let reported = reporter.report(&nav);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let already_shown = reported && err.downcast_ref::<ClientError>().is_some();
            if !already_shown {
                eprintln!("{} {err:#}", style("error:").red().bold());
            }
            ExitCode::FAILURE
        }
    }
}

fn build_navigator(cli: &Cli) -> Result<Navigator> {
    let config = ClientConfig::resolve(cli.api_url.as_deref(), cli.timeout_secs)?;
    let gateway = HttpGateway::new(&config)?;
    info!(
        component = "cli",
        event = "cli.configured",
        api_url = %config.api_url,
        timeout_secs = config.request_timeout.as_secs(),
    );
    Ok(Navigator::new(Arc::new(gateway)))
}

async fn run(command: Commands, nav: &Navigator, user: Option<&UserId>) -> Result<()> {
    match command {
        Commands::List => {
            nav.refresh(user).await?;
            output::print_chats(&nav.directory().chats());
        }
        Commands::Create { name, prompt } => {
            let id = nav.start_chat(user, &name, prompt.as_deref()).await?;
            let created = nav.directory().name_of(&id).unwrap_or_default();
            println!("  Created {} {}", style(&created).bold(), style(&id).dim());
            if nav.pending().is_armed() {
                let outcome = nav.open_chat(user, &id).await?;
                print_delivery(nav, outcome)?;
            }
        }
        Commands::Show { chat_id } => {
            nav.open_chat(user, &chat_id).await?;
            output::print_chat(&nav.session().snapshot().chat);
        }
        Commands::Send { chat_id, prompt } => {
            nav.open_chat(user, &chat_id).await?;
            let resp = nav
                .session()
                .post_message(user, &chat_id, &prompt)
                .await?;
            output::print_message(&resp.message);
            output::print_code(&nav.session().snapshot().chat);
        }
        Commands::Rename { chat_id, name } => {
            nav.rename_chat(&chat_id, &name).await?;
            println!("  Renamed {} to {}", style(&chat_id).dim(), style(name.trim()).bold());
        }
        Commands::Delete { chat_id } => {
            nav.delete_chat(&chat_id).await?;
            println!("  Deleted {}", style(&chat_id).dim());
        }
        Commands::Token { action } => match action {
            TokenAction::Get => {
                let token = nav.tokens().fetch(user).await?;
                if token.is_empty() {
                    println!("  No token stored");
                } else {
                    println!("  Token stored ({} chars)", token.chars().count());
                }
            }
            TokenAction::Set { token } => {
                nav.tokens().save(user, &token).await?;
                println!("  Token saved");
            }
        },
    }
    Ok(())
}

fn print_delivery(nav: &Navigator, outcome: OpenOutcome) -> Result<()> {
    match outcome {
        OpenOutcome::Delivered(sent) => {
            let resp = sent?;
            let chat = nav.session().snapshot().chat.clone();
            output::print_chat(&chat);
            info!(
                component = "cli",
                event = "cli.first_prompt.answered",
                chat_id = %chat.id,
                reply_id = %resp.message.id,
            );
        }
        OpenOutcome::Opened | OpenOutcome::Superseded => {}
    }
    Ok(())
}
