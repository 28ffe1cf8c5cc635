//! GraphRAG CLI: command-line interface for the GraphRAG chat API
//!
//! Uses the graphrag-sdk RemoteClient to connect to a running server.

use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use crossterm::style::Stylize;
use futures::StreamExt;
use graphrag_sdk::{AskEvent, AskRequest, ChatClient, ImportRequest, PageStatus, RemoteClient};
use std::io::Write;

#[derive(Parser)]
#[command(name = "graphrag", version, about = "GraphRAG chat CLI")]
struct Cli {
    /// Server HTTP URL
    #[arg(long, default_value = "http://localhost:8000", global = true, env = "GRAPHRAG_URL")]
    url: String,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question and stream the answer
    Ask {
        question: String,

        /// Session to record the turn in
        #[arg(long)]
        session: Option<String>,

        /// User owning the session
        #[arg(long)]
        user: Option<String>,

        /// Do not print the model's reasoning
        #[arg(long)]
        hide_thoughts: bool,
    },
    /// Start an interactive chat in a new or existing session
    Chat {
        #[arg(long)]
        session: Option<String>,

        #[arg(long)]
        user: Option<String>,
    },
    /// Show the server's deployment details
    Config,
    /// Show server health
    Health,
    /// List users
    Users,
    /// List sessions, optionally of one user
    Sessions {
        #[arg(long)]
        user: Option<String>,
    },
    /// Show the messages of a session
    Messages { session: String },
    /// Delete a session and its messages
    DeleteSession { session: String },
    /// Delete a user with all of their sessions
    DeleteUser { user: String },
    /// Show node counts of the loaded corpus
    Summary,
    /// List recent StackOverflow imports
    Imports {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Load StackOverflow questions for some tags
    Import {
        /// Comma-separated tags
        #[arg(long, value_delimiter = ',', required = true)]
        tags: Vec<String>,

        /// Pages per tag, 100 questions each
        #[arg(long, default_value_t = 1)]
        pages: u32,

        #[arg(long, default_value_t = 1)]
        start_page: u32,
    },
    /// Create missing graph indexes and constraints
    Setup,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = RemoteClient::new(&cli.url);

    let result = match cli.command {
        Commands::Ask { question, session, user, hide_thoughts } => {
            run_ask(&client, request(question, session, user), !hide_thoughts).await
        }
        Commands::Chat { session, user } => run_chat(&client, session, user).await,
        Commands::Config => run_config(&client, &cli.format).await,
        Commands::Health => run_health(&client, &cli.format).await,
        Commands::Users => run_users(&client, &cli.format).await,
        Commands::Sessions { user } => run_sessions(&client, user.as_deref(), &cli.format).await,
        Commands::Messages { session } => run_messages(&client, &session, &cli.format).await,
        Commands::DeleteSession { session } => client
            .delete_session(&session)
            .await
            .map(|_| println!("Session {} deleted", session))
            .map_err(Into::into),
        Commands::DeleteUser { user } => client
            .delete_user(&user)
            .await
            .map(|_| println!("User {} deleted", user))
            .map_err(Into::into),
        Commands::Summary => run_summary(&client, &cli.format).await,
        Commands::Imports { limit } => run_imports(&client, limit, &cli.format).await,
        Commands::Import { tags, pages, start_page } => {
            let request = ImportRequest { tags, pages, start_page };
            run_import(&client, request, &cli.format).await
        }
        Commands::Setup => run_setup(&client, &cli.format).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn request(question: String, session: Option<String>, user: Option<String>) -> AskRequest {
    AskRequest {
        session_id: session,
        user_id: user,
        ..AskRequest::new(question)
    }
}

/// Stream one answer to stdout, thoughts dimmed on stderr
async fn run_ask(
    client: &RemoteClient,
    request: AskRequest,
    show_thoughts: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = client.ask(request).await?;
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();

    while let Some(event) = events.next().await {
        match event? {
            AskEvent::Answer(text) => {
                print!("{}", text);
                stdout.flush()?;
            }
            AskEvent::Thought(text) if show_thoughts => {
                eprint!("{}", dimmed(&text));
                stderr.flush()?;
            }
            AskEvent::ThinkingStarted if show_thoughts => eprint!("{}", dimmed("[thinking] ")),
            AskEvent::ThinkingEnded if show_thoughts => eprintln!(),
            AskEvent::Thought(_) | AskEvent::ThinkingStarted | AskEvent::ThinkingEnded => {}
            AskEvent::Error(message) => {
                println!();
                return Err(message.into());
            }
        }
    }
    println!();
    Ok(())
}

async fn run_chat(
    client: &RemoteClient,
    session: Option<String>,
    user: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    println!("GraphRAG chat (session {})", session);
    println!("Type a question, or :help for commands. :quit to exit.\n");

    let stdin = std::io::stdin();
    let mut line = String::new();

    loop {
        eprint!("you> ");

        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            break; // EOF
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match trimmed {
            ":quit" | ":exit" | ":q" => break,
            ":help" | ":h" => {
                println!("Commands:");
                println!("  :history  Show this session's messages");
                println!("  :quit     Exit chat");
                println!("  <text>    Ask a question");
            }
            ":history" => {
                if let Err(e) = run_messages(client, &session, &OutputFormat::Table).await {
                    eprintln!("Error: {}", e);
                }
            }
            question => {
                let request = request(question.to_string(), Some(session.clone()), user.clone());
                if let Err(e) = run_ask(client, request, true).await {
                    eprintln!("Error: {}", e);
                }
            }
        }
    }

    println!("Bye!");
    Ok(())
}

async fn run_config(
    client: &RemoteClient,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = client.config().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        OutputFormat::Table => {
            println!("Model:     {}", config.ollama_model);
            println!("Neo4j URL: {}", config.neo4j_url);
            println!("Neo4j user: {}", config.neo4j_user);
            println!("Container: {}", config.container_name.as_deref().unwrap_or("-"));
        }
    }

    Ok(())
}

async fn run_health(
    client: &RemoteClient,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        OutputFormat::Table => {
            println!("Status:  {}", health.status);
            println!("Version: {}", health.version);
            println!("Sources: {}", health.sources);
            println!("History: {}", if health.history { "enabled" } else { "disabled" });
        }
    }

    Ok(())
}

async fn run_users(
    client: &RemoteClient,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let users = client.users().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&users)?);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["user_id"]);
            for user in &users {
                table.add_row(vec![user.as_str()]);
            }
            println!("{}", table);
            println!("{} user(s)", users.len());
        }
    }

    Ok(())
}

async fn run_sessions(
    client: &RemoteClient,
    user: Option<&str>,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let sessions = client.sessions(user).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["session_id", "last_message"]);
            for session in &sessions {
                table.add_row(vec![
                    session.session_id.clone(),
                    truncate(session.last_message.as_deref().unwrap_or(""), 60),
                ]);
            }
            println!("{}", table);
            println!("{} session(s)", sessions.len());
        }
    }

    Ok(())
}

async fn run_messages(
    client: &RemoteClient,
    session: &str,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let messages = client.messages(session).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
        OutputFormat::Table => {
            if messages.is_empty() {
                println!("(no messages)");
                return Ok(());
            }

            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["time", "role", "content"]);
            for message in &messages {
                table.add_row(vec![
                    message.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    format!("{:?}", message.role).to_lowercase(),
                    message.content.clone(),
                ]);
            }
            println!("{}", table);
            println!("{} message(s)", messages.len());
        }
    }

    Ok(())
}

async fn run_summary(
    client: &RemoteClient,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let summary = client.summary().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Table => {
            println!("Questions:   {}", summary.total_questions);
            println!("Answers:     {}", summary.total_answers);
            println!("Tags:        {}", summary.total_tags);
            println!("Users:       {}", summary.total_users);
            println!("Imports:     {}", summary.total_imports);
            println!("Last import: {}", summary.last_import.as_deref().unwrap_or("-"));
        }
    }

    Ok(())
}

async fn run_imports(
    client: &RemoteClient,
    limit: Option<usize>,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let imports = client.imports(limit).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&imports)?);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["timestamp", "questions", "pages", "tags"]);
            for import in &imports {
                table.add_row(vec![
                    import.timestamp.clone(),
                    import.questions.to_string(),
                    import.pages.to_string(),
                    truncate(&import.tags_list.join(", "), 60),
                ]);
            }
            println!("{}", table);
            println!("{} import(s)", imports.len());
        }
    }

    Ok(())
}

async fn run_import(
    client: &RemoteClient,
    request: ImportRequest,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("{}", dimmed("Importing, this can take a few minutes..."));
    let report = client.import(request).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["tag", "page", "result"]);
            for page in &report.pages {
                let result = match &page.status {
                    PageStatus::Imported { count } => format!("{} questions", count),
                    PageStatus::Empty => "no questions".to_string(),
                    PageStatus::Failed { error } => format!("failed: {}", truncate(error, 60)),
                };
                table.add_row(vec![page.tag.clone(), page.page.to_string(), result]);
            }
            println!("{}", table);
            println!("Imported {} question(s), import {}", report.total_questions, report.import_id);
        }
    }

    Ok(())
}

async fn run_setup(
    client: &RemoteClient,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = client.ensure_schema().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            println!("Constraints:     {}", report.constraints);
            println!("Vector indexes:  {}", report.vector_indexes.join(", "));
            println!("Keyword indexes: {}", report.keyword_indexes.join(", "));
            println!("Dimensions:      {}", report.dimensions);
            println!("Nodes embedded:  {}", report.embedded_nodes);
        }
    }

    Ok(())
}

/// Shorten to `max` characters for table display
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max.saturating_sub(1)).collect();
    short.push('…');
    short
}

/// Render reasoning text in the terminal's dim style
fn dimmed(text: &str) -> String {
    text.dim().to_string()
}
