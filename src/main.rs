//! Torch-Markup terminal client.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use torch_markup::model::DatasetId;
use torch_markup::repl::{self, Command};
use torch_markup::{
    ClientConfig, ConfigError, CredentialProvider, EnvToken, HttpGateway, Session, SessionError,
    StaticToken,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Annotate images served by a remote labeling service")]
struct Args {
    /// Dataset to annotate
    #[arg(long)]
    dataset: DatasetId,

    /// Config file; defaults to the user config directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server address, overrides the config file
    #[arg(long)]
    server: Option<String>,

    /// Bearer token; otherwise read from the configured environment variable
    #[arg(long)]
    token: Option<String>,
}

fn load_config(args: &Args) -> Result<ClientConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load_from_path(path)?,
        None => ClientConfig::load_from_default_path().unwrap_or_default(),
    };
    if let Some(server) = &args.server {
        config.server_url = server.clone();
    }
    Ok(config)
}

fn init_logging(config: &ClientConfig) {
    // RUST_LOG wins over the configured level
    env_logger::Builder::new()
        .filter_level(config.log_level.to_level_filter())
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);

    let credentials: Arc<dyn CredentialProvider> = match &args.token {
        Some(token) => Arc::new(StaticToken::new(token.clone())),
        None => Arc::new(EnvToken::new(config.token_env.clone())),
    };
    let gateway = match HttpGateway::from_config(&config, credentials) {
        Ok(gateway) => gateway,
        Err(e) => {
            eprintln!("Failed to set up HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    log::info!("Using server {}", gateway.base_url());

    let mut session = Session::new(Arc::new(gateway), config.session());
    print_banner(&config, args.dataset);

    if let Err(e) = session.load_categories(args.dataset).await {
        println!("[error] Could not load categories: {}", e);
    }

    match run_repl(&mut session, &config, args.dataset).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Input error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_banner(config: &ClientConfig, dataset: DatasetId) {
    println!("\n==================================================");
    println!("   Torch-Markup v{}", env!("CARGO_PKG_VERSION"));
    println!("==================================================");
    println!("Server:  {}", config.server_url);
    println!("Dataset: {}", dataset);
    println!("Type 'help' for commands or 'quit' to exit.\n");
}

async fn run_repl(
    session: &mut Session<HttpGateway>,
    config: &ClientConfig,
    dataset: DatasetId,
) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"markup> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match repl::parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(Command::SaveConfig) => save_config(config),
            Ok(command) => {
                if let Err(e) = execute(session, dataset, command).await {
                    println!("[error] {}", e);
                }
            }
            Err(e) => println!("[syntax error] {}", e),
        }
    }
    Ok(())
}

fn save_config(config: &ClientConfig) {
    match config.save_to_default_path() {
        Ok(()) => match ClientConfig::default_path() {
            Some(path) => println!("Saved settings to {}", path.display()),
            None => println!("Saved settings"),
        },
        Err(e) => println!("[error] Could not save settings: {}", e),
    }
}

fn print_item(session: &Session<HttpGateway>) {
    match session.current_item() {
        Some(item) => {
            let size = match (item.width, item.height) {
                (Some(w), Some(h)) => format!("{}x{}", w, h),
                _ => match session.current_payload().map(|p| p.dimensions()) {
                    Some(Ok((w, h))) => format!("{}x{}", w, h),
                    _ => "unknown size".to_string(),
                },
            };
            let payload = if session.current_payload().is_some() {
                "cached"
            } else {
                "missing, try 'retry'"
            };
            println!(
                "Item {} '{}' ({}, payload {}), {} annotation(s)",
                item.id,
                item.filename,
                size,
                payload,
                session.annotations().len()
            );
        }
        None => println!("No items left in this dataset."),
    }
}

fn print_annotations(session: &Session<HttpGateway>) {
    if session.annotations().is_empty() {
        println!("(no annotations)");
        return;
    }
    for a in session.annotations() {
        let name = session
            .categories()
            .iter()
            .find(|c| c.id == a.category_id)
            .map_or("?", |c| c.name.as_str());
        println!(
            "{}{:>18}  {:<12} x={:.3} y={:.3} w={:.3} h={:.3}",
            if a.selected { "*" } else { " " },
            a.id,
            name,
            a.bbox.x_center,
            a.bbox.y_center,
            a.bbox.width,
            a.bbox.height
        );
    }
}

/// Commit the open item and move on to the next one.
async fn commit_and_advance(
    session: &mut Session<HttpGateway>,
    dataset: DatasetId,
    skip: bool,
) -> Result<(), SessionError> {
    match session.commit(skip).await? {
        Some(ack) => {
            println!("[ok] {}", ack.message);
            session.fetch_next(dataset).await?;
            print_item(session);
        }
        None => println!("No item open"),
    }
    Ok(())
}

async fn execute(
    session: &mut Session<HttpGateway>,
    dataset: DatasetId,
    command: Command,
) -> Result<(), SessionError> {
    match command {
        Command::Next => {
            session.fetch_next(dataset).await?;
            print_item(session);
        }
        Command::Open(id) => {
            session.fetch_by_id(id).await?;
            print_item(session);
        }
        Command::Categories => {
            let selected = session.selected_category().map(|c| c.id);
            for c in session.categories() {
                println!(
                    "{} {:>4}  {:<16} key={}",
                    if Some(c.id) == selected { "*" } else { " " },
                    c.id,
                    c.name,
                    c.shortcut().map_or("-".to_string(), String::from)
                );
            }
        }
        Command::Key(key) => match session.select_category_by_shortcut(key) {
            Some(c) => println!("Category: {}", c.name),
            None => println!("No category bound to '{}'", key),
        },
        Command::Use(id) => match session.select_category(id) {
            Some(c) => println!("Category: {}", c.name),
            None => println!("Unknown category {}", id),
        },
        Command::Add(new) => {
            let a = session.add_annotation(new)?;
            println!("Added {}", a.id);
        }
        Command::Set(id, patch) => {
            if !session.update_annotation(id, patch) {
                println!("No annotation {}", id);
            }
        }
        Command::Remove(id) => {
            if !session.remove_annotation(id) {
                println!("No annotation {}", id);
            }
        }
        Command::Select(id) => session.select_annotation(id),
        Command::Undo => {
            if !session.undo() {
                println!("Nothing to undo");
            }
        }
        Command::Redo => {
            if !session.redo() {
                println!("Nothing to redo");
            }
        }
        Command::List => print_annotations(session),
        Command::Save => commit_and_advance(session, dataset, false).await?,
        Command::Skip => commit_and_advance(session, dataset, true).await?,
        Command::Progress => {
            let p = session.dataset_progress(dataset).await?;
            println!(
                "{}/{} labeled, {} skipped, {} pending ({:.1}%)",
                p.labeled, p.total, p.skipped, p.pending, p.progress
            );
        }
        Command::Payload(path) => match session.current_payload().and_then(|p| p.bytes()) {
            Some(bytes) => match std::fs::write(&path, &bytes[..]) {
                Ok(()) => println!("Wrote {} bytes to {}", bytes.len(), path.display()),
                Err(e) => println!("[error] {}: {}", path.display(), e),
            },
            None => println!("No payload cached for the open item"),
        },
        Command::Retry => match session.retry_payload().await {
            Some(outcome) => println!("Payload: {:?}", outcome),
            None => println!("No item open"),
        },
        Command::Status => {
            let status = session.prefetch_status();
            println!(
                "Queue: {} item(s){}, progress {}%",
                status.queue_len,
                if status.is_prefetching { ", refilling" } else { "" },
                status.progress
            );
            println!(
                "History: {} snapshot(s), undo {}, redo {}",
                session.history().len(),
                session.can_undo(),
                session.can_redo()
            );
            println!("Cached payloads: {}", session.cache().len());
        }
        Command::Reset => {
            session.reset();
            println!("Session reset");
        }
        Command::Help => println!("{}", repl::HELP),
        Command::Quit | Command::SaveConfig => {}
    }
    Ok(())
}
