use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iptv_catalog_lib::catalog::{Category, Channel, Credentials, PlaylistSource};
use iptv_catalog_lib::config::AppConfig;
use iptv_catalog_lib::filter::View;
use iptv_catalog_lib::proxy;
use iptv_catalog_lib::session::{Applied, CatalogSession};
use iptv_catalog_lib::worker::{WorkerHost, WorkerResponse};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Log level for the catalog engine (trace, debug, info, warn, error)
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a playlist and print its categories
    Load {
        #[command(flatten)]
        source: SourceArgs,

        /// Print the full catalog as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ingest a playlist and print the channels matching a query
    Filter {
        #[command(flatten)]
        source: SourceArgs,

        /// categories, favorites or history
        #[arg(long, default_value = "categories", value_parser = parse_view)]
        view: View,

        #[arg(long, default_value = "All")]
        category: String,

        #[arg(short, long, default_value = "")]
        search: String,

        /// Favorite channel id, repeatable
        #[arg(long = "favorite")]
        favorites: Vec<String>,

        /// Watched channel id, most recent first, repeatable
        #[arg(long = "watched")]
        history: Vec<String>,

        #[arg(long)]
        json: bool,
    },
    /// Run the same-origin streaming proxy
    Proxy {
        /// Listen address, overrides the configured one
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct SourceArgs {
    /// M3U playlist URL
    #[arg(long, conflicts_with_all = ["file", "xtream"])]
    url: Option<String>,

    /// Local M3U file
    #[arg(long, conflicts_with = "xtream")]
    file: Option<PathBuf>,

    /// Xtream Codes server base URL
    #[arg(long, requires = "username")]
    xtream: Option<String>,

    #[arg(short, long)]
    username: Option<String>,

    #[arg(short, long)]
    password: Option<String>,
}

impl SourceArgs {
    fn into_source(self) -> anyhow::Result<PlaylistSource> {
        if let Some(url) = self.url {
            return Ok(PlaylistSource::url(url));
        }
        if let Some(path) = self.file {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            return Ok(PlaylistSource::file(content));
        }
        if let Some(base_url) = self.xtream {
            let username = self
                .username
                .ok_or_else(|| anyhow!("--xtream needs --username"))?;
            return Ok(PlaylistSource::xtream(
                base_url,
                Credentials::new(username, self.password),
            ));
        }
        bail!("one of --url, --file or --xtream is required")
    }
}

fn parse_view(s: &str) -> Result<View, String> {
    match s.to_ascii_lowercase().as_str() {
        "categories" => Ok(View::Categories),
        "favorites" => Ok(View::Favorites),
        "history" => Ok(View::History),
        other => Err(format!("unknown view '{}'", other)),
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    let log_filter = format!("iptv_catalog_lib={},iptv_catalog={}", args.log_level, args.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    match args.command {
        Command::Load { source, json } => {
            let source = source.into_source()?;
            let mut session = CatalogSession::new(config.history_limit);
            let (host, mut responses) = WorkerHost::new(config.fetch_context()?);
            let worker = host.handle()?;

            session.load(&worker, source)?;
            let outcome = wait_for(&mut session, &mut responses, |applied| {
                matches!(applied, Applied::CatalogReplaced)
            })
            .await;
            host.shutdown()?;
            outcome?;

            print_categories(session.categories(), json)?;
        }
        Command::Filter {
            source,
            view,
            category,
            search,
            favorites,
            history,
            json,
        } => {
            let source = source.into_source()?;
            let mut session = CatalogSession::new(config.history_limit);
            for id in &favorites {
                session.favorites.toggle(id);
            }
            // record oldest first so the first --watched ends up most recent
            for id in history.iter().rev() {
                session.history.record(id);
            }
            session.set_view(view);
            session.select_category(category);
            session.set_search_term(search);

            let (host, mut responses) = WorkerHost::new(config.fetch_context()?);
            let worker = host.handle()?;

            session.load(&worker, source)?;
            let outcome: anyhow::Result<()> = async {
                wait_for(&mut session, &mut responses, |a| matches!(a, Applied::CatalogReplaced)).await?;
                session.refresh_display(&worker)?;
                wait_for(&mut session, &mut responses, |a| matches!(a, Applied::DisplayUpdated)).await
            }
            .await;
            host.shutdown()?;
            outcome?;

            print_channels(session.display_channels(), json)?;
        }
        Command::Proxy { bind } => {
            let bind = bind.unwrap_or_else(|| config.proxy_bind.clone());
            let listener = TcpListener::bind(&bind)
                .await
                .with_context(|| format!("binding {}", bind))?;
            proxy::serve(listener, &config.proxy_route, config.proxy_state()?).await?;
        }
    }

    Ok(())
}

/// Feeds responses into the session until `done` accepts one. A failure
/// of the awaited request ends the wait with its error.
async fn wait_for(
    session: &mut CatalogSession,
    responses: &mut mpsc::UnboundedReceiver<WorkerResponse>,
    done: impl Fn(&Applied) -> bool,
) -> anyhow::Result<()> {
    while let Some(response) = responses.recv().await {
        match session.apply(response) {
            Applied::Failed(err) => {
                error!("{}", err.diagnostics());
                return Err(err.into());
            }
            applied if done(&applied) => return Ok(()),
            _ => {}
        }
    }
    bail!("background worker stopped before answering")
}

fn print_categories(categories: &[Category], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(categories)?);
        return Ok(());
    }
    let total: usize = categories.iter().map(|c| c.channels.len()).sum();
    info!("{} categories, {} channels", categories.len(), total);
    for category in categories {
        println!("{:>6}  {}", category.channels.len(), category.name);
    }
    Ok(())
}

fn print_channels(channels: &[Channel], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(channels)?);
        return Ok(());
    }
    for channel in channels {
        println!("{}\t{}\t{}", channel.group, channel.name, channel.url);
    }
    Ok(())
}
