use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use ns_client::config::MAX_PAGE_SIZE;
use ns_client::{create_gateway, Backend, ClientConfig, Session};
use ns_core::{Language, Sentiment, SourceQuery};
use ns_query::pages::{ArticlesView, DASHBOARD_DAYS};
use ns_query::{
    queries, ArticleFilter, ArticlesPage, DashboardPage, QueryClient, StoreConfig, TopicForm,
    TopicsPage,
};
use std::io::Write as _;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod duration;
mod render;

use duration::HumanDuration;

const DEMO_EMAIL: &str = "demo@example.com";
const DEMO_PASSWORD: &str = "demo";
/// Tokens passed on the command line carry no lifetime; assume a day.
const CLI_TOKEN_LIFETIME_SECS: u64 = 86_400;
const MAX_DASHBOARD_DAYS: i64 = 3650;

#[derive(Parser, Debug)]
#[command(author, version, about = "News sentiment dashboard in the terminal", long_about = None)]
pub struct Cli {
    /// Backend to talk to: http (the REST API) or memory (seeded sample data)
    #[arg(long, default_value = "http")]
    backend: Backend,
    #[arg(long, env = "NS_API_URL")]
    api_url: Option<String>,
    /// Bearer token of an existing session
    #[arg(long, env = "NS_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Request timeout (e.g. 30s, 2m)
    #[arg(long)]
    timeout: Option<HumanDuration>,
    /// Rows per page of the articles list
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=MAX_PAGE_SIZE as i64))]
    page_size: Option<u32>,
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Sentiment summary, trend and recent articles
    Dashboard {
        #[arg(long, default_value_t = DASHBOARD_DAYS, value_parser = clap::value_parser!(i64).range(1..=MAX_DASHBOARD_DAYS))]
        days: i64,
    },
    Articles {
        #[arg(long)]
        source: Option<i64>,
        #[arg(long)]
        sentiment: Option<Sentiment>,
        /// One-based page number
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        query: Option<String>,
    },
    Article {
        id: i64,
    },
    Sources {
        #[arg(long)]
        language: Option<Language>,
        /// Only sources that are currently ingested
        #[arg(long)]
        active: bool,
    },
    Source {
        id: i64,
    },
    Topics {
        #[command(subcommand)]
        command: Option<TopicCommands>,
    },
}

#[derive(Subcommand, Debug)]
enum TopicCommands {
    List,
    Create(TopicArgs),
    Update {
        id: i64,
        #[command(flatten)]
        args: TopicArgs,
    },
    Delete {
        id: i64,
    },
}

#[derive(Args, Debug, Clone)]
struct TopicArgs {
    #[arg(long)]
    name: Option<String>,
    /// Comma separated, e.g. "Armenia startup, Yerevan tech"
    #[arg(long)]
    keywords: Option<String>,
    /// Restrict the search to configured sources instead of the whole web
    #[arg(long, conflicts_with = "global")]
    local: bool,
    /// Search the whole web again
    #[arg(long)]
    global: bool,
    #[arg(long)]
    language: Option<String>,
    #[arg(long = "source-id", conflicts_with = "clear_sources")]
    source_ids: Vec<i64>,
    /// Drop every source restriction
    #[arg(long)]
    clear_sources: bool,
}

impl TopicArgs {
    /// Overrides the form fields given on the command line.
    fn apply(&self, form: &mut TopicForm) {
        if let Some(name) = &self.name {
            form.name = name.clone();
        }
        if let Some(keywords) = &self.keywords {
            form.keywords = keywords.clone();
        }
        if self.local {
            form.global_search = false;
        }
        if self.global {
            form.global_search = true;
        }
        if let Some(language) = &self.language {
            form.language = language.clone();
        }
        if self.clear_sources {
            form.source_ids.clear();
        } else if !self.source_ids.is_empty() {
            form.source_ids = self.source_ids.clone();
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Environment defaults overridden by the command line.
fn client_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &cli.api_url {
        config = config.with_url(url)?;
    }
    if let Some(timeout) = cli.timeout {
        config = config.with_timeout(timeout.0);
    }
    if let Some(size) = cli.page_size {
        config = config.with_page_size(size)?;
    }
    Ok(config)
}

async fn connect(cli: &Cli, config: ClientConfig, session: Session) -> anyhow::Result<QueryClient> {
    let store_config = StoreConfig {
        request_timeout: Some(config.timeout),
        ..StoreConfig::default()
    };
    debug!("🌐 Using {:?} backend at {}", cli.backend, config.base_url());
    let api = create_gateway(cli.backend, config, session.clone()).await?;
    info!("🔌 Gateway ready ({})", api.name());
    Ok(QueryClient::new(api, session, store_config))
}

/// Makes sure the session holds a token before a data command runs.
async fn ensure_session(cli: &Cli, client: &QueryClient) -> anyhow::Result<()> {
    if client.session().is_authenticated() {
        return Ok(());
    }
    match cli.backend {
        Backend::Memory => {
            client
                .login(DEMO_EMAIL, DEMO_PASSWORD)
                .await
                .context("signing in to the memory backend")?;
            Ok(())
        }
        Backend::Http => bail!("Login required: run `ns login` and pass the token with --token or NS_TOKEN"),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let session = match &cli.token {
        Some(token) => Session::with_token(token.clone(), CLI_TOKEN_LIFETIME_SECS),
        None => Session::new(),
    };
    let config = client_config(&cli)?;
    let page_size = config.page_size();
    let client = connect(&cli, config, session).await?;
    let watcher = client.watch_session();

    match &cli.command {
        Commands::Login { email, password } => {
            let token = client.login(email, password).await.context("login failed")?;
            println!("{}", token.token);
            eprintln!("🔑 Token valid for {}s", token.expires_in);
        }
        Commands::Register { email, password, name } => {
            let token = client
                .register(email, password, name.as_deref())
                .await
                .context("registration failed")?;
            println!("{}", token.token);
        }
        command => {
            ensure_session(&cli, &client).await?;
            show(&client, command, page_size).await?;
        }
    }

    watcher.abort();
    if client.requires_login() {
        bail!("Session expired, log in again");
    }
    Ok(())
}

/// Loads one page of the articles list. `number` is one-based.
async fn articles(
    client: &QueryClient,
    page_size: u32,
    source: Option<i64>,
    sentiment: Option<Sentiment>,
    number: u32,
    query: Option<&str>,
) -> anyhow::Result<ArticlesView> {
    let mut filter = ArticleFilter::new(page_size);
    filter.set_source(source);
    filter.set_sentiment(sentiment);
    filter.set_search(query);
    let mut page = ArticlesPage::with_filter(client.clone(), filter)?;
    let mut view = page.settled().await?;
    let wanted = number.saturating_sub(1);
    if wanted != view.page && page.go_to(wanted)? {
        view = page.settled().await?;
    }
    Ok(view)
}

async fn show(client: &QueryClient, command: &Commands, page_size: u32) -> anyhow::Result<()> {
    let store = client.store();
    let api = client.api();
    let mut out = String::new();
    match command {
        Commands::Dashboard { days } => {
            let mut page = DashboardPage::new(client, Utc::now(), *days)?;
            let view = page.settled().await?;
            render::dashboard(&mut out, &view, *days)?;
        }
        Commands::Articles { source, sentiment, page: number, query } => {
            let view = articles(client, page_size, *source, *sentiment, *number, query.as_deref()).await?;
            render::articles(&mut out, &view)?;
        }
        Commands::Article { id } => {
            let article = store.fetch(queries::article(api, *id)).await?;
            render::article(&mut out, &article)?;
        }
        Commands::Sources { language, active } => {
            let query = SourceQuery {
                language: *language,
                active: active.then_some(true),
            };
            let sources = store.fetch(queries::sources(api, query)?).await?;
            render::sources(&mut out, &sources)?;
        }
        Commands::Source { id } => {
            let source = store.fetch(queries::source(api, *id)).await?;
            render::source(&mut out, &source)?;
        }
        Commands::Topics { command } => topics(client, command, &mut out).await?,
        Commands::Login { .. } | Commands::Register { .. } => {}
    }
    std::io::stdout().lock().write_all(out.as_bytes())?;
    Ok(())
}

async fn topics(
    client: &QueryClient,
    command: &Option<TopicCommands>,
    out: &mut String,
) -> anyhow::Result<()> {
    let mut page = TopicsPage::new(client);
    page.settled().await?;
    match command {
        None | Some(TopicCommands::List) => {}
        Some(TopicCommands::Create(args)) => {
            args.apply(&mut page.form);
            let topic = page.submit().await.context("could not create topic")?;
            println!("📌 Created topic #{} {}", topic.id, topic.name);
        }
        Some(TopicCommands::Update { id, args }) => {
            let current = client.store().fetch(queries::topic(client.api(), *id)).await?;
            page.form = TopicForm::from_topic(&current);
            args.apply(&mut page.form);
            page.save(*id).await.context("could not update topic")?;
            println!("✏️ Updated topic #{}", id);
        }
        Some(TopicCommands::Delete { id }) => {
            page.delete(*id).await.context("could not delete topic")?;
            println!("🗑️ Deleted topic #{}", id);
        }
    }
    let view = page.settled().await?;
    render::topics(out, &view)?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topic_create() {
        let cli = Cli::try_parse_from([
            "ns", "--backend", "memory", "topics", "create", "--name", "Tech", "--keywords",
            "AI, chips", "--local", "--source-id", "1", "--source-id", "2",
        ])
        .unwrap();
        assert_eq!(cli.backend, Backend::Memory);
        let Commands::Topics { command: Some(TopicCommands::Create(args)) } = cli.command else {
            panic!("expected topics create");
        };
        let mut form = TopicForm::default();
        args.apply(&mut form);
        assert_eq!(form.name, "Tech");
        assert!(!form.global_search);
        assert_eq!(form.source_ids, vec![1, 2]);
        assert_eq!(form.language, "en");
    }

    #[test]
    fn test_parse_filters() {
        let cli = Cli::try_parse_from([
            "ns", "--timeout", "5s", "articles", "--sentiment", "negative", "--page", "2",
        ])
        .unwrap();
        assert_eq!(cli.timeout.map(|t| t.0.as_secs()), Some(5));
        let Commands::Articles { sentiment, page, .. } = cli.command else {
            panic!("expected articles");
        };
        assert_eq!(sentiment, Some(Sentiment::Negative));
        assert_eq!(page, 2);
    }

    #[tokio::test]
    async fn test_memory_backend_topics_roundtrip() {
        let cli = Cli::try_parse_from(["ns", "--backend", "memory", "topics"]).unwrap();
        let client = connect(&cli, client_config(&cli).unwrap(), Session::new()).await.unwrap();
        ensure_session(&cli, &client).await.unwrap();

        let create = Some(TopicCommands::Create(TopicArgs {
            name: Some("Elections".into()),
            keywords: Some("vote, ballot".into()),
            local: false,
            global: false,
            language: None,
            source_ids: vec![],
            clear_sources: false,
        }));
        let mut out = String::new();
        topics(&client, &create, &mut out).await.unwrap();
        assert!(out.contains("Elections"));
        let listed = client.store().fetch(queries::topics(client.api())).await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn test_update_can_restore_global_search() {
        let cli = Cli::try_parse_from([
            "ns", "topics", "update", "1", "--global", "--clear-sources",
        ])
        .unwrap();
        let Commands::Topics { command: Some(TopicCommands::Update { args, .. }) } = cli.command else {
            panic!("expected topics update");
        };
        let mut form = TopicForm {
            global_search: false,
            source_ids: vec![1, 2],
            ..TopicForm::default()
        };
        args.apply(&mut form);
        assert!(form.global_search);
        assert!(form.source_ids.is_empty());

        assert!(Cli::try_parse_from(["ns", "topics", "update", "1", "--global", "--local"]).is_err());
        assert!(Cli::try_parse_from([
            "ns", "topics", "update", "1", "--clear-sources", "--source-id", "3",
        ])
        .is_err());
    }

    #[test]
    fn test_days_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["ns", "dashboard", "--days", "0"]).is_err());
        assert!(Cli::try_parse_from(["ns", "dashboard", "--days=-3"]).is_err());
        assert!(Cli::try_parse_from(["ns", "dashboard", "--days", "1000000000"]).is_err());
        let cli = Cli::try_parse_from(["ns", "dashboard", "--days", "30"]).unwrap();
        assert!(matches!(cli.command, Commands::Dashboard { days: 30 }));
    }

    #[test]
    fn test_timeout_overflow_rejected() {
        assert!(Cli::try_parse_from(["ns", "--timeout", "9999999999999999h", "topics"]).is_err());
    }

    #[tokio::test]
    async fn test_page_size_reaches_article_filter() {
        let cli = Cli::try_parse_from(["ns", "--backend", "memory", "--page-size", "3", "articles"]).unwrap();
        let config = client_config(&cli).unwrap();
        assert_eq!(config.page_size(), 3);
        let page_size = config.page_size();
        let client = connect(&cli, config, Session::new()).await.unwrap();
        ensure_session(&cli, &client).await.unwrap();

        let view = articles(&client, page_size, None, None, 1, None).await.unwrap();
        assert_eq!(view.rows.len(), 3);
        assert!(view.total_pages > 1);

        assert!(Cli::try_parse_from(["ns", "--page-size", "0", "articles"]).is_err());
    }
}
