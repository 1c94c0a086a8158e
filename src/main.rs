use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use txdash::catalog;
use txdash::chart::{aggregate, Aggregation, ChartConfig, ChartType};
use txdash::config::{ws_base_for, Config};
use txdash::export::{self, DatasetKind, ExportFormat, ExportRequest};
use txdash::fetch::{ChartFetcher, FetchRequest, Fetcher, Transform};
use txdash::filters::{DateRange, SessionContext};
use txdash::generate::{self, ConditionInput, ConditionSet, Distributions};
use txdash::kpi::load_kpis;
use txdash::logging::{self, obj, v_str, Domain};
use txdash::pagination::{InfiniteTransactions, PageParams};
use txdash::progress::ProgressChannel;
use txdash::render::{format_krw, frame, render_text};
use txdash::storage::StateStore;
use txdash::transport::{HttpTransport, Transport};

#[derive(Parser)]
#[command(name = "txdash", about = "Synthetic transaction analysis from the terminal", version)]
struct Cli {
    /// Range start (YYYY-MM-DD)
    #[arg(long, global = true)]
    start: Option<String>,

    /// Range end (YYYY-MM-DD)
    #[arg(long, global = true)]
    end: Option<String>,

    /// Session id; overrides the stored one
    #[arg(long, global = true)]
    session: Option<String>,

    /// Backend base URL; overrides API_BASE_URL
    #[arg(long, global = true)]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stored session id
    #[command(subcommand)]
    Session(SessionCommand),

    /// Fetch, aggregate and draw a chart
    Chart {
        /// Catalog source (monthly, category, hourly, heatmap, period)
        #[arg(long, conflicts_with = "endpoint")]
        source: Option<String>,
        /// Raw endpoint path returning an array result
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        x: Option<String>,
        #[arg(long)]
        y: Option<String>,
        #[arg(long)]
        agg: Option<String>,
        #[arg(long = "type")]
        chart_type: Option<String>,
        #[arg(long)]
        user: Option<i64>,
    },

    /// Headline figures
    Kpi {
        #[arg(long)]
        user: Option<i64>,
    },

    /// Page through a user's transaction history
    Transactions {
        #[arg(long)]
        user: i64,
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },

    /// Download a dataset
    Export {
        #[arg(long)]
        dataset: String,
        /// Comma-separated snake_case columns for a custom dataset
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        /// Column preset for a custom dataset
        #[arg(long)]
        preset: Option<String>,
        #[arg(long, default_value = "csv")]
        format: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Run the simulation and follow its progress
    Simulate,

    /// Generate users from a JSON file of conditions and show the analysis
    Generate {
        #[arg(long)]
        conditions: PathBuf,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    Show,
    Set { id: String },
    Clear,
}

fn open_store(cfg: &Config) -> Result<StateStore> {
    let path = cfg.session_db.to_string_lossy();
    StateStore::new(&path).with_context(|| format!("opening session store {}", path))
}

fn context(cli: &Cli, store: &StateStore) -> Result<SessionContext> {
    let session_id = match &cli.session {
        Some(id) => Some(id.clone()),
        None => store.session_id()?,
    };
    let range = DateRange::parse(cli.start.as_deref(), cli.end.as_deref())?;
    Ok(SessionContext::new(session_id, range))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = Config::from_env();
    if let Some(base) = &cli.api_base {
        cfg.api_base = base.trim_end_matches('/').to_string();
        if std::env::var("WS_BASE_URL").is_err() {
            cfg.ws_base = ws_base_for(&cfg.api_base);
        }
    }
    let mut store = open_store(&cfg)?;
    let ctx = context(&cli, &store)?;
    let http: Arc<dyn Transport> = Arc::new(HttpTransport::new(cfg.http_timeout())?);

    logging::debug(
        Domain::System,
        "startup",
        obj(&[("api_base", v_str(&cfg.api_base)), ("ready", json!(ctx.is_ready()))]),
    );

    match &cli.command {
        Command::Session(action) => session(action, &mut store)?,
        Command::Chart { source, endpoint, x, y, agg, chart_type, user } => {
            let source = match source {
                Some(name) => Some(catalog::lookup(name).ok_or_else(|| anyhow!("unknown source: {}", name))?),
                None => None,
            };
            let (endpoint, transform, mut config) = match (source, endpoint) {
                (Some(s), _) => (s.endpoint.to_string(), s.boxed_transform(), s.default_config()),
                (None, Some(ep)) => {
                    let (Some(x), Some(y)) = (x, y) else {
                        bail!("--x and --y are required with --endpoint");
                    };
                    let identity: Transform = Arc::new(catalog::identity);
                    (ep.clone(), identity, ChartConfig::new(ChartType::Bar, x, y, Aggregation::Sum))
                }
                (None, None) => bail!("either --source or --endpoint is required"),
            };
            if let Some(x) = x {
                config.x_axis = x.clone();
            }
            if let Some(y) = y {
                config.y_axis = y.clone();
            }
            if let Some(agg) = agg {
                config.aggregation = Aggregation::parse(agg);
            }
            if let Some(t) = chart_type {
                config.chart_type = t.parse().map_err(anyhow::Error::msg)?;
            }

            let params = ctx.ready_params(*user).map(|p| match source {
                Some(s) => s.params(p),
                None => p,
            });
            let request = FetchRequest::when_ready(&endpoint, params, 0);
            if request.endpoint.is_none() {
                bail!("a session and --start are required");
            }
            let chart = ChartFetcher::new(Fetcher::new(http.clone(), cfg.api_base.clone()), transform);
            chart.fetch(&request).await;
            let state = chart.state();
            if let Some(err) = state.error {
                bail!(err);
            }
            let rows = aggregate(&state.data.unwrap_or_default(), &config);
            print!("{}", render_text(&frame(&rows, &config)));
        }
        Command::Kpi { user } => {
            for card in load_kpis(http.as_ref(), &cfg.api_base, &ctx, *user).await? {
                println!("{:<16} {}", card.title, card.value);
            }
        }
        Command::Transactions { user, pages } => {
            let list = InfiniteTransactions::new(http.clone(), cfg.api_base.clone());
            list.set_params(PageParams { context: ctx.clone(), user_id: Some(*user), refresh: 0 })
                .await;
            for _ in 1..*pages {
                if !list.state().has_more {
                    break;
                }
                list.load_more().await;
            }
            let state = list.state();
            if let Some(err) = state.error {
                bail!(err);
            }
            for t in &state.transactions {
                println!(
                    "{}  {:<12} {:<24} {:>14}",
                    t.timestamp,
                    t.category,
                    t.description,
                    format_krw(t.amount)
                );
            }
            if state.has_more {
                println!("(more available)");
            }
        }
        Command::Export { dataset, columns, preset, format, out } => {
            let kind: DatasetKind = dataset.parse().map_err(anyhow::Error::msg)?;
            let format: ExportFormat = format.parse().map_err(anyhow::Error::msg)?;
            let mut columns = columns.clone();
            if let Some(name) = preset {
                columns.extend(export::preset(name).iter().map(|c| c.to_string()));
            }
            if kind == DatasetKind::Custom && columns.is_empty() {
                bail!("a custom dataset needs --columns or --preset");
            }
            let request = ExportRequest::build(&ctx, kind, format, &columns)?;
            let bytes = export::download(http.as_ref(), &cfg.api_base, &request).await?;
            let dir = out.clone().unwrap_or_else(|| cfg.export_dir.clone());
            let path = export::save(&dir, kind, format, &bytes, Some(&mut store))?;
            println!("{}", path.display());
        }
        Command::Simulate => {
            let mut channel = ProgressChannel::connect(http.as_ref(), &cfg.api_base, &cfg.ws_base, &ctx).await?;
            println!("[{}]", channel.status().label());
            while let Some(lines) = channel.next_batch().await {
                for line in lines {
                    println!("{}", line);
                }
            }
            println!("[{}]", channel.status().label());
        }
        Command::Generate { conditions } => {
            let raw = std::fs::read_to_string(conditions)
                .with_context(|| format!("reading {}", conditions.display()))?;
            let inputs: Vec<ConditionInput> = serde_json::from_str(&raw)?;
            let options = generate::load_options(http.as_ref(), &cfg.api_base).await?;
            let mut set = ConditionSet::new();
            for input in &inputs {
                let c = set.add(input)?;
                println!(
                    "#{} {} / {} / {} / {} x{}",
                    c.id,
                    options.display("ageGroup", &c.age_group),
                    options.display("gender", c.gender.as_str()),
                    options.display("occupationCode", &c.occupation_code),
                    options.display("preferenceId", &c.preference_id),
                    c.user_count
                );
            }
            let analysis = generate::submit(http.as_ref(), &cfg.api_base, &set, &ctx.filters.date_range).await?;
            let dist = Distributions::from(&analysis);
            println!("{} users", dist.total_users);
            let pie = ChartConfig::new(ChartType::Pie, "name", "value", Aggregation::Sum);
            for (key, rows) in [
                ("ageDistribution", &dist.age),
                ("genderDistribution", &dist.gender),
                ("occupationDistribution", &dist.occupation),
                ("preferenceDistribution", &dist.preference),
            ] {
                println!("\n{}", generate::label_for_key(key));
                print!("{}", render_text(&frame(rows, &pie)));
            }
        }
    }
    Ok(())
}

fn session(action: &SessionCommand, store: &mut StateStore) -> Result<()> {
    match action {
        SessionCommand::Show => match store.session_id()? {
            Some(id) => println!("{}", id),
            None => println!("(no session)"),
        },
        SessionCommand::Set { id } => store.set_session_id(id)?,
        SessionCommand::Clear => store.clear_session_id()?,
    }
    Ok(())
}
