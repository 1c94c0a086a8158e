//! Structured JSON-lines logging.
//!
//! Every record carries a timestamp, a process-wide sequence number, a level
//! and a domain so runs can be filtered and replayed. Records go to stderr;
//! with `LOG_DIR` set they are also appended to `{LOG_DIR}/{run_id}/events.jsonl`.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

// =============================================================================
// Levels and domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn label(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Fetch,    // Envelope fetches and transforms
    Chart,    // Aggregation and rendering
    Page,     // Cursor pagination
    Session,  // Session id lifecycle
    Progress, // Simulation progress socket
    Export,   // Dataset downloads
    Generate, // Generation conditions and submission
    System,   // Startup, shutdown
}

impl Domain {
    pub const ALL: [Domain; 8] = [
        Domain::Fetch,
        Domain::Chart,
        Domain::Page,
        Domain::Session,
        Domain::Progress,
        Domain::Export,
        Domain::Generate,
        Domain::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Fetch => "fetch",
            Domain::Chart => "chart",
            Domain::Page => "page",
            Domain::Session => "session",
            Domain::Progress => "progress",
            Domain::Export => "export",
            Domain::Generate => "generate",
            Domain::System => "system",
        }
    }
}

/// Level threshold plus the set of domains that may log.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub min_level: Level,
    pub domains: HashSet<Domain>,
}

impl Filter {
    /// `LOG_LEVEL` (default info) and `LOG_DOMAINS` (comma list, default all).
    pub fn parse(level: Option<&str>, domains: Option<&str>) -> Self {
        let min_level = level.and_then(|l| l.parse().ok()).unwrap_or(Level::Info);
        let domains = match domains.map(str::trim) {
            None | Some("") | Some("all") => Domain::ALL.into_iter().collect(),
            Some(list) => Domain::ALL
                .into_iter()
                .filter(|d| list.split(',').any(|name| name.trim() == d.as_str()))
                .collect(),
        };
        Self { min_level, domains }
    }

    pub fn allows(&self, level: Level, domain: Domain) -> bool {
        level >= self.min_level && self.domains.contains(&domain)
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

struct RunContext {
    run_id: String,
    filter: Filter,
    events: Option<Mutex<BufWriter<File>>>,
}

fn open_events(base: &str, run_id: &str) -> Option<Mutex<BufWriter<File>>> {
    let run_dir = PathBuf::from(base).join(run_id);
    if let Err(err) = create_dir_all(&run_dir) {
        eprintln!("[log] cannot create {}: {}", run_dir.display(), err);
        return None;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(run_dir.join("events.jsonl"))
        .map(|file| Mutex::new(BufWriter::new(file)))
        .map_err(|err| eprintln!("[log] cannot open events.jsonl: {}", err))
        .ok()
}

fn run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID").unwrap_or_else(|_| {
            format!("txdash-{}-{}", Utc::now().timestamp_millis(), process::id())
        });
        let filter = Filter::parse(
            std::env::var("LOG_LEVEL").ok().as_deref(),
            std::env::var("LOG_DOMAINS").ok().as_deref(),
        );
        let events = std::env::var("LOG_DIR")
            .ok()
            .and_then(|base| open_events(&base, &run_id));
        RunContext { run_id, filter, events }
    })
}

const REDACTED_KEYS: [&str; 4] = ["sessionId", "session_id", "authorization", "Authorization"];

fn redact(fields: &mut Map<String, Value>) {
    for key in REDACTED_KEYS {
        if let Some(v) = fields.get_mut(key) {
            *v = Value::String("[REDACTED]".to_string());
        }
    }
}

// =============================================================================
// Emit
// =============================================================================

/// Emit one record if the level and domain pass the filter.
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let ctx = run_context();
    if !ctx.filter.allows(level, domain) {
        return;
    }
    let line = build_record(&ctx.run_id, level, domain, event, fields).to_string();
    if let Some(events) = &ctx.events {
        if let Ok(mut w) = events.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
    eprintln!("{}", line);
}

fn build_record(run_id: &str, level: Level, domain: Domain, event: &str, mut data: Map<String, Value>) -> Value {
    redact(&mut data);
    let msg = data.remove("msg").unwrap_or_else(|| json!(""));
    json!({
        "ts": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "run_id": run_id,
        "seq": next_seq(),
        "lvl": level.label(),
        "component": domain.as_str(),
        "event": event,
        "msg": msg,
        "data": data,
    })
}

pub fn debug(domain: Domain, event: &str, fields: Map<String, Value>) {
    log(Level::Debug, domain, event, fields);
}

pub fn info(domain: Domain, event: &str, fields: Map<String, Value>) {
    log(Level::Info, domain, event, fields);
}

pub fn warn(domain: Domain, event: &str, fields: Map<String, Value>) {
    log(Level::Warn, domain, event, fields);
}

pub fn error(domain: Domain, event: &str, fields: Map<String, Value>) {
    log(Level::Error, domain, event, fields);
}

// =============================================================================
// Field helpers
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}
