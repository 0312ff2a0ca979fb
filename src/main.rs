use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use beacon_core::{
    FolderId, FolderKind, GroupField, HandlerFilter, QuerySpec, RuleId, RuleStatus, SortOrder,
    UriAction, UriSource,
};
use beacon_store::{build_plan, Database, FolderRepo, Pager, RecordRepo, RuleService};
use beacon_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "beacon", about = "Host classification rules and interaction history")]
struct Cli {
    /// Database path. Defaults to ~/.beacon/database/beacon.db
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or update the rule for a host
    Save {
        host: String,
        /// none | bookmarked | blocked
        status: String,
        #[arg(long)]
        folder: Option<i64>,
        #[arg(long)]
        handler: Option<String>,
        #[arg(long)]
        preferred: bool,
    },
    /// Delete the rule for a host (idempotent)
    Delete { host: String },
    /// List all rules
    Rules,
    #[command(subcommand)]
    Folder(FolderCmd),
    #[command(subcommand)]
    History(HistoryCmd),
    /// Query the interaction history
    Query {
        #[arg(long, default_value = "")]
        search: String,
        /// intent | clipboard | manual (repeatable)
        #[arg(long)]
        source: Vec<String>,
        /// Host filter (repeatable)
        #[arg(long)]
        host: Vec<String>,
        /// Handler filter; empty string means "no handler" (repeatable)
        #[arg(long)]
        handler: Vec<String>,
        /// day | action | source | host | handler
        #[arg(long)]
        group: Option<String>,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
        #[arg(long, default_value_t = 0)]
        page: u32,
        /// Keep the query open and re-print on every change
        #[arg(long)]
        follow: bool,
    },
}

#[derive(Subcommand)]
enum FolderCmd {
    Create {
        name: String,
        /// bookmark | block
        kind: String,
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Rename and/or move a folder (omit --parent to move to root level)
    Rename {
        id: i64,
        name: String,
        #[arg(long)]
        parent: Option<i64>,
    },
    Delete {
        id: i64,
    },
    List {
        /// bookmark | block
        kind: String,
    },
}

#[derive(Subcommand)]
enum HistoryCmd {
    Add {
        uri: String,
        host: String,
        /// intent | clipboard | manual
        source: String,
        /// dismissed | blocked_enforced | preference_set | opened_once | opened_by_preference
        action: String,
        #[arg(long)]
        handler: Option<String>,
        #[arg(long)]
        rule: Option<i64>,
    },
    Clear,
    Stats,
}

fn default_db_path() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".beacon")
        .join("database")
        .join("beacon.db")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    init_telemetry(&TelemetryConfig {
        json: cli.json_logs,
        ..TelemetryConfig::default()
    });

    let db_path = cli.db.clone().unwrap_or_else(default_db_path);
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let db = Database::open(&db_path)?;
    tracing::info!(path = %db_path.display(), "database opened");

    let folders = FolderRepo::new(db.clone());
    folders.ensure_default_roots()?;
    let rules = RuleService::new(db.clone());
    let records = RecordRepo::new(db.clone());

    match cli.command {
        Command::Save {
            host,
            status,
            folder,
            handler,
            preferred,
        } => {
            let status: RuleStatus = status.parse()?;
            let id = rules.save(
                &host,
                status,
                folder.map(FolderId::from_raw),
                handler.as_deref(),
                preferred,
            )?;
            println!("saved rule {id} for {host}");
        }
        Command::Delete { host } => {
            rules.delete_by_host(&host)?;
            println!("deleted rule for {host}");
        }
        Command::Rules => {
            for rule in rules.list()? {
                let folder = rule
                    .folder_id
                    .map(|f| format!(" folder={f}"))
                    .unwrap_or_default();
                let handler = rule
                    .preferred_handler
                    .as_deref()
                    .map(|h| format!(" handler={h}"))
                    .unwrap_or_default();
                println!("{}  {}{folder}{handler}", rule.host, rule.status);
            }
        }
        Command::Folder(cmd) => match cmd {
            FolderCmd::Create { name, kind, parent } => {
                let kind: FolderKind = kind.parse()?;
                let id = folders.create(&name, parent.map(FolderId::from_raw), kind)?;
                println!("folder {id}");
            }
            FolderCmd::Rename { id, name, parent } => {
                folders.rename_move(
                    FolderId::from_raw(id),
                    &name,
                    parent.map(FolderId::from_raw),
                )?;
                println!("folder {id} updated");
            }
            FolderCmd::Delete { id } => {
                folders.delete(FolderId::from_raw(id))?;
                println!("folder {id} deleted");
            }
            FolderCmd::List { kind } => {
                let kind: FolderKind = kind.parse()?;
                for folder in folders.list_all(kind)? {
                    let parent = folder
                        .parent_id
                        .map(|p| format!(" parent={p}"))
                        .unwrap_or_default();
                    println!("{}  {}{parent}", folder.id, folder.name);
                }
            }
        },
        Command::History(cmd) => match cmd {
            HistoryCmd::Add {
                uri,
                host,
                source,
                action,
                handler,
                rule,
            } => {
                let source: UriSource = source.parse()?;
                let action: UriAction = action.parse()?;
                let id = records.append(
                    &uri,
                    &host,
                    source,
                    action,
                    handler.as_deref(),
                    rule.map(RuleId::from_raw),
                )?;
                println!("record {id}");
            }
            HistoryCmd::Clear => {
                let removed = records.clear()?;
                println!("cleared {removed} records");
            }
            HistoryCmd::Stats => {
                for stat in records.usage_stats()? {
                    println!(
                        "{}  {} uses  last {}",
                        stat.handler, stat.usage_count, stat.last_used_at
                    );
                }
            }
        },
        Command::Query {
            search,
            source,
            host,
            handler,
            group,
            page_size,
            page,
            follow,
        } => {
            let mut spec = QuerySpec {
                search,
                ..QuerySpec::default()
            };
            for s in source {
                spec.sources.insert(s.parse::<UriSource>()?);
            }
            spec.hosts.extend(host);
            for h in handler {
                spec.handlers.insert(if h.is_empty() {
                    HandlerFilter::NoHandler
                } else {
                    HandlerFilter::Named(h)
                });
            }
            if let Some(g) = group.as_deref() {
                spec.group_field = Some(parse_group(g)?);
                spec.group_order = SortOrder::Desc;
            }

            let pager = Pager::new(db.clone(), build_plan(&spec), page_size);

            if follow {
                let cancel = CancellationToken::new();
                let mut stream = pager.subscribe(page, cancel.clone());
                let ctrl_c = tokio::signal::ctrl_c();
                tokio::pin!(ctrl_c);
                loop {
                    tokio::select! {
                        _ = &mut ctrl_c => {
                            cancel.cancel();
                            break;
                        }
                        item = stream.next() => match item {
                            Some(Ok(p)) => print_page(&p),
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, kind = e.kind(), "query re-evaluation failed");
                            }
                            None => break,
                        }
                    }
                }
            } else {
                print_page(&pager.page(page)?);
                println!("total: {}", pager.total_count()?);
                for group in pager.group_counts()? {
                    println!("{:>6}  {}", group.count, group.key);
                }
            }
        }
    }

    Ok(())
}

fn parse_group(s: &str) -> Result<GroupField, String> {
    match s {
        "day" => Ok(GroupField::Day),
        "action" => Ok(GroupField::Action),
        "source" => Ok(GroupField::Source),
        "host" => Ok(GroupField::Host),
        "handler" => Ok(GroupField::Handler),
        other => Err(format!("unknown group field: {other}")),
    }
}

fn print_page(page: &beacon_store::Page) {
    println!("-- page {} ({} records)", page.index, page.records.len());
    for record in &page.records {
        let handler = record
            .chosen_handler
            .as_deref()
            .map(|h| format!(" [{h}]"))
            .unwrap_or_default();
        println!(
            "{}  {}  {}  {}{handler}",
            record.timestamp, record.source, record.action, record.uri
        );
    }
}
