/// SQL DDL for the beacon database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS folders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER REFERENCES folders(id),
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS host_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    host TEXT NOT NULL,
    status TEXT NOT NULL,
    folder_id INTEGER REFERENCES folders(id),
    preferred_handler TEXT,
    preference_enabled INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS uri_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uri TEXT NOT NULL,
    host TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    source TEXT NOT NULL,
    action TEXT NOT NULL,
    chosen_handler TEXT,
    rule_id INTEGER
);

CREATE TABLE IF NOT EXISTS browser_usage_stats (
    handler TEXT PRIMARY KEY,
    usage_count INTEGER NOT NULL DEFAULT 0,
    last_used_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_host_rules_host ON host_rules(lower(host));
CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_parent_name_kind
    ON folders(COALESCE(parent_id, 0), lower(name), kind);
CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id);
CREATE INDEX IF NOT EXISTS idx_host_rules_folder ON host_rules(folder_id);
CREATE INDEX IF NOT EXISTS idx_uri_records_timestamp ON uri_records(timestamp);
CREATE INDEX IF NOT EXISTS idx_uri_records_host ON uri_records(host);
CREATE INDEX IF NOT EXISTS idx_uri_records_action ON uri_records(action);
CREATE INDEX IF NOT EXISTS idx_uri_records_source ON uri_records(source);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
