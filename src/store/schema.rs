pub const SCHEMA: &str = r#"
-- Principals; the admin flag is the system-wide superuser bit
CREATE TABLE IF NOT EXISTS users (
    username TEXT PRIMARY KEY,
    fname TEXT NOT NULL DEFAULT '',
    lname TEXT NOT NULL DEFAULT '',
    preferred_name TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT '',
    custom TEXT NOT NULL DEFAULT '{}',
    admin INTEGER NOT NULL DEFAULT 0,
    provider TEXT NOT NULL DEFAULT 'local',

    archived INTEGER NOT NULL DEFAULT 0,
    archived_by TEXT,
    archived_on TEXT,
    created_by TEXT,
    created_on TEXT DEFAULT (datetime('now')),
    last_modified_by TEXT,
    updated_on TEXT DEFAULT (datetime('now'))
);

-- Organizations; permissions is a JSON object of username -> role array
CREATE TABLE IF NOT EXISTS organizations (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    permissions TEXT NOT NULL DEFAULT '{}',
    custom TEXT NOT NULL DEFAULT '{}',

    archived INTEGER NOT NULL DEFAULT 0,
    archived_by TEXT,
    archived_on TEXT,
    created_by TEXT,
    created_on TEXT DEFAULT (datetime('now')),
    last_modified_by TEXT,
    updated_on TEXT DEFAULT (datetime('now'))
);

-- Projects are scoped to their organization
CREATE TABLE IF NOT EXISTS projects (
    org_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    permissions TEXT NOT NULL DEFAULT '{}',
    custom TEXT NOT NULL DEFAULT '{}',
    visibility TEXT NOT NULL DEFAULT 'private',

    archived INTEGER NOT NULL DEFAULT 0,
    archived_by TEXT,
    archived_on TEXT,
    created_by TEXT,
    created_on TEXT DEFAULT (datetime('now')),
    last_modified_by TEXT,
    updated_on TEXT DEFAULT (datetime('now')),

    PRIMARY KEY (org_id, id)
);

-- Structural elements; only project roots are written by the server
CREATE TABLE IF NOT EXISTS elements (
    org_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    parent_id TEXT,
    created_by TEXT,
    created_on TEXT DEFAULT (datetime('now')),

    PRIMARY KEY (org_id, project_id, id),
    FOREIGN KEY (org_id, project_id) REFERENCES projects(org_id, id) ON DELETE CASCADE
);

-- API tokens are auth credentials bound to a user
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- first 8 chars of ID for fast lookup
    username TEXT NOT NULL REFERENCES users(username) ON DELETE CASCADE,

    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,            -- NULL = never
    last_used_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_projects_org ON projects(org_id);
CREATE INDEX IF NOT EXISTS idx_elements_project ON elements(org_id, project_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(username);
"#;
