//! v001 -- Initial schema creation.
//!
//! Creates the five core tables: `profiles`, `likes`, `matches`, `calls`,
//! and `reports`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profiles (the Directory)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    id                TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    name              TEXT NOT NULL,
    age               INTEGER NOT NULL,
    gender            TEXT NOT NULL,              -- male / female / other
    preferred_gender  TEXT NOT NULL,              -- male / female / both / all
    location          TEXT NOT NULL,
    bio               TEXT,
    avatar            TEXT,                       -- opaque picture reference
    relationship_goal TEXT NOT NULL,              -- serious / casual / friendship
    premium           INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    created_at        TEXT NOT NULL               -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Likes: one row per ordered (liker, liked) pair
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS likes (
    liker      TEXT NOT NULL,
    liked      TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (liker, liked)
);

CREATE INDEX IF NOT EXISTS idx_likes_liked ON likes(liked);

-- ----------------------------------------------------------------
-- Matches: unique per canonical unordered pair (pair_lo < pair_hi)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS matches (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    pair_lo    TEXT NOT NULL,
    pair_hi    TEXT NOT NULL,
    status     TEXT NOT NULL,                 -- pending / accepted / completed / rejected
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE (pair_lo, pair_hi)
);

-- ----------------------------------------------------------------
-- Calls: each belongs to exactly one match
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS calls (
    id            TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    match_id      TEXT NOT NULL,              -- FK -> matches(id)
    kind          TEXT NOT NULL,              -- voice / video
    status        TEXT NOT NULL,              -- pending / active / completed / rejected
    duration_secs INTEGER NOT NULL,
    started_at    TEXT,
    ended_at      TEXT,

    FOREIGN KEY (match_id) REFERENCES matches(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_calls_match_id ON calls(match_id);

-- ----------------------------------------------------------------
-- Reports: append-only
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS reports (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    reporter   TEXT NOT NULL,
    reported   TEXT NOT NULL,
    call_id    TEXT,                          -- nullable FK -> calls(id)
    reason     TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reports_reporter ON reports(reporter);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
