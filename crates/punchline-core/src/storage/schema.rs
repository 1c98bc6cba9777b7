pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS suggestions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  word TEXT NOT NULL UNIQUE,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS backend_results (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  suggestion_id INTEGER NOT NULL REFERENCES suggestions(id),
  backend_name TEXT NOT NULL,
  backend_id TEXT NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('pending', 'completed')),
  text TEXT,
  failed INTEGER NOT NULL DEFAULT 0,
  latency_secs REAL NOT NULL DEFAULT 0,
  completion_tokens INTEGER NOT NULL DEFAULT 0,
  reasoning_tokens INTEGER NOT NULL DEFAULT 0,
  prompt_tokens INTEGER NOT NULL DEFAULT 0,
  cost REAL NOT NULL DEFAULT 0,
  completed_at TEXT,
  UNIQUE (suggestion_id, backend_name)
);

CREATE INDEX IF NOT EXISTS idx_results_suggestion ON backend_results(suggestion_id);
CREATE INDEX IF NOT EXISTS idx_results_backend ON backend_results(backend_name);

CREATE TABLE IF NOT EXISTS games (
  id TEXT PRIMARY KEY,
  suggestion_id INTEGER NOT NULL REFERENCES suggestions(id),
  winning_result_id INTEGER REFERENCES backend_results(id),
  voter_ip TEXT,
  voter_session TEXT,
  created_at TEXT NOT NULL,
  voted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_games_suggestion ON games(suggestion_id);

CREATE TABLE IF NOT EXISTS game_contestants (
  game_id TEXT NOT NULL REFERENCES games(id),
  result_id INTEGER NOT NULL REFERENCES backend_results(id),
  position INTEGER NOT NULL,
  PRIMARY KEY (game_id, position),
  UNIQUE (game_id, result_id)
);

CREATE INDEX IF NOT EXISTS idx_contestants_result ON game_contestants(result_id);
"#;
