use strum_macros::{AsRefStr, EnumString};

/// Database flavour behind the `Any` pool, picked from the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
pub enum Backend {
    #[strum(serialize = "mysql")]
    MySql,
    #[strum(serialize = "mariadb")]
    MariaDb,
    #[strum(serialize = "sqlite")]
    Sqlite,
}

impl Backend {
    pub fn from_url(url: &str) -> Option<Self> {
        url.split(':').next()?.parse().ok()
    }

    /// Takes row locks with `SELECT ... FOR UPDATE`.
    pub fn locks_rows(self) -> bool {
        matches!(self, Backend::MySql | Backend::MariaDb)
    }

    /// DDL run at startup; every statement is idempotent.
    pub fn schema(self) -> Vec<String> {
        match self {
            Backend::MySql => mysql_schema("utf8mb4_0900_bin"),
            Backend::MariaDb => mysql_schema("utf8mb4_nopad_bin"),
            Backend::Sqlite => SQLITE_SCHEMA.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// period and employee_name need a binary NO PAD collation: equality is
// case-sensitive, trailing spaces are significant and ORDER BY is byte order.
// The two servers name that collation differently.
fn mysql_schema(collation: &str) -> Vec<String> {
    MYSQL_SCHEMA
        .iter()
        .map(|s| s.replace("{collation}", collation))
        .collect()
}

const MYSQL_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS batch (
        id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        period VARCHAR(191) CHARACTER SET utf8mb4 COLLATE {collation} NOT NULL,
        holidays LONGTEXT NOT NULL,
        working_days BIGINT NOT NULL,
        created_at VARCHAR(64) NOT NULL,
        UNIQUE KEY uq_batch_period (period)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS attendance_record (
        id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        batch_id BIGINT NOT NULL,
        employee_name VARCHAR(255) CHARACTER SET utf8mb4 COLLATE {collation} NOT NULL,
        project TEXT NULL,
        month_total DOUBLE NOT NULL DEFAULT 0,
        row_data LONGTEXT NOT NULL,
        KEY idx_record_batch (batch_id),
        KEY idx_record_employee (employee_name),
        CONSTRAINT fk_record_batch FOREIGN KEY (batch_id) REFERENCES batch (id)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
    "#,
];

const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS batch (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        period TEXT NOT NULL UNIQUE,
        holidays TEXT NOT NULL,
        working_days INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS attendance_record (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        batch_id INTEGER NOT NULL REFERENCES batch (id),
        employee_name TEXT NOT NULL,
        project TEXT,
        month_total REAL NOT NULL DEFAULT 0,
        row_data TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_record_batch ON attendance_record (batch_id)",
    "CREATE INDEX IF NOT EXISTS idx_record_employee ON attendance_record (employee_name)",
];
