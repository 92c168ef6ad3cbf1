use deadpool_postgres::Pool;
use tracing::Level;

/// Default cap applied to `limit`.
pub const DEFAULT_MAX_QUERY_LIMIT: u64 = 10_000;
pub const DEFAULT_AUDIT_TABLE: &str = "audits";
pub const DEFAULT_ACCESS_TABLE: &str = "accesskeys";
pub const DEFAULT_ROLE_TABLE: &str = "roles";
pub const DEFAULT_USER_TABLE: &str = "users";

/// Options for a [`Crud`](crate::crud::Crud) request.
///
/// Empty / missing values are filled in by `Crud::new`, never here, so a request can tell an
/// explicit setting from a default.
#[derive(Debug, Clone, Default)]
pub struct CrudOptions {
    /// Upper bound for `limit`; `0` means [`DEFAULT_MAX_QUERY_LIMIT`].
    pub max_query_limit: u64,
    pub audit_table: String,
    pub access_table: String,
    pub role_table: String,
    pub user_table: String,
    /// Pool for audit writes; falls back to the application pool.
    pub audit_db: Option<Pool>,
    /// Pool for access checks; falls back to the application pool.
    pub access_db: Option<Pool>,
    pub log_all: bool,
    pub log_create: bool,
    pub log_update: bool,
    pub log_read: bool,
    pub log_delete: bool,
    /// Access checks are left to middleware; the flag is carried for it.
    pub check_access: bool,
    /// How executed SQL is logged.
    pub sql_log: SqlLogConfig,
}

/// `tracing` settings for executed SQL.
#[derive(Debug, Clone)]
pub struct SqlLogConfig {
    /// Whether statements are emitted at all.
    pub enabled: bool,
    /// Tracing event level to emit at.
    pub level: Level,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for SqlLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: Level::DEBUG,
            max_sql_length: Some(200),
        }
    }
}

impl SqlLogConfig {
    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    /// Stop emitting SQL.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl CrudOptions {
    /// Create options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_query_limit(mut self, limit: u64) -> Self {
        self.max_query_limit = limit;
        self
    }

    pub fn audit_table(mut self, table: impl Into<String>) -> Self {
        self.audit_table = table.into();
        self
    }

    pub fn access_table(mut self, table: impl Into<String>) -> Self {
        self.access_table = table.into();
        self
    }

    pub fn role_table(mut self, table: impl Into<String>) -> Self {
        self.role_table = table.into();
        self
    }

    pub fn user_table(mut self, table: impl Into<String>) -> Self {
        self.user_table = table.into();
        self
    }

    pub fn audit_db(mut self, pool: Pool) -> Self {
        self.audit_db = Some(pool);
        self
    }

    pub fn access_db(mut self, pool: Pool) -> Self {
        self.access_db = Some(pool);
        self
    }

    /// Audit every operation type.
    pub fn log_all(mut self) -> Self {
        self.log_all = true;
        self
    }

    pub fn log_create(mut self) -> Self {
        self.log_create = true;
        self
    }

    pub fn log_update(mut self) -> Self {
        self.log_update = true;
        self
    }

    pub fn log_read(mut self) -> Self {
        self.log_read = true;
        self
    }

    pub fn log_delete(mut self) -> Self {
        self.log_delete = true;
        self
    }

    pub fn check_access(mut self, enabled: bool) -> Self {
        self.check_access = enabled;
        self
    }

    pub fn sql_log(mut self, config: SqlLogConfig) -> Self {
        self.sql_log = config;
        self
    }
}
