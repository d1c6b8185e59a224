use super::{GrantFilter, PermissionStore};
use crate::error::Result;
use crate::models::{CoarsePermission, ContentType, Grant, Group, Subject, User};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

const GRANT_COLUMNS: &str = "grant_id, codename, content_type, object_id, user_id, group_id, \
     creator, approver, approved, date_requested, date_approved";

/// Counts grant-table reads, split by the kind of subject predicate.
///
/// Subject queries filter on a user or group column directly; group queries
/// go through the membership subquery.
#[derive(Debug, Default)]
pub struct QueryStats {
    subject_grant_queries: AtomicUsize,
    group_grant_queries: AtomicUsize,
}

impl QueryStats {
    pub fn subject_grant_queries(&self) -> usize {
        self.subject_grant_queries.load(Ordering::Relaxed)
    }

    pub fn group_grant_queries(&self) -> usize {
        self.group_grant_queries.load(Ordering::Relaxed)
    }

    fn record(&self, filter: &GrantFilter) {
        if filter.is_group_membership() {
            self.group_grant_queries.fetch_add(1, Ordering::Relaxed);
        } else {
            self.subject_grant_queries.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Permission store backed by SQLite through sqlx.
///
/// Safe to share across tasks; the pool hands out connections as needed.
pub struct SqliteStore {
    pool: SqlitePool,
    stats: QueryStats,
}

impl SqliteStore {
    /// Open (or create) a store and initialize the schema.
    ///
    /// The path can be:
    /// - A file path like "authority.db" or "./data/authority.db"
    /// - ":memory:" for an in-memory database (testing)
    pub async fn open(path: &str) -> Result<Self> {
        let pool = if path == ":memory:" {
            // Every connection to sqlite::memory: is its own database, so pin one.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
                .await?
        } else {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
                }
            }

            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(
                    SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
                        .create_if_missing(true),
                )
                .await?
        };

        Self::init_schema(&pool).await?;
        log::debug!("Opened permission store at {}", path);

        Ok(Self {
            pool,
            stats: QueryStats::default(),
        })
    }

    /// Grant-table read counters.
    pub fn stats(&self) -> &QueryStats {
        &self.stats
    }

    /// Initialize the database schema (tables and indexes).
    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS content_types (
                label TEXT PRIMARY KEY,
                app_label TEXT NOT NULL,
                model TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_superuser INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE TABLE IF NOT EXISTS groups (
                group_id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            )",
            "CREATE TABLE IF NOT EXISTS user_groups (
                user_id TEXT NOT NULL,
                group_id TEXT NOT NULL,
                PRIMARY KEY (user_id, group_id)
            )",
            // No uniqueness on (subject, target, codename, approved): duplicates are
            // tolerated and readers only test for existence.
            "CREATE TABLE IF NOT EXISTS grants (
                grant_id TEXT PRIMARY KEY,
                codename TEXT NOT NULL,
                content_type TEXT NOT NULL,
                object_id TEXT NOT NULL,
                user_id TEXT,
                group_id TEXT,
                creator TEXT,
                approver TEXT,
                approved INTEGER NOT NULL DEFAULT 0,
                date_requested TEXT NOT NULL,
                date_approved TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_grants_user ON grants(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_grants_group ON grants(group_id)",
            "CREATE INDEX IF NOT EXISTS idx_grants_object ON grants(content_type, object_id)",
            "CREATE TABLE IF NOT EXISTS coarse_permissions (
                permission_id TEXT PRIMARY KEY,
                codename TEXT NOT NULL,
                name TEXT NOT NULL,
                content_type TEXT NOT NULL,
                UNIQUE (content_type, codename)
            )",
            "CREATE TABLE IF NOT EXISTS user_permissions (
                user_id TEXT NOT NULL,
                permission_id TEXT NOT NULL,
                PRIMARY KEY (user_id, permission_id)
            )",
            "CREATE TABLE IF NOT EXISTS group_permissions (
                group_id TEXT NOT NULL,
                permission_id TEXT NOT NULL,
                PRIMARY KEY (group_id, permission_id)
            )",
        ];

        for statement in statements {
            sqlx::query(statement).execute(pool).await?;
        }

        Ok(())
    }

    fn row_to_user(row: &SqliteRow) -> Result<User> {
        Ok(User {
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            is_active: row.try_get("is_active")?,
            is_superuser: row.try_get("is_superuser")?,
        })
    }

    fn row_to_grant(row: &SqliteRow) -> Result<Grant> {
        Ok(Grant {
            grant_id: row.try_get("grant_id")?,
            codename: row.try_get("codename")?,
            content_type: row.try_get("content_type")?,
            object_id: row.try_get("object_id")?,
            user_id: row.try_get("user_id")?,
            group_id: row.try_get("group_id")?,
            creator: row.try_get("creator")?,
            approver: row.try_get("approver")?,
            approved: row.try_get("approved")?,
            date_requested: row.try_get("date_requested")?,
            date_approved: row.try_get("date_approved")?,
        })
    }

    fn row_to_coarse(row: &SqliteRow) -> Result<CoarsePermission> {
        Ok(CoarsePermission {
            permission_id: row.try_get("permission_id")?,
            codename: row.try_get("codename")?,
            name: row.try_get("name")?,
            content_type: row.try_get("content_type")?,
        })
    }
}

#[async_trait]
impl PermissionStore for SqliteStore {
    async fn register_content_type(&self, content_type: &ContentType) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO content_types (label, app_label, model) VALUES ($1, $2, $3)")
            .bind(content_type.label())
            .bind(&content_type.app_label)
            .bind(&content_type.model)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn content_type_exists(&self, content_type: &ContentType) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM content_types WHERE label = $1")
            .bind(content_type.label())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (user_id, username, is_active, is_superuser)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&user.user_id)
        .bind(&user.username)
        .bind(user.is_active)
        .bind(user.is_superuser)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "UPDATE users SET username = $1, is_active = $2, is_superuser = $3
             WHERE user_id = $4",
        )
        .bind(&user.username)
        .bind(user.is_active)
        .bind(user.is_superuser)
        .bind(&user.user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT user_id, username, is_active, is_superuser FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT user_id, username, is_active, is_superuser FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn create_group(&self, group: &Group) -> Result<()> {
        sqlx::query("INSERT INTO groups (group_id, name) VALUES ($1, $2)")
            .bind(&group.group_id)
            .bind(&group.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        let row = sqlx::query("SELECT group_id, name FROM groups WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Group {
                group_id: row.try_get("group_id")?,
                name: row.try_get("name")?,
            })),
            None => Ok(None),
        }
    }

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_grant(&self, grant: &Grant) -> Result<()> {
        sqlx::query(
            "INSERT INTO grants (grant_id, codename, content_type, object_id, user_id, group_id,
                                 creator, approver, approved, date_requested, date_approved)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&grant.grant_id)
        .bind(&grant.codename)
        .bind(&grant.content_type)
        .bind(&grant.object_id)
        .bind(&grant.user_id)
        .bind(&grant.group_id)
        .bind(&grant.creator)
        .bind(&grant.approver)
        .bind(grant.approved)
        .bind(&grant.date_requested)
        .bind(&grant.date_approved)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_grant(&self, grant_id: &str) -> Result<Option<Grant>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM grants WHERE grant_id = $1",
            GRANT_COLUMNS
        ))
        .bind(grant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_grant).transpose()
    }

    async fn filter_grants(&self, filter: &GrantFilter) -> Result<Vec<Grant>> {
        self.stats.record(filter);

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM grants WHERE 1 = 1", GRANT_COLUMNS));

        if let Some(user_id) = &filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id.clone());
        }
        if let Some(group_id) = &filter.group_id {
            query.push(" AND group_id = ").push_bind(group_id.clone());
        }
        if let Some(member) = &filter.member_of {
            query
                .push(" AND group_id IN (SELECT group_id FROM user_groups WHERE user_id = ")
                .push_bind(member.clone())
                .push(")");
        }
        if let Some(content_type) = &filter.content_type {
            query.push(" AND content_type = ").push_bind(content_type.clone());
        }
        if let Some(object_id) = &filter.object_id {
            query.push(" AND object_id = ").push_bind(object_id.clone());
        }
        if let Some(codename) = &filter.codename {
            query.push(" AND codename = ").push_bind(codename.clone());
        }
        if let Some(approved) = filter.approved {
            query.push(" AND approved = ").push_bind(approved);
        }
        query.push(" ORDER BY rowid");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_grant).collect()
    }

    async fn approve_grant(
        &self,
        grant_id: &str,
        approver: &str,
        date_approved: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE grants SET approved = 1, approver = $1, date_approved = $2
             WHERE grant_id = $3 AND approved = 0",
        )
        .bind(approver)
        .bind(date_approved)
        .bind(grant_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_grant(&self, grant_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM grants WHERE grant_id = $1")
            .bind(grant_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_or_create_coarse_permission(
        &self,
        codename: &str,
        name: &str,
        content_type: &ContentType,
    ) -> Result<CoarsePermission> {
        let candidate =
            CoarsePermission::new(codename.to_string(), name.to_string(), content_type.label());

        // Concurrent creators race harmlessly: the unique key keeps the first row.
        sqlx::query(
            "INSERT OR IGNORE INTO coarse_permissions (permission_id, codename, name, content_type)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&candidate.permission_id)
        .bind(&candidate.codename)
        .bind(&candidate.name)
        .bind(&candidate.content_type)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT permission_id, codename, name, content_type FROM coarse_permissions
             WHERE content_type = $1 AND codename = $2",
        )
        .bind(content_type.label())
        .bind(codename)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_coarse(&row)
    }

    async fn attach_coarse_permission(
        &self,
        subject: &Subject,
        permission_id: &str,
    ) -> Result<()> {
        let (statement, subject_id) = match subject {
            Subject::User(id) => (
                "INSERT OR IGNORE INTO user_permissions (user_id, permission_id) VALUES ($1, $2)",
                id,
            ),
            Subject::Group(id) => (
                "INSERT OR IGNORE INTO group_permissions (group_id, permission_id) VALUES ($1, $2)",
                id,
            ),
        };

        sqlx::query(statement)
            .bind(subject_id)
            .bind(permission_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn coarse_permissions_for_user(&self, user_id: &str) -> Result<Vec<CoarsePermission>> {
        let rows = sqlx::query(
            "SELECT p.permission_id, p.codename, p.name, p.content_type
             FROM coarse_permissions p
             JOIN user_permissions up ON up.permission_id = p.permission_id
             WHERE up.user_id = $1
             UNION
             SELECT p.permission_id, p.codename, p.name, p.content_type
             FROM coarse_permissions p
             JOIN group_permissions gp ON gp.permission_id = p.permission_id
             JOIN user_groups ug ON ug.group_id = gp.group_id
             WHERE ug.user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_coarse).collect()
    }
}
