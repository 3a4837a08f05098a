use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rtls_core::registry_contracts::{
    ReaderCreate, ReaderRecord, TagCreate, TagRecord, UserCreate, UserRecord, UserRole,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

pub const REGISTRY_SCHEMA_VERSION: i64 = 1;
pub const LIST_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{entity} already exists: {key}")]
    Duplicate { entity: &'static str, key: String },
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("password hash error: {0}")]
    PasswordHash(String),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

pub struct RegistryStore {
    conn: Connection,
}

impl RegistryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > REGISTRY_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: REGISTRY_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_registry_schema.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    pub fn create_reader(&self, body: &ReaderCreate) -> Result<ReaderRecord, StorageError> {
        let reader_id = require_field("reader_id", &body.reader_id)?;
        let location_name = require_field("location_name", &body.location_name)?;
        let created_at = Utc::now();

        self.conn
            .execute(
                "
                INSERT INTO readers (reader_id, location_name, is_active, created_at)
                VALUES (?1, ?2, ?3, ?4)
                ",
                params![
                    reader_id,
                    location_name,
                    body.is_active,
                    format_timestamp(created_at),
                ],
            )
            .map_err(|err| unique_violation(err, "reader_id", reader_id))?;

        Ok(ReaderRecord {
            reader_id: reader_id.to_string(),
            location_name: location_name.to_string(),
            is_active: body.is_active,
            created_at,
        })
    }

    pub fn list_readers(&self) -> Result<Vec<ReaderRecord>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT reader_id, location_name, is_active, created_at
            FROM readers
            ORDER BY reader_id
            ",
        )?;

        let rows = statement.query_map([], |row| {
            Ok(ReaderRecord {
                reader_id: row.get(0)?,
                location_name: row.get(1)?,
                is_active: row.get(2)?,
                created_at: timestamp_column(row, 3)?,
            })
        })?;

        let mut readers = Vec::new();
        for row in rows {
            readers.push(row?);
        }
        Ok(readers)
    }

    pub fn reader_location(&self, reader_id: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .conn
            .query_row(
                "SELECT location_name FROM readers WHERE reader_id = ?1",
                [reader_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn create_tag(&self, body: &TagCreate) -> Result<TagRecord, StorageError> {
        let tag_id = require_field("tag_id", &body.tag_id)?;
        let equipment_name = require_field("equipment_name", &body.equipment_name)?;
        let equipment_type = require_field("equipment_type", &body.equipment_type)?;
        let serial_number = body
            .serial_number
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let created_at = Utc::now();

        self.conn
            .execute(
                "
                INSERT INTO tags (
                    tag_id,
                    equipment_name,
                    equipment_type,
                    serial_number,
                    is_active,
                    created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
                params![
                    tag_id,
                    equipment_name,
                    equipment_type,
                    serial_number,
                    body.is_active,
                    format_timestamp(created_at),
                ],
            )
            .map_err(|err| unique_violation(err, "tag_id or serial_number", tag_id))?;

        Ok(TagRecord {
            tag_id: tag_id.to_string(),
            equipment_name: equipment_name.to_string(),
            equipment_type: equipment_type.to_string(),
            serial_number: serial_number.map(str::to_string),
            is_active: body.is_active,
            created_at,
        })
    }

    /// Newest tags first. `query` matches equipment name or tag id, ASCII case-insensitive.
    pub fn list_tags(&self, query: Option<&str>) -> Result<Vec<TagRecord>, StorageError> {
        let pattern = query
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| format!("%{}%", escape_like(value)));

        let mut statement = self.conn.prepare(
            "
            SELECT tag_id, equipment_name, equipment_type, serial_number, is_active, created_at
            FROM tags
            WHERE ?1 IS NULL
               OR equipment_name LIKE ?1 ESCAPE '\\'
               OR tag_id LIKE ?1 ESCAPE '\\'
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            ",
        )?;

        let rows = statement.query_map(params![pattern, LIST_LIMIT as i64], |row| {
            Ok(TagRecord {
                tag_id: row.get(0)?,
                equipment_name: row.get(1)?,
                equipment_type: row.get(2)?,
                serial_number: row.get(3)?,
                is_active: row.get(4)?,
                created_at: timestamp_column(row, 5)?,
            })
        })?;

        let mut tags = Vec::new();
        for row in rows {
            tags.push(row?);
        }
        Ok(tags)
    }

    pub fn create_user(&self, user: &NewUser) -> Result<UserRecord, StorageError> {
        let created_at = Utc::now();

        self.conn
            .execute(
                "
                INSERT INTO users (
                    username,
                    display_name,
                    role,
                    department,
                    password_hash,
                    is_active,
                    created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
                params![
                    user.username,
                    user.display_name,
                    user.role.as_str(),
                    user.department,
                    user.password_hash,
                    user.is_active,
                    format_timestamp(created_at),
                ],
            )
            .map_err(|err| unique_violation(err, "username", &user.username))?;

        Ok(UserRecord {
            user_id: self.conn.last_insert_rowid(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
            department: user.department.clone(),
            is_active: user.is_active,
            created_at,
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRecord>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT user_id, username, display_name, role, department, is_active, created_at
            FROM users
            ORDER BY user_id DESC
            LIMIT ?1
            ",
        )?;

        let rows = statement.query_map([LIST_LIMIT as i64], |row| {
            let role_raw: String = row.get(3)?;
            let role = role_raw.parse::<UserRole>().map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, err)),
                )
            })?;
            Ok(UserRecord {
                user_id: row.get(0)?,
                username: row.get(1)?,
                display_name: row.get(2)?,
                role,
                department: row.get(4)?,
                is_active: row.get(5)?,
                created_at: timestamp_column(row, 6)?,
            })
        })?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn
            .query_row(
                "
                SELECT 1
                FROM sqlite_master
                WHERE type='table' AND name = ?1
                LIMIT 1
                ",
                [table_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.is_some())
    }
}

/// A validated user row whose password is already hashed. Hashing happens in
/// [`NewUser::prepare`], so build this before taking any lock on a [`RegistryStore`].
#[derive(Debug, Clone)]
pub struct NewUser {
    username: String,
    display_name: String,
    role: UserRole,
    department: Option<String>,
    password_hash: String,
    is_active: bool,
}

impl NewUser {
    pub fn prepare(body: &UserCreate) -> Result<Self, StorageError> {
        let username = require_field("username", &body.username)?;
        let display_name = require_field("display_name", &body.display_name)?;
        let role: UserRole = body.role.parse().map_err(StorageError::Invalid)?;
        if body.password.is_empty() {
            return Err(StorageError::Invalid("password must not be empty".to_string()));
        }
        Ok(Self {
            username: username.to_string(),
            display_name: display_name.to_string(),
            role,
            department: body.department.clone(),
            password_hash: hash_password(&body.password)?,
            is_active: body.is_active,
        })
    }
}

fn require_field<'a>(name: &str, value: &'a str) -> Result<&'a str, StorageError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StorageError::Invalid(format!("{name} must not be empty")));
    }
    Ok(trimmed)
}

fn hash_password(password: &str) -> Result<String, StorageError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| StorageError::PasswordHash(err.to_string()))
}

fn unique_violation(err: rusqlite::Error, entity: &'static str, key: &str) -> StorageError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation
            && matches!(
                failure.extended_code,
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            )
        {
            return StorageError::Duplicate {
                entity,
                key: key.to_string(),
            };
        }
    }
    StorageError::Sqlite(err)
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| StorageError::Timestamp(err.to_string()))
}

fn timestamp_column(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_timestamp(row.get::<_, String>(index)?).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(err))
    })
}
