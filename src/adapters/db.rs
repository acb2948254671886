use std::collections::HashMap;

use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use thiserror::Error;

use crate::domain::models::{
    ChargeSession, NewChargeSessionRecord, NewPortRecord, Port, PortStatus, Timestamp,
    UnknownPortStatus, parse_iso8601, to_iso8601,
};

pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS ports (
    port_id TEXT PRIMARY KEY NOT NULL,
    station_id TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('idle', 'charging', 'fault', 'offline')),
    last_ping TEXT NOT NULL,
    reported_at TEXT NOT NULL,
    cost_per_kwh REAL NOT NULL,
    avg_time_to_charge_minutes REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS charge_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    port_id TEXT NOT NULL REFERENCES ports (port_id) ON DELETE CASCADE,
    session_id TEXT NOT NULL,
    vehicle_id TEXT,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    duration_minutes REAL NOT NULL,
    charged_percent REAL NOT NULL,
    energy_consumed_kwh REAL NOT NULL,
    electricity_cost REAL NOT NULL,
    user_rating REAL,
    review TEXT,
    UNIQUE (port_id, session_id)
);

CREATE INDEX IF NOT EXISTS idx_charge_sessions_port_id
ON charge_sessions (port_id, id);
"#,
)];

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
    #[error("stored port has {0}")]
    UnknownPortStatus(#[from] UnknownPortStatus),
    #[error("port {0} does not exist")]
    PortNotFound(String),
    #[error("record already exists: {0}")]
    Conflict(String),
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    let connection = Connection::open(path)?;
    connection.pragma_update(None, "foreign_keys", true)?;
    Ok(connection)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

pub fn insert_port(connection: &Connection, new_port: &NewPortRecord) -> Result<(), DbError> {
    connection
        .execute(
            "INSERT INTO ports (port_id, station_id, status, last_ping, reported_at, cost_per_kwh, avg_time_to_charge_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new_port.port_id,
                new_port.station_id,
                new_port.status.as_str(),
                to_iso8601(&new_port.last_ping),
                to_iso8601(&new_port.reported_at),
                new_port.cost_per_kwh,
                new_port.avg_time_to_charge_minutes,
            ],
        )
        .map_err(|error| constraint_to_conflict(error, format!("port {}", new_port.port_id)))?;

    Ok(())
}

/// Appends a session to the end of a port's history and returns its row id.
pub fn insert_charge_session(
    connection: &Connection,
    port_id: &str,
    new_session: &NewChargeSessionRecord,
) -> Result<i64, DbError> {
    if !port_exists(connection, port_id)? {
        return Err(DbError::PortNotFound(port_id.to_string()));
    }

    connection
        .execute(
            "INSERT INTO charge_sessions (
                port_id, session_id, vehicle_id, start_time, end_time, duration_minutes,
                charged_percent, energy_consumed_kwh, electricity_cost, user_rating, review
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                port_id,
                new_session.session_id,
                new_session.vehicle_id,
                to_iso8601(&new_session.start_time),
                to_iso8601(&new_session.end_time),
                new_session.duration_minutes,
                new_session.charged_percent,
                new_session.energy_consumed_kwh,
                new_session.electricity_cost,
                new_session.user_rating,
                new_session.review,
            ],
        )
        .map_err(|error| {
            constraint_to_conflict(
                error,
                format!("session {} on port {port_id}", new_session.session_id),
            )
        })?;

    Ok(connection.last_insert_rowid())
}

/// Records a status report; `reported_at` doubles as the latest ping.
pub fn update_port_status(
    connection: &Connection,
    port_id: &str,
    status: PortStatus,
    reported_at: &Timestamp,
) -> Result<(), DbError> {
    let reported_at = to_iso8601(reported_at);
    let updated = connection.execute(
        "UPDATE ports SET status = ?1, reported_at = ?2, last_ping = ?2 WHERE port_id = ?3",
        params![status.as_str(), reported_at, port_id],
    )?;

    if updated == 0 {
        return Err(DbError::PortNotFound(port_id.to_string()));
    }

    Ok(())
}

pub fn count_ports(connection: &Connection) -> Result<i64, DbError> {
    let count = connection.query_row("SELECT COUNT(*) FROM ports", [], |row| row.get(0))?;
    Ok(count)
}

/// All ports in insertion order, each with its sessions in arrival order.
pub fn list_ports_with_sessions(connection: &Connection) -> Result<Vec<Port>, DbError> {
    let mut statement = connection.prepare(
        "SELECT port_id, station_id, status, last_ping, reported_at, cost_per_kwh, avg_time_to_charge_minutes
         FROM ports
         ORDER BY rowid",
    )?;
    let rows = statement.query_map([], read_port_row)?;

    let mut port_rows = Vec::new();
    for row in rows {
        port_rows.push(row?);
    }

    let mut sessions_by_port = list_all_sessions(connection)?;

    port_rows
        .into_iter()
        .map(|row| {
            let sessions = sessions_by_port.remove(&row.port_id).unwrap_or_default();
            row.into_port(sessions)
        })
        .collect()
}

pub fn get_port_with_sessions(
    connection: &Connection,
    port_id: &str,
) -> Result<Option<Port>, DbError> {
    let row = connection
        .query_row(
            "SELECT port_id, station_id, status, last_ping, reported_at, cost_per_kwh, avg_time_to_charge_minutes
             FROM ports
             WHERE port_id = ?1",
            params![port_id],
            read_port_row,
        )
        .optional()?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut statement = connection.prepare(
        "SELECT port_id, session_id, vehicle_id, start_time, end_time, duration_minutes,
                charged_percent, energy_consumed_kwh, electricity_cost, user_rating, review
         FROM charge_sessions
         WHERE port_id = ?1
         ORDER BY id",
    )?;
    let rows = statement.query_map(params![port_id], read_session_row)?;

    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?.into_session());
    }

    row.into_port(sessions).map(Some)
}

fn port_exists(connection: &Connection, port_id: &str) -> Result<bool, DbError> {
    let found = connection
        .query_row(
            "SELECT 1 FROM ports WHERE port_id = ?1",
            params![port_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn list_all_sessions(connection: &Connection) -> Result<HashMap<String, Vec<ChargeSession>>, DbError> {
    let mut statement = connection.prepare(
        "SELECT port_id, session_id, vehicle_id, start_time, end_time, duration_minutes,
                charged_percent, energy_consumed_kwh, electricity_cost, user_rating, review
         FROM charge_sessions
         ORDER BY port_id, id",
    )?;
    let rows = statement.query_map([], read_session_row)?;

    let mut sessions_by_port: HashMap<String, Vec<ChargeSession>> = HashMap::new();
    for row in rows {
        let row = row?;
        let port_id = row.port_id.clone();
        sessions_by_port
            .entry(port_id)
            .or_default()
            .push(row.into_session());
    }

    Ok(sessions_by_port)
}

struct PortRow {
    port_id: String,
    station_id: String,
    status: String,
    last_ping: Option<String>,
    reported_at: Option<String>,
    cost_per_kwh: f64,
    avg_time_to_charge_minutes: f64,
}

impl PortRow {
    fn into_port(self, sessions: Vec<ChargeSession>) -> Result<Port, DbError> {
        let status = self.status.parse::<PortStatus>()?;
        let last_ping = stored_timestamp(self.last_ping, "last_ping", &self.port_id, None);
        let reported_at = stored_timestamp(self.reported_at, "reported_at", &self.port_id, None);

        Ok(Port {
            port_id: self.port_id,
            station_id: self.station_id,
            status,
            last_ping,
            reported_at,
            cost_per_kwh: self.cost_per_kwh,
            avg_time_to_charge_minutes: self.avg_time_to_charge_minutes,
            sessions,
        })
    }
}

struct SessionRow {
    port_id: String,
    session_id: String,
    vehicle_id: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    duration_minutes: f64,
    charged_percent: f64,
    energy_consumed_kwh: f64,
    electricity_cost: f64,
    user_rating: Option<f64>,
    review: Option<String>,
}

impl SessionRow {
    fn into_session(self) -> ChargeSession {
        let session_id = Some(self.session_id.as_str());
        let start_time = stored_timestamp(self.start_time, "start_time", &self.port_id, session_id);
        let end_time = stored_timestamp(self.end_time, "end_time", &self.port_id, session_id);

        ChargeSession {
            session_id: self.session_id,
            vehicle_id: self.vehicle_id,
            start_time,
            end_time,
            duration_minutes: self.duration_minutes,
            charged_percent: self.charged_percent,
            energy_consumed_kwh: self.energy_consumed_kwh,
            electricity_cost: self.electricity_cost,
            user_rating: self.user_rating,
            review: self.review,
        }
    }
}

fn read_port_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PortRow> {
    Ok(PortRow {
        port_id: row.get(0)?,
        station_id: row.get(1)?,
        status: row.get(2)?,
        last_ping: row.get(3)?,
        reported_at: row.get(4)?,
        cost_per_kwh: row.get(5)?,
        avg_time_to_charge_minutes: row.get(6)?,
    })
}

fn read_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        port_id: row.get(0)?,
        session_id: row.get(1)?,
        vehicle_id: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        duration_minutes: row.get(5)?,
        charged_percent: row.get(6)?,
        energy_consumed_kwh: row.get(7)?,
        electricity_cost: row.get(8)?,
        user_rating: row.get(9)?,
        review: row.get(10)?,
    })
}

fn stored_timestamp(
    raw: Option<String>,
    field: &'static str,
    port_id: &str,
    session_id: Option<&str>,
) -> Option<Timestamp> {
    let raw = raw?;
    let parsed = parse_iso8601(&raw);
    if parsed.is_none() {
        tracing::warn!(
            port_id,
            session_id = session_id.unwrap_or("-"),
            field,
            value = %raw,
            "malformed timestamp in port store"
        );
    }
    parsed
}

fn constraint_to_conflict(error: rusqlite::Error, what: String) -> DbError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            DbError::Conflict(what)
        }
        _ => DbError::Sqlite(error),
    }
}
