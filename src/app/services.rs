use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use thiserror::Error;

use crate::adapters::db;
use crate::adapters::db::DbError;
use crate::domain::anomaly::{NoopSessionClassifier, SessionClassifier};
use crate::domain::models::{
    ChargeSession, NewChargeSessionRecord, NewPortRecord, Port, PortStatus, Timestamp,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("port store unavailable: {0}")]
    StoreUnavailable(#[source] DbError),
    #[error("port {0} does not exist")]
    PortNotFound(String),
    #[error("record already exists: {0}")]
    Conflict(String),
}

impl From<DbError> for ServiceError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::PortNotFound(port_id) => Self::PortNotFound(port_id),
            DbError::Conflict(what) => Self::Conflict(what),
            other => Self::StoreUnavailable(other),
        }
    }
}

pub trait PortQueryHandler {
    fn fetch_all_ports(&self) -> Result<Vec<Port>, ServiceError>;
    fn fetch_port(&self, port_id: &str) -> Result<Option<Port>, ServiceError>;
    fn get_schema_version(&self) -> Result<u32, ServiceError>;
}

pub trait PortCommandHandler {
    fn create_port(&self, new_port: &NewPortRecord) -> Result<(), ServiceError>;
    fn append_session(
        &self,
        port_id: &str,
        new_session: NewChargeSessionRecord,
    ) -> Result<ChargeSession, ServiceError>;
    fn report_status(
        &self,
        port_id: &str,
        status: PortStatus,
        reported_at: &Timestamp,
    ) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct SqlitePortService {
    connection: Arc<Mutex<Connection>>,
    classifier: Arc<dyn SessionClassifier + Send + Sync>,
}

impl SqlitePortService {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self::with_classifier(connection, Arc::new(NoopSessionClassifier))
    }

    pub fn with_classifier(
        connection: Arc<Mutex<Connection>>,
        classifier: Arc<dyn SessionClassifier + Send + Sync>,
    ) -> Self {
        Self {
            connection,
            classifier,
        }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, ServiceError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| ServiceError::DbLockPoisoned)?;
        op(&connection).map_err(ServiceError::from)
    }
}

impl PortQueryHandler for SqlitePortService {
    fn fetch_all_ports(&self) -> Result<Vec<Port>, ServiceError> {
        self.with_connection(db::list_ports_with_sessions)
    }

    fn fetch_port(&self, port_id: &str) -> Result<Option<Port>, ServiceError> {
        self.with_connection(|connection| db::get_port_with_sessions(connection, port_id))
    }

    fn get_schema_version(&self) -> Result<u32, ServiceError> {
        self.with_connection(db::schema_version)
    }
}

impl PortCommandHandler for SqlitePortService {
    fn create_port(&self, new_port: &NewPortRecord) -> Result<(), ServiceError> {
        self.with_connection(|connection| db::insert_port(connection, new_port))?;

        tracing::info!(
            port_id = %new_port.port_id,
            station_id = %new_port.station_id,
            status = %new_port.status,
            "port registered"
        );
        Ok(())
    }

    fn append_session(
        &self,
        port_id: &str,
        new_session: NewChargeSessionRecord,
    ) -> Result<ChargeSession, ServiceError> {
        let row_id = self.with_connection(|connection| {
            db::insert_charge_session(connection, port_id, &new_session)
        })?;

        let session = new_session.into_session();
        tracing::info!(
            row_id,
            port_id,
            session_id = %session.session_id,
            kwh = session.energy_consumed_kwh,
            "charging session recorded"
        );

        if self.classifier.classify(&session).suspicious {
            tracing::warn!(
                port_id,
                session_id = %session.session_id,
                "charging session flagged as suspicious"
            );
        }

        Ok(session)
    }

    fn report_status(
        &self,
        port_id: &str,
        status: PortStatus,
        reported_at: &Timestamp,
    ) -> Result<(), ServiceError> {
        self.with_connection(|connection| {
            db::update_port_status(connection, port_id, status, reported_at)
        })?;

        tracing::info!(port_id, status = %status, "port status reported");
        Ok(())
    }
}
