use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

pub type Timestamp = DateTime<Utc>;

pub fn to_iso8601(timestamp: &Timestamp) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_iso8601(raw: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|value| value.with_timezone(&Utc))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStatus {
    Idle,
    Charging,
    Fault,
    Offline,
}

impl PortStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Charging => "charging",
            Self::Fault => "fault",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown port status '{0}'; expected idle, charging, fault or offline")]
pub struct UnknownPortStatus(pub String);

impl FromStr for PortStatus {
    type Err = UnknownPortStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "charging" => Ok(Self::Charging),
            "fault" => Ok(Self::Fault),
            "offline" => Ok(Self::Offline),
            _ => Err(UnknownPortStatus(value.to_string())),
        }
    }
}

/// One vehicle-charging event recorded on a port.
///
/// Time fields are `None` when the stored value could not be parsed; such a
/// session still contributes energy but is skipped by every window comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeSession {
    pub session_id: String,
    pub vehicle_id: Option<String>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub duration_minutes: f64,
    pub charged_percent: f64,
    pub energy_consumed_kwh: f64,
    pub electricity_cost: f64,
    pub user_rating: Option<f64>,
    pub review: Option<String>,
}

/// A charging connector together with its session history in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub port_id: String,
    pub station_id: String,
    pub status: PortStatus,
    pub last_ping: Option<Timestamp>,
    pub reported_at: Option<Timestamp>,
    pub cost_per_kwh: f64,
    pub avg_time_to_charge_minutes: f64,
    pub sessions: Vec<ChargeSession>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPortRecord {
    pub port_id: String,
    pub station_id: String,
    pub status: PortStatus,
    pub last_ping: Timestamp,
    pub reported_at: Timestamp,
    pub cost_per_kwh: f64,
    pub avg_time_to_charge_minutes: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewChargeSessionRecord {
    pub session_id: String,
    pub vehicle_id: Option<String>,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub duration_minutes: f64,
    pub charged_percent: f64,
    pub energy_consumed_kwh: f64,
    pub electricity_cost: f64,
    pub user_rating: Option<f64>,
    pub review: Option<String>,
}

impl NewChargeSessionRecord {
    pub fn into_session(self) -> ChargeSession {
        ChargeSession {
            session_id: self.session_id,
            vehicle_id: self.vehicle_id,
            start_time: Some(self.start_time),
            end_time: Some(self.end_time),
            duration_minutes: self.duration_minutes,
            charged_percent: self.charged_percent,
            energy_consumed_kwh: self.energy_consumed_kwh,
            electricity_cost: self.electricity_cost,
            user_rating: self.user_rating,
            review: self.review,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PortStatus, UnknownPortStatus, parse_iso8601, to_iso8601};

    #[test]
    fn parses_statuses_case_insensitively() {
        assert_eq!("fault".parse::<PortStatus>(), Ok(PortStatus::Fault));
        assert_eq!(" Charging ".parse::<PortStatus>(), Ok(PortStatus::Charging));
        assert_eq!(PortStatus::Offline.as_str(), "offline");
    }

    #[test]
    fn rejects_unknown_status() {
        let result = "broken".parse::<PortStatus>();
        assert_eq!(result, Err(UnknownPortStatus("broken".to_string())));
        assert_eq!(
            result.unwrap_err().to_string(),
            "unknown port status 'broken'; expected idle, charging, fault or offline"
        );
    }

    #[test]
    fn normalizes_timestamps_to_utc_millis() {
        let parsed = parse_iso8601("2026-02-20T19:12:03.12+01:00").expect("should parse");
        assert_eq!(to_iso8601(&parsed), "2026-02-20T18:12:03.120Z");
        assert_eq!(parse_iso8601("yesterday"), None);
    }
}
