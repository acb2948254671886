//! Port analytics: per-port energy totals, trailing traffic windows and the
//! fleet-wide fault counts that are attached to every summary.
//!
//! Everything here is a pure function of its inputs plus one reference
//! instant. Callers either pass `now` explicitly or hand over a [`Clock`],
//! which is read exactly once per aggregation run.

use chrono::{DateTime, Duration, Utc};

use crate::domain::models::{ChargeSession, Port, PortStatus, Timestamp};

pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Lower bounds of the three trailing windows, all derived from the same `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCutoffs {
    pub last_day: Timestamp,
    pub last_7_days: Timestamp,
    pub last_30_days: Timestamp,
}

impl WindowCutoffs {
    pub fn from_now(now: Timestamp) -> Self {
        Self {
            last_day: days_before(now, 1),
            last_7_days: days_before(now, 7),
            last_30_days: days_before(now, 30),
        }
    }
}

// Saturates at the earliest representable instant instead of panicking.
fn days_before(now: Timestamp, days: i64) -> Timestamp {
    now.checked_sub_signed(Duration::days(days))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Event counts per trailing window. Windows nest, so a single event can
/// land in all three.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounts {
    pub last_day: u32,
    pub last_7_days: u32,
    pub last_30_days: u32,
}

impl WindowCounts {
    fn record(&mut self, at: Timestamp, cutoffs: &WindowCutoffs) {
        if at >= cutoffs.last_day {
            self.last_day += 1;
        }
        if at >= cutoffs.last_7_days {
            self.last_7_days += 1;
        }
        if at >= cutoffs.last_30_days {
            self.last_30_days += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortSummary {
    pub port_id: String,
    pub station_id: String,
    pub status: PortStatus,
    pub last_ping: Option<Timestamp>,
    pub reported_at: Option<Timestamp>,
    pub cost_per_kwh: f64,
    pub avg_time_to_charge_minutes: f64,
    pub session_count: usize,
    pub total_energy_consumed_kwh: f64,
    /// `None` when the port has no sessions.
    pub average_energy_consumed_kwh: Option<f64>,
    pub traffic_windows: WindowCounts,
    pub fault_counts: WindowCounts,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortDetail {
    pub port_id: String,
    pub station_id: String,
    pub status: PortStatus,
    pub last_ping: Option<Timestamp>,
    pub reported_at: Option<Timestamp>,
    pub cost_per_kwh: f64,
    pub avg_time_to_charge_minutes: f64,
    pub total_energy_consumed_kwh: f64,
    pub average_energy_consumed_kwh: Option<f64>,
    pub sessions: Vec<ChargeSession>,
}

impl PortDetail {
    pub fn latest_session(&self) -> Option<&ChargeSession> {
        self.sessions.last()
    }
}

#[derive(Debug, Default)]
struct SessionScan {
    total_kwh: f64,
    session_count: usize,
    traffic: WindowCounts,
    untimed: usize,
}

impl SessionScan {
    fn run(sessions: &[ChargeSession], cutoffs: Option<&WindowCutoffs>) -> Self {
        let mut scan = Self::default();

        for session in sessions {
            scan.total_kwh += session.energy_consumed_kwh;
            scan.session_count += 1;

            let Some(cutoffs) = cutoffs else {
                continue;
            };
            match session.end_time {
                Some(end_time) => scan.traffic.record(end_time, cutoffs),
                None => scan.untimed += 1,
            }
        }

        scan
    }

    fn average_kwh(&self) -> Option<f64> {
        (self.session_count > 0).then(|| self.total_kwh / self.session_count as f64)
    }
}

/// Builds one summary per port, in input order, against a single `now`.
pub fn aggregate(ports: Vec<Port>, now: Timestamp) -> Vec<PortSummary> {
    let cutoffs = WindowCutoffs::from_now(now);
    let fault_counts = count_recent_faults(&ports, &cutoffs);

    tracing::debug!(
        ports = ports.len(),
        now = %now,
        fault_last_day = fault_counts.last_day,
        fault_last_7_days = fault_counts.last_7_days,
        fault_last_30_days = fault_counts.last_30_days,
        "aggregating port summaries"
    );

    ports
        .into_iter()
        .map(|port| summarize_port(port, &cutoffs, fault_counts))
        .collect()
}

/// Same as [`aggregate`], reading `now` from the clock once up front.
pub fn aggregate_at<C: Clock + ?Sized>(ports: Vec<Port>, clock: &C) -> Vec<PortSummary> {
    let now = clock.now();
    aggregate(ports, now)
}

/// Energy figures for a single port with its session history kept verbatim.
pub fn aggregate_one(port: Port) -> PortDetail {
    let scan = SessionScan::run(&port.sessions, None);
    let average_energy_consumed_kwh = scan.average_kwh();

    PortDetail {
        port_id: port.port_id,
        station_id: port.station_id,
        status: port.status,
        last_ping: port.last_ping,
        reported_at: port.reported_at,
        cost_per_kwh: port.cost_per_kwh,
        avg_time_to_charge_minutes: port.avg_time_to_charge_minutes,
        total_energy_consumed_kwh: scan.total_kwh,
        average_energy_consumed_kwh,
        sessions: port.sessions,
    }
}

/// Counts ports currently in `fault` whose last report falls inside each window.
pub fn count_recent_faults(ports: &[Port], cutoffs: &WindowCutoffs) -> WindowCounts {
    let mut counts = WindowCounts::default();

    for port in ports.iter().filter(|port| port.status == PortStatus::Fault) {
        match port.reported_at {
            Some(reported_at) => counts.record(reported_at, cutoffs),
            None => tracing::warn!(
                port_id = %port.port_id,
                "faulted port has no comparable reported_at; excluded from fault counts"
            ),
        }
    }

    counts
}

fn summarize_port(port: Port, cutoffs: &WindowCutoffs, fault_counts: WindowCounts) -> PortSummary {
    let scan = SessionScan::run(&port.sessions, Some(cutoffs));

    if scan.untimed > 0 {
        tracing::warn!(
            port_id = %port.port_id,
            sessions = scan.untimed,
            "sessions without a comparable end_time excluded from traffic windows"
        );
    }

    PortSummary {
        average_energy_consumed_kwh: scan.average_kwh(),
        port_id: port.port_id,
        station_id: port.station_id,
        status: port.status,
        last_ping: port.last_ping,
        reported_at: port.reported_at,
        cost_per_kwh: port.cost_per_kwh,
        avg_time_to_charge_minutes: port.avg_time_to_charge_minutes,
        session_count: scan.session_count,
        total_energy_consumed_kwh: scan.total_kwh,
        traffic_windows: scan.traffic,
        fault_counts,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use crate::domain::models::{ChargeSession, Port, PortStatus, Timestamp};

    use super::{
        Clock, WindowCounts, WindowCutoffs, aggregate, aggregate_at, aggregate_one,
        count_recent_faults,
    };

    fn fixed_now() -> Timestamp {
        DateTime::parse_from_rfc3339("2026-03-15T12:00:00Z")
            .expect("timestamp should parse")
            .with_timezone(&Utc)
    }

    fn session(id: &str, end_time: Option<Timestamp>, kwh: f64) -> ChargeSession {
        ChargeSession {
            session_id: id.to_string(),
            vehicle_id: None,
            start_time: end_time.map(|end| end - Duration::minutes(45)),
            end_time,
            duration_minutes: 45.0,
            charged_percent: 60.0,
            energy_consumed_kwh: kwh,
            electricity_cost: kwh * 0.3,
            user_rating: None,
            review: None,
        }
    }

    fn port(id: &str, status: PortStatus, reported_at: Option<Timestamp>) -> Port {
        Port {
            port_id: id.to_string(),
            station_id: "station-1".to_string(),
            status,
            last_ping: reported_at,
            reported_at,
            cost_per_kwh: 0.3,
            avg_time_to_charge_minutes: 42.0,
            sessions: Vec::new(),
        }
    }

    struct FixedClock(Timestamp);

    impl Clock for FixedClock {
        fn now(&self) -> Timestamp {
            self.0
        }
    }

    #[test]
    fn sums_energy_and_counts_nested_traffic_windows() {
        let now = fixed_now();
        let mut p1 = port("P1", PortStatus::Idle, Some(now));
        p1.sessions = vec![
            session("s1", Some(now - Duration::hours(2)), 5.0),
            session("s2", Some(now - Duration::days(10)), 3.0),
        ];

        let summaries = aggregate(vec![p1], now);

        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert_eq!(summary.total_energy_consumed_kwh, 8.0);
        assert_eq!(summary.average_energy_consumed_kwh, Some(4.0));
        assert_eq!(summary.session_count, 2);
        assert_eq!(
            summary.traffic_windows,
            WindowCounts {
                last_day: 1,
                last_7_days: 1,
                last_30_days: 2,
            }
        );
    }

    #[test]
    fn port_without_sessions_has_no_average() {
        let now = fixed_now();
        let summaries = aggregate(vec![port("P2", PortStatus::Idle, Some(now))], now);

        let summary = &summaries[0];
        assert_eq!(summary.total_energy_consumed_kwh, 0.0);
        assert_eq!(summary.average_energy_consumed_kwh, None);
        assert_eq!(summary.traffic_windows, WindowCounts::default());
    }

    #[test]
    fn fleet_fault_counts_are_attached_to_every_summary() {
        let now = fixed_now();
        let ports = vec![
            port("F1", PortStatus::Fault, Some(now - Duration::hours(12))),
            port("F2", PortStatus::Fault, Some(now - Duration::days(5))),
            port("F3", PortStatus::Fault, Some(now - Duration::days(20))),
            port("OK", PortStatus::Charging, Some(now - Duration::hours(1))),
        ];

        let summaries = aggregate(ports, now);
        let expected = WindowCounts {
            last_day: 1,
            last_7_days: 2,
            last_30_days: 3,
        };

        assert_eq!(summaries.len(), 4);
        for summary in &summaries {
            assert_eq!(summary.fault_counts, expected);
        }
    }

    #[test]
    fn non_fault_ports_and_stale_reports_are_not_counted() {
        let now = fixed_now();
        let ports = vec![
            port("old", PortStatus::Fault, Some(now - Duration::days(45))),
            port("offline", PortStatus::Offline, Some(now)),
            port("unknown", PortStatus::Fault, None),
        ];

        let counts = count_recent_faults(&ports, &WindowCutoffs::from_now(now));

        assert_eq!(counts, WindowCounts::default());
    }

    #[test]
    fn preserves_input_order_and_length() {
        let now = fixed_now();
        let ports = vec![
            port("c", PortStatus::Idle, Some(now)),
            port("a", PortStatus::Idle, Some(now)),
            port("a", PortStatus::Offline, Some(now)),
            port("b", PortStatus::Charging, Some(now)),
        ];

        let ids: Vec<String> = aggregate(ports, now)
            .into_iter()
            .map(|summary| summary.port_id)
            .collect();

        assert_eq!(ids, vec!["c", "a", "a", "b"]);
    }

    #[test]
    fn cutoffs_saturate_near_earliest_instant() {
        let now = DateTime::<Utc>::MIN_UTC + Duration::days(3);
        let mut p = port("P", PortStatus::Fault, Some(now));
        p.sessions = vec![session("s", Some(now), 2.0)];

        let cutoffs = WindowCutoffs::from_now(now);
        assert_eq!(cutoffs.last_day, now - Duration::days(1));
        assert_eq!(cutoffs.last_7_days, DateTime::<Utc>::MIN_UTC);
        assert_eq!(cutoffs.last_30_days, DateTime::<Utc>::MIN_UTC);

        let summary = &aggregate(vec![p], now)[0];
        let all_windows = WindowCounts {
            last_day: 1,
            last_7_days: 1,
            last_30_days: 1,
        };
        assert_eq!(summary.traffic_windows, all_windows);
        assert_eq!(summary.fault_counts, all_windows);
        assert!(aggregate(Vec::new(), DateTime::<Utc>::MIN_UTC).is_empty());
    }

    #[test]
    fn empty_fleet_yields_empty_result() {
        assert!(aggregate(Vec::new(), fixed_now()).is_empty());
    }

    #[test]
    fn window_lower_bound_is_inclusive() {
        let now = fixed_now();
        let mut p = port("edge", PortStatus::Idle, Some(now));
        p.sessions = vec![
            session("day", Some(now - Duration::days(1)), 1.0),
            session("week", Some(now - Duration::days(7)), 1.0),
            session("month", Some(now - Duration::days(30)), 1.0),
            session("too-old", Some(now - Duration::days(30) - Duration::seconds(1)), 1.0),
        ];

        let summary = &aggregate(vec![p], now)[0];

        assert_eq!(
            summary.traffic_windows,
            WindowCounts {
                last_day: 1,
                last_7_days: 2,
                last_30_days: 3,
            }
        );
        assert_eq!(summary.total_energy_consumed_kwh, 4.0);
    }

    #[test]
    fn windows_nest_for_every_port() {
        let now = fixed_now();
        let ports: Vec<Port> = (0..5)
            .map(|idx| {
                let mut p = port(&format!("P{idx}"), PortStatus::Idle, Some(now));
                p.sessions = (0..12)
                    .map(|offset| {
                        session(
                            &format!("s{offset}"),
                            Some(now - Duration::hours(7 * offset * (idx + 1))),
                            1.5,
                        )
                    })
                    .collect();
                p
            })
            .collect();

        for summary in aggregate(ports, now) {
            let windows = summary.traffic_windows;
            assert!(windows.last_day <= windows.last_7_days);
            assert!(windows.last_7_days <= windows.last_30_days);
        }
    }

    #[test]
    fn session_without_end_time_counts_energy_but_no_traffic() {
        let now = fixed_now();
        let mut p = port("P", PortStatus::Idle, Some(now));
        p.sessions = vec![
            session("broken", None, 2.5),
            session("ok", Some(now - Duration::hours(1)), 1.5),
        ];

        let summary = &aggregate(vec![p], now)[0];

        assert_eq!(summary.total_energy_consumed_kwh, 4.0);
        assert_eq!(summary.average_energy_consumed_kwh, Some(2.0));
        assert_eq!(
            summary.traffic_windows,
            WindowCounts {
                last_day: 1,
                last_7_days: 1,
                last_30_days: 1,
            }
        );
    }

    #[test]
    fn negative_energy_is_passed_through_uncorrected() {
        let now = fixed_now();
        let mut p = port("P", PortStatus::Idle, Some(now));
        p.sessions = vec![
            session("neg", Some(now), -3.0),
            session("pos", Some(now), 1.0),
        ];

        let summary = &aggregate(vec![p], now)[0];

        assert_eq!(summary.total_energy_consumed_kwh, -2.0);
        assert_eq!(summary.average_energy_consumed_kwh, Some(-1.0));
    }

    #[test]
    fn repeated_runs_with_same_now_are_identical() {
        let now = fixed_now();
        let mut p = port("P", PortStatus::Fault, Some(now - Duration::hours(3)));
        p.sessions = vec![session("s", Some(now - Duration::days(2)), 7.0)];
        let ports = vec![p, port("Q", PortStatus::Idle, None)];

        let first = aggregate(ports.clone(), now);
        let second = aggregate(ports, now);

        assert_eq!(first, second);
    }

    #[test]
    fn clock_is_read_once_per_run() {
        let now = fixed_now();
        let mut p = port("P", PortStatus::Idle, Some(now));
        p.sessions = vec![session("s", Some(now - Duration::hours(23)), 1.0)];

        let summaries = aggregate_at(vec![p.clone()], &FixedClock(now));

        assert_eq!(summaries, aggregate(vec![p], now));
        assert_eq!(summaries[0].traffic_windows.last_day, 1);
    }

    #[test]
    fn detail_keeps_sessions_and_energy_figures() {
        let now = fixed_now();
        let mut p = port("P", PortStatus::Charging, Some(now));
        p.sessions = vec![
            session("first", Some(now - Duration::days(40)), 10.0),
            session("second", Some(now - Duration::hours(1)), 6.0),
        ];

        let detail = aggregate_one(p.clone());

        assert_eq!(detail.sessions, p.sessions);
        assert_eq!(detail.total_energy_consumed_kwh, 16.0);
        assert_eq!(detail.average_energy_consumed_kwh, Some(8.0));
        assert_eq!(
            detail.latest_session().map(|s| s.session_id.as_str()),
            Some("second")
        );
    }

    #[test]
    fn detail_for_port_without_sessions_has_no_average() {
        let detail = aggregate_one(port("P", PortStatus::Offline, None));

        assert_eq!(detail.total_energy_consumed_kwh, 0.0);
        assert_eq!(detail.average_energy_consumed_kwh, None);
        assert!(detail.latest_session().is_none());
    }
}
