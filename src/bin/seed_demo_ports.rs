use std::path::Path;

use chrono::{Duration, Utc};
use ev_port_dashboard::adapters::db::{
    count_ports, insert_charge_session, insert_port, open_connection, run_migrations,
    schema_version,
};
use ev_port_dashboard::domain::models::{
    NewChargeSessionRecord, NewPortRecord, PortStatus, Timestamp,
};

struct DemoPort {
    port_id: &'static str,
    station_id: &'static str,
    status: PortStatus,
    reported_hours_ago: i64,
    cost_per_kwh: f64,
    avg_time_to_charge_minutes: f64,
    /// (hours before now the session ended, minutes, kWh, rating)
    sessions: &'static [(i64, i64, f64, Option<f64>)],
}

const DEMO_PORTS: &[DemoPort] = &[
    DemoPort {
        port_id: "STN-001-P1",
        station_id: "STN-001",
        status: PortStatus::Charging,
        reported_hours_ago: 0,
        cost_per_kwh: 0.32,
        avg_time_to_charge_minutes: 52.0,
        sessions: &[
            (600, 65, 28.4, Some(4.5)),
            (150, 40, 17.2, None),
            (30, 55, 22.9, Some(5.0)),
            (2, 35, 12.1, Some(4.0)),
        ],
    },
    DemoPort {
        port_id: "STN-001-P2",
        station_id: "STN-001",
        status: PortStatus::Fault,
        reported_hours_ago: 12,
        cost_per_kwh: 0.32,
        avg_time_to_charge_minutes: 47.0,
        sessions: &[(240, 50, 19.8, Some(3.5)), (100, 45, 18.0, None)],
    },
    DemoPort {
        port_id: "STN-002-P1",
        station_id: "STN-002",
        status: PortStatus::Fault,
        reported_hours_ago: 120,
        cost_per_kwh: 0.29,
        avg_time_to_charge_minutes: 60.0,
        sessions: &[(400, 70, 31.5, Some(2.0))],
    },
    DemoPort {
        port_id: "STN-002-P2",
        station_id: "STN-002",
        status: PortStatus::Idle,
        reported_hours_ago: 1,
        cost_per_kwh: 0.29,
        avg_time_to_charge_minutes: 0.0,
        sessions: &[],
    },
    DemoPort {
        port_id: "STN-003-P1",
        station_id: "STN-003",
        status: PortStatus::Offline,
        reported_hours_ago: 480,
        cost_per_kwh: 0.35,
        avg_time_to_charge_minutes: 44.0,
        sessions: &[(500, 30, 9.6, None)],
    },
];

fn main() {
    if let Err(error) = run() {
        eprintln!("failed to seed demo ports: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut path = "./data/ports.db".to_string();
    let mut force = false;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--path" => {
                let Some(value) = args.get(index + 1) else {
                    return Err("--path requires a value".to_string());
                };
                path = value.clone();
                index += 2;
            }
            "--force" => {
                force = true;
                index += 1;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
    }

    let path_ref = Path::new(&path);
    if let Some(parent) = path_ref.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|error| format!("failed to create parent directory: {error}"))?;
    }

    if force && path_ref.exists() {
        std::fs::remove_file(path_ref)
            .map_err(|error| format!("failed to remove existing db file: {error}"))?;
    }

    let mut connection = open_connection(&path).map_err(|error| error.to_string())?;
    run_migrations(&mut connection).map_err(|error| error.to_string())?;

    if count_ports(&connection).map_err(|error| error.to_string())? > 0 {
        return Err(format!(
            "{path} already contains ports; pass --force to recreate it"
        ));
    }

    let now = Utc::now();
    let mut session_total = 0_usize;
    for demo in DEMO_PORTS {
        insert_port(&connection, &demo_port_record(demo, now)).map_err(|error| error.to_string())?;

        for (index, session) in demo.sessions.iter().enumerate() {
            let record = demo_session_record(demo, index, *session, now);
            insert_charge_session(&connection, demo.port_id, &record)
                .map_err(|error| error.to_string())?;
            session_total += 1;
        }
    }

    let version = schema_version(&connection).map_err(|error| error.to_string())?;

    println!("seeded demo ports into: {path}");
    println!("schema version: {version}");
    println!("ports: {}, sessions: {session_total}", DEMO_PORTS.len());
    Ok(())
}

fn demo_port_record(demo: &DemoPort, now: Timestamp) -> NewPortRecord {
    let reported_at = now - Duration::hours(demo.reported_hours_ago);
    NewPortRecord {
        port_id: demo.port_id.to_string(),
        station_id: demo.station_id.to_string(),
        status: demo.status,
        last_ping: reported_at,
        reported_at,
        cost_per_kwh: demo.cost_per_kwh,
        avg_time_to_charge_minutes: demo.avg_time_to_charge_minutes,
    }
}

fn demo_session_record(
    demo: &DemoPort,
    index: usize,
    (ended_hours_ago, minutes, kwh, rating): (i64, i64, f64, Option<f64>),
    now: Timestamp,
) -> NewChargeSessionRecord {
    let end_time = now - Duration::hours(ended_hours_ago);
    NewChargeSessionRecord {
        session_id: format!("{}-S{:03}", demo.port_id, index + 1),
        vehicle_id: (index % 2 == 0).then(|| format!("EV-{:04}", 1000 + index * 37)),
        start_time: end_time - Duration::minutes(minutes),
        end_time,
        duration_minutes: minutes as f64,
        charged_percent: (kwh * 1.6).min(100.0),
        energy_consumed_kwh: kwh,
        electricity_cost: (kwh * demo.cost_per_kwh * 100.0).round() / 100.0,
        user_rating: rating,
        review: rating.filter(|value| *value >= 4.5).map(|_| "fast and reliable".to_string()),
    }
}

fn print_help() {
    println!("seed_demo_ports");
    println!();
    println!("Usage:");
    println!("  cargo run --bin seed_demo_ports -- [--path <file>] [--force]");
    println!();
    println!("Options:");
    println!("  --path <file>   target sqlite file (default: ./data/ports.db)");
    println!("  --force         delete existing file before seeding");
}
