fn main() {
    if let Err(err) = ev_port_dashboard::app::run_api() {
        eprintln!("api startup failed: {err}");
        std::process::exit(1);
    }
}
