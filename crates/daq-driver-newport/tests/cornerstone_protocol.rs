//! Wire-level behaviour against a simulated Cornerstone on a duplex stream.
#![allow(clippy::unwrap_used)]

use daq_core::capabilities::{FilterSelect, GratingSelect, ShutterControl, WavelengthTunable};
use daq_driver_newport::{CornerstoneConfig, CornerstoneDriver, ShutterState};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Debug, Clone)]
struct FakeState {
    wave: String,
    grating: u8,
    shutter: char,
    filter: u8,
}

/// Echoes every line, answers queries from `FakeState`, and logs commands.
struct FakeCornerstone {
    state: Arc<Mutex<FakeState>>,
    log: Arc<Mutex<Vec<String>>>,
    /// Resolves to `true` once the host side reaches a clean EOF.
    task: tokio::task::JoinHandle<bool>,
}

impl FakeCornerstone {
    fn spawn(initial: FakeState) -> (Self, tokio::io::DuplexStream) {
        let (host, device) = tokio::io::duplex(1024);
        let state = Arc::new(Mutex::new(initial));
        let log = Arc::new(Mutex::new(Vec::new()));

        let task_state = state.clone();
        let task_log = log.clone();
        let task = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(host);
            let mut lines = BufReader::new(read).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => return true,
                    Err(_) => return false,
                };
                let cmd = line.trim().to_string();
                task_log.lock().unwrap().push(cmd.clone());
                let reply = respond(&mut task_state.lock().unwrap(), &cmd);
                let mut out = format!("{}\r\n", cmd);
                if let Some(reply) = reply {
                    out.push_str(&reply);
                    out.push_str("\r\n");
                }
                if write.write_all(out.as_bytes()).await.is_err() {
                    return false;
                }
            }
        });

        (Self { state, log, task }, device)
    }

    fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn state(&self) -> FakeState {
        self.state.lock().unwrap().clone()
    }
}

fn respond(state: &mut FakeState, cmd: &str) -> Option<String> {
    let (verb, arg) = match cmd.split_once(' ') {
        Some((verb, arg)) => (verb, Some(arg.trim())),
        None => (cmd, None),
    };
    match (verb, arg) {
        ("wave?", None) => Some(state.wave.clone()),
        ("info?", None) => Some("Cornerstone 130 v2.5".to_string()),
        ("GRAT?", None) => Some(format!("{},1200,500", state.grating)),
        ("SHUTTER?", None) => Some(state.shutter.to_string()),
        ("filter?", None) => Some(state.filter.to_string()),
        ("gowave", Some(nm)) => {
            state.wave = format!("{:.3}", nm.parse::<f64>().unwrap());
            None
        }
        ("GRAT", Some(n)) => {
            state.grating = n.parse().unwrap();
            None
        }
        ("SHUTTER", Some(s)) => {
            state.shutter = s.chars().next().unwrap();
            None
        }
        ("filter", Some(n)) => {
            state.filter = n.parse().unwrap();
            None
        }
        _ => None,
    }
}

fn initial() -> FakeState {
    FakeState {
        wave: "500.000".to_string(),
        grating: 1,
        shutter: 'C',
        filter: 1,
    }
}

fn config() -> CornerstoneConfig {
    let mut cfg = CornerstoneConfig::new("fake");
    cfg.serial.timeout_ms = 500;
    cfg.scan_settle_ms = 0;
    cfg
}

async fn connected(state: FakeState) -> (FakeCornerstone, CornerstoneDriver) {
    let (fake, port) = FakeCornerstone::spawn(state);
    let driver = CornerstoneDriver::connect(Box::new(port), &config())
        .await
        .unwrap();
    (fake, driver)
}

#[tokio::test]
async fn connect_probes_wavelength() {
    let (fake, driver) = connected(initial()).await;
    assert_eq!(fake.commands(), vec!["wave?"]);
    assert_eq!(driver.info().await.unwrap(), "Cornerstone 130 v2.5");
}

#[tokio::test]
async fn close_shuts_down_the_port() {
    let (fake, driver) = connected(initial()).await;
    driver.close().await.unwrap();

    let clean_eof = tokio::time::timeout(Duration::from_secs(1), fake.task)
        .await
        .expect("device side still reading after close")
        .unwrap();
    assert!(clean_eof);
    assert_eq!(fake.log.lock().unwrap().as_slice(), ["wave?"]);
}

#[tokio::test]
async fn gowave_below_threshold_keeps_short_filter() {
    let (fake, driver) = connected(initial()).await;
    driver.go_wavelength(550.0).await.unwrap();

    assert_eq!(fake.commands(), vec!["wave?", "filter?", "gowave 550"]);
    assert!((driver.wavelength().await.unwrap() - 550.0).abs() < 1e-9);
}

#[tokio::test]
async fn gowave_above_threshold_switches_filter_once() {
    let (fake, driver) = connected(initial()).await;
    driver.go_wavelength(700.5).await.unwrap();
    driver.go_wavelength(800.0).await.unwrap();

    assert_eq!(
        fake.commands(),
        vec![
            "wave?",
            "filter?",
            "filter 2",
            "gowave 700.5",
            "filter?",
            "gowave 800"
        ]
    );
    assert_eq!(fake.state().filter, 2);
}

#[tokio::test]
async fn grating_shutter_and_filter_round_trip() {
    let (fake, driver) = connected(initial()).await;

    driver.set_grating(3).await.unwrap();
    assert_eq!(driver.grating().await.unwrap(), 3);

    driver.set_shutter(ShutterState::Open).await.unwrap();
    assert_eq!(driver.shutter().await.unwrap(), ShutterState::Open);

    driver.set_filter(5).await.unwrap();
    assert_eq!(driver.filter().await.unwrap(), 5);

    let sent = fake.commands();
    assert!(sent.contains(&"GRAT 3".to_string()));
    assert!(sent.contains(&"SHUTTER O".to_string()));
    assert!(sent.contains(&"filter 5".to_string()));
}

#[tokio::test]
async fn state_reports_unparsable_wavelength_as_none() {
    let mut start = initial();
    start.wave = "ERR".to_string();
    let (fake, port) = FakeCornerstone::spawn(start);
    let driver = CornerstoneDriver::with_port(Box::new(port), &config());

    let state = driver.state().await.unwrap();
    assert_eq!(state.wavelength_nm, None);
    assert_eq!(state.grating, 1);
    assert_eq!(state.shutter, ShutterState::Closed);
    assert!(fake.commands().ends_with(&["GRAT?".to_string(), "SHUTTER?".to_string()]));
}

#[tokio::test]
async fn scan_visits_each_step() {
    let (fake, driver) = connected(initial()).await;
    let visited = driver
        .scan(590.0, 610.0, 10.0, Duration::from_millis(1))
        .await
        .unwrap();
    assert_eq!(visited, vec![590.0, 600.0, 610.0]);

    let moves: Vec<String> = fake
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("gowave") || c.starts_with("filter "))
        .collect();
    assert_eq!(
        moves,
        vec!["gowave 590", "filter 2", "gowave 600", "gowave 610"]
    );
}

#[tokio::test]
async fn capability_traits_drive_the_same_device() {
    let (fake, driver) = connected(initial()).await;

    let tunable: &dyn WavelengthTunable = &driver;
    assert!(tunable.set_wavelength(2000.0).await.is_err());
    tunable.set_wavelength(650.0).await.unwrap();
    assert!((tunable.get_wavelength().await.unwrap() - 650.0).abs() < 1e-9);

    let shutter: &dyn ShutterControl = &driver;
    shutter.open_shutter().await.unwrap();
    assert!(shutter.is_shutter_open().await.unwrap());
    shutter.close_shutter().await.unwrap();
    assert!(!shutter.is_shutter_open().await.unwrap());

    let filters: &dyn FilterSelect = &driver;
    assert_eq!(filters.slot_count().await.unwrap(), 6);
    filters.select_slot(4).await.unwrap();
    assert_eq!(filters.slot().await.unwrap(), 4);

    let gratings: &dyn GratingSelect = &driver;
    assert_eq!(gratings.grating_count(), 3);
    gratings.select_grating(2).await.unwrap();
    assert_eq!(gratings.grating().await.unwrap(), 2);
    assert!(gratings.select_grating(4).await.is_err());

    assert_eq!(fake.state().grating, 2);
}
