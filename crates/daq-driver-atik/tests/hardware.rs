//! Runs against a real wheel through the vendor library.
//!
//! `cargo test -p daq-driver-atik --features hardware_tests -- --test-threads=1`
#![cfg(feature = "hardware_tests")]
#![allow(clippy::unwrap_used)]

use daq_driver_atik::{AtikFilterWheel, LibraryEfwSdk, WheelOptions};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn first_wheel_on_bus_moves_and_reports_position() {
    let sdk = Arc::new(LibraryEfwSdk::load(None).unwrap());
    let indices = AtikFilterWheel::available_filter_wheels(sdk.as_ref());
    assert!(!indices.is_empty(), "no filter wheel on the bus");

    let options = WheelOptions {
        settle_timeout: Some(Duration::from_secs(30)),
        ..WheelOptions::default()
    };
    let wheel = AtikFilterWheel::new(sdk, options);
    wheel.connect(indices[0]).await.unwrap();

    let details = wheel.details().unwrap();
    assert_ne!(details.serial_number, 0);

    let count = wheel.number_of_filters().unwrap();
    assert!(count > 0);
    let target = (wheel.position().unwrap() + 1) % count;
    wheel.set_position(target).await.unwrap();
    assert_eq!(wheel.position().unwrap(), target);
    assert!(!wheel.is_moving().unwrap());

    wheel.disconnect().unwrap();
    assert!(!wheel.is_connected());
}
