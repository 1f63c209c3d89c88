// SPDX-License-Identifier: MIT OR Apache-2.0

//! Smoke test against real hardware.

use std::time::Duration;

use tokio::sync::mpsc;

use tokio_inetbox::server::{Config, Event, Server, SetRequest};

#[tokio::test]
#[ignore = "we need to mock a serial port to test this"]
async fn serve_and_shut_down() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = Server::new_from_path("/dev/ttyUSB0", 9600)?;

    let (_set_tx, set_rx) = mpsc::channel::<SetRequest>(16);
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(64);

    let listener = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("{event:?}");
        }
    });

    server
        .serve_until(
            Config::default(),
            set_rx,
            event_tx,
            tokio::time::sleep(Duration::from_secs(2)),
        )
        .await?;
    listener.abort();
    Ok(())
}

#[tokio::test]
#[ignore = "needs two connected serial devices"]
async fn second_instance_is_refused() {
    let _ = env_logger::builder().is_test(true).try_init();
    let first = Server::new_from_path("/dev/ttyUSB0", 9600);
    assert!(first.is_ok());
    // The UART is exclusive to one process.
    let second = Server::new_from_path("/dev/ttyUSB0", 9600);
    assert!(second.is_err());
}
