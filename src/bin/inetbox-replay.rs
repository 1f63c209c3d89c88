// SPDX-License-Identifier: MIT OR Apache-2.0

//! Replay a LIN bus capture through the protocol stack.
//!
//! Reads a text log of hex-encoded frames, runs them through the
//! receive codec and the passive layers, and prints the telemetry a
//! live bus would have produced. `RUST_LOG=debug` exposes the frame
//! trace.

use std::{
    fs::File,
    io::{self, BufReader},
    path::PathBuf,
    time::Instant,
};

use clap::Parser;

use tokio_inetbox::{
    frame::{DataFrame, PID_DIAG_REQUEST},
    replay::{replay_log, ReplaySlice},
    responder::{Handled, Responder},
    server::Config,
    status::StatusStore,
    transport::Reassembler,
};

#[derive(Parser)]
#[command(name = "inetbox-replay")]
#[command(about = "Feed a recorded LIN log through the iNet box protocol stack")]
struct Cli {
    /// Log file with one frame per line as hex bytes.
    file: PathBuf,

    /// First column carrying frame bytes (negative counts from the end).
    #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
    first: isize,

    /// End of the frame bytes (negative counts from the end).
    #[arg(long, default_value_t = -2, allow_hyphen_values = true)]
    last: isize,
}

struct Passive {
    reassembler: Reassembler,
    responder: Responder,
    store: StatusStore,
}

impl Passive {
    fn observe(&mut self, frame: &DataFrame) {
        if let Some(fields) = tokio_inetbox::status::display::decode(frame) {
            for (key, value) in fields {
                println!("display_status/{key} = {value}");
            }
            return;
        }
        if frame.pid.id() == PID_DIAG_REQUEST {
            if let Some(pdu) = self.reassembler.accept(frame, Instant::now()) {
                if let Handled::StatusAccepted(id) = self.responder.handle_pdu(&pdu, &mut self.store)
                {
                    println!("status buffer {id}:");
                    for (key, value) in self.store.control_view() {
                        println!("control_status/{key} = {value}");
                    }
                }
            }
        }
    }
}

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let file = File::open(&cli.file)?;
    let config = Config::default();
    let mut passive = Passive {
        reassembler: Reassembler::new(),
        responder: Responder::new(config.nad),
        store: StatusStore::new(),
    };

    let slice = ReplaySlice {
        first: cli.first,
        last: cli.last,
    };
    let stats = replay_log(BufReader::new(file), slice, |frame| {
        passive.observe(frame);
    })?;

    log::info!(
        "replayed {} line(s): {} frame(s), {} skipped, {} checksum error(s), {} parity error(s)",
        stats.lines,
        stats.frames,
        stats.skipped,
        stats.codec.checksum_errors,
        stats.codec.parity_errors
    );
    Ok(())
}
