use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use gazex_experiment::{ControlEvent, OperatorCommand};
use tracing::{debug, info};

/// Reads operator commands from stdin, one per line, on its own thread.
/// Stops after `q` or when stdin closes.
pub fn spawn(tx: Sender<ControlEvent>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("operator-console".into())
        .spawn(move || {
            let stdin = io::stdin();
            read_commands(stdin.lock(), &tx);
            info!("operator console closed");
        })
}

fn read_commands(input: impl BufRead, tx: &Sender<ControlEvent>) {
    for line in input.lines() {
        let Ok(line) = line else { break };
        let Some(command) = OperatorCommand::from_line(&line) else {
            println!("keys: s/space advance, enter/r restart, c cancel, b baseline on/off, q quit");
            continue;
        };
        debug!(?command, "operator");
        if tx.send(ControlEvent::Operator(command)).is_err() || command == OperatorCommand::Quit {
            break;
        }
    }
}
