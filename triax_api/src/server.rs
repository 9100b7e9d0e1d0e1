//! Newline-framed JSON command server.
//!
//! One thread per connection; each request line is a JSON object
//! `{"command": NAME, "pars": {…}}`, each response a single JSON line.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;

/// Accept connections forever.
pub fn serve(listener: TcpListener, dispatcher: Arc<Dispatcher>) -> io::Result<()> {
    info!("command server listening on {}", listener.local_addr()?);
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let dispatcher = dispatcher.clone();
                thread::Builder::new()
                    .name("client".into())
                    .spawn(move || {
                        if let Err(e) = handle_client(stream, &dispatcher) {
                            debug!("client dropped: {e}");
                        }
                    })?;
            }
            Err(e) => warn!("accept failed: {e}"),
        }
    }
    Ok(())
}

fn handle_client(stream: TcpStream, dispatcher: &Dispatcher) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    info!("client connected: {peer}");
    let reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = respond(dispatcher, &line);
        writer.write_all(response.to_string().as_bytes())?;
        writer.write_all(b"\n")?;
    }
    info!("client disconnected: {peer}");
    Ok(())
}

/// Answer one framed request line.
pub fn respond(dispatcher: &Dispatcher, line: &str) -> Value {
    match serde_json::from_str::<Value>(line) {
        Ok(request) => match request.get("command").and_then(Value::as_str) {
            Some(command) => dispatcher.execute(command, request.get("pars")),
            None => json!({ "ACK": false, "ERROR": "missing command" }),
        },
        Err(e) => json!({ "ACK": false, "ERROR": format!("invalid JSON: {e}") }),
    }
}
