//! # Triax JSON Command Surface
//!
//! External boundary of the motion controller: newline-framed JSON
//! commands of the form `{"command": NAME, "pars": {…}}` are parsed,
//! validated and translated into per-axis queue messages or global flag
//! writes. Responses carry the requested data, `{"ACK": true}` or
//! `{"ACK": false, "ERROR": …}`.

pub mod dispatch;
pub mod logbuf;
pub mod server;
