// Library root
// -----------
// This crate exposes the client used by the `syno-cli` binary to manage
// encrypted shares on a Synology NAS. The binary (`main.rs`) only parses
// arguments and prints results; everything that talks to the NAS lives
// here.
//
// Module responsibilities:
// - `transport`: HTTP calls against the DSM Web API and envelope decoding.
// - `session`: login/logout and the scoped session used by every command.
// - `shares`: list, lock and unlock a single share.
// - `batch`: manifest decoding and sequential, abort-on-first-failure
//   unlocking of many shares.
// - `config`: connection settings supplied by flags or environment.
// - `ui`: share table rendering and password input.
pub mod batch;
pub mod config;
pub mod error;
pub mod session;
pub mod shares;
pub mod transport;
pub mod ui;

pub use error::{Error, Result};
