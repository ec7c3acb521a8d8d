//! Git smart HTTP plumbing.
//!
//! Packet-line framing plus `git upload-pack` subprocess wrappers.  All
//! repository access shells out to the system `git` binary using
//! `tokio::process::Command` for non-blocking execution; this layer never
//! reads a repository's object store itself.

pub mod commands;
pub mod pkt_line;
