//! Script vault: stores owner-scoped scripts, hands out anonymized ids, and
//! serves raw content back only to clients that pass the gate. The vault core
//! lives in `vault`, its durable snapshot in `storage`, and the HTTP boundary in
//! `http`; the binary in `main.rs` only wires these together.

pub mod config;
pub mod http;
pub mod storage;
pub mod vault;
