//! Script id issuance.

use rand::rngs::OsRng;
use rand::RngCore;

use super::record::ScriptId;

/// Random bytes per id; hex encoding doubles this to the id length.
pub const ID_BYTES: usize = 8;
/// Upper bound on re-draws when a fresh id is already taken.
pub const MAX_ID_ATTEMPTS: usize = 8;

/// Draws a 16 character lowercase hex id from the OS random source.
pub fn allocate_id() -> ScriptId {
    let mut bytes = [0u8; ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    ScriptId::new(hex::encode(bytes))
}

/// Draws ids until `taken` rejects one, giving up after `MAX_ID_ATTEMPTS`.
pub fn allocate_unique_id(taken: impl Fn(&ScriptId) -> bool) -> Option<ScriptId> {
    (0..MAX_ID_ATTEMPTS).map(|_| allocate_id()).find(|id| !taken(id))
}
