//! Cursor encoding: a stable, opaque string over `(channel, sequence)` —
//! never a timestamp, so resumption survives clock skew (SPEC_FULL.md §4.B).

/// Encode a cursor for the given channel and per-channel sequence number.
pub fn encode(channel: &str, sequence: i64) -> String {
    format!("{sequence}:{channel}")
}

/// Decode a cursor back into `(sequence, channel)`. Returns `None` if the
/// cursor is not well-formed (e.g. client-supplied garbage).
pub fn decode(cursor: &str) -> Option<(i64, String)> {
    let (seq, channel) = cursor.split_once(':')?;
    let sequence: i64 = seq.parse().ok()?;
    Some((sequence, channel.to_string()))
}
