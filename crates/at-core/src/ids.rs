//! Typed-prefix id generation (SPEC_FULL.md §3).
//!
//! Ids look like `prof_8f2a1c9d4e6b0a73`: a short prefix identifying the
//! entity kind, followed by 16 lowercase-hex characters drawn from the
//! OS CSPRNG. Collisions within a process lifetime are an unreachable
//! invariant violation, not a case the caller handles.

use ring::rand::{SecureRandom, SystemRandom};

/// Generate a new id with the given short prefix (e.g. `"prof"`, `"gso"`).
pub fn new_id(prefix: &str) -> String {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 8];
    rng.fill(&mut bytes)
        .expect("OS RNG unavailable — cannot generate ids");
    let mut suffix = String::with_capacity(16);
    for b in bytes {
        suffix.push_str(&format!("{b:02x}"));
    }
    format!("{prefix}_{suffix}")
}
