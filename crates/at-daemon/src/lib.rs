//! Background daemon for the coding-agent gateway: owns the `Runtime`,
//! the HTTP/WebSocket listener, and the retention-sweep loop.

pub mod daemon;
