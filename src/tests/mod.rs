//! Cross-module tests: engine over HTTP, chunk-level streaming, and fan-out sessions.

mod engine;
