//! Entry point for the end-to-end suite. Cargo only auto-discovers files
//! directly under `tests/`, so this pulls in the per-scenario modules kept
//! under `tests/e2e/`.

#[path = "e2e/concurrent_ops.rs"]
mod concurrent_ops;
