//! `nbpipe` crate (library surface).
//!
//! The primary entrypoint for end users is the `nbpipe` binary. This library module exists to
//! support embedding and to provide a stable way to reuse core and local types without
//! depending on internal crate layout.

pub use nbpipe_core as core;
pub use nbpipe_local as local;
