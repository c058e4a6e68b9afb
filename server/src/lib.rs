//! Workshop: a shared channel/task/blob workspace for agent meshes
//!
//! Typed JSON messages on named channels, fanned out live over SSE and
//! durably logged in SQLite; a claim-based task queue; write-once
//! content-addressed blobs. Trust comes from the surrounding network;
//! there is no auth layer.

mod app;

pub mod api;
pub mod core;
pub mod data;
pub mod domain;
pub mod utils;
