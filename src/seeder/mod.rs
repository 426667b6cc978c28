//! Repository seeder: creates a GitHub repository and pushes a staging tree
//! into it, tracking each request as a pollable job.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (router layers, start_server)        │
//! │          │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘  polling │         │                                        │
//!                       │         │ Orchestrator::launch()                 │
//!                       │         v                                        │
//!                       │  orchestrator.rs  (job state machine)            │
//!                       │         │                                        │
//!                       │         │ upload_tree() / upload_with_retry()    │
//!                       │         v                                        │
//!                       │  walker.rs + upload.rs  ──>  github.rs           │
//!                       │         │                    (HostingApi)        │
//!                       │         v                                        │
//!                       │  pipeline.rs  (BuildPipeline, simulated)         │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module    | Responsibility                                           |
//! |-----------|----------------------------------------------------------|
//! | `models`  | `Job`, `Step`, status enums, request/response payloads   |
//! | `store`   | `JobStore` (in-memory map) and the failed-job sweeper    |
//!
//! ## Job lifecycle
//!
//! `initializing → creating_repository → uploading_files →
//! compilation_started → completed`, with `failed` reachable from every
//! non-terminal state. Per-file upload failures are retried and counted; any
//! file that still fails marks the whole job failed once the walk finishes,
//! even though the repository and the other files remain on GitHub.

pub mod api;
pub mod github;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod upload;
pub mod walker;

#[cfg(test)]
mod testing;
