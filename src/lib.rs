//! # regassist
//!
//! A retrieval-augmented chat assistant over a managed knowledge base.
//!
//! Questions typed into the web chat UI are sent to the Bedrock Agent Runtime
//! `RetrieveAndGenerate` operation. The generated answer comes back with the
//! documents it was grounded on; those citations are normalized, deduplicated
//! and rendered under the answer. Two offline utilities prepare the knowledge
//! base: one writes metadata sidecars for every PDF in the data folder, the
//! other mirrors that folder into S3.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────┐   ┌─────────────┐   ┌───────────┐   ┌───────────┐
//!  │ Chat UI  │──▶│ QueryClient │──▶│ citations │──▶│  format   │
//!  │ (server) │   │  (Bedrock)  │   │  dedup    │   │  answer   │
//!  └──────────┘   └─────────────┘   └───────────┘   └───────────┘
//!
//!  data/ ──▶ classify (sidecars) ──▶ storage (S3 mirror)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with environment overrides |
//! | [`models`] | Core data types |
//! | [`aws`] | Credentials and SigV4 signing |
//! | [`query`] | Knowledge-base query client |
//! | [`citations`] | Citation normalization and dedup |
//! | [`format`] | Answer formatting |
//! | [`session`] | Per-session chat state |
//! | [`assistant`] | Chat orchestration |
//! | [`server`] | Web chat UI and JSON API |
//! | [`classify`] | PDF metadata sidecars |
//! | [`storage`] | S3 folder mirroring |

pub mod assistant;
pub mod aws;
pub mod citations;
pub mod classify;
pub mod config;
pub mod format;
pub mod models;
pub mod query;
pub mod server;
pub mod session;
pub mod storage;
