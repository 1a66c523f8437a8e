//! # ArbGPT
//!
//! A retrieval-augmented assistant for the Arbitrum documentation and for
//! Solidity contracts.
//!
//! ArbGPT serves three browser pages: a landing page, a docs chat that
//! answers questions from passages retrieved out of a MongoDB Atlas vector
//! index, and a contract debugger that sends pasted code to a hosted model
//! with a debug or generate instruction.
//!
//! ## Architecture
//!
//! ```text
//!  Browser ──▶ ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌──────────────┐
//!              │  server  │──▶│  flows   │──▶│   query    │──▶│ Atlas vector │
//!              │ (Axum)   │   │ timeout/ │   │ embed+top k│   │    search    │
//!              └────┬─────┘   │ cancel   │   └─────┬──────┘   └──────────────┘
//!                   │         └────┬─────┘         ▼
//!              ┌────▼─────┐        │         ┌────────────┐
//!              │ session  │        └────────▶│ chat model │ (OpenAI-compatible)
//!              │transcript│                  └────────────┘
//!              └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export MONGODB_CONN_URI=mongodb+srv://...
//! export GITHUB_TOKEN=ghp_...
//! arbgpt serve                           # http://127.0.0.1:8501
//! arbgpt ask "What is ArbOS?"
//! arbgpt contract --mode debug Token.sol
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment secrets |
//! | [`models`] | Turns, transcripts, contract modes, passages |
//! | [`prompts`] | QA and contract prompt templates, example questions |
//! | [`embedding`] | Embedding provider trait and OpenAI-compatible client |
//! | [`llm`] | Chat model trait and OpenAI-compatible client |
//! | [`store`] | Vector store trait; MongoDB Atlas and in-memory backends |
//! | [`query`] | Retrieval-augmented query engine |
//! | [`session`] | Per-session transcript and in-flight state |
//! | [`flows`] | Chat and contract flows with timeout and cancellation |
//! | [`pages`] | HTML rendering |
//! | [`server`] | Axum HTTP server |

pub mod config;
pub mod embedding;
pub mod flows;
pub mod llm;
pub mod models;
pub mod pages;
pub mod prompts;
pub mod query;
pub mod server;
pub mod session;
pub mod store;

pub use flows::{Flows, Outcome};
pub use models::{ContractMode, Role, Transcript, Turn};
pub use session::{Session, SessionStore};
