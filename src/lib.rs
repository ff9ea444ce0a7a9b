//! Local coding-assistant agent engine.
//!
//! One exchange takes a client task (instruction + optional code context)
//! against a named session and produces a single ordered stream of tagged
//! chunks: model prose as it is generated, interleaved with atomic tool
//! output blocks, while every message is appended to the session log.
//!
//! ## Gateway bootstrap
//!
//! The engine requires explicit gateway selection:
//!
//! - `CODELOOM_GATEWAY=mock` for deterministic local runs and tests
//! - `CODELOOM_GATEWAY=ollama` for a local Ollama server
//!
//! When `CODELOOM_GATEWAY=ollama`, optionally set
//! `CODELOOM_OLLAMA_CONFIG_PATH` to a readable UTF-8 JSON file:
//!
//! ```json
//! {
//!   "model": "qwen2.5-coder:7b",
//!   "base_url": "http://127.0.0.1:11434",
//!   "keep_alive": "20m",
//!   "timeout_sec": 120,
//!   "temperature": 0.0,
//!   "enabled": true
//! }
//! ```
//!
//! Contract notes:
//! - `model` is required and must be non-empty.
//! - `timeout_sec` is optional and must be > 0 when provided.
//! - Unknown JSON fields are rejected.
//! - Without a config file, defaults target `http://127.0.0.1:11434`.
//!
//! ## System instructions
//!
//! Every prompt starts with one system instruction block. Set
//! `CODELOOM_SYSTEM_INSTRUCTIONS` to override the built-in default.
//!
//! Conversation memory contract: the engine replays the most recent stored
//! messages (50 by default) into every turn; the task's user message is
//! persisted before the first inference call so an aborted stream still
//! leaves the request recorded.

pub mod completion;
pub mod error;
pub mod exchange;
pub mod gateways;
pub mod invoker;
pub mod memory;
pub mod registry;
pub mod stream;
pub mod tools;

pub use completion::CompletionRequest;
pub use error::EngineError;
pub use exchange::{Engine, EngineConfig, ExchangeHandle, ExchangeOutcome, DEFAULT_MAX_TURNS};
pub use memory::{TaskInput, DEFAULT_MEMORY_LIMIT};
pub use registry::{Tool, ToolRegistry};
pub use stream::{ChunkOrigin, TaggedChunk};
