//! # mathtutor core
//!
//! Domain types, traits, and error definitions for the mathtutor
//! retrieval-augmented tutoring front end. This crate has **zero framework
//! dependencies**: it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! The two external collaborators the tutor talks to are defined as traits
//! here:
//! - [`Provider`]: the language-model inference engine (streaming chat)
//! - [`Retriever`]: the vector store (scoped similarity search)
//!
//! Implementations live in `mathtutor-providers` and `mathtutor-retrieval`,
//! which keeps the orchestrator testable with scripted stand-ins.

pub mod error;
pub mod message;
pub mod provider;
pub mod retrieval;

// Re-export key types at crate root for ergonomics
pub use error::{ProviderError, RetrievalError};
pub use message::{Message, Role, Turn};
pub use provider::{ChunkReceiver, GenerationOptions, Provider, ProviderRequest, StreamChunk};
pub use retrieval::{DocumentScope, Passage, Retriever, SearchRequest};
