//! minidocs: structured document generation with an LLM evaluate/refine loop.
//!
//! A run drafts (or accepts) an ordered set of named sections, asks an
//! evaluator model to score and critique it, and routes to semantic or
//! structural refinement until the evaluator accepts the document. Every
//! model call goes through [`generation::GenerationService`], which enforces
//! the JSON output shape and retries failed attempts.

pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod generation;
pub mod logging;
pub mod prompt;
pub mod provider;
pub mod routing;
pub mod workflow;
