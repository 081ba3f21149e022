//! Agent shell for askdb.
//!
//! Wires the database engine's tools into an LLM with native function
//! calling and drives the question → tool call → answer loop for the
//! interactive binary.

pub mod llm_client;
pub mod prompt;
pub mod tools;
pub mod turn;
