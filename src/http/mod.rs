//! HTTP API
//!
//! `POST /stream-ask` streams answers as Server-Sent Events; the `/api/v1`
//! routes expose configuration and chat history management.

pub mod handler;
pub mod server;

pub use server::{router, HttpServer};
