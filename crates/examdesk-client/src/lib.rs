//! examdesk-client: grading backend over HTTP.
//!
//! Implements `ExamBackend` against the exam REST API and loads the client
//! configuration shared by the command-line front end.

pub mod config;
pub mod http;

pub use config::{load_config, load_config_from, ClientConfig};
pub use http::HttpBackend;
