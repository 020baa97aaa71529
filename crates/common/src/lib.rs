//! Common functionality for the token server.
//!
//! This crate holds the token formats, the HTTP handlers that mint them and
//! the settings shared by the Fastly service and the `tokencli` tool.
//!
//! # Modules
//!
//! - [`auth`]: Basic-auth guard for configured routes
//! - [`constants`]: Header names and fixed response texts
//! - [`endpoints`]: JSON handlers for every token flavor
//! - [`error`]: Error types and their HTTP mapping
//! - [`request_id`]: `x-request-id` propagation
//! - [`settings`]: Configuration management and validation
//! - [`test_support`]: Shared fixtures for tests
//! - [`token`]: AccessToken2 (`007`) tokens for RTC, RTM and Chat
//! - [`whiteboard`]: Netless whiteboard SDK, room and task tokens

pub mod auth;
pub mod constants;
pub mod endpoints;
pub mod error;
pub mod request_id;
pub mod settings;
pub mod token;
pub mod whiteboard;
