//! Axum route serving the OAuth callback page.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use devhub_client::{ClientConfig, server::callback_routes};
//!
//! let config = ClientConfig::from_env()?;
//! let app = axum::Router::new().merge(callback_routes(&config));
//! ```

mod routes;

pub use routes::{callback_routes, render_callback_page};
