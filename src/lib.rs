//! # Regbook
//!
//! The core of a local outsourcing register: authentication, role-based
//! access control, and consistent backup/restore over an embedded SQLite
//! store. Usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! regbook = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use regbook::auth::AuthContext;
//! use regbook::store::SqliteStore;
//!
//! let data_dir = PathBuf::from("./data");
//! let store = Arc::new(SqliteStore::new(data_dir.join("register.db")).unwrap());
//! store.initialize().unwrap();
//!
//! let mut auth = AuthContext::init(store, &data_dir);
//! // Hand `auth` to the UI shell...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the administration binary. Disable with
//!   `default-features = false` when embedding the library.

pub mod auth;
pub mod backup;
pub mod config;
pub mod error;
pub mod store;
pub mod types;
