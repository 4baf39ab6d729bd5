//! Ferry Uploadr Library
//!
//! Uploads large local files to object storage through presigned requests.
//!
//! # Features
//!
//! - **Presigned Only**: Every request is signed by an external signing service
//! - **Multipart**: Large files are split into parts uploaded concurrently
//! - **Compression**: Large uncompressed files are gzipped before upload
//! - **Structured Errors**: Remote `<Error>` envelopes surface as typed errors
//!
//! # Example
//!
//! ```no_run
//! use ferry_uploadr::{config::Config, upload::Uploader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let uploader = Uploader::from_config(&config)?;
//!     let outcome = uploader.upload("backup.tar", 42, 7).await?;
//!     println!("{} uploaded as {}", outcome.file_meta.basename, outcome.strategy.as_str());
//!     Ok(())
//! }
//! ```

pub mod compress;
pub mod config;
pub mod inspect;
pub mod logging;
pub mod metrics;
pub mod signing;
pub mod storage;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use upload::{UploadError, UploadOutcome, Uploader};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
