#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! HTTP transport for `OData` v4 queries
//!
//! [`HttpTransport`] implements [`odata_query::Transport`] on top of a pooled
//! hyper client with rustls. Plug it into [`odata_query::ODataV4Options`]:
//!
//! ```rust,ignore
//! let transport = HttpTransport::new(HttpTransportConfig::default())?;
//! let options = ODataV4Options::new().with_transport(Arc::new(transport));
//! ```

mod config;
mod error;
mod tls;
mod transport;

pub use config::{DEFAULT_USER_AGENT, HttpTransportConfig, TransportSecurity};
pub use error::HttpTransportError;
pub use transport::HttpTransport;
