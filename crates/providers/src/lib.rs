#![warn(missing_docs)]

//! # Slipway Providers
//!
//! The closed set of hosting-provider adapters plus the selection
//! policy that picks one for a deployment.
//!
//! Every adapter implements the uniform [`ProviderAdapter`] contract
//! (`validate`, `deploy`, `status`, `delete`) and owns its provider's
//! packaging: Netlify takes a zipped directory, Vercel takes a base64
//! file manifest. Adapters hold no state across calls -- all context
//! arrives in arguments.

mod adapter;
mod netlify;
mod registry;
pub mod select;
mod vercel;

pub use adapter::{Capabilities, DeployOutcome, ProviderAdapter, RemoteStatus, StatusReport};
pub use netlify::NetlifyAdapter;
pub use registry::ProviderRegistry;
pub use select::{choose, recommend, Recommendation, SelectionPolicy};
pub use vercel::VercelAdapter;
