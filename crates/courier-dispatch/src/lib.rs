#![warn(missing_docs)]

//! Courier dispatch subsystem: REST and multiplexed request dispatch, retry, agent cache, registration gate, bulk uploads

pub mod agent;
pub mod bulk;
pub mod cdn;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod executor;
pub mod gate;
pub mod headers;
pub mod operation;
pub mod redact;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;

pub use config::DispatchConfig;
pub use credentials::Credentials;
pub use dispatcher::{CallBody, CallOptions, ConfirmRequest, ConfirmResult, Dispatcher};
pub use error::{DispatchError, Result};
pub use events::DispatchEvent;
pub use headers::Headers;
pub use operation::Operation;
pub use request::{AuthMode, Method, RequestDescriptor, ResponseShape};
pub use response::{Outcome, ResponseData};
