//! Fixed timing, concurrency and header constants shared by the dispatcher.

use std::time::Duration;

/// Maximum age of a cached agent before it is cycled.
pub const AGENT_TTL: Duration = Duration::from_secs(5 * 60);

/// Timeout applied to a request that does not specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Total attempts for a request failing at the transport level.
pub const MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between transport-level retries.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Simultaneous part uploads in a bulk transfer.
pub const BULK_CONCURRENCY: usize = 3;

/// Per-part timeout in a bulk transfer.
pub const BULK_JOB_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Longest gap allowed between chunks of a streamed attachment download.
pub const ATTACHMENT_CHUNK_TIMEOUT: Duration = Duration::from_secs(10);

/// Content type used for service calls that do not set one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Client product and version.
pub const USER_AGENT_HEADER: &str = "User-Agent";
/// Client identifier header.
pub const CLIENT_AGENT_HEADER: &str = "X-Signal-Agent";
/// Basic-auth header.
pub const AUTHORIZATION_HEADER: &str = "Authorization";
/// Sealed-sender access key header.
pub const ACCESS_KEY_HEADER: &str = "Unidentified-Access-Key";
/// Body media type.
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
/// Explicit body length.
pub const CONTENT_LENGTH_HEADER: &str = "Content-Length";
