use std::time::Duration;

/// Scope created in every benchmark bucket.
pub const DEFAULT_SCOPE: &str = "default_scope";

/// Collection created inside [`DEFAULT_SCOPE`].
pub const DEFAULT_COLLECTION: &str = "default_collection";

/// Upper bound on a single database call.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a single `couchbase-cli` invocation, rebalances included.
pub const CLI_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// RAM quota applied to every benchmark bucket, in megabytes.
pub const BUCKET_RAM_QUOTA_MB: u32 = 1024;

/// Cluster administration (REST / couchbase-cli) port.
pub const ADMIN_PORT: u16 = 8091;

/// Query service (N1QL) REST port.
pub const QUERY_PORT: u16 = 8093;

/// Search service (FTS) REST port.
pub const SEARCH_PORT: u16 = 8094;

/// Field every generated document carries so queries and searches can match it.
pub const PHRASE_FIELD: &str = "vandy_phrase";

/// Role granted to the per-bucket benchmark user.
pub const BUCKET_USER_ROLE: &str = "bucket_full_access";
