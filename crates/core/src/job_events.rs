//! Event type names published on the event bus for build lifecycle changes.
//!
//! The same strings are used as the `type` field of the JSON messages pushed
//! to WebSocket clients.

/// A build job was created and queued.
pub const EVENT_BUILD_CREATED: &str = "build.created";

/// A runner claimed a queued build job.
pub const EVENT_BUILD_CLAIMED: &str = "build.claimed";

/// A runner reported a successful build.
pub const EVENT_BUILD_SUCCEEDED: &str = "build.succeeded";

/// A build failed, either reported by its runner or reaped for silence.
pub const EVENT_BUILD_FAILED: &str = "build.failed";

/// The auto-fix loop started producing a retry for a failed build.
pub const EVENT_AUTOFIX_STARTED: &str = "build.autofix_started";

/// The auto-fix loop enqueued a retry job.
pub const EVENT_RETRY_CREATED: &str = "build.retry_created";

/// The auto-fix loop stopped without creating a retry.
pub const EVENT_AUTOFIX_GAVE_UP: &str = "build.autofix_gave_up";
