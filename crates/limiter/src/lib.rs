pub mod bucket;

pub use bucket::{BucketUsage, Permit, PermitGuard, TokenBucket};
