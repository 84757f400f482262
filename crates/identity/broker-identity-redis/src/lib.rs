//! Redis-backed [`SessionCache`].
//!
//! Every operation maps onto the Redis command of the same name. The
//! compare-and-delete used to release leases runs as a Lua script so the
//! check and the delete are atomic.

mod cache;

pub use cache::RedisSessionCache;

pub use broker_auth_core::SessionCache;
