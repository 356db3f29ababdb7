pub mod blob_fs;
pub mod password;
pub mod redis_store;
pub mod token;

pub use blob_fs::FsBlobStorage;
pub use password::Argon2Hasher;
pub use redis_store::RedisStore;
pub use token::{Claims, TokenIssuer};
