pub mod bins;
pub mod domain;
pub mod keys;
pub mod memory;
pub mod ports;
pub mod stats;
pub mod users;

pub use bins::{BinRepository, DEFAULT_RETENTION};
pub use domain::{Bin, BinClicks, BinUpdate, ContentKind, NewBin, NewFileBin, Statistics, User};
pub use memory::{MemoryBlobStorage, MemoryStore};
pub use ports::{
    BlobStorage, BoxError, CredentialHasher, KeyValueStore, PortError, PortResult,
};
pub use stats::StatsAggregator;
pub use users::UserRepository;
