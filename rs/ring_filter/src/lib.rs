pub mod bits;
pub mod codec;
pub mod error;
pub mod filter;
pub mod guard;
pub mod hash;
pub mod params;
pub mod persist;

pub use codec::FormatVersion;
pub use config::enums::LockStrategy;
pub use config::ring::RingConfig;
pub use error::{Result, RingError};
pub use filter::RingFilter;
pub use hash::MultiHash;
pub use params::FilterParams;
