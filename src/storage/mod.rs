mod error;
pub use error::StoreError;
mod memory;
pub use memory::InMemoryProtocolStore;
mod traits;
pub use traits::*;
