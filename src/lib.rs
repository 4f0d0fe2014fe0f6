mod address;
pub use address::ProtocolAddress;

mod config;
pub use config::SessionConfig;

pub mod consts;

mod crypto;

mod error;
pub use error::Error;

pub mod fingerprint;

mod proto;

mod protocol;
pub use protocol::*;

mod ratchet;

mod session;
pub use session::{SessionBuilder, SessionCipher, SessionManager};

mod state;
pub use state::{PendingPreKey, SessionRecord, SessionState};

pub mod storage;
pub use storage::{
    Direction, IdentityKeyStore, InMemoryProtocolStore, PreKeyStore, ProtocolStore, SessionStore,
    SignedPreKeyStore, StoreError,
};

mod types;
pub use types::*;

mod x3dh;
pub use x3dh::*;
