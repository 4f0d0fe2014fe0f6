mod session_record;
mod session_state;
mod skipped;

pub use session_record::SessionRecord;
pub(crate) use session_state::{ReceiverChain, SenderChain};
pub use session_state::{PendingPreKey, SessionState};
pub(crate) use skipped::SkippedKeys;
