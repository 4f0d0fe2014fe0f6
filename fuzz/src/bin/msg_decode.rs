#[macro_use]
extern crate afl;
use parley::{CiphertextMessage, CiphertextMessageType, PreKeySignalMessage, SignalMessage};

fn main() {
    fuzz!(|data: &[u8]| {
        let _ = SignalMessage::try_from_bytes(data);
        let _ = PreKeySignalMessage::try_from_bytes(data);

        if let Some((&kind, rest)) = data.split_first() {
            if let Ok(kind) = CiphertextMessageType::try_from(kind) {
                let _ = CiphertextMessage::from_bytes(kind, rest);
            }
        }
    });
}
