//! Signed/encrypted UDP packet codec and the lightweight session-ID variant
//! (section 4.3). Carries no explicit sender identity: the recoverable
//! signature lets the receiver recover it from the wire bytes alone.

pub mod lite;
pub mod packet;

pub use lite::{LitePacket, LITE_HEADER_SIZE};
pub use packet::{Packet, MTU_FLOOR, PACKET_HEADER_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("packet too short: need at least {need} bytes, got {got}")]
    InvalidLength { need: usize, got: usize },

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("payload size field out of range: {0}")]
    SizeOverflow(usize),

    #[error("payload exceeds u16 length: {0} bytes")]
    PayloadTooLarge(usize),

    #[error(transparent)]
    Crypto(#[from] kadron_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, CodecError>;
