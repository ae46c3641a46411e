pub mod codec;
pub mod types;

pub use codec::decode;
pub use types::{DecodedPacket, Record, CHANNEL_CAPACITY, PACKET_LEN};
