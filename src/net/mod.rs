//! Network-layer data structures: address literals and packet queues.

mod address;
mod packet;

pub use address::NetworkAddress;
pub use packet::{
    PacketBuffer, PacketBufferRef, PacketWriter, ReliablePacket, ReliablePacketId,
    ReliablePacketList, UnsentPacketQueue, DATA_SIZE,
};
