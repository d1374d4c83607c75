//! Packet buffer chains and the reliable-delivery bookkeeping.
//!
//! Outgoing bytes land in fixed-size pooled buffers chained behind an
//! [`UnsentPacketQueue`]; `bytes_sent`/`bytes_written` watermarks track
//! how much of each buffer the socket has consumed
//! (`0 <= sent <= written <= DATA_SIZE`). Packets that must survive a
//! reconnect are additionally recorded as [`ReliablePacket`] fragment
//! chains in a [`ReliablePacketList`]; `compact` rewrites those fragments
//! into fresh buffers so the originals can be released.

use crate::buffer::{BufferPool, PoolBlock};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Payload bytes per packet buffer.
pub const DATA_SIZE: usize = 4096;

/// One fixed-size buffer with send/write watermarks.
pub struct PacketBuffer {
    data: PoolBlock,
    /// Bytes of payload present.
    pub bytes_written: usize,
    /// Bytes already handed to the socket.
    pub bytes_sent: usize,
}

/// Shared handle to a buffer in a chain.
pub type PacketBufferRef = Rc<RefCell<PacketBuffer>>;

impl PacketBuffer {
    fn new(pool: &BufferPool) -> PacketBufferRef {
        Rc::new(RefCell::new(Self {
            data: pool.alloc(DATA_SIZE),
            bytes_written: 0,
            bytes_sent: 0,
        }))
    }

    /// Room left for payload.
    #[must_use]
    pub fn bytes_unwritten(&self) -> usize {
        DATA_SIZE - self.bytes_written
    }

    /// Written payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data[..self.bytes_written]
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        let start = self.bytes_written;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.bytes_written += bytes.len();
        debug_assert!(self.bytes_sent <= self.bytes_written);
        debug_assert!(self.bytes_written <= DATA_SIZE);
        start
    }
}

/// A contiguous range of one buffer belonging to a reliable packet.
struct Fragment {
    buffer: PacketBufferRef,
    begin: usize,
    end: usize,
}

/// One logical packet recorded for retransmission; fragments chain the
/// pieces that span buffer boundaries.
pub struct ReliablePacket {
    fragments: Vec<Fragment>,
}

impl ReliablePacket {
    /// Total payload length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fragments.iter().map(|f| f.end - f.begin).sum()
    }

    /// True for a packet with no recorded bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fragments (buffer crossings plus one).
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Copies the payload out, in order.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for fragment in &self.fragments {
            let buffer = fragment.buffer.borrow();
            out.extend_from_slice(&buffer.data[fragment.begin..fragment.end]);
        }
        out
    }
}

/// Bytes not yet handed to the socket, as a chain of buffers.
pub struct UnsentPacketQueue {
    buffers: VecDeque<PacketBufferRef>,
    pool: BufferPool,
}

impl UnsentPacketQueue {
    /// Creates an empty queue drawing buffers from `pool`.
    #[must_use]
    pub fn new(pool: BufferPool) -> Self {
        Self {
            buffers: VecDeque::new(),
            pool,
        }
    }

    fn tail_or_new(&mut self) -> PacketBufferRef {
        let needs_new = self
            .buffers
            .back()
            .map_or(true, |b| b.borrow().bytes_unwritten() == 0);
        if needs_new {
            self.buffers.push_back(PacketBuffer::new(&self.pool));
        }
        Rc::clone(self.buffers.back().expect("queue cannot be empty here"))
    }

    /// Advances the sent watermark by `bytes`, releasing fully-sent
    /// buffers. The tail buffer is kept while it still has room to write.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` exceeds the queued unsent payload.
    pub fn sent(&mut self, mut bytes: usize) {
        while bytes > 0 {
            let front = Rc::clone(self.buffers.front().expect("sent more bytes than queued"));
            let mut buffer = front.borrow_mut();
            let available = buffer.bytes_written - buffer.bytes_sent;
            let keep_tail =
                self.buffers.len() == 1 && buffer.bytes_unwritten() > 0 && bytes == available;
            if bytes < available || keep_tail {
                buffer.bytes_sent += bytes;
                debug_assert!(buffer.bytes_sent <= DATA_SIZE);
                return;
            }
            bytes -= available;
            buffer.bytes_sent = buffer.bytes_written;
            drop(buffer);
            self.buffers.pop_front();
        }
    }

    /// Releases every buffer.
    pub fn discard_all(&mut self) {
        self.buffers.clear();
    }

    /// Bytes written but not yet sent.
    #[must_use]
    pub fn unsent_bytes(&self) -> usize {
        self.buffers
            .iter()
            .map(|b| {
                let b = b.borrow();
                b.bytes_written - b.bytes_sent
            })
            .sum()
    }

    /// Buffers in the chain.
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// The buffer the socket would send next.
    #[must_use]
    pub fn front(&self) -> Option<PacketBufferRef> {
        self.buffers.front().cloned()
    }

    /// Copies all unsent payload out, for inspection.
    #[must_use]
    pub fn unsent_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for buffer in &self.buffers {
            let b = buffer.borrow();
            out.extend_from_slice(&b.data[b.bytes_sent..b.bytes_written]);
        }
        out
    }
}

/// Appends payload to a queue, optionally recording reliable fragments.
pub struct PacketWriter<'a> {
    queue: &'a mut UnsentPacketQueue,
    fragments: Option<Vec<Fragment>>,
    written: usize,
}

impl<'a> PacketWriter<'a> {
    /// Starts a packet. With `reliable` set, `finish` returns the
    /// fragment record for the [`ReliablePacketList`].
    pub fn new(queue: &'a mut UnsentPacketQueue, reliable: bool) -> Self {
        Self {
            queue,
            fragments: reliable.then(Vec::new),
            written: 0,
        }
    }

    /// Appends bytes, crossing buffer boundaries as needed.
    pub fn write_bytes(&mut self, data: &[u8]) {
        let mut offset = 0;
        while offset < data.len() {
            let buffer = self.queue.tail_or_new();
            let (start, n) = {
                let mut b = buffer.borrow_mut();
                let n = b.bytes_unwritten().min(data.len() - offset);
                let start = b.write(&data[offset..offset + n]);
                (start, n)
            };
            if let Some(fragments) = &mut self.fragments {
                match fragments.last_mut() {
                    Some(last) if Rc::ptr_eq(&last.buffer, &buffer) && last.end == start => {
                        last.end += n;
                    }
                    _ => fragments.push(Fragment {
                        buffer: Rc::clone(&buffer),
                        begin: start,
                        end: start + n,
                    }),
                }
            }
            offset += n;
            self.written += n;
        }
    }

    /// Completes the packet, returning its length and the reliable record
    /// if one was requested.
    #[must_use]
    pub fn finish(self) -> (usize, Option<ReliablePacket>) {
        (
            self.written,
            self.fragments.map(|fragments| ReliablePacket { fragments }),
        )
    }
}

/// Stable handle to a packet in a [`ReliablePacketList`]. Valid until the
/// packet is removed; a stale handle is rejected, never misdirected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReliablePacketId {
    slot: usize,
    generation: u64,
}

struct Node {
    packet: ReliablePacket,
    generation: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Sent-but-unacknowledged packets: a doubly-linked ring, oldest first,
/// backed by a slot arena so `insert_before` and `remove` are O(1) given
/// a handle. Removing a node releases its buffer references.
#[derive(Default)]
pub struct ReliablePacketList {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    next_generation: u64,
}

impl ReliablePacketList {
    /// An empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, packet: ReliablePacket) -> usize {
        let generation = self.next_generation;
        self.next_generation += 1;
        let node = Node {
            packet,
            generation,
            prev: None,
            next: None,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn node(&self, id: ReliablePacketId) -> Option<&Node> {
        self.nodes
            .get(id.slot)?
            .as_ref()
            .filter(|node| node.generation == id.generation)
    }

    fn id_of(&self, slot: usize) -> ReliablePacketId {
        let generation = self.nodes[slot]
            .as_ref()
            .expect("ring slot vacant")
            .generation;
        ReliablePacketId { slot, generation }
    }

    /// Records a packet at the tail for possible retransmission.
    pub fn push_back(&mut self, packet: ReliablePacket) -> ReliablePacketId {
        let slot = self.alloc(packet);
        self.nodes[slot].as_mut().expect("fresh slot vacant").prev = self.tail;
        match self.tail {
            Some(tail) => self.nodes[tail].as_mut().expect("tail vacant").next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.len += 1;
        self.id_of(slot)
    }

    /// Links a packet immediately before `anchor`. Returns `None` (and
    /// drops nothing) if the anchor has already been removed.
    pub fn insert_before(
        &mut self,
        anchor: ReliablePacketId,
        packet: ReliablePacket,
    ) -> Option<ReliablePacketId> {
        self.node(anchor)?;
        let slot = self.alloc(packet);
        let anchor_prev = self.nodes[anchor.slot]
            .as_ref()
            .expect("anchor vanished")
            .prev;
        {
            let node = self.nodes[slot].as_mut().expect("fresh slot vacant");
            node.prev = anchor_prev;
            node.next = Some(anchor.slot);
        }
        self.nodes[anchor.slot].as_mut().expect("anchor vanished").prev = Some(slot);
        match anchor_prev {
            Some(prev) => self.nodes[prev].as_mut().expect("prev vacant").next = Some(slot),
            None => self.head = Some(slot),
        }
        self.len += 1;
        Some(self.id_of(slot))
    }

    /// Unlinks an arbitrary packet, releasing its buffer references.
    /// Returns `None` for a stale handle.
    pub fn remove(&mut self, id: ReliablePacketId) -> Option<ReliablePacket> {
        self.node(id)?;
        let node = self.nodes[id.slot].take().expect("node vanished");
        match node.prev {
            Some(prev) => self.nodes[prev].as_mut().expect("prev vacant").next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.nodes[next].as_mut().expect("next vacant").prev = node.prev,
            None => self.tail = node.prev,
        }
        self.free.push(id.slot);
        self.len -= 1;
        Some(node.packet)
    }

    /// Handle of the oldest packet.
    #[must_use]
    pub fn front(&self) -> Option<ReliablePacketId> {
        self.head.map(|slot| self.id_of(slot))
    }

    /// Acknowledges the oldest packet, releasing its buffer references.
    pub fn acknowledge_front(&mut self) -> Option<ReliablePacket> {
        let front = self.front()?;
        self.remove(front)
    }

    /// The packet behind a handle.
    #[must_use]
    pub fn get(&self, id: ReliablePacketId) -> Option<&ReliablePacket> {
        self.node(id).map(|node| &node.packet)
    }

    /// Packets in ring order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (ReliablePacketId, &ReliablePacket)> + '_ {
        let mut current = self.head;
        std::iter::from_fn(move || {
            let slot = current?;
            let node = self.nodes[slot].as_ref().expect("ring slot vacant");
            current = node.next;
            Some((
                ReliablePacketId {
                    slot,
                    generation: node.generation,
                },
                &node.packet,
            ))
        })
    }

    /// Releases everything.
    pub fn discard_all(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Number of recorded packets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total recorded payload bytes.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.iter().map(|(_, packet)| packet.len()).sum()
    }

    /// Rewrites every fragment into fresh buffers appended to `into`,
    /// freeing the original buffers, splitting a fragment wherever it
    /// crosses a target buffer boundary. Stops when it reaches a fragment
    /// living in `end` (the unsent range, which needs no rewriting).
    pub fn compact(&mut self, into: &mut UnsentPacketQueue, end: Option<&PacketBufferRef>) {
        let order: Vec<usize> = {
            let mut slots = Vec::with_capacity(self.len);
            let mut current = self.head;
            while let Some(slot) = current {
                slots.push(slot);
                current = self.nodes[slot].as_ref().expect("ring slot vacant").next;
            }
            slots
        };
        for slot in order {
            let packet = &mut self.nodes[slot].as_mut().expect("ring slot vacant").packet;
            let mut i = 0;
            while i < packet.fragments.len() {
                if let Some(end) = end {
                    if Rc::ptr_eq(&packet.fragments[i].buffer, end) {
                        return;
                    }
                }
                let target = into.tail_or_new();
                if Rc::ptr_eq(&target, &packet.fragments[i].buffer) {
                    // Already living in the target chain.
                    i += 1;
                    continue;
                }
                let room = target.borrow().bytes_unwritten();
                let fragment_len = {
                    let f = &packet.fragments[i];
                    f.end - f.begin
                };
                if fragment_len > room {
                    let f = &mut packet.fragments[i];
                    let rest = Fragment {
                        buffer: Rc::clone(&f.buffer),
                        begin: f.begin + room,
                        end: f.end,
                    };
                    f.end = f.begin + room;
                    packet.fragments.insert(i + 1, rest);
                }
                let fragment = &mut packet.fragments[i];
                let payload: Vec<u8> = {
                    let b = fragment.buffer.borrow();
                    b.data[fragment.begin..fragment.end].to_vec()
                };
                let start = target.borrow_mut().write(&payload);
                fragment.buffer = target;
                fragment.begin = start;
                fragment.end = start + payload.len();
                i += 1;
            }
        }
    }
}
