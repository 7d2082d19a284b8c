//! Message reassembly from a stream of [`DataPacket`]s.
//!
//! A message is identified by its `msg_number`, independent of the packet
//! sequence space, so pieces can be buffered and assembled even when they
//! arrive before the piece carrying [`Boundary::First`] — the packet
//! sequence number, not arrival order, tells us where a piece belongs
//! within its message.
//!
//! Messages flagged `in_order` are only released to the application in
//! increasing `msg_number` order; messages that aren't wait for nothing and
//! are released as soon as their own pieces are complete.

use std::collections::{BTreeMap, HashMap};

use crate::packet::{Boundary, DataPacket};

struct PendingMessage {
    pieces: BTreeMap<u32, Vec<u8>>,
    first_seq: Option<u32>,
    last_seq: Option<u32>,
    in_order: bool,
}

impl PendingMessage {
    fn new(in_order: bool) -> Self {
        Self {
            pieces: BTreeMap::new(),
            first_seq: None,
            last_seq: None,
            in_order,
        }
    }

    fn is_complete(&self) -> bool {
        let (Some(first), Some(last)) = (self.first_seq, self.last_seq) else {
            return false;
        };
        if first > last {
            return false;
        }
        (first..=last).all(|seq| self.pieces.contains_key(&seq))
    }

    fn assemble(&self) -> Vec<u8> {
        self.pieces.values().flat_map(|p| p.iter().copied()).collect()
    }
}

/// Reassembles application messages out of a stream of [`DataPacket`]s,
/// tolerating arbitrary arrival order.
pub struct MessageReassembler {
    pending: HashMap<u32, PendingMessage>,
    ready_in_order: BTreeMap<u32, Vec<u8>>,
    next_in_order: u32,
}

impl Default for MessageReassembler {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            ready_in_order: BTreeMap::new(),
            next_in_order: 0,
        }
    }
}

impl MessageReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet in. Returns any messages now ready for delivery, in
    /// the order they should be handed to the application.
    pub fn push(&mut self, pkt: DataPacket) -> Vec<Vec<u8>> {
        let msg_number = pkt.msg_number;

        if pkt.boundary == Boundary::Only {
            return self.complete(msg_number, pkt.payload, pkt.in_order);
        }

        let entry = self
            .pending
            .entry(msg_number)
            .or_insert_with(|| PendingMessage::new(pkt.in_order));

        let seq = pkt.seq.value();
        entry.pieces.insert(seq, pkt.payload);
        match pkt.boundary {
            Boundary::First => entry.first_seq = Some(seq),
            Boundary::Last => entry.last_seq = Some(seq),
            Boundary::Middle | Boundary::Only => {}
        }

        if entry.is_complete() {
            let entry = self.pending.remove(&msg_number).expect("just checked");
            return self.complete(msg_number, entry.assemble(), entry.in_order);
        }

        Vec::new()
    }

    fn complete(&mut self, msg_number: u32, data: Vec<u8>, in_order: bool) -> Vec<Vec<u8>> {
        if !in_order {
            return vec![data];
        }
        self.ready_in_order.insert(msg_number, data);
        let mut out = Vec::new();
        let mut cursor = self.next_in_order;
        while let Some(data) = self.ready_in_order.remove(&cursor) {
            out.push(data);
            cursor = cursor.wrapping_add(1);
        }
        self.next_in_order = cursor;
        out
    }

    pub fn pending_messages(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kadron_types::PacketId;

    fn piece(seq: u32, boundary: Boundary, msg_number: u32, in_order: bool, payload: &[u8]) -> DataPacket {
        DataPacket {
            seq: PacketId::new(seq),
            boundary,
            in_order,
            msg_number,
            timestamp: 0,
            dest_socket_id: 0,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn single_packet_message_completes_immediately() {
        let mut r = MessageReassembler::new();
        let out = r.push(piece(1, Boundary::Only, 0, false, b"hi"));
        assert_eq!(out, vec![b"hi".to_vec()]);
    }

    #[test]
    fn out_of_order_pieces_before_first_still_assemble() {
        let mut r = MessageReassembler::new();
        // Middle and Last arrive before First.
        assert!(r.push(piece(2, Boundary::Middle, 5, false, b"B")).is_empty());
        assert!(r.push(piece(3, Boundary::Last, 5, false, b"C")).is_empty());
        let out = r.push(piece(1, Boundary::First, 5, false, b"A"));
        assert_eq!(out, vec![b"ABC".to_vec()]);
    }

    #[test]
    fn in_order_messages_release_only_in_sequence() {
        let mut r = MessageReassembler::new();
        // Message 1 completes before message 0; since both are in_order,
        // message 1 must wait for message 0.
        assert!(r
            .push(piece(10, Boundary::Only, 1, true, b"second"))
            .is_empty());
        let out = r.push(piece(9, Boundary::Only, 0, true, b"first"));
        assert_eq!(out, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn out_of_order_messages_do_not_wait_for_sequence() {
        let mut r = MessageReassembler::new();
        let out = r.push(piece(1, Boundary::Only, 3, false, b"x"));
        assert_eq!(out, vec![b"x".to_vec()]);
    }
}
