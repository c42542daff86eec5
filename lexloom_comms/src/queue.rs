// The outgoing message queue.
//
// Every application message ever sent stays queued until the peer's
// implicit ack (the `last_msg_rcd` header field) covers it. The queue is
// kept in send order, which within a channel means ascending message ids;
// resends must replay in that order. `len` is tracked separately from the
// element list and the two must always agree.

use std::collections::VecDeque;

use tracing::debug;

use lexloom_protocol::types::{ChannelId, MessageId};

pub(crate) struct QueuedMessage {
    pub channel: ChannelId,
    pub msg_id: MessageId,
    /// The complete framed datagram: header plus body.
    pub bytes: Vec<u8>,
    pub send_count: u16,
}

#[derive(Default)]
pub(crate) struct OutgoingQueue {
    elems: VecDeque<QueuedMessage>,
    len: u16,
}

impl OutgoingQueue {
    pub fn push(&mut self, elem: QueuedMessage) {
        self.elems.push_back(elem);
        self.len += 1;
        debug_assert_eq!(self.len as usize, self.elems.len());
    }

    /// Drop every message the ack covers: messages on `channel` with ids
    /// at or below `ack`, plus any channel-0 messages once a real channel
    /// is established. Only guests ever hold channel-0 messages, and
    /// anything from the host is an implicit ack of those.
    pub fn prune(&mut self, channel: ChannelId, ack: MessageId) {
        let before = self.elems.len();
        self.elems.retain(|elem| {
            let on_channel = elem.channel == channel
                || (elem.channel == ChannelId::NONE && channel != ChannelId::NONE);
            !(on_channel && elem.msg_id <= ack)
        });
        let dropped = before - self.elems.len();
        if dropped > 0 {
            debug!(
                dropped,
                remaining = self.elems.len(),
                channel = channel.0,
                ack = ack.0,
                "acked messages pruned"
            );
        }
        #[expect(clippy::cast_possible_truncation)]
        {
            self.len -= dropped as u16;
        }
        debug_assert_eq!(self.len as usize, self.elems.len());
    }

    pub fn clear(&mut self) {
        self.elems.clear();
        self.len = 0;
    }

    pub fn len(&self) -> u16 {
        debug_assert_eq!(self.len as usize, self.elems.len());
        self.len
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut QueuedMessage> {
        self.elems.get_mut(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.elems.iter()
    }
}
