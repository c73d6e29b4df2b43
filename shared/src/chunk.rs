//! Splitting and reassembly of messages larger than the transport's packet
//! ceiling.
//!
//! An oversized `tag|payload` message is cut into `CK|tag|id|index|total|slice`
//! pieces, each at most the threshold in bytes. Slices are byte ranges of the
//! payload adjusted to UTF-8 boundaries, so concatenating them in index order
//! restores the payload exactly.

use crate::identity::PlayerId;
use crate::protocol::{ChunkMsg, WireMessage, DELIMITER};
use log::{debug, warn};
use std::collections::HashMap;

/// Room left for `CK|tag|id|index|total|` in front of every slice.
const HEADER_RESERVE: usize = 40;
/// Upper bound on pieces accepted for one message.
const MAX_CHUNKS: u32 = 4096;
/// Seconds an incomplete message is kept before being discarded.
const PARTIAL_MAX_AGE: f32 = 10.0;
/// Incomplete messages tracked at once; the oldest is evicted beyond this.
const MAX_PARTIALS: usize = 64;

/// Splits `text` into chunk messages when it exceeds `threshold` bytes.
///
/// Messages within the threshold come back unchanged as a single element.
pub fn split_into_chunks(text: &str, chunk_id: u32, threshold: usize) -> Vec<String> {
    if text.len() <= threshold {
        return vec![text.to_string()];
    }
    let Some((tag, payload)) = text.split_once(DELIMITER) else {
        return vec![text.to_string()];
    };

    let slice_size = threshold
        .saturating_sub(HEADER_RESERVE + tag.len())
        .max(1);
    let slices = slice_payload(payload, slice_size);
    let total = slices.len() as u32;

    slices
        .into_iter()
        .enumerate()
        .map(|(index, slice)| {
            ChunkMsg {
                tag: tag.to_string(),
                chunk_id,
                index: index as u32,
                total,
                slice: slice.to_string(),
            }
            .encode()
        })
        .collect()
}

fn slice_payload(payload: &str, slice_size: usize) -> Vec<&str> {
    let mut slices = Vec::new();
    let mut start = 0;
    while start < payload.len() {
        let mut end = (start + slice_size).min(payload.len());
        while !payload.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // A single character wider than the slice; let it through whole.
            end = start + 1;
            while !payload.is_char_boundary(end) {
                end += 1;
            }
        }
        slices.push(&payload[start..end]);
        start = end;
    }
    slices
}

struct Partial {
    tag: String,
    parts: Vec<Option<String>>,
    received: usize,
    age: f32,
}

impl Partial {
    fn new(tag: &str, total: u32) -> Self {
        Self {
            tag: tag.to_string(),
            parts: vec![None; total as usize],
            received: 0,
            age: 0.0,
        }
    }

    fn assemble(self) -> String {
        let mut out = self.tag;
        out.push(DELIMITER);
        for part in self.parts.into_iter().flatten() {
            out.push_str(&part);
        }
        out
    }
}

/// Collects chunks per `(sender, chunk id)` until a message is complete.
#[derive(Default)]
pub struct ChunkAssembler {
    partials: HashMap<(PlayerId, u32), Partial>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores one chunk and returns the full `tag|payload` text once every
    /// piece of that message has arrived.
    pub fn on_chunk(&mut self, sender: &PlayerId, chunk: ChunkMsg) -> Option<String> {
        if chunk.total == 0 || chunk.total > MAX_CHUNKS || chunk.index >= chunk.total {
            warn!(
                "Dropping malformed chunk {}/{} of message {} from {}",
                chunk.index, chunk.total, chunk.chunk_id, sender
            );
            return None;
        }

        let key = (sender.clone(), chunk.chunk_id);
        let restart = self
            .partials
            .get(&key)
            .map(|p| p.tag != chunk.tag || p.parts.len() != chunk.total as usize)
            .unwrap_or(true);
        if restart {
            if !self.partials.contains_key(&key) && self.partials.len() >= MAX_PARTIALS {
                self.evict_oldest();
            }
            self.partials
                .insert(key.clone(), Partial::new(&chunk.tag, chunk.total));
        }

        let partial = self.partials.get_mut(&key)?;
        let slot = &mut partial.parts[chunk.index as usize];
        if slot.is_none() {
            *slot = Some(chunk.slice);
            partial.received += 1;
        }

        if partial.received < partial.parts.len() {
            return None;
        }

        let complete = self.partials.remove(&key)?;
        debug!(
            "Reassembled {} message {} from {} ({} chunks)",
            complete.tag,
            chunk.chunk_id,
            sender,
            complete.parts.len()
        );
        Some(complete.assemble())
    }

    /// Ages incomplete messages and drops those that will never finish.
    pub fn expire(&mut self, dt: f32) {
        self.partials.retain(|(sender, id), partial| {
            partial.age += dt;
            let keep = partial.age <= PARTIAL_MAX_AGE;
            if !keep {
                debug!("Discarding incomplete message {} from {}", id, sender);
            }
            keep
        });
    }

    /// Forgets every incomplete message from a peer that left.
    pub fn forget_sender(&mut self, sender: &PlayerId) {
        self.partials.retain(|(from, _), _| from != sender);
    }

    pub fn pending(&self) -> usize {
        self.partials.len()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .partials
            .iter()
            .max_by(|a, b| a.1.age.total_cmp(&b.1.age))
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.partials.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vector2;
    use crate::protocol::{parse_message, BulletMsg, ParsedMessage};

    fn chunk_of(text: &str) -> ChunkMsg {
        match parse_message(text) {
            Some(ParsedMessage::Chunk(chunk)) => chunk,
            other => panic!("Expected chunk, got {:?}", other),
        }
    }

    fn oversized_bullet() -> String {
        let shooter = format!("bot-{}", "a".repeat(2470));
        let text = BulletMsg {
            shooter: PlayerId::new(&shooter),
            position: Vector2::new(12.0, 34.0),
            direction: Vector2::new(1.0, 0.0),
            bullet_id: Some(3),
        }
        .encode();
        assert!(text.len() >= 2500);
        text
    }

    #[test]
    fn test_small_message_untouched() {
        let chunks = split_into_chunks("M|1|2.00,3.00", 1, 800);
        assert_eq!(chunks, vec!["M|1|2.00,3.00".to_string()]);
    }

    #[test]
    fn test_chunk_roundtrip_matches_direct_parse() {
        let text = oversized_bullet();
        let chunks = split_into_chunks(&text, 17, 800);
        assert!(chunks.len() >= 4);
        for chunk in &chunks {
            assert!(chunk.len() <= 800, "chunk of {} bytes", chunk.len());
            assert!(chunk.starts_with("CK|B|17|"));
        }

        let sender = PlayerId::new("5");
        let mut assembler = ChunkAssembler::new();
        let mut complete = None;
        for chunk in &chunks {
            assert!(complete.is_none());
            complete = assembler.on_chunk(&sender, chunk_of(chunk));
        }

        let complete = complete.expect("message should be complete");
        assert_eq!(complete, text);
        assert_eq!(parse_message(&complete), parse_message(&text));
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_out_of_order_and_duplicate_chunks() {
        let text = oversized_bullet();
        let mut chunks = split_into_chunks(&text, 2, 800);
        chunks.reverse();
        let first = chunks[0].clone();
        chunks.insert(1, first);

        let sender = PlayerId::new("9");
        let mut assembler = ChunkAssembler::new();
        let results: Vec<Option<String>> = chunks
            .iter()
            .map(|c| assembler.on_chunk(&sender, chunk_of(c)))
            .collect();
        assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
        assert_eq!(results.last().cloned().flatten(), Some(text));
    }

    #[test]
    fn test_interleaved_senders_kept_apart() {
        let text = oversized_bullet();
        let chunks = split_into_chunks(&text, 1, 800);
        let a = PlayerId::new("1");
        let b = PlayerId::new("2");
        let mut assembler = ChunkAssembler::new();

        for chunk in &chunks[..chunks.len() - 1] {
            assert!(assembler.on_chunk(&a, chunk_of(chunk)).is_none());
            assert!(assembler.on_chunk(&b, chunk_of(chunk)).is_none());
        }
        assert_eq!(assembler.pending(), 2);
        let last = chunk_of(&chunks[chunks.len() - 1]);
        assert_eq!(assembler.on_chunk(&a, last.clone()), Some(text.clone()));
        assert_eq!(assembler.on_chunk(&b, last), Some(text));
    }

    #[test]
    fn test_malformed_chunk_rejected() {
        let mut assembler = ChunkAssembler::new();
        let sender = PlayerId::new("1");
        let bad = ChunkMsg {
            tag: "B".to_string(),
            chunk_id: 1,
            index: 3,
            total: 2,
            slice: "x".to_string(),
        };
        assert!(assembler.on_chunk(&sender, bad).is_none());
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_expire_drops_stale_partials() {
        let text = oversized_bullet();
        let chunks = split_into_chunks(&text, 4, 800);
        let sender = PlayerId::new("1");
        let mut assembler = ChunkAssembler::new();
        assembler.on_chunk(&sender, chunk_of(&chunks[0]));
        assert_eq!(assembler.pending(), 1);

        assembler.expire(PARTIAL_MAX_AGE / 2.0);
        assert_eq!(assembler.pending(), 1);
        assembler.expire(PARTIAL_MAX_AGE);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_multibyte_payload_boundaries() {
        let text = format!("L|{}", "é".repeat(1000));
        let chunks = split_into_chunks(&text, 1, 100);
        let sender = PlayerId::new("1");
        let mut assembler = ChunkAssembler::new();
        let mut out = None;
        for chunk in &chunks {
            assert!(chunk.len() <= 100);
            out = assembler.on_chunk(&sender, chunk_of(chunk));
        }
        assert_eq!(out, Some(text));
    }
}
