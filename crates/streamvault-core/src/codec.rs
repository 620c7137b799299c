//! Wire codec: multiplex many streams' binary payloads into one frame.
//!
//! ## Why an offset index?
//!
//! Payloads are arbitrary binary (JPEG frames, sensor packets, anything),
//! so embedding delimiters or length prefixes inside the data stream would
//! require escaping. Instead the codec concatenates all payloads into one
//! contiguous blob and carries all structure out-of-band in a JSON index of
//! `[stream_id, entry_id, byte_offset]` triples. A receiver recovers payload
//! `i` by slicing `blob[offset_i..offset_{i+1}]` (the last entry runs to the
//! end of the blob).
//!
//! The same framing is used for live delivery (index as a text message, blob
//! as a binary message on the same exchange) and, length-prefixed, inside
//! archive chunk files.
//!
//! ## Round trip
//!
//! `unpack(pack(entries))` reproduces the original triples byte-for-byte and
//! in the original order; see the tests at the bottom of this module.

use bytes::Bytes;

use crate::entry::{EntryId, StreamEntries};
use crate::error::{Error, Result};

/// One `(stream_id, entry_id, payload)` triple recovered by [`unpack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedEntry {
    pub stream: String,
    pub id: EntryId,
    pub payload: Bytes,
}

/// Pack per-stream entry batches into `(json_index, blob)`.
///
/// The index preserves the caller's stream ordering and, within each stream,
/// entry ordering. Empty payloads are legal and survive the round trip.
pub fn pack(entries: &[StreamEntries]) -> Result<(String, Bytes)> {
    let mut index: Vec<(&str, String, usize)> = Vec::new();
    let mut blob = Vec::new();

    for batch in entries {
        for entry in &batch.entries {
            index.push((batch.stream.as_str(), entry.id.to_string(), blob.len()));
            blob.extend_from_slice(&entry.payload);
        }
    }

    let index = serde_json::to_string(&index)?;
    Ok((index, Bytes::from(blob)))
}

/// Unpack `(json_index, blob)` back into `(stream, id, payload)` triples.
///
/// Fails with [`Error::InvalidIndex`] if any offset points outside the blob
/// or the offsets are not non-decreasing.
pub fn unpack(index: &str, blob: &[u8]) -> Result<Vec<PackedEntry>> {
    let index: Vec<(String, String, usize)> = serde_json::from_str(index)?;
    let blob = Bytes::copy_from_slice(blob);

    let mut out = Vec::with_capacity(index.len());
    for (i, (stream, id, start)) in index.iter().enumerate() {
        let end = match index.get(i + 1) {
            Some((_, _, next)) => *next,
            None => blob.len(),
        };
        if *start > end || end > blob.len() {
            return Err(Error::InvalidIndex(format!(
                "offset {start}..{end} outside blob of {} bytes",
                blob.len()
            )));
        }
        out.push(PackedEntry {
            stream: stream.clone(),
            id: id.parse()?,
            payload: blob.slice(*start..end),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;

    fn sample() -> Vec<StreamEntries> {
        vec![
            StreamEntries::new(
                "main",
                vec![
                    Entry::new(EntryId::new(100, 0), &b"\x00\x01\xff"[..]),
                    Entry::new(EntryId::new(101, 0), &b""[..]),
                    Entry::new(EntryId::new(101, 1), &b"xyz"[..]),
                ],
            ),
            StreamEntries::new("depth", vec![Entry::new(EntryId::new(99, 3), &b"d"[..])]),
        ]
    }

    #[test]
    fn round_trip_preserves_bytes_and_order() {
        let entries = sample();
        let (index, blob) = pack(&entries).unwrap();
        let unpacked = unpack(&index, &blob).unwrap();

        let flat: Vec<PackedEntry> = entries
            .iter()
            .flat_map(|b| {
                b.entries.iter().map(|e| PackedEntry {
                    stream: b.stream.clone(),
                    id: e.id,
                    payload: e.payload.clone(),
                })
            })
            .collect();
        assert_eq!(unpacked, flat);
    }

    #[test]
    fn index_is_plain_json_triples() {
        let (index, _) = pack(&sample()).unwrap();
        let parsed: Vec<(String, String, usize)> = serde_json::from_str(&index).unwrap();
        assert_eq!(parsed[0], ("main".into(), "100-0".into(), 0));
        // Empty payload: same offset as its successor.
        assert_eq!(parsed[1].2, 3);
        assert_eq!(parsed[2].2, 3);
    }

    #[test]
    fn empty_input_packs_to_empty_frame() {
        let (index, blob) = pack(&[]).unwrap();
        assert_eq!(index, "[]");
        assert!(blob.is_empty());
        assert!(unpack(&index, &blob).unwrap().is_empty());
    }

    #[test]
    fn out_of_range_offset_rejected() {
        let err = unpack(r#"[["s","1-0",10]]"#, b"abc").unwrap_err();
        assert!(matches!(err, Error::InvalidIndex(_)));
    }

    #[test]
    fn decreasing_offsets_rejected() {
        let err = unpack(r#"[["s","1-0",2],["s","2-0",1]]"#, b"abc").unwrap_err();
        assert!(matches!(err, Error::InvalidIndex(_)));
    }
}
