//! Trace record wire format: little-endian binary batches, each headed
//! by an `ID`/`SZ` tag pair, followed by a word stream mixing `START`/`NAME`/`END`
//! control words with plain `(pc, last_pc)` observation pairs. Framed with `nom`
//! combinators over `le_u16`/`le_u32`, the same way packed binary tables elsewhere
//! in this codebase are read; the inner word-stream
//! dispatch is a plain cursor loop since each tag consumes a different, flag-
//! dependent number of trailing words -- a shape `nom`'s combinators don't fit as
//! cleanly as the fixed-width outer framing does.

use nom::{
    bytes::complete::take,
    number::complete::{le_u16, le_u32},
    IResult,
};

use crate::error::TraceError;

const TAG_ID: u16 = 0x4449;
const TAG_SZ: u16 = 0x5A53;
const TAG_START: u32 = 0x5453;
const TAG_NAME: u32 = 0x4D4E;
const TAG_END: u32 = 0x4445;
const NAME_WORDS: usize = 8;

/// One event decoded from a batch's word stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    Start { pc: u32 },
    Name { name: String },
    End { end_pc: u32 },
    Observation { pc: u32, last_pc: u32 },
}

/// One `ID`/`SZ`-framed batch: a thread id plus its decoded events, in stream order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    pub thread_id: u16,
    pub events: Vec<TraceEvent>,
    /// Total words consumed by this batch's body, used to advance `nts` by
    /// `size_words / 2` for batches that produce no individually-timestamped
    /// records.
    pub size_words: u32,
}

fn header(input: &[u8]) -> IResult<&[u8], (u16, u16)> {
    let (input, id_tag) = le_u16(input)?;
    let (input, thread_id) = le_u16(input)?;
    if id_tag != TAG_ID {
        return Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }
    Ok((input, (id_tag, thread_id)))
}

fn size(input: &[u8]) -> IResult<&[u8], u32> {
    let (input, sz_tag) = le_u16(input)?;
    let (input, size_words) = le_u32(input)?;
    if sz_tag != TAG_SZ {
        return Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }
    Ok((input, size_words))
}

/// Reads one `ID`/`SZ`-framed batch from the front of `input`, returning the
/// remaining bytes.
pub fn read_batch(input: &[u8]) -> Result<(&[u8], Batch), TraceError> {
    let (input, (_, thread_id)) =
        header(input).map_err(|_| TraceError::Malformed("expected ID tag".to_string()))?;
    let (input, size_words) = size(input).map_err(|_| TraceError::Malformed("expected SZ tag".to_string()))?;

    let (input, body) = take::<_, _, nom::error::Error<&[u8]>>((size_words as usize) * 4)(input)
        .map_err(|_| TraceError::Malformed(format!("batch body shorter than declared size {size_words}")))?;

    let events = decode_words(body, size_words)?;
    Ok((input, Batch { thread_id, events, size_words }))
}

fn decode_words(mut body: &[u8], size_words: u32) -> Result<Vec<TraceEvent>, TraceError> {
    let mut events = Vec::new();
    let mut words_left = size_words;

    while words_left > 0 {
        let (rest, word) =
            le_u32::<_, nom::error::Error<&[u8]>>(body).map_err(|_| TraceError::Malformed("truncated word".to_string()))?;
        body = rest;
        words_left -= 1;

        if word >> 16 == 0 {
            match word {
                w if w == TAG_START => {
                    let (rest, pc) = le_u32::<_, nom::error::Error<&[u8]>>(body)
                        .map_err(|_| TraceError::Malformed("START missing pc word".to_string()))?;
                    body = rest;
                    words_left = words_left.checked_sub(1).ok_or_else(|| TraceError::Malformed("START overran batch".into()))?;
                    events.push(TraceEvent::Start { pc });
                }
                w if w == TAG_NAME => {
                    if (words_left as usize) < NAME_WORDS {
                        return Err(TraceError::Malformed("NAME overran batch".to_string()));
                    }
                    let (rest, bytes) = take::<_, _, nom::error::Error<&[u8]>>(NAME_WORDS * 4)(body)
                        .map_err(|_| TraceError::Malformed("NAME payload truncated".to_string()))?;
                    body = rest;
                    words_left -= NAME_WORDS as u32;
                    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                    let name = String::from_utf8_lossy(&bytes[..end]).into_owned();
                    events.push(TraceEvent::Name { name });
                }
                w if w == TAG_END => {
                    let (rest, end_pc) = le_u32::<_, nom::error::Error<&[u8]>>(body)
                        .map_err(|_| TraceError::Malformed("END missing pc word".to_string()))?;
                    body = rest;
                    words_left = words_left.checked_sub(1).ok_or_else(|| TraceError::Malformed("END overran batch".into()))?;
                    events.push(TraceEvent::End { end_pc });
                }
                _ => return Err(TraceError::Malformed(format!("unknown tag word {word:#06x}"))),
            }
        } else {
            let pc = word;
            if words_left == 0 {
                return Err(TraceError::Malformed("observation missing last_pc word".to_string()));
            }
            let (rest, last_pc) = le_u32::<_, nom::error::Error<&[u8]>>(body)
                .map_err(|_| TraceError::Malformed("truncated last_pc word".to_string()))?;
            body = rest;
            words_left -= 1;
            events.push(TraceEvent::Observation { pc, last_pc });
        }
    }

    Ok(events)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u16(buf: &mut Vec<u8>, v: u16) {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    fn push_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    #[test]
    fn decodes_start_then_one_observation() {
        let mut buf = Vec::new();
        push_u16(&mut buf, TAG_ID);
        push_u16(&mut buf, 7);
        push_u16(&mut buf, TAG_SZ);
        push_u32(&mut buf, 4); // size_words: START tag+pc (2) + observation (2)
        push_u32(&mut buf, TAG_START);
        push_u32(&mut buf, 0x0880_1000);
        push_u32(&mut buf, 0x0880_1004);
        push_u32(&mut buf, 0x0880_1000);

        let (rest, batch) = read_batch(&buf).unwrap();
        assert!(rest.is_empty());
        assert_eq!(batch.thread_id, 7);
        assert_eq!(
            batch.events,
            vec![
                TraceEvent::Start { pc: 0x0880_1000 },
                TraceEvent::Observation { pc: 0x0880_1004, last_pc: 0x0880_1000 },
            ]
        );
    }

    #[test]
    fn decodes_name_tag_with_nul_padded_ascii() {
        let mut buf = Vec::new();
        push_u16(&mut buf, TAG_ID);
        push_u16(&mut buf, 1);
        push_u16(&mut buf, TAG_SZ);
        push_u32(&mut buf, 9);
        push_u32(&mut buf, TAG_NAME);
        let mut name_bytes = vec![0u8; 32];
        name_bytes[..5].copy_from_slice(b"idle1");
        buf.extend_from_slice(&name_bytes);

        let (_, batch) = read_batch(&buf).unwrap();
        assert_eq!(batch.events, vec![TraceEvent::Name { name: "idle1".to_string() }]);
        assert_eq!(batch.size_words, 9);
    }
}
