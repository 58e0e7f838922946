//! FITS header card parsing and writing.
//!
//! A header is a run of 80-byte cards terminated by the `END` card and padded
//! with blanks to a whole number of 2880-byte blocks. Decoded cards become
//! [`MetadataRecord`]s holding the textual value of the card.

use std::str;

use crate::block::{align_up, BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE, HEADER_PAD_BYTE};
use crate::error::{Error, Result};
use crate::io::RandomAccess;
use crate::metadata::{MetadataRecord, MetadataSet};
use crate::value::{format_value, parse_value_text, Value};

/// The terminator keyword, padded to the keyword field width.
pub const END_KEYWORD: &[u8; 8] = b"END     ";

/// Keywords that never carry a value indicator. Their bytes 8..80 are free text.
const COMMENTARY_KEYWORDS: [&str; 2] = ["COMMENT", "HISTORY"];

/// One decoded 80-byte card.
#[derive(Debug, Clone, PartialEq)]
pub enum Card {
    /// The `END` terminator.
    End,
    /// A card with a blank keyword field.
    Blank,
    /// A keyword card.
    Record(MetadataRecord),
}

impl Card {
    /// Returns `true` if this card is the END keyword.
    pub fn is_end(&self) -> bool {
        matches!(self, Card::End)
    }
}

// ── Parsing ──

fn valid_keyword_byte(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'0'..=b'9' | b' ' | b'-' | b'_')
}

/// Free text following the keyword field, right-trimmed.
fn card_text(card_bytes: &[u8; CARD_SIZE]) -> Result<String> {
    let text = str::from_utf8(&card_bytes[8..])
        .map_err(|_| Error::InvalidKeyword(String::from_utf8_lossy(&card_bytes[..8]).into()))?;
    Ok(text.trim_end().to_string())
}

/// Parse a single 80-byte FITS header card.
///
/// Value cards (`= ` in bytes 8..10) keep only the value; anything after the
/// comment separator is dropped. Commentary cards keep their free text.
pub fn parse_card(card_bytes: &[u8; CARD_SIZE]) -> Result<Card> {
    let keyword_field = &card_bytes[..8];

    if keyword_field == END_KEYWORD {
        return Ok(Card::End);
    }
    if !keyword_field.iter().copied().all(valid_keyword_byte) {
        return Err(Error::InvalidKeyword(
            String::from_utf8_lossy(keyword_field).into_owned(),
        ));
    }
    // Validated as ASCII above.
    let keyword = str::from_utf8(keyword_field)
        .map_err(|_| Error::InvalidKeyword(String::from_utf8_lossy(keyword_field).into()))?
        .trim_end();
    if keyword.is_empty() {
        return Ok(Card::Blank);
    }

    let has_value = card_bytes[8] == b'=' && card_bytes[9] == b' ';
    let value = if has_value && !COMMENTARY_KEYWORDS.contains(&keyword) {
        parse_value_text(&card_bytes[10..])
            .map(|(text, _comment)| text)
            .unwrap_or_default()
    } else {
        card_text(card_bytes)?
    };

    Ok(Card::Record(MetadataRecord {
        keyword: keyword.to_string(),
        value,
    }))
}

/// Result of scanning one header from storage.
#[derive(Debug, Clone)]
pub struct HeaderScan {
    /// The decoded records (terminator excluded).
    pub metadata: MetadataSet,
    /// Number of cards consumed, including blanks and the terminator.
    pub cards: usize,
    /// Byte offset just past the END card.
    pub end: u64,
}

impl HeaderScan {
    /// Offset of the first byte after the header's padded blocks.
    pub fn padded_end(&self) -> u64 {
        align_up(self.end)
    }
}

/// Read cards from `storage` starting at `offset` until the END card.
///
/// Cards are read one block at a time. Fails with [`Error::UnexpectedEof`]
/// if storage ends before the terminator.
pub fn read_header<S: RandomAccess + ?Sized>(storage: &S, offset: u64) -> Result<HeaderScan> {
    let size = storage.size()?;
    let mut metadata = MetadataSet::new();
    let mut block = vec![HEADER_PAD_BYTE; BLOCK_SIZE as usize];
    let mut position = offset;
    let mut cards = 0usize;

    while position < size {
        let available = (size - position).min(BLOCK_SIZE) as usize;
        let chunk = &mut block[..available];
        storage.read_exact_at(chunk, position)?;

        for card_bytes in chunk.chunks_exact(CARD_SIZE) {
            let card_bytes: &[u8; CARD_SIZE] = card_bytes
                .try_into()
                .map_err(|_| Error::UnexpectedEof)?;
            cards += 1;
            match parse_card(card_bytes)? {
                Card::End => {
                    return Ok(HeaderScan {
                        metadata,
                        cards,
                        end: offset + (cards * CARD_SIZE) as u64,
                    });
                }
                Card::Blank => {}
                Card::Record(record) => metadata.insert(record.keyword, record.value),
            }
        }

        if available < BLOCK_SIZE as usize {
            break;
        }
        position += BLOCK_SIZE;
    }

    Err(Error::UnexpectedEof)
}

// ── Writing ──

/// Validate a keyword and pad it to the 8-byte keyword field.
///
/// Lowercase letters are upper-cased; anything outside `A-Z 0-9 - _`, an
/// empty name, or a name longer than 8 bytes is rejected.
pub fn keyword_field(name: &str) -> Result<[u8; 8]> {
    let upper = name.trim_end().to_ascii_uppercase();
    let bytes = upper.as_bytes();
    if bytes.is_empty()
        || bytes.len() > 8
        || !bytes.iter().all(|&b| b != b' ' && valid_keyword_byte(b))
        || upper == "END"
    {
        return Err(Error::InvalidKeyword(name.to_string()));
    }
    let mut field = [b' '; 8];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

/// Serialize a keyword/value pair into an 80-byte card image.
pub fn format_card(keyword: &str, value: &Value) -> Result<[u8; CARD_SIZE]> {
    let name = keyword_field(keyword)?;
    let field = format_value(value).ok_or_else(|| Error::InvalidValue {
        keyword: keyword.to_ascii_uppercase(),
        value: match value {
            Value::String(s) => s.clone(),
            other => format!("{other:?}"),
        },
    })?;
    let mut buf = [b' '; CARD_SIZE];
    buf[..8].copy_from_slice(&name);
    buf[8] = b'=';
    buf[9] = b' ';
    buf[10..].copy_from_slice(&field);
    Ok(buf)
}

/// Create the standard FITS END card.
pub fn format_end_card() -> [u8; CARD_SIZE] {
    let mut buf = [b' '; CARD_SIZE];
    buf[..8].copy_from_slice(END_KEYWORD);
    buf
}

/// Number of cards that fit in `blocks` header blocks.
pub const fn card_capacity(blocks: usize) -> usize {
    blocks * CARDS_PER_BLOCK
}

/// Serialize cards into `blocks` header blocks: the cards in order, then the
/// END card, then blank fill.
///
/// Fails with [`Error::HeaderFull`] if the cards and terminator do not fit.
pub fn serialize_header(cards: &[[u8; CARD_SIZE]], blocks: usize) -> Result<Vec<u8>> {
    let capacity = card_capacity(blocks);
    if cards.len() + 1 > capacity {
        return Err(Error::HeaderFull { capacity });
    }

    let mut buf = vec![HEADER_PAD_BYTE; capacity * CARD_SIZE];
    for (i, card) in cards.iter().enumerate() {
        let offset = i * CARD_SIZE;
        buf[offset..offset + CARD_SIZE].copy_from_slice(card);
    }
    let end_offset = cards.len() * CARD_SIZE;
    buf[end_offset..end_offset + CARD_SIZE].copy_from_slice(&format_end_card());

    Ok(buf)
}
