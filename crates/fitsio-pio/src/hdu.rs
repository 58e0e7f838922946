//! Header-data units: their layout in storage and the records that describe them.

use crate::block::{checked_align_up, BLOCK_SIZE, CARD_SIZE};
use crate::element::ElementKind;
use crate::error::{Error, Result};
use crate::header::{card_capacity, format_card, parse_card, serialize_header, Card, HeaderScan};
use crate::metadata::MetadataSet;
use crate::offset;
use crate::value::{FromValue, Value};

/// Element kind and axis lengths of one HDU to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HduSchema {
    kind: ElementKind,
    axes: Vec<u64>,
    header_blocks: usize,
}

impl HduSchema {
    /// Describe an HDU holding `axes` elements of `kind`, with one header block.
    pub fn new(kind: ElementKind, axes: impl Into<Vec<u64>>) -> Self {
        HduSchema {
            kind,
            axes: axes.into(),
            header_blocks: 1,
        }
    }

    /// Reserve `blocks` header blocks (36 cards each) instead of one.
    pub fn with_header_blocks(mut self, blocks: usize) -> Self {
        self.header_blocks = blocks.max(1);
        self
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn axes(&self) -> &[u64] {
        &self.axes
    }

    pub fn header_blocks(&self) -> usize {
        self.header_blocks
    }
}

/// Bytes occupied by the elements of an array, without padding.
///
/// An empty axis list describes an HDU without data.
pub fn array_extent(kind: ElementKind, axes: &[u64]) -> Result<u64> {
    if axes.is_empty() {
        return Ok(0);
    }
    let mut bytes = kind.byte_width() as u64;
    for (i, &size) in axes.iter().enumerate() {
        bytes = bytes
            .checked_mul(size)
            .ok_or(Error::InvalidAxis { axis: i + 1, size })?;
    }
    Ok(bytes)
}

/// Sizes derived from an element kind and an axis list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HduLayout {
    kind: ElementKind,
    axes: Vec<u64>,
    data_len: u64,
    data_block_size: u64,
}

impl HduLayout {
    /// Compute the layout of an array of `axes` elements of `kind`.
    ///
    /// Axis lengths of zero are rejected.
    pub fn new(kind: ElementKind, axes: &[u64]) -> Result<Self> {
        if let Some(i) = axes.iter().position(|&size| size == 0) {
            return Err(Error::InvalidAxis { axis: i + 1, size: 0 });
        }
        let data_len = array_extent(kind, axes)?;
        let data_block_size = checked_align_up(data_len).ok_or(Error::AddressOverflow {
            offset: 0,
            len: data_len,
        })?;
        Ok(HduLayout {
            kind,
            axes: axes.to_vec(),
            data_len,
            data_block_size,
        })
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn axes(&self) -> &[u64] {
        &self.axes
    }

    /// Unpadded array size in bytes.
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Array size rounded up to whole blocks.
    pub fn data_block_size(&self) -> u64 {
        self.data_block_size
    }

    /// The structural records every HDU starts with, in emission order.
    ///
    /// The first HDU of a file is marked `SIMPLE`; later ones are image
    /// extensions.
    pub fn mandatory_records(&self, first: bool) -> Vec<(String, Value)> {
        let mut records = Vec::with_capacity(self.axes.len() + 5);
        if first {
            records.push(("SIMPLE".to_string(), Value::Logical(true)));
        } else {
            records.push(("XTENSION".to_string(), Value::from("IMAGE")));
        }
        records.push(("BITPIX".to_string(), Value::Integer(self.kind.bitpix())));
        records.push(("NAXIS".to_string(), Value::from(self.axes.len() as i64)));
        for (i, &size) in self.axes.iter().enumerate() {
            records.push((format!("NAXIS{}", i + 1), Value::Integer(size as i64)));
        }
        if first {
            records.push(("EXTEND".to_string(), Value::Logical(true)));
        } else {
            records.push(("PCOUNT".to_string(), Value::Integer(0)));
            records.push(("GCOUNT".to_string(), Value::Integer(1)));
        }
        records
    }
}

/// One header-data unit and its position in storage.
#[derive(Debug, Clone)]
pub struct Hdu {
    metadata: MetadataSet,
    kind: ElementKind,
    axes: Vec<u64>,
    header_start: u64,
    data_start: u64,
    data_len: u64,
    data_block_size: u64,
    card_capacity: usize,
    cards_used: usize,
}

impl Hdu {
    /// Build an HDU from a header scanned at `header_start`.
    ///
    /// `NAXIS`, each `NAXISn` and `BITPIX` must be present and valid.
    /// Non-default `PCOUNT`/`GCOUNT` values enlarge the data block the way
    /// extensions with a heap require, but never the addressable array.
    pub(crate) fn from_scan(scan: HeaderScan, header_start: u64) -> Result<Self> {
        let data_start = scan.padded_end();
        let cards = scan.cards;
        let metadata = scan.metadata;
        let naxis: usize = required(&metadata, "NAXIS")?;
        let mut axes = Vec::with_capacity(naxis);
        for i in 1..=naxis {
            let size: u64 = required(&metadata, &format!("NAXIS{i}"))?;
            if size == 0 {
                return Err(Error::InvalidAxis { axis: i, size });
            }
            axes.push(size);
        }
        let kind = ElementKind::from_bitpix(required(&metadata, "BITPIX")?)?;

        let data_len = array_extent(kind, &axes)?;
        let pcount: u64 = metadata.value_as_optional("PCOUNT")?.unwrap_or(0);
        let gcount: u64 = metadata.value_as_optional("GCOUNT")?.unwrap_or(1);
        let stored = data_len
            .checked_add(pcount)
            .and_then(|n| n.checked_mul(gcount.max(1)))
            .and_then(checked_align_up)
            .ok_or(Error::InvalidValue {
                keyword: "PCOUNT".to_string(),
                value: pcount.to_string(),
            })?;

        if data_start.checked_add(stored).is_none() {
            return Err(Error::AddressOverflow {
                offset: data_start,
                len: stored,
            });
        }
        let header_blocks = (data_start - header_start) / BLOCK_SIZE;
        Ok(Hdu {
            metadata,
            kind,
            axes,
            header_start,
            data_start,
            data_len,
            data_block_size: stored,
            card_capacity: card_capacity(header_blocks as usize),
            cards_used: cards - 1,
        })
    }

    pub fn metadata(&self) -> &MetadataSet {
        &self.metadata
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn axes(&self) -> &[u64] {
        &self.axes
    }

    pub fn naxis(&self) -> usize {
        self.axes.len()
    }

    /// Number of array elements; zero for an HDU without axes.
    pub fn element_count(&self) -> u64 {
        if self.axes.is_empty() {
            0
        } else {
            self.axes.iter().product()
        }
    }

    /// Offset of the first header card.
    pub fn header_start(&self) -> u64 {
        self.header_start
    }

    /// Offset of the first array byte.
    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// Unpadded array size in bytes.
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    pub fn data_block_size(&self) -> u64 {
        self.data_block_size
    }

    /// Offset just past the data block, where the next HDU begins.
    pub fn end(&self) -> u64 {
        self.data_start + self.data_block_size
    }

    /// Number of metadata records held by this HDU.
    pub fn headers_written(&self) -> usize {
        self.metadata.len()
    }

    /// Cards the reserved header blocks can hold, terminator included.
    pub fn card_capacity(&self) -> usize {
        self.card_capacity
    }

    pub fn value_as<T: FromValue>(&self, keyword: &str) -> Result<T> {
        self.metadata.value_as(keyword)
    }

    pub fn value_as_optional<T: FromValue>(&self, keyword: &str) -> Result<Option<T>> {
        self.metadata.value_as_optional(keyword)
    }

    pub fn values<'a>(&'a self, keyword: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.metadata.values(keyword)
    }

    /// Absolute storage offset of a transfer of `len` bytes at `index`.
    pub fn transfer_offset(&self, index: &[u64], len: usize) -> Result<u64> {
        let relative = offset::byte_offset(&self.axes, self.kind.byte_width(), index, len as u64)?;
        Ok(self.data_start + relative)
    }

    /// Storage offset where the next appended card goes.
    ///
    /// Fails with [`Error::HeaderFull`] unless both the card and the
    /// terminator after it fit in the reserved blocks.
    pub(crate) fn next_card_offset(&self) -> Result<u64> {
        if self.cards_used + 2 > self.card_capacity {
            return Err(Error::HeaderFull {
                capacity: self.card_capacity,
            });
        }
        Ok(self.header_start + (self.cards_used * CARD_SIZE) as u64)
    }

    /// Record a card that was written at [`Hdu::next_card_offset`].
    pub(crate) fn card_appended(&mut self, card: &[u8; CARD_SIZE]) -> Result<()> {
        if let Card::Record(record) = parse_card(card)? {
            self.metadata.insert(record.keyword, record.value);
        }
        self.cards_used += 1;
        Ok(())
    }
}

fn required<T: FromValue>(metadata: &MetadataSet, keyword: &str) -> Result<T> {
    metadata
        .value_as_optional(keyword)?
        .ok_or_else(|| Error::MissingKeyword(keyword.to_string()))
}

/// An HDU positioned in a file to be written, with its encoded header.
#[derive(Debug, Clone)]
pub struct PlannedHdu {
    pub hdu: Hdu,
    pub header: Vec<u8>,
}

/// Lay out a whole file: headers and data blocks back to back.
///
/// Pure; returns the planned HDUs and the total file length.
pub fn plan_layout(schemas: &[HduSchema]) -> Result<(Vec<PlannedHdu>, u64)> {
    let mut planned = Vec::with_capacity(schemas.len());
    let mut position = 0u64;

    for (i, schema) in schemas.iter().enumerate() {
        let layout = HduLayout::new(schema.kind, &schema.axes)?;
        let cards = layout
            .mandatory_records(i == 0)
            .iter()
            .map(|(keyword, value)| format_card(keyword, value))
            .collect::<Result<Vec<_>>>()?;
        let header = serialize_header(&cards, schema.header_blocks)?;

        let mut metadata = MetadataSet::new();
        for card in &cards {
            if let Card::Record(record) = parse_card(card)? {
                metadata.insert(record.keyword, record.value);
            }
        }

        let data_start = position + header.len() as u64;
        let hdu = Hdu {
            metadata,
            kind: layout.kind,
            axes: layout.axes,
            header_start: position,
            data_start,
            data_len: layout.data_len,
            data_block_size: layout.data_block_size,
            card_capacity: card_capacity(schema.header_blocks),
            cards_used: cards.len(),
        };
        position = data_start
            .checked_add(hdu.data_block_size)
            .ok_or(Error::AddressOverflow {
                offset: data_start,
                len: hdu.data_block_size,
            })?;
        planned.push(PlannedHdu { hdu, header });
    }

    Ok((planned, position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::read_header;
    use crate::io::{MemoryFile, RandomAccess};

    #[test]
    fn layout_sizes() {
        let layout = HduLayout::new(ElementKind::I16, &[20, 30]).unwrap();
        assert_eq!(layout.data_len(), 1200);
        assert_eq!(layout.data_block_size(), BLOCK_SIZE);

        let layout = HduLayout::new(ElementKind::F32, &[10, 6, 5]).unwrap();
        assert_eq!(layout.data_len(), 1200);

        let layout = HduLayout::new(ElementKind::F64, &[1000]).unwrap();
        assert_eq!(layout.data_len(), 8000);
        assert_eq!(layout.data_block_size(), 3 * BLOCK_SIZE);
    }

    #[test]
    fn layout_without_axes_has_no_data() {
        let layout = HduLayout::new(ElementKind::U8, &[]).unwrap();
        assert_eq!(layout.data_len(), 0);
        assert_eq!(layout.data_block_size(), 0);
    }

    #[test]
    fn layout_rejects_zero_axis() {
        assert!(matches!(
            HduLayout::new(ElementKind::I32, &[4, 0]),
            Err(Error::InvalidAxis { axis: 2, size: 0 })
        ));
    }

    #[test]
    fn layout_rejects_overflowing_extent() {
        assert!(HduLayout::new(ElementKind::F64, &[u64::MAX, 2]).is_err());
    }

    #[test]
    fn layout_reports_unalignable_extent() {
        assert!(matches!(
            HduLayout::new(ElementKind::U8, &[u64::MAX]),
            Err(Error::AddressOverflow {
                offset: 0,
                len: u64::MAX
            })
        ));
    }

    #[test]
    fn mandatory_records_first_hdu() {
        let layout = HduLayout::new(ElementKind::I16, &[20, 30]).unwrap();
        let keys: Vec<String> = layout
            .mandatory_records(true)
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, ["SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "EXTEND"]);
    }

    #[test]
    fn mandatory_records_extension() {
        let layout = HduLayout::new(ElementKind::F32, &[10, 6, 5]).unwrap();
        let records = layout.mandatory_records(false);
        assert_eq!(records[0], ("XTENSION".to_string(), Value::from("IMAGE")));
        assert_eq!(records[1], ("BITPIX".to_string(), Value::Integer(-32)));
        assert_eq!(records[2], ("NAXIS".to_string(), Value::Integer(3)));
        let tail: Vec<&str> = records[6..].iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(tail, ["PCOUNT", "GCOUNT"]);
    }

    #[test]
    fn plan_two_hdus() {
        let schemas = [
            HduSchema::new(ElementKind::I16, [20, 30]),
            HduSchema::new(ElementKind::F32, [10, 6, 5]),
        ];
        let (planned, total) = plan_layout(&schemas).unwrap();
        assert_eq!(planned.len(), 2);

        let first = &planned[0].hdu;
        assert_eq!(first.header_start(), 0);
        assert_eq!(first.data_start(), BLOCK_SIZE);
        assert_eq!(first.headers_written(), 6);

        let second = &planned[1].hdu;
        assert_eq!(second.header_start(), first.data_start() + first.data_block_size());
        assert_eq!(second.data_start(), 3 * BLOCK_SIZE);
        assert_eq!(total, 4 * BLOCK_SIZE);
        assert_eq!(second.value_as::<String>("XTENSION").unwrap(), "IMAGE");
    }

    #[test]
    fn plan_with_extra_header_blocks() {
        let schemas = [HduSchema::new(ElementKind::U8, [10]).with_header_blocks(2)];
        let (planned, total) = plan_layout(&schemas).unwrap();
        assert_eq!(planned[0].header.len() as u64, 2 * BLOCK_SIZE);
        assert_eq!(planned[0].hdu.data_start(), 2 * BLOCK_SIZE);
        assert_eq!(planned[0].hdu.card_capacity(), 72);
        assert_eq!(total, 3 * BLOCK_SIZE);
    }

    #[test]
    fn header_blocks_never_zero() {
        assert_eq!(
            HduSchema::new(ElementKind::U8, [1]).with_header_blocks(0).header_blocks(),
            1
        );
    }

    #[test]
    fn planned_header_scans_back() {
        let schemas = [HduSchema::new(ElementKind::I64, [3, 4])];
        let (planned, _) = plan_layout(&schemas).unwrap();
        let storage = MemoryFile::from(planned[0].header.clone());
        let scan = read_header(&storage, 0).unwrap();
        let hdu = Hdu::from_scan(scan, 0).unwrap();
        assert_eq!(hdu.kind(), ElementKind::I64);
        assert_eq!(hdu.axes(), &[3, 4]);
        assert_eq!(hdu.data_len(), 96);
        assert_eq!(hdu.data_start(), BLOCK_SIZE);
        assert_eq!(hdu.element_count(), 12);
    }

    fn scan_cards(cards: &[(&str, Value)]) -> Result<Hdu> {
        let encoded: Vec<[u8; CARD_SIZE]> = cards
            .iter()
            .map(|(k, v)| format_card(k, v).unwrap())
            .collect();
        let storage = MemoryFile::from(serialize_header(&encoded, 1).unwrap());
        assert_eq!(storage.size().unwrap(), BLOCK_SIZE);
        Hdu::from_scan(read_header(&storage, 0)?, 0)
    }

    #[test]
    fn scan_requires_naxis() {
        let err = scan_cards(&[("BITPIX", Value::Integer(8))]).unwrap_err();
        assert!(matches!(err, Error::MissingKeyword(ref k) if k == "NAXIS"));
    }

    #[test]
    fn scan_requires_every_axis() {
        let err = scan_cards(&[
            ("BITPIX", Value::Integer(8)),
            ("NAXIS", Value::Integer(2)),
            ("NAXIS1", Value::Integer(4)),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::MissingKeyword(ref k) if k == "NAXIS2"));
    }

    #[test]
    fn scan_rejects_bad_bitpix() {
        let err = scan_cards(&[("BITPIX", Value::Integer(24)), ("NAXIS", Value::Integer(0))])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBitpix(24)));
    }

    #[test]
    fn scan_rejects_unparseable_naxis() {
        let err = scan_cards(&[("BITPIX", Value::Integer(8)), ("NAXIS", Value::from("two"))])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }

    #[test]
    fn scan_heap_enlarges_data_block() {
        let hdu = scan_cards(&[
            ("XTENSION", Value::from("BINTABLE")),
            ("BITPIX", Value::Integer(8)),
            ("NAXIS", Value::Integer(2)),
            ("NAXIS1", Value::Integer(100)),
            ("NAXIS2", Value::Integer(28)),
            ("PCOUNT", Value::Integer(100)),
            ("GCOUNT", Value::Integer(1)),
        ])
        .unwrap();
        assert_eq!(hdu.data_len(), 2800);
        assert_eq!(hdu.data_block_size(), 2 * BLOCK_SIZE);
    }

    #[test]
    fn append_slots_and_capacity() {
        let schemas = [HduSchema::new(ElementKind::U8, [1])];
        let (mut planned, _) = plan_layout(&schemas).unwrap();
        let hdu = &mut planned[0].hdu;
        assert_eq!(hdu.next_card_offset().unwrap(), 5 * CARD_SIZE as u64);

        for i in 0..30 {
            let card = format_card(&format!("KEY{i}"), &Value::Integer(i)).unwrap();
            hdu.next_card_offset().unwrap();
            hdu.card_appended(&card).unwrap();
        }
        assert_eq!(hdu.headers_written(), 35);
        assert!(matches!(
            hdu.next_card_offset(),
            Err(Error::HeaderFull { capacity: 36 })
        ));
    }

    #[test]
    fn transfer_offset_is_absolute() {
        let schemas = [HduSchema::new(ElementKind::I16, [20, 30])];
        let (planned, _) = plan_layout(&schemas).unwrap();
        let hdu = &planned[0].hdu;
        assert_eq!(hdu.transfer_offset(&[1, 2], 2).unwrap(), BLOCK_SIZE + 64);
        assert!(hdu.transfer_offset(&[19, 29], 4).is_err());
    }
}
