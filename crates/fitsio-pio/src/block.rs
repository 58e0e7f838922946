/// FITS block size in bytes (each logical record is one block).
pub const BLOCK_SIZE: u64 = 2880;

/// FITS card (keyword record) size in bytes.
pub const CARD_SIZE: usize = 80;

/// Number of cards that fit in a single block.
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE as usize / CARD_SIZE;

/// Padding byte used for header blocks (ASCII space).
pub const HEADER_PAD_BYTE: u8 = 0x20;

/// Padding byte used for data blocks (zero).
pub const DATA_PAD_BYTE: u8 = 0x00;

/// Returns the number of FITS blocks required to hold `num_bytes` bytes.
///
/// This is a ceiling division: 0 bytes requires 0 blocks, 1 byte requires
/// 1 block, 2880 bytes requires 1 block, 2881 bytes requires 2 blocks.
pub const fn blocks_needed(num_bytes: u64) -> u64 {
    num_bytes.div_ceil(BLOCK_SIZE)
}

/// Rounds `offset` up to the next multiple of [`BLOCK_SIZE`].
///
/// Offsets that are already aligned are returned unchanged.
pub const fn align_up(offset: u64) -> u64 {
    blocks_needed(offset) * BLOCK_SIZE
}

/// Overflow-checked variant of [`align_up`].
pub fn checked_align_up(offset: u64) -> Option<u64> {
    blocks_needed(offset).checked_mul(BLOCK_SIZE)
}

/// Returns `true` if `offset` sits on a block boundary.
pub const fn is_aligned(offset: u64) -> bool {
    offset % BLOCK_SIZE == 0
}
