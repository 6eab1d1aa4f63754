//! Control byte encoding and 16-wide group scans.
//!
//! Every slot has one control byte. A byte with the high bit clear is an
//! occupied slot and holds the low 7 bits of the key's hash; the two byte
//! patterns with the high bit set are reserved for empty slots and
//! tombstones.

/// Control byte of a slot that has not held a value since the last reset.
///
/// Chosen as 0x80 (sign bit set) so it can never collide with a 7-bit tag.
pub(crate) const EMPTY: u8 = 0x80;

/// Control byte of a slot whose value was erased (a tombstone).
pub(crate) const DELETED: u8 = 0xFE;

/// Number of control bytes compared per probe step.
pub(crate) const GROUP_WIDTH: usize = 16;

#[inline(always)]
pub(crate) fn hashtag(hash: u64) -> u8 {
    (hash & 0x7F) as u8
}

#[inline(always)]
pub(crate) fn is_full(ctrl: u8) -> bool {
    ctrl & 0x80 == 0
}

/// A set of in-group offsets, one bit per control byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct BitMask(pub(crate) u16);

impl BitMask {
    #[inline(always)]
    pub(crate) fn any(self) -> bool {
        self.0 != 0
    }

    #[inline(always)]
    pub(crate) fn lowest(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }
}

impl Iterator for BitMask {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        let offset = self.lowest()?;
        self.0 &= self.0 - 1;
        Some(offset)
    }
}

/// Result of scanning one group for a tag.
///
/// `matches` is only a candidate set: two keys can share a 7-bit tag, so
/// each offset still has to be confirmed by comparing keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct GroupScan {
    pub(crate) matches: BitMask,
    pub(crate) empty: BitMask,
    pub(crate) deleted: BitMask,
}

/// Scan the group of control bytes starting at `start`.
///
/// A full 16-byte window goes through the vectorized [`Group`]. A window that
/// would run past the end of `ctrl` is shortened to the tail and scanned one
/// byte at a time; the caller wraps to index 0 afterwards.
#[inline]
pub(crate) fn scan(ctrl: &[u8], start: usize, tag: u8) -> GroupScan {
    let window = &ctrl[start..];
    match window.first_chunk::<GROUP_WIDTH>() {
        Some(bytes) => Group::load(bytes).scan(tag),
        None => scan_bytes(window, tag),
    }
}

/// Byte-at-a-time scan of up to [`GROUP_WIDTH`] control bytes.
///
/// This is the reference behavior every [`Group`] implementation must match.
#[inline]
pub(crate) fn scan_bytes(bytes: &[u8], tag: u8) -> GroupScan {
    debug_assert!(bytes.len() <= GROUP_WIDTH);
    debug_assert!(is_full(tag));

    let mut result = GroupScan::default();
    for (offset, &byte) in bytes.iter().take(GROUP_WIDTH).enumerate() {
        let bit = 1u16 << offset;
        if byte == tag {
            result.matches.0 |= bit;
        } else if byte == EMPTY {
            result.empty.0 |= bit;
        } else if byte == DELETED {
            result.deleted.0 |= bit;
        }
    }
    result
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))] {
        /// A group of control bytes held in an SSE2 register.
        #[derive(Clone, Copy)]
        pub(crate) struct Group(core::arch::x86_64::__m128i);

        impl Group {
            #[inline(always)]
            pub(crate) fn load(bytes: &[u8; GROUP_WIDTH]) -> Self {
                use core::arch::x86_64::*;
                // SAFETY: `bytes` is exactly 16 readable bytes, and
                // `_mm_loadu_si128` has no alignment requirement.
                unsafe { Group(_mm_loadu_si128(bytes.as_ptr() as *const __m128i)) }
            }

            #[inline(always)]
            fn match_byte(self, byte: u8) -> BitMask {
                use core::arch::x86_64::*;
                // SAFETY: SSE2 is statically enabled for this target.
                unsafe {
                    let cmp = _mm_cmpeq_epi8(self.0, _mm_set1_epi8(byte as i8));
                    BitMask(_mm_movemask_epi8(cmp) as u16)
                }
            }

            #[inline(always)]
            pub(crate) fn scan(self, tag: u8) -> GroupScan {
                GroupScan {
                    matches: self.match_byte(tag),
                    empty: self.match_byte(EMPTY),
                    deleted: self.match_byte(DELETED),
                }
            }
        }
    } else {
        /// A group of control bytes, scanned one byte at a time.
        #[derive(Clone, Copy)]
        pub(crate) struct Group([u8; GROUP_WIDTH]);

        impl Group {
            #[inline(always)]
            pub(crate) fn load(bytes: &[u8; GROUP_WIDTH]) -> Self {
                Group(*bytes)
            }

            #[inline(always)]
            pub(crate) fn scan(self, tag: u8) -> GroupScan {
                scan_bytes(&self.0, tag)
            }
        }
    }
}
