use log::debug;

use crate::error::{EmuError, Result};
use crate::instruction::{ByteSource, DecodedInstruction, decode};
use crate::mmu::{BANK_SIZE, Mmu, Region};

/// A read-only byte region mapped at `base`.
struct RegionBytes<'a> {
    base: u16,
    bytes: &'a [u8],
}

impl ByteSource for RegionBytes<'_> {
    fn byte_at(&self, address: u16) -> Result<u8> {
        address
            .checked_sub(self.base)
            .and_then(|offset| self.bytes.get(offset as usize))
            .copied()
            .ok_or(EmuError::OutOfRangeAddress {
                address: address as u32,
            })
    }
}

/// Descriptors for every offset of one region. `None` marks offsets whose
/// operands run past the end of the region.
struct RegionTable {
    entries: Vec<Option<DecodedInstruction>>,
}

impl RegionTable {
    fn build(base: u16, bytes: &[u8]) -> Self {
        let source = RegionBytes { base, bytes };
        let entries: Vec<_> = (0..bytes.len())
            .map(|offset| decode(base.wrapping_add(offset as u16), &source).ok())
            .collect();
        debug!(
            "decoded {} bytes of ROM at {:#06x}",
            entries.len(),
            base
        );
        Self { entries }
    }
}

/// Precomputed decode tables for regions that cannot change after load: the
/// boot overlay and each ROM bank. Tables are built the first time execution
/// reaches a region. RAM is never cached.
#[derive(Default)]
pub struct DecodeCache {
    boot: Option<RegionTable>,
    fixed: Option<RegionTable>,
    switchable: Vec<Option<RegionTable>>,
}

impl DecodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached descriptor for `address`, or `None` when the caller has to
    /// decode live.
    pub fn lookup(&mut self, mmu: &Mmu, address: u16) -> Option<&mut DecodedInstruction> {
        let location = mmu.resolve(address);
        let (slot, base, bytes) = match location.region {
            Region::Boot => (&mut self.boot, 0x0000, mmu.boot_rom()?),
            Region::Rom(bank) if (address as usize) < BANK_SIZE => {
                (&mut self.fixed, 0x0000, mmu.cartridge().bank(bank)?)
            }
            Region::Rom(bank) => {
                if self.switchable.len() <= bank {
                    self.switchable.resize_with(bank + 1, || None);
                }
                (
                    &mut self.switchable[bank],
                    BANK_SIZE as u16,
                    mmu.cartridge().bank(bank)?,
                )
            }
            Region::CartRam(_) | Region::Ram => return None,
        };
        let table = slot.get_or_insert_with(|| RegionTable::build(base, bytes));
        table.entries.get_mut(location.offset)?.as_mut()
    }
}
