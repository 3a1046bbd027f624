//! Logical (bank:offset) to physical (ROM file offset) address mapping.

use std::fmt;
use std::ops::RangeInclusive;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// One declared memory region. Banks in `mirror_bank_range` resolve to the
/// same physical bytes as the primary banks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub identifier: String,
    pub bank_range: RangeInclusive<u8>,
    pub address_range: RangeInclusive<u32>,
    pub mask: u32,
    pub writable: bool,
    pub mirror_bank_range: Option<RangeInclusive<u8>>,
}

impl Mapping {
    pub fn rom(
        identifier: impl Into<String>,
        bank_range: RangeInclusive<u8>,
        address_range: RangeInclusive<u32>,
        mask: u32,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            bank_range,
            address_range,
            mask,
            writable: false,
            mirror_bank_range: None,
        }
    }

    pub fn with_mirror(mut self, banks: RangeInclusive<u8>) -> Self {
        self.mirror_bank_range = Some(banks);
        self
    }

    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("bus '{name}' cannot be edited once code generation is complete")]
    NotEditable { name: String },
    #[error("no mapping named '{identifier}'")]
    UnknownMapping { identifier: String },
    #[error("invalid mapping '{identifier}': {reason}")]
    InvalidMapping { identifier: String, reason: String },
    #[error("advancing {address:#08x} by {count} runs past mapping '{identifier}'")]
    RegionOverflow {
        identifier: String,
        address: i64,
        count: i64,
    },
}

/// Built-in memory layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MappingMode {
    #[default]
    Low,
    Low2,
    High,
}

impl MappingMode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Low2 => "low2",
            Self::High => "high",
        }
    }

    /// Address code starts at before any `*=`.
    pub fn origin(self) -> i64 {
        match self {
            Self::Low => 0x00_8000,
            Self::Low2 => 0x80_8000,
            Self::High => 0xC0_0000,
        }
    }
}

impl fmt::Display for MappingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BankOwner {
    identifier: String,
    /// Bounds of the range this bank belongs to (primary or mirror).
    bank_start: u8,
    bank_end: u8,
}

#[derive(Debug, Clone)]
pub struct Bus {
    name: String,
    mappings: IndexMap<String, Mapping>,
    lookup: FxHashMap<u8, BankOwner>,
    editable: bool,
}

/// Mapping that owns an address, seen through the bank range it came from.
#[derive(Debug, Clone, Copy)]
pub struct Region<'a> {
    pub mapping: &'a Mapping,
    bank_start: u8,
    bank_end: u8,
}

impl Region<'_> {
    pub fn physical(&self, address: i64) -> Option<u32> {
        if self.mapping.writable {
            return None;
        }
        let bank = (address >> 16) as u32;
        let offset = (address & 0xFFFF) as u32;
        if !self.mapping.address_range.contains(&offset) {
            return None;
        }
        let mask = self.mapping.mask;
        Some((bank - u32::from(self.bank_start)) * mask + (offset & !mask & 0xFFFF))
    }

    pub fn logical(&self, physical: u32) -> i64 {
        let mask = self.mapping.mask;
        let bank = i64::from(physical / mask) + i64::from(self.bank_start);
        (bank << 16) | i64::from((mask & 0xFFFF) + physical % mask)
    }
}

impl Bus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mappings: IndexMap::new(),
            lookup: FxHashMap::default(),
            editable: true,
        }
    }

    pub fn preset(mode: MappingMode) -> Self {
        let mut bus = Self::new(mode.name());
        let mappings = match mode {
            MappingMode::Low => vec![
                Mapping::rom("rom", 0x00..=0x7D, 0x8000..=0xFFFF, 0x8000).with_mirror(0x80..=0xFF),
                Mapping::rom("ram", 0x7E..=0x7F, 0x0000..=0xFFFF, 0x10000).writable(),
            ],
            MappingMode::Low2 => vec![
                Mapping::rom("rom", 0x80..=0xFF, 0x8000..=0xFFFF, 0x8000).with_mirror(0x00..=0x7D),
                Mapping::rom("ram", 0x7E..=0x7F, 0x0000..=0xFFFF, 0x10000).writable(),
            ],
            MappingMode::High => vec![
                Mapping::rom("rom", 0xC0..=0xFF, 0x0000..=0xFFFF, 0x10000).with_mirror(0x40..=0x7D),
                Mapping::rom("low_rom", 0x00..=0x3F, 0x8000..=0xFFFF, 0x10000)
                    .with_mirror(0x80..=0xBF),
                Mapping::rom("ram", 0x7E..=0x7F, 0x0000..=0xFFFF, 0x10000).writable(),
            ],
        };
        for mapping in mappings {
            bus.install(mapping);
        }
        bus
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    /// Prevents further `map`/`unmap` calls.
    pub fn freeze(&mut self) {
        self.editable = false;
    }

    /// Installs `mapping`, taking over its banks from any earlier owner.
    pub fn map(&mut self, mapping: Mapping) -> Result<(), BusError> {
        self.check_editable()?;
        validate(&mapping)?;
        if self.mappings.contains_key(&mapping.identifier) {
            self.remove(&mapping.identifier);
        }
        self.install(mapping);
        Ok(())
    }

    /// Removes a mapping together with its mirror.
    pub fn unmap(&mut self, identifier: &str) -> Result<(), BusError> {
        self.check_editable()?;
        if !self.mappings.contains_key(identifier) {
            return Err(BusError::UnknownMapping {
                identifier: identifier.to_string(),
            });
        }
        self.remove(identifier);
        Ok(())
    }

    fn check_editable(&self) -> Result<(), BusError> {
        if self.editable {
            Ok(())
        } else {
            Err(BusError::NotEditable {
                name: self.name.clone(),
            })
        }
    }

    fn install(&mut self, mapping: Mapping) {
        let ranges =
            std::iter::once(mapping.bank_range.clone()).chain(mapping.mirror_bank_range.clone());
        for banks in ranges {
            for bank in banks.clone() {
                self.lookup.insert(
                    bank,
                    BankOwner {
                        identifier: mapping.identifier.clone(),
                        bank_start: *banks.start(),
                        bank_end: *banks.end(),
                    },
                );
            }
        }
        self.mappings.insert(mapping.identifier.clone(), mapping);
    }

    fn remove(&mut self, identifier: &str) {
        self.mappings.shift_remove(identifier);
        self.lookup.retain(|_, owner| owner.identifier != identifier);
    }

    pub fn region(&self, address: i64) -> Option<Region<'_>> {
        if !(0..=0xFF_FFFF).contains(&address) {
            return None;
        }
        let owner = self.lookup.get(&((address >> 16) as u8))?;
        let mapping = self.mappings.get(&owner.identifier)?;
        Some(Region {
            mapping,
            bank_start: owner.bank_start,
            bank_end: owner.bank_end,
        })
    }

    /// `address` lies in a RAM region, whose bytes never reach the output.
    pub fn is_writable(&self, address: i64) -> bool {
        self.region(address)
            .is_some_and(|region| region.mapping.writable)
    }

    /// Offset of `address` in the output image, if it is backed by ROM.
    pub fn physical(&self, address: i64) -> Option<u32> {
        self.region(address)?.physical(address)
    }

    /// Moves `address` forward by `count` bytes. ROM addresses advance
    /// through the physical image so bank gaps and mirrors are honoured;
    /// anything else advances linearly.
    pub fn advance(&self, address: i64, count: i64) -> Result<i64, BusError> {
        let Some(region) = self.region(address) else {
            return Ok(address + count);
        };
        let Some(physical) = region.physical(address) else {
            return Ok(address + count);
        };
        let overflow = || BusError::RegionOverflow {
            identifier: region.mapping.identifier.clone(),
            address,
            count,
        };
        let target = u32::try_from(i64::from(physical) + count).map_err(|_| overflow())?;
        let logical = region.logical(target);
        if logical >> 16 > i64::from(region.bank_end) {
            return Err(overflow());
        }
        Ok(logical)
    }
}

fn validate(mapping: &Mapping) -> Result<(), BusError> {
    let invalid = |reason: &str| BusError::InvalidMapping {
        identifier: mapping.identifier.clone(),
        reason: reason.to_string(),
    };
    if mapping.bank_range.is_empty() {
        return Err(invalid("bank range is empty"));
    }
    if mapping.address_range.is_empty() || *mapping.address_range.end() > 0xFFFF {
        return Err(invalid("address range must lie within 0x0000-0xffff"));
    }
    if !mapping.mask.is_power_of_two() || mapping.mask > 0x10000 {
        return Err(invalid("mask must be a power of two no larger than 0x10000"));
    }
    if mapping
        .mirror_bank_range
        .as_ref()
        .is_some_and(|mirror| mirror.is_empty())
    {
        return Err(invalid("mirror bank range is empty"));
    }
    Ok(())
}
