use super::{
    pg_descriptors::{Descriptor, DescriptorKind},
    pg_tables::{Level, SlotRef, TableId, TranslationTableSet},
};
use crate::memory::address::{PA, VA};

/// Why a walk stopped short of its target level: the slot at `level` does
/// not hold a table descriptor this set owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WalkBlocked {
    pub level: Level,
    pub slot: SlotRef,
    pub descriptor: Descriptor,
}

/// Result of resolving a virtual address down to its terminal descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Translation {
    pub pa: PA,
    pub descriptor: Descriptor,
    pub level: Level,
}

/// Finds the descriptor slot for `va` at `target`, following table
/// descriptors from the root. Never modifies the tables.
pub fn locate_slot(
    tables: &TranslationTableSet,
    va: VA,
    target: Level,
) -> Result<SlotRef, WalkBlocked> {
    let mut level = tables.config().base_level();
    let mut table = TableId::ROOT;

    loop {
        let slot = SlotRef {
            table,
            index: level.index(va),
            level,
        };

        if level == target {
            return Ok(slot);
        }

        let descriptor = tables.descriptor(slot);
        let blocked = WalkBlocked {
            level,
            slot,
            descriptor,
        };

        // Targets above the base level are unreachable by construction.
        if level > target {
            return Err(blocked);
        }

        table = descriptor
            .next_table_address(level)
            .and_then(|pa| tables.table_id(pa))
            .ok_or(blocked)?;

        level = level.next().ok_or(blocked)?;
    }
}

/// Resolves `va` to the physical address and terminal descriptor covering it.
pub fn translate(tables: &TranslationTableSet, va: VA) -> Option<Translation> {
    if va.value() >= tables.config().va_limit() {
        return None;
    }

    let mut level = tables.config().base_level();
    let mut table = TableId::ROOT;

    loop {
        let descriptor = tables.table(table).get(level.index(va));

        match descriptor.kind(level) {
            DescriptorKind::Invalid => return None,
            DescriptorKind::Block | DescriptorKind::Page => {
                let offset = va.value() & (level.span() - 1);
                return Some(Translation {
                    pa: descriptor.output_address().add_bytes(offset),
                    descriptor,
                    level,
                });
            }
            DescriptorKind::Table => {
                table = tables.table_id(descriptor.output_address())?;
                level = level.next()?;
            }
        }
    }
}
