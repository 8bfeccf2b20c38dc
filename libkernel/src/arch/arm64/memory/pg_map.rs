use log::{debug, info, trace, warn};

use super::{
    pg_descriptors::{Descriptor, DescriptorAttrs, DescriptorKind},
    pg_tables::{DESCRIPTORS_PER_TABLE, Level, SlotRef, TableId, TranslationTableSet, XlatConfig},
    pg_walk::locate_slot,
};
use crate::error::MapError;
use crate::memory::PAGE_MASK;
use crate::memory::address::{PA, VA};
use crate::memory::attributes::RegionAttributes;

/// One region to be mapped.
#[derive(Clone, Copy, Debug)]
pub struct MappingRequest<'n> {
    /// Only used for diagnostics.
    pub name: &'n str,
    pub phys: PA,
    pub virt: VA,
    pub size: usize,
    pub attrs: RegionAttributes,
}

impl MappingRequest<'_> {
    fn validate(&self, config: &XlatConfig) -> Result<(), MapError> {
        if !self.phys.is_page_aligned() {
            return Err(MapError::PhysNotAligned(self.phys));
        }

        if !self.virt.is_page_aligned() {
            return Err(MapError::VirtNotAligned(self.virt));
        }

        if self.size & PAGE_MASK != 0 {
            return Err(MapError::SizeNotAligned(self.size));
        }

        if !self
            .virt
            .checked_add(self.size)
            .is_some_and(|end| end.value() <= config.va_limit())
        {
            return Err(MapError::VirtOutOfRange {
                start: self.virt,
                size: self.size,
                va_bits: config.va_bits(),
            });
        }

        if !self
            .phys
            .checked_add(self.size)
            .is_some_and(|end| end.value() <= config.pa_limit())
        {
            return Err(MapError::PhysOutOfRange {
                start: self.phys,
                size: self.size,
                pa_bits: config.pa_bits(),
            });
        }

        Ok(())
    }
}

/// Output address a block of `span` bytes would need for `virt` to map to
/// `phys`.
fn block_base(phys: PA, virt: VA, span: usize) -> Option<PA> {
    phys.value()
        .checked_sub(virt.value() & (span - 1))
        .map(PA::from_value)
}

fn descend(level: Level) -> Result<Level, MapError> {
    level.next().ok_or(MapError::WalkDepthExceeded)
}

impl TranslationTableSet<'_> {
    /// Maps `size` bytes at `virt` to `phys` with `attrs`.
    ///
    /// Overlapping an existing mapping replaces it for the overlapped range.
    pub fn add_mapping(
        &mut self,
        name: &str,
        phys: PA,
        virt: VA,
        size: usize,
        attrs: RegionAttributes,
    ) -> Result<(), MapError> {
        self.map(&MappingRequest {
            name,
            phys,
            virt,
            size,
            attrs,
        })
    }

    /// Places descriptors for `req`, largest blocks first.
    ///
    /// After every terminal placement the walk restarts at the base level so
    /// the remainder of the range is always tried with the biggest block its
    /// alignment allows.
    pub fn map(&mut self, req: &MappingRequest) -> Result<(), MapError> {
        req.validate(self.config())?;

        info!(
            "mmap {}: virt {} phys {} size 0x{:x}",
            req.name, req.virt, req.phys, req.size
        );

        let attrs = DescriptorAttrs::new(req.attrs, self.config().regime());
        let base_level = self.config().base_level();

        let mut level = base_level;
        let mut virt = req.virt;
        let mut phys = req.phys;
        let mut remaining = req.size;

        while remaining > 0 {
            let slot = locate_slot(self, virt, level)
                .map_err(|blocked| MapError::WalkBlocked { level: blocked.level })?;
            let span = level.span();
            let current = self.descriptor(slot);
            let fits = level.supports_block()
                && remaining >= span
                && virt.is_aligned(span)
                && phys.is_aligned(span);

            match (fits, current.kind(level)) {
                // Keep an existing subtree reachable; fill it at finer grain.
                (_, DescriptorKind::Table) => level = descend(level)?,
                (true, _) => {
                    self.place_terminal(slot, phys, attrs, current);
                    virt = virt.add_bytes(span);
                    phys = phys.add_bytes(span);
                    remaining -= span;
                    level = base_level;
                }
                (false, DescriptorKind::Invalid) => {
                    let table = self.allocate_table()?;
                    let desc = Descriptor::new_table(self.table_pa(table));
                    debug!("{} slot {}: [Table] {}", level, slot.index, self.table_pa(table));
                    self.write_descriptor(slot, desc);
                    level = descend(level)?;
                }
                // The enclosing block already maps this part identically.
                (false, DescriptorKind::Block)
                    if current.attrs() == attrs
                        && current.mapped_address(level) == block_base(phys, virt, span) =>
                {
                    let covered = (span - (virt.value() & (span - 1))).min(remaining);
                    trace!("{} slot {}: covered by existing block", level, slot.index);
                    virt = virt.add_bytes(covered);
                    phys = phys.add_bytes(covered);
                    remaining -= covered;
                    level = base_level;
                }
                (false, DescriptorKind::Block | DescriptorKind::Page) => {
                    self.split_block(slot)?;
                    level = descend(level)?;
                }
            }
        }

        Ok(())
    }

    fn place_terminal(&mut self, slot: SlotRef, pa: PA, attrs: DescriptorAttrs, current: Descriptor) {
        let desc = Descriptor::new_terminal(pa, attrs, slot.level);

        if desc == current {
            trace!("{} slot {}: already mapped", slot.level, slot.index);
            return;
        }

        let regime = self.config().regime();

        if current.kind(slot.level).is_terminal() && current.attrs() != attrs {
            warn!(
                "{} slot {}: replacing {} with {}",
                slot.level,
                slot.index,
                current.attrs().display(regime),
                attrs.display(regime)
            );
        }

        debug!("{} slot {}: {} {}", slot.level, slot.index, pa, attrs.display(regime));
        self.write_descriptor(slot, desc);
    }

    /// Replaces the block descriptor in `slot` with a table whose entries
    /// reproduce the block's range and attributes one level down.
    pub fn split_block(&mut self, slot: SlotRef) -> Result<TableId, MapError> {
        let old = self.descriptor(slot);
        let child_level = descend(slot.level)?;

        let Some(base) = old.mapped_address(slot.level) else {
            return Err(MapError::WalkBlocked { level: slot.level });
        };

        debug!("Splitting {} slot {}", slot.level, slot.index);

        let table = self.allocate_table()?;
        let attrs = old.attrs();

        for index in 0..DESCRIPTORS_PER_TABLE {
            let pa = base.add_bytes(index * child_level.span());
            self.write_descriptor(
                SlotRef {
                    table,
                    index,
                    level: child_level,
                },
                Descriptor::new_terminal(pa, attrs, child_level),
            );
        }

        self.write_descriptor(slot, Descriptor::new_table(self.table_pa(table)));

        Ok(table)
    }
}
