//! Basic-block manager: address-indexed basic blocks plus the cross-reference
//! edges between them, with lookup expressed over [`IntervalMap::floor`] rather
//! than a lower-bound-then-step-back walk.

use std::collections::HashMap;

use crate::interval_map::IntervalMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BasicBlockError {
    #[error("a basic block already starts at {0:#010x}")]
    AlreadyExists(u32),
    #[error("no basic block contains address {0:#010x}")]
    NoBlockContainsAddress(u32),
    #[error("cannot split a block at its own start address {0:#010x}")]
    SplitAtBlockStart(u32),
}

/// One basic block: a contiguous, single-entry run of instructions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicBlock {
    pub address: u32,
    pub last_address: u32,
    /// The address a trailing conditional/unconditional branch targets, `0` if the
    /// block doesn't end in one.
    pub branch_address: u32,
}

impl BasicBlock {
    #[must_use]
    pub fn contains(&self, addr: u32) -> bool {
        self.address <= addr && addr <= self.last_address
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BbRefKey {
    pub from: u32,
    pub to: u32,
}

/// One cross-reference edge between two basic blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BbRef {
    pub is_dynamic: bool,
    pub is_adjacent: bool,
    pub is_linked: bool,
    pub is_visited: bool,
}

pub struct SplitOutcome {
    pub prev_address: u32,
    pub split_address: u32,
}

#[derive(Default)]
pub struct BasicBlockManager {
    blocks: IntervalMap<BasicBlock>,
    refs: HashMap<BbRefKey, BbRef>,
    refs_to_bb: HashMap<u32, Vec<u32>>,
    refs_from_bb: HashMap<u32, Vec<u32>>,
}

impl BasicBlockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds the block containing `addr`, if any: a floor-lookup by start address,
    /// then a containment check against `last_address` (a block only partially
    /// scanned has `last_address == address` until its first `last_address` update,
    /// so an address just past a freshly created block's start correctly misses).
    #[must_use]
    pub fn get(&self, addr: u32) -> Option<&BasicBlock> {
        if addr == 0 {
            return None;
        }
        let (_, bb) = self.blocks.floor(addr)?;
        bb.contains(addr).then_some(bb)
    }

    #[must_use]
    pub fn get_mut(&mut self, addr: u32) -> Option<&mut BasicBlock> {
        if addr == 0 {
            return None;
        }
        let split_key = self.blocks.floor(addr).map(|(k, _)| k)?;
        let bb = self.blocks.get_mut(split_key)?;
        bb.contains(addr).then_some(bb)
    }

    /// Creates a new, not-yet-scanned block starting at `addr`. Fails if a block
    /// already starts there.
    pub fn create(&mut self, addr: u32) -> Result<&BasicBlock, BasicBlockError> {
        if self.get(addr).is_some() {
            return Err(BasicBlockError::AlreadyExists(addr));
        }
        self.blocks.insert(addr, BasicBlock { address: addr, last_address: addr, branch_address: 0 });
        Ok(self.blocks.get(addr).expect("just inserted"))
    }

    pub fn get_enter_refs(&self, addr: u32) -> &[u32] {
        self.refs_to_bb.get(&addr).map_or(&[], |v| v.as_slice())
    }

    pub fn get_exit_refs(&self, addr: u32) -> &[u32] {
        self.refs_from_bb.get(&addr).map_or(&[], |v| v.as_slice())
    }

    /// Records (or returns the existing) edge `from -> to`. Callers then tag it via
    /// the returned `&mut BbRef` (e.g. `.is_adjacent = true`).
    pub fn create_reference(&mut self, from: u32, to: u32) -> &mut BbRef {
        let key = BbRefKey { from, to };
        if !self.refs.contains_key(&key) {
            self.refs_to_bb.entry(to).or_default().push(from);
            self.refs_from_bb.entry(from).or_default().push(to);
            self.refs.insert(key, BbRef::default());
        }
        self.refs.get_mut(&key).expect("just inserted or already present")
    }

    /// Splits the block containing `split_addr` into two: the tail (`prev` block,
    /// truncated to end right before `split_addr`) and a freshly created block
    /// starting at `split_addr` that inherits the tail end and branch target.
    pub fn split_at(&mut self, split_addr: u32) -> Result<SplitOutcome, BasicBlockError> {
        let prev_address = self.get(split_addr).map(|bb| bb.address).ok_or(BasicBlockError::NoBlockContainsAddress(split_addr))?;
        if prev_address == split_addr {
            return Err(BasicBlockError::SplitAtBlockStart(split_addr));
        }

        let (last_addr, branch_address) = {
            let prev = self.blocks.get_mut(prev_address).expect("looked up by address above");
            let last_addr = prev.last_address;
            if prev.last_address >= split_addr {
                prev.last_address = split_addr - 4;
            }
            (last_addr, prev.branch_address)
        };

        if self.create(split_addr).is_err() {
            // Restore the truncation on a failed create.
            self.blocks.get_mut(prev_address).expect("still present").last_address = last_addr;
            log::error!("unable to create split bb at {split_addr:#010x}, possibly exists?");
            return Err(BasicBlockError::AlreadyExists(split_addr));
        }

        {
            let split = self.blocks.get_mut(split_addr).expect("just created");
            split.last_address = last_addr;
            if branch_address >= split_addr {
                split.branch_address = branch_address;
            }
        }
        if branch_address >= split_addr {
            self.blocks.get_mut(prev_address).expect("still present").branch_address = 0;
        }

        self.create_reference(prev_address, split_addr).is_adjacent = true;

        Ok(SplitOutcome { prev_address, split_address: split_addr })
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &BasicBlock)> {
        self.blocks.iter()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_roundtrips() {
        let mut m = BasicBlockManager::new();
        m.create(0x1000).unwrap();
        m.get_mut(0x1000).unwrap().last_address = 0x1020;
        assert_eq!(m.get(0x1010).unwrap().address, 0x1000);
        assert!(m.get(0x1030).is_none());
        assert!(m.get(0).is_none());
    }

    #[test]
    fn create_twice_fails() {
        let mut m = BasicBlockManager::new();
        m.create(0x1000).unwrap();
        assert_eq!(m.create(0x1000), Err(BasicBlockError::AlreadyExists(0x1000)));
    }

    #[test]
    fn split_truncates_prev_and_links_adjacent_ref() {
        let mut m = BasicBlockManager::new();
        m.create(0x1000).unwrap();
        m.get_mut(0x1000).unwrap().last_address = 0x1020;

        let outcome = m.split_at(0x1010).unwrap();
        assert_eq!(outcome.prev_address, 0x1000);
        assert_eq!(outcome.split_address, 0x1010);

        let prev = m.get(0x1000).unwrap();
        assert_eq!(prev.last_address, 0x100c);
        let split = m.get(0x1010).unwrap();
        assert_eq!(split.last_address, 0x1020);

        assert_eq!(m.get_exit_refs(0x1000), &[0x1010]);
        assert_eq!(m.get_enter_refs(0x1010), &[0x1000]);
    }

    #[test]
    fn split_at_block_start_is_rejected() {
        let mut m = BasicBlockManager::new();
        m.create(0x1000).unwrap();
        assert_eq!(m.split_at(0x1000), Err(BasicBlockError::SplitAtBlockStart(0x1000)));
    }

    #[test]
    fn branch_address_moves_to_split_block_when_beyond_it() {
        let mut m = BasicBlockManager::new();
        m.create(0x1000).unwrap();
        {
            let bb = m.get_mut(0x1000).unwrap();
            bb.last_address = 0x1020;
            bb.branch_address = 0x1018;
        }
        m.split_at(0x1010).unwrap();
        assert_eq!(m.get(0x1000).unwrap().branch_address, 0);
        assert_eq!(m.get(0x1010).unwrap().branch_address, 0x1018);
    }
}
