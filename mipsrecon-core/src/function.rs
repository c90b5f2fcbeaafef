//! Function manager: address- and name-indexed functions, with split/re-parent
//! support for when replay discovers a call into the middle of an already-known
//! function.

use std::collections::HashMap;

use itertools::{Either, Itertools};
use mipsrecon_isa::{Addr, SymbolMap};

use crate::interval_map::IntervalMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FunctionError {
    #[error("a function already starts at {0:#010x}")]
    AlreadyExists(u32),
    #[error("no function start found for split at {0:#010x}")]
    NothingToSplit(u32),
}

/// `{ name, address, size, bb_addresses[] }`. `bb_addresses` is
/// set-like: no duplicates, order not significant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub address: u32,
    pub size: u32,
    pub bb_addresses: Vec<u32>,
}

impl Function {
    #[must_use]
    pub fn last_address(&self) -> u32 {
        self.address + self.size - 4
    }

    #[must_use]
    pub fn contains(&self, addr: u32) -> bool {
        self.address <= addr && addr <= self.last_address()
    }

    fn add_owned_block(&mut self, block_start: u32) {
        if !self.bb_addresses.contains(&block_start) {
            self.bb_addresses.push(block_start);
        }
    }
}

pub struct SplitOutcome {
    pub prev_address: u32,
    pub new_address: u32,
}

#[derive(Default)]
pub struct FunctionManager {
    functions: IntervalMap<Function>,
    by_name: HashMap<String, Vec<u32>>,
}

impl FunctionManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, addr: u32) -> Option<&Function> {
        self.functions.get(addr)
    }

    #[must_use]
    pub fn get_mut(&mut self, addr: u32) -> Option<&mut Function> {
        self.functions.get_mut(addr)
    }

    #[must_use]
    pub fn get_by_name(&self, name: &str) -> &[u32] {
        self.by_name.get(name).map_or(&[], |v| v.as_slice())
    }

    fn register_name(&mut self, name: &str, addr: u32) {
        let addrs = self.by_name.entry(name.to_string()).or_default();
        if !addrs.contains(&addr) {
            addrs.push(addr);
        }
    }

    /// Creates a function at `addr`, naming it from the symbol map or synthesizing
    /// `z_un_HHHHHHHH`, and publishes the (possibly synthesized) name back to the
    /// symbol map. Returns `None` (not an error) if one already exists there,
    /// matching `CreateNewFunction`'s "return nil, no-op" behavior on a repeat call.
    pub fn create_new_function(&mut self, addr: u32, size: u32, sym_map: &mut dyn SymbolMap) -> Option<&Function> {
        if self.functions.contains_key(addr) {
            return None;
        }

        let (name, needs_publish) = match sym_map.get_label_name(Addr(addr)) {
            Some(name) => (name, false),
            None => (format!("z_un_{addr:08x}"), true),
        };

        self.functions.insert(addr, Function { name: name.clone(), address: addr, size, bb_addresses: Vec::new() });
        self.register_name(&name, addr);

        if needs_publish {
            sym_map.add_function(&name, Addr(addr), size);
        }

        self.functions.get(addr)
    }

    /// Registers a function straight from the manifest, bypassing the
    /// symbol-map round trip `create_new_function` does -- the manifest is already
    /// the authoritative name/size source at load time.
    pub fn preload(&mut self, name: String, address: u32, size: u32, bb_addresses: Vec<u32>) {
        self.register_name(&name, address);
        self.functions.insert(address, Function { name, address, size, bb_addresses });
    }

    /// Marks `block_start` as owned by the function containing it, if any.
    pub fn add_owned_block(&mut self, fn_addr: u32, block_start: u32) {
        if let Some(f) = self.functions.get_mut(fn_addr) {
            f.add_owned_block(block_start);
        }
    }

    /// Splits the function covering `split_addr` into two, re-parenting owned block
    /// starts between them.
    pub fn split_at(&mut self, split_addr: u32, sym_map: &mut dyn SymbolMap) -> Result<SplitOutcome, FunctionError> {
        let fn_start = sym_map
            .get_function_start(Addr(split_addr))
            .map(|a| a.0)
            .or_else(|| self.functions.contains_key(split_addr).then_some(split_addr))
            .ok_or(FunctionError::NothingToSplit(split_addr))?;

        if fn_start == split_addr {
            // Already a function start -- nothing to split.
            return Err(FunctionError::NothingToSplit(split_addr));
        }
        if self.functions.contains_key(split_addr) {
            return Err(FunctionError::AlreadyExists(split_addr));
        }

        let (last, new_prev_size, owned) = {
            let prev = self.functions.get_mut(fn_start).ok_or(FunctionError::NothingToSplit(split_addr))?;
            let last = prev.last_address();
            prev.size = split_addr - prev.address;
            (last, prev.size, std::mem::take(&mut prev.bb_addresses))
        };
        sym_map.set_function_size(Addr(fn_start), new_prev_size);

        let new_size = last - split_addr + 4;
        let new_name = sym_map.get_label_name(Addr(split_addr)).unwrap_or_else(|| format!("z_un_{split_addr:08x}"));
        self.functions.insert(
            split_addr,
            Function { name: new_name.clone(), address: split_addr, size: new_size, bb_addresses: Vec::new() },
        );
        self.register_name(&new_name, split_addr);

        let (prev_range, new_range) = {
            let prev = self.functions.get(fn_start).expect("still present");
            let newf = self.functions.get(split_addr).expect("just inserted");
            ((prev.address, prev.last_address()), (newf.address, newf.last_address()))
        };

        // Three-way partition of the owned set (stays with `prev`, moves to `new`,
        // belongs to neither) via two `itertools::Either` passes rather than a
        // hand-rolled three-armed loop.
        let (in_prev, rest): (Vec<u32>, Vec<u32>) = owned
            .into_iter()
            .partition_map(|b| if prev_range.0 <= b && b <= prev_range.1 { Either::Left(b) } else { Either::Right(b) });
        let (in_new, orphaned): (Vec<u32>, Vec<u32>) = rest
            .into_iter()
            .partition_map(|b| if new_range.0 <= b && b <= new_range.1 { Either::Left(b) } else { Either::Right(b) });

        for block_start in in_prev {
            self.functions.get_mut(fn_start).expect("still present").add_owned_block(block_start);
        }
        for block_start in in_new {
            self.functions.get_mut(split_addr).expect("just inserted").add_owned_block(block_start);
        }
        if !orphaned.is_empty() {
            log::warn!("split_at({split_addr:#010x}): {} owned block(s) belong to neither half: {orphaned:x?}", orphaned.len());
        }

        Ok(SplitOutcome { prev_address: fn_start, new_address: split_addr })
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockSymbolMap {
        function_starts: HashMap<u32, u32>,
        labels: HashMap<u32, String>,
    }

    impl SymbolMap for MockSymbolMap {
        fn get_label_name(&self, addr: Addr) -> Option<String> {
            self.labels.get(&addr.0).cloned()
        }

        fn get_function_start(&self, addr: Addr) -> Option<Addr> {
            self.function_starts.get(&addr.0).copied().map(Addr)
        }

        fn add_function(&mut self, name: &str, address: Addr, size: u32) {
            self.labels.insert(address.0, name.to_string());
            for a in address.0..address.0 + size {
                self.function_starts.entry(a).or_insert(address.0);
            }
        }

        fn set_function_size(&mut self, _address: Addr, _size: u32) {}

        fn add_module(&mut self, _name: &str, _address: Addr, _size: u32) {}
    }

    #[test]
    fn create_new_function_synthesizes_name_and_publishes_it() {
        let mut funmgr = FunctionManager::new();
        let mut sym = MockSymbolMap::default();
        funmgr.create_new_function(0x1000, 0x20, &mut sym).unwrap();
        assert_eq!(funmgr.get(0x1000).unwrap().name, "z_un_00001000");
        assert_eq!(sym.get_label_name(Addr(0x1000)).as_deref(), Some("z_un_00001000"));
        assert_eq!(funmgr.get_by_name("z_un_00001000"), &[0x1000]);
    }

    #[test]
    fn create_twice_is_a_no_op() {
        let mut funmgr = FunctionManager::new();
        let mut sym = MockSymbolMap::default();
        funmgr.create_new_function(0x1000, 0x20, &mut sym).unwrap();
        assert!(funmgr.create_new_function(0x1000, 0x20, &mut sym).is_none());
    }

    #[test]
    fn split_at_shrinks_prev_and_reparents_owned_blocks() {
        let mut funmgr = FunctionManager::new();
        let mut sym = MockSymbolMap::default();
        funmgr.create_new_function(0x1000, 0x40, &mut sym).unwrap();
        sym.function_starts.extend((0x1000..0x1040).map(|a| (a, 0x1000)));
        funmgr.add_owned_block(0x1000, 0x1000);
        funmgr.add_owned_block(0x1000, 0x1010);
        funmgr.add_owned_block(0x1000, 0x1030);

        let outcome = funmgr.split_at(0x1020, &mut sym).unwrap();
        assert_eq!(outcome.prev_address, 0x1000);
        assert_eq!(outcome.new_address, 0x1020);

        let prev = funmgr.get(0x1000).unwrap();
        assert_eq!(prev.size, 0x20);
        assert_eq!(prev.bb_addresses, vec![0x1000, 0x1010]);

        let newf = funmgr.get(0x1020).unwrap();
        assert_eq!(newf.last_address(), 0x103c);
        assert_eq!(newf.bb_addresses, vec![0x1030]);
    }

    #[test]
    fn split_at_function_start_is_a_no_op() {
        let mut funmgr = FunctionManager::new();
        let mut sym = MockSymbolMap::default();
        funmgr.create_new_function(0x1000, 0x20, &mut sym).unwrap();
        sym.function_starts.insert(0x1000, 0x1000);
        assert_eq!(funmgr.split_at(0x1000, &mut sym), Err(FunctionError::NothingToSplit(0x1000)));
    }
}
