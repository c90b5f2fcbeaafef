//! The `Document` facade: owns the manifest, the basic-block/function/trace
//! managers, and the injected [`OpcodeDecoder`]/[`SymbolMap`]/[`HleRegistry`]
//! primitives, and exposes `new_document`/`disasm`/`process_bb`/`parse_trace`/
//! `get_label_name`/`get_print_lines` as the one entry point callers use.

use std::{collections::HashMap, path::Path};

use mipsrecon_isa::{Addr, HleRegistry, Instruction, OpcodeDecoder, SymbolMap};

use crate::{
    basic_block::{BasicBlock, BasicBlockManager},
    config::EngineConfig,
    error::DocumentError,
    function::FunctionManager,
    instruction_cache::InstructionCache,
    manifest::Manifest,
    render,
    replay::{Replay, ThreadState},
    scanner::scan,
    trace,
};

pub struct Document {
    pub manifest: Manifest,
    pub config: EngineConfig,
    bbmgr: BasicBlockManager,
    funmgr: FunctionManager,
    cache: InstructionCache,
    decoder: Box<dyn OpcodeDecoder>,
    sym_map: Box<dyn SymbolMap>,
    hle: Box<dyn HleRegistry>,
    threads: HashMap<u16, ThreadState>,
}

impl Document {
    /// Loads the manifest at `manifest_path`, then builds the document via
    /// [`Self::from_manifest`]. Returns `anyhow::Result` since it aggregates two
    /// independent leaf failure modes: I/O and manifest parsing.
    pub fn new_document(
        manifest_path: &Path,
        decoder: Box<dyn OpcodeDecoder>,
        sym_map: Box<dyn SymbolMap>,
        hle: Box<dyn HleRegistry>,
        config: EngineConfig,
    ) -> anyhow::Result<Self> {
        log::info!("reading manifest from {}", manifest_path.display());
        let text = std::fs::read_to_string(manifest_path)
            .map_err(|e| DocumentError::Io(manifest_path.display().to_string(), e))?;
        let manifest = Manifest::from_json(&text).map_err(DocumentError::from)?;
        Ok(Self::from_manifest(manifest, decoder, sym_map, hle, config))
    }

    /// Builds a document from an already-parsed manifest, publishing its modules and
    /// functions into `sym_map`/`funmgr` before any disassembly or trace replay
    /// happens. Split out from [`Self::new_document`] so callers (and tests) can
    /// supply a manifest without going through the filesystem.
    pub fn from_manifest(
        manifest: Manifest,
        decoder: Box<dyn OpcodeDecoder>,
        mut sym_map: Box<dyn SymbolMap>,
        hle: Box<dyn HleRegistry>,
        config: EngineConfig,
    ) -> Self {
        for module in &manifest.loaded_modules {
            sym_map.add_module(&module.name, Addr(module.address), module.size);
        }

        let mut funmgr = FunctionManager::new();
        for f in &manifest.functions {
            funmgr.preload(f.name.clone(), f.address, f.size, f.bb_addresses.clone());
            sym_map.add_function(&f.name, Addr(f.address), f.size);
        }

        Self {
            manifest,
            config,
            bbmgr: BasicBlockManager::new(),
            funmgr,
            cache: InstructionCache::new(),
            decoder,
            sym_map,
            hle,
            threads: HashMap::new(),
        }
    }

    #[must_use]
    pub fn basic_blocks(&self) -> &BasicBlockManager {
        &self.bbmgr
    }

    #[must_use]
    pub fn functions(&self) -> &FunctionManager {
        &self.funmgr
    }

    #[must_use]
    pub fn thread(&self, id: u16) -> Option<&ThreadState> {
        self.threads.get(&id)
    }

    /// Decodes and argument-parses the instruction at `addr`, memoizing it.
    pub fn disasm(&mut self, addr: u32) -> Option<Instruction> {
        self.cache.get_or_decode(Addr(addr), &*self.decoder, &*self.sym_map).cloned()
    }

    #[must_use]
    pub fn get_label_name(&self, addr: u32) -> Option<String> {
        self.sym_map.get_label_name(Addr(addr))
    }

    /// Scans forward from `start` (bounded by `last`, if given), registering every
    /// discovered block and invoking `on_each_bb` once per block in scan order.
    pub fn process_bb(&mut self, start: u32, last: Option<u32>, mut on_each_bb: impl FnMut(&BasicBlock)) {
        let decoder = &*self.decoder;
        let sym_map = &*self.sym_map;
        let bbmgr = &mut self.bbmgr;
        let cache = &mut self.cache;
        let mut prev_yielded: Option<u32> = None;

        scan(start, last, cache, decoder, sym_map, |state| {
            if bbmgr.create(state.bb_addr).is_ok() {
                if let Some(bb) = bbmgr.get_mut(state.bb_addr) {
                    bb.last_address = state.last_addr;
                    bb.branch_address = state.branch_addr;
                }
                if let Some(prev) = prev_yielded {
                    bbmgr.create_reference(prev, state.bb_addr).is_adjacent = true;
                }
                prev_yielded = Some(state.bb_addr);
            }
            if let Some(bb) = bbmgr.get(state.bb_addr) {
                on_each_bb(bb);
            }
        });
    }

    /// Replays one or more `ID`/`SZ`-framed trace batches out of `data`, stopping
    /// early once `config.length_budget` observation records have been processed
    /// (`None` is unbounded). Thread state persists across calls, so a caller may
    /// stream a trace in chunks. `anyhow::Result` here for the same reason as
    /// [`Self::new_document`]: this aggregates the wire-format reader's and the
    /// replay state machine's distinct leaf error types behind one facade call.
    pub fn parse_trace(&mut self, mut data: &[u8]) -> anyhow::Result<()> {
        let threads = std::mem::take(&mut self.threads);
        let mut replay =
            Replay::new(&mut self.bbmgr, &mut self.funmgr, &mut self.cache, &*self.decoder, &mut *self.sym_map, &self.config);
        replay.threads = threads;

        while !data.is_empty() {
            let (rest, batch) = trace::read_batch(data).map_err(DocumentError::from)?;
            let keep_going = replay.process_batch(batch).map_err(DocumentError::from)?;
            data = rest;
            if !keep_going {
                break;
            }
        }
        replay.stop_all();

        self.threads = replay.threads;
        Ok(())
    }

    /// Renders one block's print lines: `* _ 0xADDR\tdizz\t; pseudo`.
    pub fn get_print_lines(&mut self, addresses: &[u32], branch_addr: u32, last_addr: u32) -> Vec<String> {
        render::render_block(addresses, branch_addr, last_addr, &mut self.cache, &*self.decoder, &*self.sym_map, &*self.hle)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mipsrecon_isa::{HleFunction, InstructionInfo};
    use std::collections::HashMap as StdHashMap;

    struct ScriptedDecoder(StdHashMap<u32, InstructionInfo>);
    impl OpcodeDecoder for ScriptedDecoder {
        fn decode(&self, addr: Addr) -> Option<InstructionInfo> {
            self.0.get(&addr.0).cloned()
        }
        fn is_valid_address(&self, addr: Addr) -> bool {
            self.0.contains_key(&addr.0)
        }
    }

    #[derive(Default)]
    struct MapSymbols {
        labels: StdHashMap<u32, String>,
    }
    impl SymbolMap for MapSymbols {
        fn get_label_name(&self, addr: Addr) -> Option<String> {
            self.labels.get(&addr.0).cloned()
        }
        fn get_function_start(&self, _addr: Addr) -> Option<Addr> {
            None
        }
        fn add_function(&mut self, name: &str, address: Addr, _size: u32) {
            self.labels.insert(address.0, name.to_string());
        }
        fn set_function_size(&mut self, _address: Addr, _size: u32) {}
        fn add_module(&mut self, _name: &str, _address: Addr, _size: u32) {}
    }

    struct NoHle;
    impl HleRegistry for NoHle {
        fn resolve(&self, _syscall_code: u32) -> Option<HleFunction> {
            None
        }
    }

    fn minimal_manifest() -> Manifest {
        let json = r#"{
            "module": { "nm": { "name": "main", "segments": [], "entry_addr": 0 }, "textStart": 0, "textEnd": 0, "modulePtr": 0 },
            "memory": { "start": 142606336, "size": 33554432 },
            "loaded_modules": [],
            "functions": [{"name": "entry", "address": 4096, "size": 8, "bb_addresses": [4096]}],
            "hle_modules": []
        }"#;
        Manifest::from_json(json).unwrap()
    }

    #[test]
    fn from_manifest_preloads_functions() {
        let decoder = ScriptedDecoder(StdHashMap::new());
        let doc = Document::from_manifest(
            minimal_manifest(),
            Box::new(decoder),
            Box::new(MapSymbols::default()),
            Box::new(NoHle),
            EngineConfig::default(),
        );
        assert_eq!(doc.functions().get(4096).unwrap().name, "entry");
    }

    #[test]
    fn process_bb_registers_blocks_from_a_scan() {
        let mut words = StdHashMap::new();
        words.insert(4096, InstructionInfo::plain(0, "addiu\tsp, sp, -0x20"));
        words.insert(
            4100,
            InstructionInfo {
                is_branch: true,
                is_conditional: false,
                is_likely_branch: false,
                is_branch_to_register: true,
                has_delay_slot: true,
                branch_target: Addr::ZERO,
                ..InstructionInfo::plain(0, "jr\t->ra")
            },
        );
        words.insert(4104, InstructionInfo::plain(0, "nop\t"));

        let mut doc = Document::from_manifest(
            minimal_manifest(),
            Box::new(ScriptedDecoder(words)),
            Box::new(MapSymbols::default()),
            Box::new(NoHle),
            EngineConfig::default(),
        );

        let mut seen = Vec::new();
        doc.process_bb(4096, None, |bb| seen.push(bb.address));
        assert_eq!(seen, vec![4096]);
        assert_eq!(doc.basic_blocks().get(4096).unwrap().last_address, 4104);
    }
}
