//! Trace replay: the per-thread shadow-stack state machine that drives the basic
//! block, function, and call-graph managers from a stream of `(pc, last_pc)`
//! observations, dispatching each transition through `on_enter`/`on_leave`/
//! `on_continue`/`on_merging_past_to_last`.

use std::collections::{HashMap, HashSet};

use mipsrecon_isa::{Addr, OpcodeDecoder, SymbolMap};

use crate::{
    basic_block::BasicBlockManager,
    callgraph::{CallHistory, FunGraph},
    config::EngineConfig,
    error::TraceError,
    function::FunctionManager,
    instruction_cache::InstructionCache,
    scanner::scan,
    timestamp::Nts,
    trace::{Batch, TraceEvent},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackItem {
    pub bb_address: u32,
    pub ra: u32,
    pub fun_address: u32,
    pub graph_node_id: usize,
}

pub struct ThreadState {
    pub id: u16,
    pub pc: u32,
    pub name: Option<String>,
    pub executing: bool,
    pub nts: Nts,
    pub stack: Vec<StackItem>,
    pub fun_graph: FunGraph,
    pub call_history: CallHistory,
}

impl ThreadState {
    fn new(id: u16) -> Self {
        Self {
            id,
            pc: 0,
            name: None,
            executing: true,
            nts: Nts::default(),
            stack: Vec::new(),
            fun_graph: FunGraph::new(),
            call_history: CallHistory::new(),
        }
    }
}

/// Owns per-thread replay state; borrows the shared engine managers for the
/// duration of a `process_batch` call.
pub struct Replay<'a> {
    pub bbmgr: &'a mut BasicBlockManager,
    pub funmgr: &'a mut FunctionManager,
    pub cache: &'a mut InstructionCache,
    pub decoder: &'a dyn OpcodeDecoder,
    pub sym_map: &'a mut dyn SymbolMap,
    pub config: &'a EngineConfig,
    pub threads: HashMap<u16, ThreadState>,
    budget_remaining: Option<u64>,
}

impl<'a> Replay<'a> {
    pub fn new(
        bbmgr: &'a mut BasicBlockManager,
        funmgr: &'a mut FunctionManager,
        cache: &'a mut InstructionCache,
        decoder: &'a dyn OpcodeDecoder,
        sym_map: &'a mut dyn SymbolMap,
        config: &'a EngineConfig,
    ) -> Self {
        Self { bbmgr, funmgr, cache, decoder, sym_map, config, threads: HashMap::new(), budget_remaining: config.length_budget }
    }

    fn thread_mut(&mut self, id: u16) -> &mut ThreadState {
        self.threads.entry(id).or_insert_with(|| ThreadState::new(id))
    }

    /// Processes one `ID`/`SZ`-framed batch, advancing `nts` once per observation
    /// record (`Start`/`Name`/`End` are control words, not records). Returns `false`
    /// once the configured record budget is exhausted, telling the caller to stop
    /// feeding further batches.
    pub fn process_batch(&mut self, batch: Batch) -> Result<bool, TraceError> {
        let thread_id = batch.thread_id;
        for event in batch.events {
            match event {
                TraceEvent::Start { pc } => {
                    let thread = self.thread_mut(thread_id);
                    thread.pc = pc;
                }
                TraceEvent::Name { name } => {
                    let executing = !self.config.is_idle_name(&name);
                    let thread = self.thread_mut(thread_id);
                    thread.executing = executing;
                    let nts = thread.nts;
                    thread.call_history.add_marker(nts, name.clone());
                    thread.name = Some(name);
                }
                TraceEvent::End { end_pc } => {
                    log::debug!("thread {thread_id}: end of trace at {end_pc:#010x}");
                }
                TraceEvent::Observation { pc, last_pc } => {
                    let executing = self.thread_mut(thread_id).executing;
                    if executing {
                        self.process_observation(thread_id, pc, last_pc)?;
                    }
                    self.thread_mut(thread_id).nts.advance();

                    if let Some(remaining) = &mut self.budget_remaining {
                        *remaining = remaining.saturating_sub(1);
                        if *remaining == 0 {
                            return Ok(false);
                        }
                    }
                }
            }
            if self.config.is_cancelled() {
                return Err(TraceError::Cancelled);
            }
        }
        Ok(true)
    }

    /// Closes every open call-history cell on every thread, for clean shutdown.
    pub fn stop_all(&mut self) {
        for thread in self.threads.values_mut() {
            let depth = thread.stack.len() + 1;
            let nts = thread.nts;
            thread.call_history.stop_all(depth, nts);
        }
    }

    fn process_observation(&mut self, thread_id: u16, pc: u32, last_pc: u32) -> Result<(), TraceError> {
        if self.config.verbosity >= 1 {
            log::debug!("thread {thread_id}: observation pc={pc:#010x} last_pc={last_pc:#010x}");
        }

        let the_bb_addr = self.ensure_bb(pc)?;

        if last_pc == 0 {
            self.on_enter(thread_id, the_bb_addr, 0);
            return Ok(());
        }
        if self.config.is_fake_syscall_address(last_pc) && !self.config.is_fake_syscall_address(pc) {
            self.on_enter(thread_id, the_bb_addr, last_pc);
            return Ok(());
        }

        self.on_merging_past_to_last(thread_id, last_pc)?;

        let last_bb_addr = self.bbmgr.get(last_pc).map(|bb| bb.address);
        let branch_addr = last_bb_addr.and_then(|a| self.bbmgr.get(a)).map(|bb| bb.branch_address);

        if let Some(from) = last_bb_addr {
            self.bbmgr.create_reference(from, the_bb_addr);
        }

        let branch_info = branch_addr
            .filter(|&a| a != 0)
            .and_then(|a| self.cache.get_or_decode(Addr(a), self.decoder, self.sym_map))
            .cloned();

        match branch_info {
            Some(instr) if instr.is_jal_or_jalr() => {
                let ra = instr.address.0 + if instr.info.has_delay_slot { 8 } else { 4 };
                if let Some(from) = last_bb_addr {
                    self.bbmgr.create_reference(from, ra).is_adjacent = true;
                    self.bbmgr.create_reference(from, the_bb_addr).is_linked = true;
                }
                self.on_enter(thread_id, the_bb_addr, ra);
            }
            Some(instr) if instr.is_jr_ra() => {
                self.on_leave(thread_id, the_bb_addr);
            }
            _ => {
                self.on_continue(thread_id, the_bb_addr);
            }
        }

        Ok(())
    }

    /// Ensures a block exists starting exactly at `addr`, scanning fresh territory
    /// or splitting an existing block as needed.
    fn ensure_bb(&mut self, addr: u32) -> Result<u32, TraceError> {
        if let Some(bb) = self.bbmgr.get(addr) {
            if bb.address == addr {
                return Ok(addr);
            }
            self.bbmgr.split_at(addr)?;
            return Ok(addr);
        }

        let decoder = self.decoder;
        let bbmgr = &mut *self.bbmgr;
        let cache = &mut *self.cache;
        let sym_map = &*self.sym_map;
        let mut prev_yielded: Option<u32> = None;
        scan(addr, None, cache, decoder, sym_map, |state| {
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
        });

        Ok(addr)
    }

    /// Walks forward from the top-of-stack block, creating adjacent edges up to
    /// `last_pc`'s block.
    fn on_merging_past_to_last(&mut self, thread_id: u16, last_pc: u32) -> Result<(), TraceError> {
        let Some(mut cur) = self.thread_mut(thread_id).stack.last().map(|s| s.bb_address) else {
            return Ok(());
        };

        let mut visited = HashSet::new();
        let mut first = true;
        loop {
            if !visited.insert(cur) {
                return Err(TraceError::MergeCycle(cur));
            }

            let Some(past) = self.bbmgr.get(cur).cloned() else {
                log::warn!("OnMergingPastToLast: no block at {cur:#010x}, giving up");
                return Ok(());
            };

            if !first {
                if let Some(top) = self.thread_mut(thread_id).stack.last_mut() {
                    top.bb_address = past.address;
                }
            }
            first = false;

            let branch_instr = (past.branch_address != 0)
                .then(|| self.cache.peek(Addr(past.branch_address)))
                .flatten()
                .cloned();

            if let Some(instr) = &branch_instr {
                if instr.info.is_likely_branch && past.branch_address == last_pc {
                    return Ok(());
                }
            }
            if past.last_address == last_pc {
                return Ok(());
            }

            let next = match &branch_instr {
                Some(instr) if instr.info.is_conditional => past.last_address + 4,
                Some(instr) => {
                    if instr.info.is_branch_to_register {
                        log::warn!("OnMergingPastToLast: cannot merge through branch-to-register at {cur:#010x}");
                        return Ok(());
                    }
                    instr.info.branch_target.0
                }
                None => past.last_address + 4,
            };

            self.bbmgr.create_reference(cur, next).is_adjacent = true;
            cur = next;
        }
    }

    /// Pushes a new call frame, resolving or creating its owning function.
    fn on_enter(&mut self, thread_id: u16, bb_addr: u32, ra: u32) {
        if let Some(top) = self.thread_mut(thread_id).stack.last_mut() {
            top.ra = ra;
        }

        let fun_addr = self.resolve_owning_function(bb_addr);
        self.funmgr.add_owned_block(fun_addr, bb_addr);

        let thread = self.thread_mut(thread_id);
        let parent_node = thread.stack.last().map_or(FunGraph::ROOT, |s| s.graph_node_id);
        let node = thread.fun_graph.add_node(fun_addr, parent_node);
        let level = thread.stack.len();
        let nts = thread.nts;
        thread.call_history.add_block(level, nts, bb_addr, format!("enter {fun_addr:#010x}"));
        thread.stack.push(StackItem { bb_address: bb_addr, ra, fun_address: fun_addr, graph_node_id: node });
    }

    fn resolve_owning_function(&mut self, bb_addr: u32) -> u32 {
        if let Some(f) = self.funmgr.get(bb_addr) {
            return f.address;
        }
        if self.sym_map.get_function_start(Addr(bb_addr)).is_some() {
            if self.funmgr.split_at(bb_addr, self.sym_map).is_ok() {
                return bb_addr;
            }
        }
        let size = self.bbmgr.get(bb_addr).map_or(4, |bb| bb.last_address - bb.address + 4);
        self.funmgr.create_new_function(bb_addr, size, self.sym_map);
        bb_addr
    }

    /// Ends the current frame; resumes the caller on a matching return address,
    /// otherwise treats the transition as a callback.
    fn on_leave(&mut self, thread_id: u16, the_bb_addr: u32) {
        let level = {
            let thread = self.thread_mut(thread_id);
            thread.stack.len().saturating_sub(1)
        };
        {
            let thread = self.thread_mut(thread_id);
            let nts = thread.nts;
            thread.call_history.end_block(level, nts);
            thread.stack.pop();
        }

        enum Outcome {
            Resumed(u32),
            Callback(u32),
            StackEmpty,
        }

        let outcome = {
            let thread = self.thread_mut(thread_id);
            match thread.stack.last() {
                Some(top) if top.ra == the_bb_addr => Outcome::Resumed(top.bb_address),
                Some(top) => Outcome::Callback(top.ra),
                None => Outcome::StackEmpty,
            }
        };

        match outcome {
            Outcome::Resumed(prev_bb_address) => {
                {
                    let thread = self.thread_mut(thread_id);
                    if let Some(top) = thread.stack.last_mut() {
                        top.bb_address = the_bb_addr;
                    }
                }
                self.bbmgr.create_reference(prev_bb_address, the_bb_addr).is_adjacent = true;
            }
            Outcome::Callback(expected_ra) => {
                self.on_enter(thread_id, the_bb_addr, expected_ra);
            }
            Outcome::StackEmpty => {
                log::warn!("thread {thread_id}: stack emptied on leave at {the_bb_addr:#010x}");
                if self.config.is_fake_syscall_address(the_bb_addr) {
                    self.on_enter(thread_id, the_bb_addr, 0);
                }
            }
        }
    }

    fn on_continue(&mut self, thread_id: u16, the_bb_addr: u32) {
        if let Some(top) = self.thread_mut(thread_id).stack.last_mut() {
            top.bb_address = the_bb_addr;
        }
    }
}

// -------------------------------------------------------------------------------------------------
