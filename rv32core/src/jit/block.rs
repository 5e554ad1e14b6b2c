//! A translated basic block and the cache that maps guest PCs to them.

use std::collections::{HashMap, VecDeque};

use dynasmrt::{AssemblyOffset, ExecutableBuffer};

/// A single translated basic block.
///
/// `code`/`entry` are the W^X-enforcing executable buffer dynasm-rt hands back once translation
/// finalizes; before that point the same bytes live in a writable `Assembler`. Tying the buffer's
/// lifetime to this struct (and this struct's lifetime to the cache) is what keeps "writable" and
/// "executable" from ever being true of the same page at once.
pub struct Block {
    pub guest_pc_start: u32,
    pub guest_pc_end: u32,
    pub code: ExecutableBuffer,
    pub entry: AssemblyOffset,
    pub instructions: u32,
}

impl Block {
    /// The compiled entry point, callable as `extern "C" fn(*mut ()) -> u32` returning the
    /// number of guest instructions the block actually retired before falling back (a block may
    /// retire fewer than `instructions` if a helper call latched an exception partway through).
    pub fn entry_fn(&self) -> extern "C" fn(*mut ()) -> u32 {
        let ptr = self.code.ptr(self.entry);
        unsafe { std::mem::transmute::<*const u8, extern "C" fn(*mut ()) -> u32>(ptr) }
    }
}

/// Maps `guest_pc_start` to its translation. Capacity-limited with FIFO eviction; never evicts
/// whatever block the driver is currently inside (the driver never calls [`BlockCache::evict_if_full`]
/// while a block's `entry_fn` is on the stack).
pub struct BlockCache {
    blocks: HashMap<u32, Block>,
    order: VecDeque<u32>,
    capacity: usize,
}

impl BlockCache {
    const DEFAULT_CAPACITY: usize = 4096;

    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            order: VecDeque::new(),
            capacity: Self::DEFAULT_CAPACITY,
        }
    }

    pub fn get(&self, guest_pc_start: u32) -> Option<&Block> {
        self.blocks.get(&guest_pc_start)
    }

    pub fn insert(&mut self, block: Block) {
        let pc = block.guest_pc_start;
        if !self.blocks.contains_key(&pc) {
            if self.blocks.len() >= self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.blocks.remove(&oldest);
                }
            }
            self.order.push_back(pc);
        }
        self.blocks.insert(pc, block);
    }

    pub fn flush(&mut self) {
        self.blocks.clear();
        self.order.clear();
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new()
    }
}
