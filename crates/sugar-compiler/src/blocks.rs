//! Block tables and the block manager used by template inheritance.

use indexmap::IndexMap;
use smol_str::SmolStr;
use std::cell::Cell;
use sugar_parser::NodeId;

/// How a child template contributes to a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    /// `s:block`: replaces the layout content.
    Define,
    /// `s:append`: renders after the content.
    Append,
    /// `s:prepend`: renders before the content.
    Prepend,
}

impl BlockMode {
    /// Returns the directive name (without prefix) for this mode.
    pub fn directive(self) -> &'static str {
        match self {
            BlockMode::Define => "block",
            BlockMode::Append => "append",
            BlockMode::Prepend => "prepend",
        }
    }

    /// All modes, in lookup order.
    pub const ALL: [BlockMode; 3] = [BlockMode::Define, BlockMode::Append, BlockMode::Prepend];
}

/// One contribution to a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry {
    /// How the entry combines with the layout content.
    pub mode: BlockMode,
    /// The wrapper node carrying the block attribute.
    pub node: NodeId,
}

/// Block contributions of one child template, in source order.
#[derive(Debug, Clone, Default)]
pub struct BlockTable {
    blocks: IndexMap<SmolStr, Vec<BlockEntry>>,
}

/// A second `s:block` for a name that already has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateBlock(pub SmolStr);

impl BlockTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry. At most one [`BlockMode::Define`] is accepted per name.
    pub fn insert(&mut self, name: impl Into<SmolStr>, entry: BlockEntry) -> Result<(), DuplicateBlock> {
        let name = name.into();
        let entries = self.blocks.entry(name.clone()).or_default();
        if entry.mode == BlockMode::Define && entries.iter().any(|e| e.mode == BlockMode::Define) {
            return Err(DuplicateBlock(name));
        }
        entries.push(entry);
        Ok(())
    }

    /// Returns the entries for `name`.
    pub fn entries(&self, name: &str) -> &[BlockEntry] {
        self.blocks.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns the defining entry for `name`.
    pub fn define(&self, name: &str) -> Option<BlockEntry> {
        self.entries(name)
            .iter()
            .copied()
            .find(|e| e.mode == BlockMode::Define)
    }

    /// Returns the entries for `name` with the given mode, in source order.
    pub fn with_mode(&self, name: &str, mode: BlockMode) -> impl Iterator<Item = BlockEntry> + '_ {
        self.entries(name)
            .iter()
            .copied()
            .filter(move |e| e.mode == mode)
    }

    /// Iterates over block names in first-seen order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(SmolStr::as_str)
    }

    /// Returns true if `name` has entries.
    pub fn contains(&self, name: &str) -> bool {
        self.blocks.contains_key(name)
    }

    /// Returns the number of named blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if no block is registered.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Tracks whether block definitions are currently being registered from an
/// included partial.
///
/// While registering, an include contributes only its blocks to the child's
/// block table. Outside registration an include renders in place and its
/// blocks act as placeholders.
///
/// The depth only changes through [`RegistrationGuard`], which restores it
/// when dropped, so an error while a partial is being read never leaves the
/// manager stuck in registering state.
#[derive(Debug, Default)]
pub struct BlockManager {
    depth: Cell<usize>,
}

impl BlockManager {
    /// Creates a manager at depth zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current registration depth.
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Returns true while a partial's blocks are being registered.
    pub fn is_registering(&self) -> bool {
        self.depth.get() > 0
    }

    /// Enters registration; the returned guard leaves it on drop.
    #[must_use = "registration ends as soon as the guard is dropped"]
    pub fn register(&self) -> RegistrationGuard<'_> {
        self.enter(self.depth.get() + 1)
    }

    /// Leaves registration until the returned guard is dropped.
    ///
    /// Used while resolving the inside of a registered partial, whose own
    /// includes render in place.
    #[must_use = "registration resumes as soon as the guard is dropped"]
    pub fn suspend(&self) -> RegistrationGuard<'_> {
        self.enter(0)
    }

    fn enter(&self, depth: usize) -> RegistrationGuard<'_> {
        let restore = self.depth.replace(depth);
        RegistrationGuard {
            manager: self,
            restore,
        }
    }
}

impl Clone for BlockManager {
    /// Clones start at depth zero; the depth belongs to an active call tree.
    fn clone(&self) -> Self {
        Self::new()
    }
}

/// Scope guard returned by [`BlockManager::register`] and
/// [`BlockManager::suspend`].
#[derive(Debug)]
pub struct RegistrationGuard<'a> {
    manager: &'a BlockManager,
    restore: usize,
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        self.manager.depth.set(self.restore);
    }
}
