//! Mutation notifications emitted by the block manager.

use crate::types::BlockId;

/// A structural change to the block collection.
///
/// Hosts subscribe to these to keep their rendered holders in step with the
/// collection (mount, unmount, reposition).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockMutation {
    Added {
        id: BlockId,
        index: usize,
    },
    /// Fired before a block is replaced in place.
    AboutToBeRemoved {
        id: BlockId,
        index: usize,
    },
    Removed {
        id: BlockId,
        index: usize,
    },
    Moved {
        id: BlockId,
        from: usize,
        to: usize,
        /// False when the caller already repositioned the rendered holder.
        render: bool,
    },
}

impl BlockMutation {
    pub fn id(&self) -> &BlockId {
        match self {
            Self::Added { id, .. }
            | Self::AboutToBeRemoved { id, .. }
            | Self::Removed { id, .. }
            | Self::Moved { id, .. } => id,
        }
    }
}

/// Callback invoked for every mutation.
pub type MutationObserver = Box<dyn FnMut(&BlockMutation)>;
