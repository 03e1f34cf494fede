//! CFG traversal utilities shared by the verifier and the optimizer.
//!
//! All traversals start at [`BlockId::ENTRY`] and only visit reachable
//! blocks. Out-of-range successor IDs are skipped; the verifier reports them.

use rustc_hash::FxHashSet;

use crate::ir::{BlockId, Function};

/// Compute the predecessor list for each block (deduplicated).
///
/// Returns a vector indexed by block index.
pub fn compute_predecessors(func: &Function) -> Vec<Vec<BlockId>> {
    let num_blocks = func.blocks.len();
    let mut predecessors: Vec<Vec<BlockId>> = vec![Vec::new(); num_blocks];

    for block in &func.blocks {
        let mut seen = FxHashSet::default();
        for succ in block.terminator.successors() {
            if succ.index() < num_blocks && seen.insert(succ) {
                predecessors[succ.index()].push(block.id);
            }
        }
    }

    predecessors
}

/// Depth-first preorder of the reachable blocks.
///
/// Successors are visited in terminator order, so the entry block comes
/// first and a block's first successor directly follows it. Iterative to
/// avoid recursion depth issues on long block chains.
pub fn depth_first_preorder(func: &Function) -> Vec<BlockId> {
    let num_blocks = func.blocks.len();
    if num_blocks == 0 {
        return Vec::new();
    }

    let mut visited = vec![false; num_blocks];
    let mut order = Vec::with_capacity(num_blocks);
    let mut stack = vec![BlockId::ENTRY];

    while let Some(id) = stack.pop() {
        let idx = id.index();
        if idx >= num_blocks || visited[idx] {
            continue;
        }
        visited[idx] = true;
        order.push(id);

        // Reverse so the first successor is popped next.
        for succ in func.block(id).terminator.successors().into_iter().rev() {
            if succ.index() < num_blocks && !visited[succ.index()] {
                stack.push(succ);
            }
        }
    }

    order
}

/// Postorder of the reachable blocks.
pub fn compute_postorder(func: &Function) -> Vec<BlockId> {
    let num_blocks = func.blocks.len();
    if num_blocks == 0 {
        return Vec::new();
    }

    let mut visited = vec![false; num_blocks];
    let mut postorder = Vec::with_capacity(num_blocks);

    // (block, children_pushed)
    let mut stack: Vec<(BlockId, bool)> = vec![(BlockId::ENTRY, false)];

    while let Some(&mut (id, ref mut children_done)) = stack.last_mut() {
        if *children_done {
            postorder.push(id);
            stack.pop();
            continue;
        }
        *children_done = true;

        let idx = id.index();
        if idx >= num_blocks || visited[idx] {
            stack.pop();
            continue;
        }
        visited[idx] = true;

        for succ in func.block(id).terminator.successors() {
            if succ.index() < num_blocks && !visited[succ.index()] {
                stack.push((succ, false));
            }
        }
    }

    postorder
}

/// Reachable blocks that have no successors: returns, throws and
/// `unreachable` terminators, in depth-first preorder.
pub fn exiting_blocks(func: &Function) -> Vec<BlockId> {
    depth_first_preorder(func)
        .into_iter()
        .filter(|&id| func.block(id).terminator.successors().is_empty())
        .collect()
}
