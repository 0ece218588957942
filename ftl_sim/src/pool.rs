//! Free-block pool with passive wear-leveling.
//! 带被动磨损均衡的空闲块池。

use std::collections::VecDeque;

use crate::block::Block;

/// Blocks awaiting allocation, kept non-decreasing by erase count so the
/// youngest blocks are handed out first.
/// 等待分配的块，按擦除次数保持非降序，最年轻的块先被取出。
#[derive(Debug, Default)]
pub struct FreePool {
  blocks: VecDeque<Block>,
}

impl FreePool {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  #[inline]
  #[must_use]
  pub fn len(&self) -> u32 {
    self.blocks.len() as u32
  }

  #[inline]
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }

  /// Initial population; blocks all carry erase count zero here.
  /// 初始填充；此时所有块的擦除次数都是零。
  pub fn push_initial(&mut self, block: Block) {
    self.blocks.push_back(block);
  }

  /// Take the first block assigned to `stream` (block index mod `streams`),
  /// falling back to the head of the list when no block matches.
  /// 取出第一个归属 `stream`（块号对 `streams` 取模）的块；没有匹配时
  /// 回退为队首。
  pub fn take_stream(&mut self, stream: u32, streams: u32) -> Option<Block> {
    let pos = self
      .blocks
      .iter()
      .position(|b| b.index() % streams == stream)
      .unwrap_or(0);
    self.blocks.remove(pos)
  }

  /// Ordered reinsertion by erase count: reverse scan, insert after the
  /// last position whose erase count is ≤ the returning block's count.
  /// 按擦除次数有序重插：反向扫描，插到最后一个擦除次数不大于回收块
  /// 的位置之后。
  pub fn return_block(&mut self, block: Block) {
    let count = block.erase_count();
    let mut at = 0;

    for i in (0..self.blocks.len()).rev() {
      if self.blocks[i].erase_count() <= count {
        at = i + 1;
        break;
      }
    }

    self.blocks.insert(at, block);
  }

  /// Erase counts front to back; used by invariant checks and statistics.
  /// 从前到后的擦除次数；供不变量检查与统计使用。
  pub fn erase_counts(&self) -> impl Iterator<Item = u32> + '_ {
    self.blocks.iter().map(Block::erase_count)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Block> {
    self.blocks.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn block_with_erases(idx: u32, erases: u32) -> Block {
    let mut b = Block::new(idx, 1, 1);
    for _ in 0..erases {
      b.erase().unwrap();
    }
    b
  }

  #[test]
  fn ordered_reinsertion_keeps_sort() {
    let mut pool = FreePool::new();
    for (idx, erases) in [(0, 0), (1, 2), (2, 5)] {
      pool.push_initial(block_with_erases(idx, erases));
    }

    pool.return_block(block_with_erases(3, 3));
    pool.return_block(block_with_erases(4, 0));

    let counts: Vec<u32> = pool.erase_counts().collect();
    let mut sorted = counts.clone();
    sorted.sort_unstable();
    assert_eq!(counts, sorted);
  }

  #[test]
  fn take_stream_prefers_matching_block() {
    let mut pool = FreePool::new();
    for idx in 0..8 {
      pool.push_initial(Block::new(idx, 1, 1));
    }

    let b = pool.take_stream(3, 4).unwrap();
    assert_eq!(b.index() % 4, 3);

    // No block matches stream 3 mod 100: falls back to the head.
    let b = pool.take_stream(99, 100).unwrap();
    assert_eq!(b.index(), 0);
  }

  #[test]
  fn youngest_first_after_mixed_returns() {
    let mut pool = FreePool::new();
    pool.return_block(block_with_erases(0, 4));
    pool.return_block(block_with_erases(1, 1));
    pool.return_block(block_with_erases(2, 2));

    let b = pool.take_stream(0, 1).unwrap();
    assert_eq!(b.erase_count(), 1);
  }
}
