//! One physical erase block.
//! 一个物理擦除块。

use crate::error::{Error, Result};
use crate::SubUnits;

/// Erase block with per-(page, sub-unit) LPN records and valid bits.
/// Pages are programmed strictly in order per sub-unit; a block whose write
/// cursor reached the last page is *sealed* and may become a GC victim.
/// 带有 (页, 子单元) LPN 记录与有效位的擦除块。每个子单元的页严格按序
/// 编程；写游标到达最后一页的块被“封口”，可成为 GC 牺牲块。
#[derive(Clone, Debug)]
pub struct Block {
  idx: u32,
  pages: u32,
  subunits: u32,

  // One LPN slot per (page, sub-unit); kept after invalidation so GC can
  // reconstruct the mapping.
  // 每个 (页, 子单元) 一个 LPN 槽；失效后仍保留，供 GC 重建映射。
  lpns: Vec<u64>,
  valid: Vec<SubUnits>,
  cursor: Vec<u32>,

  last_read: Vec<u64>,
  last_written: Vec<u64>,
  last_accessed: u64,
  erase_count: u32,
}

impl Block {
  #[must_use]
  pub fn new(idx: u32, pages: u32, subunits: u32) -> Self {
    Self {
      idx,
      pages,
      subunits,
      lpns: vec![u64::MAX; (pages * subunits) as usize],
      valid: vec![SubUnits::none(subunits); pages as usize],
      cursor: vec![0; subunits as usize],
      last_read: vec![0; pages as usize],
      last_written: vec![0; pages as usize],
      last_accessed: 0,
      erase_count: 0,
    }
  }

  #[inline]
  #[must_use]
  pub fn index(&self) -> u32 {
    self.idx
  }

  /// Program one sub-unit. Pages are programmed in order: the target may
  /// never precede the sub-unit's write cursor. Host writes land exactly on
  /// the cursor; GC copies may jump it forward to the block-level cursor.
  /// 编程一个子单元。页必须按序编程：目标页不得落后于该子单元的写游
  /// 标。主机写恰好落在游标上；GC 复制可将其前移到块级游标。
  pub fn write(&mut self, page: u32, subunit: u32, lpn: u64, now: u64) -> Result<()> {
    if page >= self.pages || subunit >= self.subunits {
      return Err(Error::Invariant("block write out of range"));
    }

    if page < self.cursor[subunit as usize] {
      return Err(Error::Invariant("rewrite of a programmed page"));
    }

    self.lpns[(page * self.subunits + subunit) as usize] = lpn;
    self.valid[page as usize].set(subunit);
    self.cursor[subunit as usize] = page + 1;
    self.last_written[page as usize] = now;
    self.last_accessed = now;
    Ok(())
  }

  /// Touch one sub-unit for a read; validity is asserted by callers.
  /// 读取触碰一个子单元；有效性由调用方保证。
  pub fn read(&mut self, page: u32, _subunit: u32, now: u64) {
    if let Some(t) = self.last_read.get_mut(page as usize) {
      *t = now;
    }
    self.last_accessed = now;
  }

  /// Drop the valid bit of one sub-unit; the LPN record stays.
  /// 清除一个子单元的有效位；LPN 记录保留。
  pub fn invalidate(&mut self, page: u32, subunit: u32) {
    if let Some(bits) = self.valid.get_mut(page as usize) {
      bits.clear(subunit);
    }
  }

  /// Full sub-unit vector of one page, regardless of individual validity.
  /// 返回一页的完整子单元向量，不论单个子单元是否有效。
  #[must_use]
  pub fn page_info(&self, page: u32) -> (&[u64], SubUnits) {
    let start = (page * self.subunits) as usize;
    (
      &self.lpns[start..start + self.subunits as usize],
      self.valid[page as usize],
    )
  }

  /// Erase the whole block. Valid pages must have been copied away first.
  /// 擦除整块。有效页必须先被搬走。
  pub fn erase(&mut self) -> Result<()> {
    if self.valid_pages() != 0 {
      return Err(Error::Invariant("erase with valid pages remaining"));
    }

    self.lpns.fill(u64::MAX);
    for bits in &mut self.valid {
      *bits = SubUnits::none(self.subunits);
    }
    self.cursor.fill(0);
    self.last_read.fill(0);
    self.last_written.fill(0);
    self.erase_count += 1;
    Ok(())
  }

  /// Pages holding at least one valid sub-unit.
  /// 至少包含一个有效子单元的页数。
  #[must_use]
  pub fn valid_pages(&self) -> u32 {
    self.valid.iter().filter(|bits| bits.any()).count() as u32
  }

  /// Valid sub-units over the whole block (the raw victim weight).
  /// 全块有效子单元数（原始牺牲块权重）。
  #[must_use]
  pub fn valid_subunits(&self) -> u32 {
    self.valid.iter().map(SubUnits::count).sum()
  }

  /// Written pages that no longer carry any valid sub-unit.
  /// 已写入但不再含任何有效子单元的页数。
  #[must_use]
  pub fn dirty_pages(&self) -> u32 {
    (0..self.pages)
      .filter(|&p| self.page_written(p) && !self.valid[p as usize].any())
      .count() as u32
  }

  /// Next write page for one sub-unit.
  #[inline]
  #[must_use]
  pub fn next_write_page_for(&self, subunit: u32) -> u32 {
    self.cursor[subunit as usize]
  }

  /// Overall write cursor: the furthest sub-unit cursor.
  /// 整体写游标：所有子单元游标中的最大值。
  #[must_use]
  pub fn next_write_page(&self) -> u32 {
    self.cursor.iter().copied().max().unwrap_or(0)
  }

  /// Sealed blocks are the only GC victim candidates.
  /// 只有封口的块才是 GC 牺牲块候选。
  #[inline]
  #[must_use]
  pub fn is_sealed(&self) -> bool {
    self.next_write_page() == self.pages
  }

  #[inline]
  #[must_use]
  pub fn last_accessed(&self) -> u64 {
    self.last_accessed
  }

  #[inline]
  #[must_use]
  pub fn erase_count(&self) -> u32 {
    self.erase_count
  }

  #[inline]
  #[must_use]
  pub fn pages_in_block(&self) -> u32 {
    self.pages
  }

  #[inline]
  fn page_written(&self, page: u32) -> bool {
    (0..self.subunits).any(|su| page < self.cursor[su as usize])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sequential_program_and_seal() {
    let mut b = Block::new(0, 4, 1);
    for p in 0..4 {
      b.write(p, 0, 100 + p as u64, p as u64).unwrap();
    }
    assert!(b.is_sealed());
    assert_eq!(b.valid_pages(), 4);

    // Writing past the end or skipping the cursor is rejected.
    assert!(b.write(4, 0, 1, 0).is_err());
  }

  #[test]
  fn rewrite_of_a_programmed_page_is_rejected() {
    let mut b = Block::new(0, 4, 1);
    b.write(0, 0, 1, 0).unwrap();
    assert!(b.write(0, 0, 2, 0).is_err());

    // A forward jump wastes pages but is legal, like a GC copy landing on
    // the block-level cursor.
    b.write(2, 0, 3, 0).unwrap();
    assert_eq!(b.next_write_page(), 3);
  }

  #[test]
  fn erase_requires_zero_valid_pages() {
    let mut b = Block::new(0, 2, 2);
    b.write(0, 0, 7, 1).unwrap();
    b.write(0, 1, 7, 1).unwrap();

    assert!(b.erase().is_err());

    b.invalidate(0, 0);
    b.invalidate(0, 1);
    assert_eq!(b.valid_pages(), 0);
    assert_eq!(b.dirty_pages(), 1);

    b.erase().unwrap();
    assert_eq!(b.erase_count(), 1);
    assert_eq!(b.next_write_page(), 0);
    assert_eq!(b.dirty_pages(), 0);
  }

  #[test]
  fn page_info_keeps_lpns_after_invalidate() {
    let mut b = Block::new(3, 2, 2);
    b.write(0, 0, 41, 1).unwrap();
    b.write(0, 1, 41, 1).unwrap();
    b.invalidate(0, 1);

    let (lpns, valid) = b.page_info(0);
    assert_eq!(lpns, &[41, 41]);
    assert!(valid.test(0));
    assert!(!valid.test(1));
  }
}
