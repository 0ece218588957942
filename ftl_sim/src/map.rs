//! Logical-to-physical mapping table.
//! 逻辑到物理映射表。

use rapidhash::RapidHashMap;

/// Physical location of one sub-unit.
/// 一个子单元的物理位置。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PagePtr {
  pub block: u32,
  pub page: u32,
}

impl PagePtr {
  /// Placeholder for a sub-unit that was never written.
  /// 从未写入的子单元占位值。
  pub const UNSET: Self = Self {
    block: u32::MAX,
    page: u32::MAX,
  };

  #[inline]
  #[must_use]
  pub fn is_set(&self) -> bool {
    self.block != u32::MAX
  }
}

/// LPN → fixed-length vector of per-sub-unit locations. Absent key means
/// unmapped.
/// LPN → 按子单元的定长位置向量。键不存在表示未映射。
#[derive(Debug)]
pub struct MapTable {
  entries: RapidHashMap<u64, Vec<PagePtr>>,
  subunits: u32,
}

impl MapTable {
  #[must_use]
  pub fn new(subunits: u32) -> Self {
    Self {
      entries: RapidHashMap::default(),
      subunits,
    }
  }

  #[inline]
  #[must_use]
  pub fn get(&self, lpn: u64) -> Option<&[PagePtr]> {
    self.entries.get(&lpn).map(Vec::as_slice)
  }

  /// Point one sub-unit of `lpn` at a new physical page, creating the entry
  /// on first write.
  /// 将 `lpn` 的一个子单元指向新的物理页，首次写入时创建条目。
  pub fn upsert(&mut self, lpn: u64, subunit: u32, block: u32, page: u32) {
    let subunits = self.subunits as usize;
    let entry = self
      .entries
      .entry(lpn)
      .or_insert_with(|| vec![PagePtr::UNSET; subunits]);
    entry[subunit as usize] = PagePtr { block, page };
  }

  /// Remove the whole entry; the caller invalidates the physical pages.
  /// 删除整个条目；物理页由调用方失效。
  pub fn erase(&mut self, lpn: u64) -> Option<Vec<PagePtr>> {
    self.entries.remove(&lpn)
  }

  /// Remove every entry in `[start, start + count)`, yielding the removed
  /// mappings for invalidation.
  /// 删除 `[start, start + count)` 内的所有条目，返回被删映射以便失效。
  pub fn range_erase(&mut self, start: u64, count: u64) -> Vec<(u64, Vec<PagePtr>)> {
    let end = start.saturating_add(count);
    let lpns: Vec<u64> = self
      .entries
      .keys()
      .copied()
      .filter(|&lpn| lpn >= start && lpn < end)
      .collect();

    lpns
      .into_iter()
      .filter_map(|lpn| self.entries.remove(&lpn).map(|v| (lpn, v)))
      .collect()
  }

  #[inline]
  #[must_use]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[inline]
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  #[inline]
  #[must_use]
  pub fn contains(&self, lpn: u64) -> bool {
    self.entries.contains_key(&lpn)
  }

  pub fn iter(&self) -> impl Iterator<Item = (u64, &[PagePtr])> {
    self.entries.iter().map(|(&lpn, v)| (lpn, v.as_slice()))
  }

  /// Mapped LPNs inside a range, for status reporting.
  /// 区间内已映射的 LPN 数，用于状态上报。
  #[must_use]
  pub fn mapped_in_range(&self, start: u64, end: u64) -> u64 {
    self
      .entries
      .keys()
      .filter(|&&lpn| lpn >= start && lpn < end)
      .count() as u64
  }
}
