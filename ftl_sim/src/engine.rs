//! Page-mapping engine: read/write/trim/format orchestration, the
//! round-robin write allocator, and the bulk/bounded GC paths.
//! 页映射引擎：读/写/trim/format 编排、轮转写分配器，以及整体/有界两
//! 条 GC 路径。

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rapidhash::RapidHashMap;

use crate::block::Block;
use crate::conf::{FtlConf, GcMode, GcPolicyKind};
use crate::error::{Error, Result};
use crate::map::MapTable;
use crate::pal::{CpuLatency, Dram, Pal};
use crate::policy::{self, GcPolicy, PolicyStats, Trigger};
use crate::pool::FreePool;
use crate::victim::select_victims;
use crate::{LpnRange, Req, SubUnits};

/// Engine-level GC counters exported to the outer simulator.
/// 导出给外层模拟器的引擎级 GC 计数。
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineStats {
  pub gc_count: u64,
  pub reclaimed_blocks: u64,
  pub superpage_copies: u64,
  pub page_copies: u64,
}

/// One exported statistic row.
/// 一行导出的统计项。
#[derive(Clone, Debug)]
pub struct StatEntry {
  pub name: String,
  pub desc: String,
  pub value: f64,
}

/// The page-mapping FTL. Owns the mapping table, the block map, the free
/// pool and the active GC policy; PAL and DRAM are consumed models.
/// 页映射 FTL。拥有映射表、块表、空闲池与当前 GC 策略；PAL 与 DRAM
/// 是被消费的模型。
pub struct Ftl<P: Pal, D: Dram> {
  conf: FtlConf,
  pal: P,
  dram: D,
  policy: Box<dyn GcPolicy>,

  table: MapTable,
  blocks: RapidHashMap<u32, Block>,
  free: FreePool,
  retired: u32,

  // Per-stream current write block plus the claimed sub-unit mask of the
  // stream the cursor points at.
  // 每流的当前写块，以及游标所指流已占用的子单元掩码。
  last_free: Vec<u32>,
  last_free_map: SubUnits,
  last_free_idx: usize,
  reclaim_more: bool,

  victim_rng: StdRng,
  cpu: CpuLatency,
  stats: EngineStats,
  units: u32,
}

impl<P: Pal, D: Dram> Ftl<P, D> {
  pub fn new(conf: FtlConf, pal: P, dram: D) -> Result<Self> {
    conf.validate()?;
    let policy = policy::build(&conf)?;

    // Without the random-IO tweak the page is one opaque unit.
    // 不启用随机 IO 优化时，整页视为单个不可分单元。
    let units = if conf.random_io_tweak { conf.subunits_in_page } else { 1 };

    let mut free = FreePool::new();
    for i in 0..conf.physical_blocks {
      free.push_initial(Block::new(i, conf.pages_in_block, units));
    }

    let mut ftl = Self {
      table: MapTable::new(units),
      blocks: RapidHashMap::default(),
      free,
      retired: 0,
      last_free: Vec::with_capacity(conf.parallelism as usize),
      last_free_map: SubUnits::none(units),
      last_free_idx: 0,
      reclaim_more: false,
      victim_rng: StdRng::seed_from_u64(conf.seed.wrapping_add(2)),
      cpu: CpuLatency::default(),
      stats: EngineStats::default(),
      units,
      conf,
      pal,
      dram,
      policy,
    };

    // Pin one open write block per allocation stream.
    // 为每个分配流固定一个打开的写块。
    for stream in 0..ftl.conf.parallelism {
      let idx = ftl.take_free_block(stream)?;
      ftl.last_free.push(idx);
    }

    Ok(ftl)
  }

  pub fn set_cpu_latency(&mut self, cpu: CpuLatency) {
    self.cpu = cpu;
  }

  /// Host read. Unmapped sub-units return silently with no PAL traffic.
  /// 主机读。未映射的子单元静默返回，不产生 PAL 流量。
  pub fn read(&mut self, req: &Req, tick: &mut u64) -> Result<()> {
    let start = *tick;
    let map = self.effective_map(req.map);

    if map.any() {
      self.read_internal(req.lpn, map, tick)?;
    } else {
      warn!("ftl: got empty read request");
    }

    *tick += self.cpu.read_ns;
    let response = *tick - start;
    debug!("ftl: READ  | LPN {} | {} - {} ({})", req.lpn, start, tick, response);

    self.policy.on_response(response, *tick);

    // Read-completion side trigger (aggressive policy only).
    // 读完成侧触发（仅激进策略）。
    let free = self.free.len();
    if self.policy.read_trigger(free, *tick) {
      let budget = self.policy.action(free, Trigger::Normal);
      let (copied, valid) = self.partial_gc(budget, Vec::new(), tick)?;
      self.policy.record_gc_invocation(copied, valid);
    }

    Ok(())
  }

  /// Host write, then the post-write GC decision.
  /// 主机写，随后做写后 GC 决策。
  pub fn write(&mut self, req: &Req, tick: &mut u64) -> Result<()> {
    let start = *tick;
    let map = self.effective_map(req.map);

    if map.any() {
      self.write_internal(req.lpn, map, tick, true)?;
    } else {
      warn!("ftl: got empty write request");
    }

    *tick += self.cpu.write_ns;
    let response = *tick - start;
    debug!("ftl: WRITE | LPN {} | {} - {} ({})", req.lpn, start, tick, response);

    self.policy.on_response(response, *tick);

    // Post-write GC decision. `reclaim_more` does not force a pass by
    // itself; it widens the next victim selection instead.
    // 写后 GC 决策。`reclaim_more` 本身不强制触发，只会扩大下一次牺牲
    // 块选择的规模。
    let free = self.free.len();
    match self.policy.should_trigger(free, *tick) {
      Some(Trigger::Bulk) => {
        let victims = self.select_victims_now(tick);
        debug!("ftl: GC | on-demand | {} blocks will be reclaimed", victims.len());
        let (copied, valid) = self.full_gc(&victims, tick)?;
        self.policy.record_gc_invocation(copied, valid);
      }
      Some(t) => {
        let budget = self.policy.action(free, t);
        let (copied, valid) = self.partial_gc(budget, Vec::new(), tick)?;
        self.policy.record_gc_invocation(copied, valid);
      }
      None => {}
    }

    Ok(())
  }

  /// Invalidate every sub-unit of the LPN and drop the mapping. No GC.
  /// 失效该 LPN 的所有子单元并删除映射。不做 GC。
  pub fn trim(&mut self, req: &Req, tick: &mut u64) -> Result<()> {
    let start = *tick;

    if let Some(entry) = self.table.erase(req.lpn) {
      self.dram.read(8 * self.units as u64, tick);

      for (su, ptr) in entry.iter().enumerate() {
        if ptr.is_set() {
          if let Some(block) = self.blocks.get_mut(&ptr.block) {
            block.invalidate(ptr.page, su as u32);
          }
        }
      }

      *tick += self.cpu.trim_internal_ns;
    }

    *tick += self.cpu.trim_ns;
    debug!("ftl: TRIM  | LPN {} | {} - {} ({})", req.lpn, start, tick, *tick - start);
    Ok(())
  }

  /// Trim a whole LPN range, then run a full GC restricted to the blocks
  /// the range touched.
  /// 修剪整个 LPN 区间，然后仅对区间触及的块做一次完整 GC。
  pub fn format(&mut self, range: LpnRange, tick: &mut u64) -> Result<()> {
    let removed = self.table.range_erase(range.start, range.count);
    let mut victims: Vec<u32> = Vec::new();

    for (_lpn, entry) in removed {
      for (su, ptr) in entry.iter().enumerate() {
        if ptr.is_set() {
          if let Some(block) = self.blocks.get_mut(&ptr.block) {
            block.invalidate(ptr.page, su as u32);
            victims.push(ptr.block);
          }
        }
      }
    }

    victims.sort_unstable();
    victims.dedup();

    self.full_gc(&victims, tick)?;
    *tick += self.cpu.format_ns;
    Ok(())
  }

  /// Flush policy metrics and summaries.
  /// 落盘策略指标与汇总。
  pub fn finalize(&mut self) {
    self.policy.finalize();
  }

  // ---- allocator ----

  fn effective_map(&self, map: SubUnits) -> SubUnits {
    if self.conf.random_io_tweak {
      map
    } else {
      SubUnits::all(1)
    }
  }

  /// Move one block from the free pool into the active map.
  /// 把一个块从空闲池移入活跃表。
  fn take_free_block(&mut self, stream: u32) -> Result<u32> {
    let block = self
      .free
      .take_stream(stream, self.conf.parallelism)
      .ok_or(Error::Invariant("free-block pool exhausted"))?;

    let idx = block.index();
    if self.blocks.insert(idx, block).is_some() {
      return Err(Error::Invariant("free block already active"));
    }

    Ok(idx)
  }

  /// Current write block for an incoming sub-unit set. Colliding sub-units
  /// advance the round-robin stream cursor; a filled stream block is
  /// replaced and raises `reclaim_more`.
  /// 请求子单元集的当前写块。子单元冲突会推进轮转流游标；写满的流块被
  /// 替换并置起 `reclaim_more`。
  fn last_free_block(&mut self, map: &SubUnits) -> Result<u32> {
    if !self.conf.random_io_tweak || self.last_free_map.intersects(map) {
      self.last_free_idx = (self.last_free_idx + 1) % self.conf.parallelism as usize;
      self.last_free_map = *map;
    } else {
      self.last_free_map.union(map);
    }

    let idx = self.last_free[self.last_free_idx];
    let filled = self
      .blocks
      .get(&idx)
      .ok_or(Error::Invariant("missing current write block"))?
      .next_write_page()
      == self.conf.pages_in_block;

    if filled {
      let fresh = self.take_free_block(self.last_free_idx as u32)?;
      self.last_free[self.last_free_idx] = fresh;
      self.reclaim_more = true;
    }

    Ok(self.last_free[self.last_free_idx])
  }

  // ---- I/O internals ----

  fn read_internal(&mut self, lpn: u64, map: SubUnits, tick: &mut u64) -> Result<()> {
    let Some(entry) = self.table.get(lpn) else {
      return Ok(());
    };
    let entry = entry.to_vec();

    self.dram.read(8 * map.count() as u64, tick);

    // Sub-unit reads go to independent planes: they start together and the
    // final tick is the last completion.
    // 子单元读发往独立的 plane：同时开始，最终 tick 取最后完成时刻。
    let begin = *tick;
    let mut finish = *tick;

    for su in map.iter_set() {
      let ptr = entry[su as usize];
      if !ptr.is_set() {
        continue;
      }

      let Some(block) = self.blocks.get_mut(&ptr.block) else {
        continue;
      };

      let mut t = begin;
      block.read(ptr.page, su, t);
      self.pal.read(ptr.block, ptr.page, &SubUnits::single(self.units, su), &mut t);
      finish = finish.max(t);
    }

    *tick = finish;
    *tick += self.cpu.read_internal_ns;
    Ok(())
  }

  fn write_internal(&mut self, lpn: u64, map: SubUnits, tick: &mut u64, send_to_pal: bool) -> Result<()> {
    // Invalidate the prior physical location of every written sub-unit.
    // 先失效每个被写子单元的旧物理位置。
    if let Some(entry) = self.table.get(lpn) {
      let entry = entry.to_vec();
      for su in map.iter_set() {
        let ptr = entry[su as usize];
        if ptr.is_set() {
          if let Some(block) = self.blocks.get_mut(&ptr.block) {
            block.invalidate(ptr.page, su);
          }
        }
      }
    }

    let target = self.last_free_block(&map)?;

    if send_to_pal {
      let bytes = 8 * map.count() as u64;
      self.dram.read(bytes, tick);
      self.dram.write(bytes, tick);
    }

    let begin = *tick;
    let mut finish = *tick;

    for su in map.iter_set() {
      let block = self
        .blocks
        .get_mut(&target)
        .ok_or(Error::Invariant("missing current write block"))?;
      let page = block.next_write_page_for(su);

      let mut t = begin;
      block.write(page, su, lpn, t)?;
      self.table.upsert(lpn, su, target, page);

      if send_to_pal {
        self.pal.write(target, page, &SubUnits::single(self.units, su), &mut t);
      }
      finish = finish.max(t);
    }

    if send_to_pal {
      *tick = finish;
      *tick += self.cpu.write_internal_ns;
    } else if self.free_block_ratio() < self.conf.gc_threshold {
      // The warmup filler must never force a collection.
      // 预热填充绝不允许触发回收。
      return Err(Error::Invariant("GC required during initialization"));
    }

    Ok(())
  }

  pub(crate) fn warm_write(&mut self, lpn: u64, tick: &mut u64) -> Result<()> {
    self.write_internal(lpn, SubUnits::all(self.units), tick, false)
  }

  // ---- GC ----

  /// Victim count per the GC mode, plus one stream's worth of blocks when
  /// `reclaim_more` was raised.
  /// 按 GC 模式决定牺牲块数量；`reclaim_more` 置位时多回收一个流宽度。
  fn select_victims_now(&mut self, tick: &mut u64) -> Vec<u32> {
    let mut n = match self.conf.gc_mode {
      GcMode::FixedN => self.conf.reclaim_blocks as usize,
      GcMode::UpToRatio => {
        let target = (self.conf.physical_blocks as f32 * self.conf.reclaim_threshold) as i64;
        (target - self.free.len() as i64).max(0) as usize
      }
    };

    if self.reclaim_more {
      n += self.conf.parallelism as usize;
      self.reclaim_more = false;
    }

    let list = select_victims(
      &self.blocks,
      self.conf.evict_policy,
      n,
      self.conf.d_choice_param,
      self.conf.pages_in_block,
      *tick,
      &self.last_free,
      &mut self.victim_rng,
    );

    *tick += self.cpu.select_victim_ns;
    list
  }

  /// Copy every valid sub-unit of one victim page to a fresh location and
  /// re-point the mapping.
  /// 把牺牲页的所有有效子单元搬到新位置并重指映射。
  fn copy_page(
    &mut self,
    victim: u32,
    page: u32,
    lpns: &[u64],
    bits: SubUnits,
    tick: &mut u64,
  ) -> Result<()> {
    let target = self.last_free_block(&bits)?;
    let new_page = self
      .blocks
      .get(&target)
      .ok_or(Error::Invariant("missing current write block"))?
      .next_write_page();

    self.pal.read(victim, page, &bits, tick);
    self.pal.write(target, new_page, &bits, tick);

    for su in bits.iter_set() {
      let lpn = lpns[su as usize];

      let block = self
        .blocks
        .get_mut(&target)
        .ok_or(Error::Invariant("missing current write block"))?;
      block.write(new_page, su, lpn, *tick)?;
      self.table.upsert(lpn, su, target, new_page);

      if let Some(v) = self.blocks.get_mut(&victim) {
        v.invalidate(page, su);
      }
    }

    Ok(())
  }

  /// Bulk path: drain every victim, no copy budget.
  /// 整体路径：清空每个牺牲块，没有复制预算。
  fn full_gc(&mut self, victims: &[u32], tick: &mut u64) -> Result<(u32, u32)> {
    let mut copied = 0u32;
    let mut valid_copies = 0u32;

    for &vidx in victims {
      if !self.blocks.contains_key(&vidx) {
        continue;
      }

      // Open write-stream blocks are never drained in place.
      // 打开的写流块绝不就地清空。
      if self.last_free.contains(&vidx) {
        continue;
      }

      if self.blocks[&vidx].valid_pages() == 0 {
        self.erase_internal(vidx, tick)?;
        continue;
      }

      for page in 0..self.conf.pages_in_block {
        let (lpns, bits) = {
          let block = &self.blocks[&vidx];
          let (lpns, bits) = block.page_info(page);
          (lpns.to_vec(), bits)
        };

        if !bits.any() {
          continue;
        }

        self.copy_page(vidx, page, &lpns, bits, tick)?;
        copied += 1;
        valid_copies += bits.count();
      }

      if self.blocks[&vidx].valid_pages() == 0 {
        self.erase_internal(vidx, tick)?;
      }
    }

    self.stats.gc_count += 1;
    self.stats.reclaimed_blocks += victims.len() as u64;
    self.stats.superpage_copies += copied as u64;
    self.stats.page_copies += valid_copies as u64;

    Ok((copied, valid_copies))
  }

  /// Bounded path: at most `budget` page copies from the first victim.
  /// 有界路径：只从第一个牺牲块复制至多 `budget` 页。
  fn partial_gc(&mut self, budget: u32, victims: Vec<u32>, tick: &mut u64) -> Result<(u32, u32)> {
    if budget == 0 {
      return Ok((0, 0));
    }

    self.stats.gc_count += 1;

    let victims = if victims.is_empty() {
      self.select_victims_now(tick)
    } else {
      victims
    };

    let Some(&vidx) = victims.first() else {
      return Ok((0, 0));
    };
    if !self.blocks.contains_key(&vidx) || self.last_free.contains(&vidx) {
      return Ok((0, 0));
    }

    if self.blocks[&vidx].valid_pages() == 0 {
      self.erase_internal(vidx, tick)?;
      return Ok((0, 0));
    }

    let mut copied = 0u32;
    let mut valid_copies = 0u32;

    for page in 0..self.conf.pages_in_block {
      if copied >= budget || self.blocks[&vidx].valid_pages() == 0 {
        break;
      }

      let (lpns, bits) = {
        let block = &self.blocks[&vidx];
        let (lpns, bits) = block.page_info(page);
        (lpns.to_vec(), bits)
      };

      if !bits.any() {
        continue;
      }

      self.copy_page(vidx, page, &lpns, bits, tick)?;
      copied += 1;
      valid_copies += bits.count();
    }

    if self.blocks[&vidx].valid_pages() == 0 {
      self.erase_internal(vidx, tick)?;
    }

    self.stats.superpage_copies += copied as u64;
    self.stats.page_copies += valid_copies as u64;

    Ok((copied, valid_copies))
  }

  /// Erase one emptied block; reinsertion is skipped past the bad-block
  /// threshold and the block is permanently retired.
  /// 擦除一个已清空的块；超过坏块阈值的块不再回池，永久退役。
  fn erase_internal(&mut self, idx: u32, tick: &mut u64) -> Result<()> {
    {
      let block = self
        .blocks
        .get_mut(&idx)
        .ok_or(Error::Invariant("erase of unknown block"))?;
      block.erase()?;
    }

    self.pal.erase(idx, tick);

    let block = self.blocks.remove(&idx).expect("checked above");
    if block.erase_count() < self.conf.bad_block_threshold {
      self.free.return_block(block);
    } else {
      warn!("ftl: block {} retired after {} erases", idx, block.erase_count());
      self.retired += 1;
    }

    self.policy.record_block_erase();
    *tick += self.cpu.erase_internal_ns;
    Ok(())
  }

  // ---- status & statistics ----

  #[inline]
  #[must_use]
  pub fn free_blocks(&self) -> u32 {
    self.free.len()
  }

  #[inline]
  #[must_use]
  pub fn active_blocks(&self) -> u32 {
    self.blocks.len() as u32
  }

  #[inline]
  #[must_use]
  pub fn retired_blocks(&self) -> u32 {
    self.retired
  }

  #[inline]
  #[must_use]
  pub fn free_block_ratio(&self) -> f32 {
    self.free.len() as f32 / self.conf.physical_blocks as f32
  }

  #[inline]
  #[must_use]
  pub fn mapped_pages(&self, start: u64, end: u64) -> u64 {
    self.table.mapped_in_range(start, end)
  }

  /// Census of valid and invalidated physical pages.
  /// 有效与已失效物理页的盘点。
  #[must_use]
  pub fn total_pages(&self) -> (u64, u64) {
    let mut valid = 0u64;
    let mut invalid = 0u64;
    for block in self.blocks.values() {
      valid += block.valid_pages() as u64;
      invalid += block.dirty_pages() as u64;
    }
    (valid, invalid)
  }

  #[inline]
  #[must_use]
  pub fn stats(&self) -> EngineStats {
    self.stats
  }

  #[inline]
  #[must_use]
  pub fn policy_stats(&self) -> PolicyStats {
    self.policy.stats()
  }

  #[inline]
  #[must_use]
  pub fn policy_name(&self) -> &'static str {
    self.policy.name()
  }

  #[inline]
  #[must_use]
  pub fn conf(&self) -> &FtlConf {
    &self.conf
  }

  /// Erase-count fairness over used blocks: `(Σe)² / (B·Σe²)`, −1 when no
  /// block was ever erased.
  /// 已用块的擦除次数公平度：`(Σe)² / (B·Σe²)`；从未擦除时为 −1。
  #[must_use]
  pub fn wear_leveling(&self) -> f64 {
    let mut total = 0u64;
    let mut squared = 0u64;
    let mut count = 0u64;

    for block in self.blocks.values() {
      let e = block.erase_count() as u64;
      total += e;
      squared += e * e;
      count += 1;
    }

    for block in self.free.iter() {
      let e = block.erase_count() as u64;
      if e == 0 {
        continue;
      }
      total += e;
      squared += e * e;
      count += 1;
    }

    if squared == 0 {
      return -1.0;
    }

    (total * total) as f64 / (count * squared) as f64
  }

  /// Spread of erase counts across all blocks, for wear tests.
  /// 所有块擦除次数的极差，供磨损测试使用。
  #[must_use]
  pub fn erase_count_spread(&self) -> u32 {
    let counts = self
      .blocks
      .values()
      .map(Block::erase_count)
      .chain(self.free.iter().map(Block::erase_count));

    let mut min = u32::MAX;
    let mut max = 0;
    for e in counts {
      min = min.min(e);
      max = max.max(e);
    }
    max.saturating_sub(min)
  }

  /// Statistic rows for the outer simulator.
  /// 供外层模拟器使用的统计行。
  #[must_use]
  pub fn stat_list(&self, prefix: &str) -> Vec<StatEntry> {
    let mut list = vec![
      StatEntry {
        name: format!("{}page_mapping.gc.count", prefix),
        desc: "Total GC count".into(),
        value: self.stats.gc_count as f64,
      },
      StatEntry {
        name: format!("{}page_mapping.gc.reclaimed_blocks", prefix),
        desc: "Total reclaimed blocks in GC".into(),
        value: self.stats.reclaimed_blocks as f64,
      },
      StatEntry {
        name: format!("{}page_mapping.gc.superpage_copies", prefix),
        desc: "Total copied valid superpages during GC".into(),
        value: self.stats.superpage_copies as f64,
      },
      StatEntry {
        name: format!("{}page_mapping.gc.page_copies", prefix),
        desc: "Total copied valid pages during GC".into(),
        value: self.stats.page_copies as f64,
      },
      StatEntry {
        name: format!("{}page_mapping.wear_leveling", prefix),
        desc: "Wear-leveling factor".into(),
        value: self.wear_leveling(),
      },
    ];

    if !matches!(self.conf.policy, GcPolicyKind::Default | GcPolicyKind::LazyRtgc) {
      let stats = self.policy.stats();
      list.push(StatEntry {
        name: format!("{}ftl.rlgc.gc_invocations", prefix),
        desc: "Number of RL-GC invocations".into(),
        value: stats.gc_invocations as f64,
      });
      list.push(StatEntry {
        name: format!("{}ftl.rlgc.page_copies", prefix),
        desc: "Total pages copied during RL-GC".into(),
        value: stats.total_page_copies as f64,
      });
      list.push(StatEntry {
        name: format!("{}ftl.rlgc.intensive_gc", prefix),
        desc: "Number of intensive GCs triggered".into(),
        value: stats.intensive_gc as f64,
      });
      list.push(StatEntry {
        name: format!("{}ftl.rlgc.avg_reward", prefix),
        desc: "Average reward received by RL-GC".into(),
        value: stats.avg_reward as f64,
      });
    }

    list
  }

  /// Full consistency audit used by the property tests: block conservation,
  /// free-pool ordering and mapping ↔ valid-bit agreement.
  /// 属性测试使用的一致性审计：块守恒、空闲池有序、映射与有效位一致。
  pub fn check_consistency(&self) -> Result<()> {
    if self.free.len() + self.blocks.len() as u32 + self.retired != self.conf.physical_blocks {
      return Err(Error::Invariant("block conservation broken"));
    }

    let counts: Vec<u32> = self.free.erase_counts().collect();
    if counts.windows(2).any(|w| w[0] > w[1]) {
      return Err(Error::Invariant("free pool not sorted by erase count"));
    }

    for (lpn, entry) in self.table.iter() {
      for (su, ptr) in entry.iter().enumerate() {
        if !ptr.is_set() {
          continue;
        }

        let Some(block) = self.blocks.get(&ptr.block) else {
          return Err(Error::Invariant("mapping points at a non-active block"));
        };

        let (lpns, bits) = block.page_info(ptr.page);
        if !bits.test(su as u32) {
          return Err(Error::Invariant("mapping points at an invalid sub-unit"));
        }
        if lpns[su] != lpn {
          return Err(Error::Invariant("mapping and block LPN record disagree"));
        }
      }
    }

    Ok(())
  }

  /// PAL model access for latency assertions in tests.
  /// 供测试断言延迟使用的 PAL 模型访问。
  #[inline]
  pub fn pal(&self) -> &P {
    &self.pal
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pal::{LatencyDram, LatencyPal};

  fn small_conf() -> FtlConf {
    let mut conf = FtlConf::default();
    conf.physical_blocks = 32;
    conf.pages_in_block = 8;
    conf.subunits_in_page = 1;
    conf.parallelism = 2;
    conf.gc_threshold = 0.2;
    conf
  }

  fn engine(conf: FtlConf) -> Ftl<LatencyPal, LatencyDram> {
    let mut ftl = Ftl::new(conf, LatencyPal::zero(), LatencyDram::zero()).unwrap();
    ftl.set_cpu_latency(CpuLatency::zero());
    ftl
  }

  #[test]
  fn write_then_read_routes_to_latest_location() {
    let mut ftl = engine(small_conf());
    let mut tick = 0;

    ftl.write(&Req::full(7, 1), &mut tick).unwrap();
    ftl.write(&Req::full(7, 1), &mut tick).unwrap();

    let reads_before = ftl.pal().reads;
    ftl.read(&Req::full(7, 1), &mut tick).unwrap();
    assert_eq!(ftl.pal().reads, reads_before + 1);

    ftl.check_consistency().unwrap();
    let (valid, invalid) = ftl.total_pages();
    assert_eq!(valid, 1);
    assert_eq!(invalid, 1);
  }

  #[test]
  fn unmapped_read_issues_no_pal_traffic() {
    let mut ftl = engine(small_conf());
    let mut tick = 0;

    ftl.read(&Req::full(42, 1), &mut tick).unwrap();
    assert_eq!(ftl.pal().reads, 0);
  }

  #[test]
  fn trim_then_read_issues_no_pal_traffic() {
    let mut ftl = engine(small_conf());
    let mut tick = 0;

    ftl.write(&Req::full(3, 1), &mut tick).unwrap();
    ftl.trim(&Req::full(3, 1), &mut tick).unwrap();

    let reads_before = ftl.pal().reads;
    ftl.read(&Req::full(3, 1), &mut tick).unwrap();
    assert_eq!(ftl.pal().reads, reads_before);

    ftl.check_consistency().unwrap();
  }

  #[test]
  fn format_clears_a_range() {
    let mut ftl = engine(small_conf());
    let mut tick = 0;

    for lpn in 0..32 {
      ftl.write(&Req::full(lpn, 1), &mut tick).unwrap();
    }

    ftl.format(LpnRange { start: 0, count: 16 }, &mut tick).unwrap();

    for lpn in 0..16 {
      assert_eq!(ftl.mapped_pages(lpn, lpn + 1), 0);
    }
    let reads_before = ftl.pal().reads;
    ftl.read(&Req::full(5, 1), &mut tick).unwrap();
    assert_eq!(ftl.pal().reads, reads_before);

    ftl.check_consistency().unwrap();
  }

  #[test]
  fn block_conservation_under_write_pressure() {
    let mut ftl = engine(small_conf());
    let mut tick = 0;

    // Hammer a small LPN space so GC has to run.
    for i in 0..2000u64 {
      ftl.write(&Req::full(i % 64, 1), &mut tick).unwrap();
      tick += 1000;
    }

    ftl.check_consistency().unwrap();
    assert!(ftl.stats().gc_count > 0);
    assert!(ftl.free_blocks() > 0);
  }

  #[test]
  fn partial_subunit_writes_keep_the_mapping_consistent() {
    let mut conf = small_conf();
    conf.subunits_in_page = 4;
    let mut ftl = engine(conf);
    let mut tick = 0;

    // Two partial writes of the same LPN touch different sub-units.
    let lo = Req {
      lpn: 9,
      map: SubUnits::single(4, 0),
    };
    let hi = Req {
      lpn: 9,
      map: SubUnits::single(4, 3),
    };

    ftl.write(&lo, &mut tick).unwrap();
    ftl.write(&hi, &mut tick).unwrap();
    ftl.check_consistency().unwrap();

    // Overwriting one sub-unit leaves the other valid.
    ftl.write(&lo, &mut tick).unwrap();
    ftl.check_consistency().unwrap();

    let reads_before = ftl.pal().reads;
    ftl.read(&Req::full(9, 4), &mut tick).unwrap();
    assert_eq!(ftl.pal().reads, reads_before + 2);
  }

  #[test]
  fn erase_increments_once_per_seal_and_reclaim() {
    let mut conf = small_conf();
    conf.physical_blocks = 16;
    let mut ftl = engine(conf);
    let mut tick = 0;

    for i in 0..1000u64 {
      ftl.write(&Req::full(i % 32, 1), &mut tick).unwrap();
      tick += 1000;
    }

    let wl = ftl.wear_leveling();
    assert!(wl > 0.0 && wl <= 1.0);
    ftl.check_consistency().unwrap();
  }
}
