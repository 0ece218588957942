//! Consumed external interfaces: NAND physical abstraction layer, DRAM cost
//! model, and the per-operation CPU latency table.
//! 被消费的外部接口：NAND 物理抽象层、DRAM 代价模型以及每操作 CPU
//! 延迟表。

use crate::SubUnits;

/// NAND physical abstraction layer. Every call advances `tick` by a
/// device-modeled amount; failure is not modeled.
/// NAND 物理抽象层。每次调用都按设备模型推进 `tick`；不建模故障。
pub trait Pal {
  fn read(&mut self, block: u32, page: u32, map: &SubUnits, tick: &mut u64);
  fn write(&mut self, block: u32, page: u32, map: &SubUnits, tick: &mut u64);
  fn erase(&mut self, block: u32, tick: &mut u64);
}

/// DRAM access cost model, opaque latency only.
/// DRAM 访问代价模型，仅有不透明延迟。
pub trait Dram {
  fn read(&mut self, bytes: u64, tick: &mut u64);
  fn write(&mut self, bytes: u64, tick: &mut u64);
}

/// Flat-latency PAL model with typical MLC timings, counting operations.
/// 采用典型 MLC 时序的平坦延迟 PAL 模型，并统计操作次数。
#[derive(Clone, Debug)]
pub struct LatencyPal {
  pub read_ns: u64,
  pub program_ns: u64,
  pub erase_ns: u64,
  pub reads: u64,
  pub programs: u64,
  pub erases: u64,
}

impl Default for LatencyPal {
  fn default() -> Self {
    Self {
      read_ns: 50_000,       // 50µs page read
      program_ns: 500_000,   // 500µs page program
      erase_ns: 3_500_000,   // 3.5ms block erase
      reads: 0,
      programs: 0,
      erases: 0,
    }
  }
}

impl LatencyPal {
  #[must_use]
  pub fn new(read_ns: u64, program_ns: u64, erase_ns: u64) -> Self {
    Self {
      read_ns,
      program_ns,
      erase_ns,
      ..Self::default()
    }
  }

  /// Zero-latency variant for pure bookkeeping tests.
  /// 零延迟变体，用于纯逻辑测试。
  #[must_use]
  pub fn zero() -> Self {
    Self::new(0, 0, 0)
  }
}

impl Pal for LatencyPal {
  fn read(&mut self, _block: u32, _page: u32, _map: &SubUnits, tick: &mut u64) {
    self.reads += 1;
    *tick += self.read_ns;
  }

  fn write(&mut self, _block: u32, _page: u32, _map: &SubUnits, tick: &mut u64) {
    self.programs += 1;
    *tick += self.program_ns;
  }

  fn erase(&mut self, _block: u32, tick: &mut u64) {
    self.erases += 1;
    *tick += self.erase_ns;
  }
}

/// DRAM model charging a fixed cost per access.
/// 每次访问收取固定代价的 DRAM 模型。
#[derive(Clone, Debug)]
pub struct LatencyDram {
  pub access_ns: u64,
  pub accesses: u64,
}

impl Default for LatencyDram {
  fn default() -> Self {
    Self {
      access_ns: 50,
      accesses: 0,
    }
  }
}

impl LatencyDram {
  #[must_use]
  pub fn zero() -> Self {
    Self {
      access_ns: 0,
      accesses: 0,
    }
  }
}

impl Dram for LatencyDram {
  fn read(&mut self, _bytes: u64, tick: &mut u64) {
    self.accesses += 1;
    *tick += self.access_ns;
  }

  fn write(&mut self, _bytes: u64, tick: &mut u64) {
    self.accesses += 1;
    *tick += self.access_ns;
  }
}

/// CPU latency charged by the mapping engine itself, per entry point.
/// 映射引擎自身按入口收取的 CPU 延迟。
#[derive(Clone, Copy, Debug)]
pub struct CpuLatency {
  pub read_ns: u64,
  pub write_ns: u64,
  pub trim_ns: u64,
  pub format_ns: u64,
  pub read_internal_ns: u64,
  pub write_internal_ns: u64,
  pub trim_internal_ns: u64,
  pub erase_internal_ns: u64,
  pub select_victim_ns: u64,
}

impl Default for CpuLatency {
  fn default() -> Self {
    Self {
      read_ns: 500,
      write_ns: 500,
      trim_ns: 400,
      format_ns: 1_000,
      read_internal_ns: 300,
      write_internal_ns: 300,
      trim_internal_ns: 300,
      erase_internal_ns: 300,
      select_victim_ns: 600,
    }
  }
}

impl CpuLatency {
  /// Zero-latency variant for pure bookkeeping tests.
  #[must_use]
  pub fn zero() -> Self {
    Self {
      read_ns: 0,
      write_ns: 0,
      trim_ns: 0,
      format_ns: 0,
      read_internal_ns: 0,
      write_internal_ns: 0,
      trim_internal_ns: 0,
      erase_internal_ns: 0,
      select_victim_ns: 0,
    }
  }
}
