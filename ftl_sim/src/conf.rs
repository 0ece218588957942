//! Typed option registry for the simulator.
//! 模拟器的类型化选项注册表。
//!
//! Option names follow the historical key set consumed by the outer
//! simulator; `set` accepts `(name, value)` string pairs, everything else
//! reads the typed fields directly. File parsing stays outside this crate.
//! 选项名沿用外层模拟器消费的历史键集合；`set` 接受 `(名称, 值)`
//! 字符串对，其余部分直接读取类型化字段。文件解析不在本 crate 内。

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Warmup filling mode: how the device is pre-filled and pre-invalidated.
/// 预热填充模式：设备如何被预填充与预失效。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillingMode {
  /// Sequential fill, sequential invalidation.
  SeqSeq,
  /// Sequential fill, random invalidation.
  SeqRand,
  /// Random fill, random invalidation.
  RandRand,
}

/// How many blocks one GC pass reclaims.
/// 一次 GC 回收多少块。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GcMode {
  /// A fixed number of victims (`reclaim_blocks`).
  FixedN,
  /// Up to `physical_blocks * reclaim_threshold - free_blocks` victims.
  UpToRatio,
}

/// Victim scoring policy.
/// 牺牲块评分策略。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictPolicy {
  Greedy,
  CostBenefit,
  Random,
  DChoice,
}

/// Which GC policy drives reclamation.
/// 由哪种 GC 策略驱动回收。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GcPolicyKind {
  Default,
  LazyRtgc,
  RlBaseline,
  RlIntensive,
  RlAggressive,
}

/// Lazy-RTGC options.
#[derive(Clone, Debug)]
pub struct LazyConf {
  /// Free-block threshold that triggers a bounded GC step.
  pub threshold: u32,
  /// Page-copy budget per GC invocation.
  pub max_page_copies: u32,
  pub metrics_enable: bool,
}

/// Options shared by the three RL policies.
/// 三个 RL 策略共享的选项。
#[derive(Clone, Debug)]
pub struct RlConf {
  /// Free-block threshold for normal GC (TGC).
  pub tgc_threshold: u32,
  /// Free-block threshold for intensive GC (TIGC).
  pub tigc_threshold: u32,
  /// Cap on pages copied per action.
  pub max_page_copies: u32,
  /// Learning rate α.
  pub learning_rate: f32,
  /// Discount factor γ.
  pub discount_factor: f32,
  /// Initial exploration rate ε, must be in (0, 1].
  pub init_epsilon: f32,
  /// Size of the discrete action space.
  pub num_actions: u32,
  pub debug_enable: bool,
  pub metrics_enable: bool,
}

/// Extra options of the aggressive RL policy.
/// 激进 RL 策略的附加选项。
#[derive(Clone, Debug)]
pub struct AggressiveConf {
  /// Early-GC free-block threshold (TAGC), must be above TGC.
  pub tagc_threshold: u32,
  /// Action clamp while between TGC and TAGC.
  pub max_gc_ops: u32,
  pub read_triggered_gc: bool,
  pub debug_enable: bool,
  pub metrics_enable: bool,
}

/// Full simulator configuration with the historical defaults.
/// 带历史默认值的完整模拟器配置。
#[derive(Clone, Debug)]
pub struct FtlConf {
  // Device geometry.
  // 设备几何参数。
  pub physical_blocks: u32,
  pub pages_in_block: u32,
  pub subunits_in_page: u32,
  /// Parallel allocation streams (pages needed for max device parallelism).
  /// 并行分配流数量（达到设备最大并行所需的页数）。
  pub parallelism: u32,

  pub over_provision: f32,
  pub gc_threshold: f32,
  pub bad_block_threshold: u32,

  pub filling_mode: FillingMode,
  pub fill_ratio: f32,
  pub invalid_ratio: f32,

  pub gc_mode: GcMode,
  pub reclaim_blocks: u32,
  pub reclaim_threshold: f32,
  pub evict_policy: EvictPolicy,
  pub d_choice_param: u32,
  pub random_io_tweak: bool,

  pub policy: GcPolicyKind,
  pub lazy: LazyConf,
  pub rl: RlConf,
  pub aggressive: AggressiveConf,

  /// Directory for per-policy metrics/summary files; `None` disables them.
  /// 每策略指标/汇总文件的目录；`None` 表示禁用。
  pub metrics_dir: Option<PathBuf>,
  /// Seed for the filler, victim-random and RL-exploration RNGs.
  /// 填充、随机选牺牲块与 RL 探索三个 RNG 的种子。
  pub seed: u64,
}

impl Default for FtlConf {
  fn default() -> Self {
    Self {
      physical_blocks: 1024,
      pages_in_block: 64,
      subunits_in_page: 1,
      parallelism: 4,
      over_provision: 0.25,
      gc_threshold: 0.05,
      bad_block_threshold: 100_000,
      filling_mode: FillingMode::SeqSeq,
      fill_ratio: 0.0,
      invalid_ratio: 0.0,
      gc_mode: GcMode::FixedN,
      reclaim_blocks: 1,
      reclaim_threshold: 0.1,
      evict_policy: EvictPolicy::Greedy,
      d_choice_param: 3,
      random_io_tweak: true,
      policy: GcPolicyKind::Default,
      lazy: LazyConf {
        threshold: 10,
        max_page_copies: 3,
        metrics_enable: true,
      },
      rl: RlConf {
        tgc_threshold: 10,
        tigc_threshold: 5,
        max_page_copies: 10,
        learning_rate: 0.3,
        discount_factor: 0.8,
        init_epsilon: 0.8,
        num_actions: 10,
        debug_enable: false,
        metrics_enable: true,
      },
      aggressive: AggressiveConf {
        tagc_threshold: 100,
        max_gc_ops: 2,
        read_triggered_gc: true,
        debug_enable: false,
        metrics_enable: true,
      },
      metrics_dir: None,
      seed: 0,
    }
  }
}

impl FtlConf {
  /// Logical blocks visible to the host after over-provisioning.
  /// 超额配置之后主机可见的逻辑块数。
  #[inline]
  #[must_use]
  pub fn logical_blocks(&self) -> u32 {
    (self.physical_blocks as f32 * (1.0 - self.over_provision)) as u32
  }

  #[inline]
  #[must_use]
  pub fn logical_pages(&self) -> u64 {
    self.logical_blocks() as u64 * self.pages_in_block as u64
  }

  /// Apply one `(name, value)` pair. Returns `false` for unknown names.
  /// 应用一个 `(名称, 值)` 对。未知名称返回 `false`。
  pub fn set(&mut self, name: &str, value: &str) -> Result<bool> {
    let bad = |_| Error::Config("malformed option value");
    let bad_f = |_| Error::Config("malformed option value");

    match name {
      "MappingMode" => {
        if value.parse::<u32>().map_err(bad)? != 0 {
          return Err(Error::Config("only page mapping is supported"));
        }
      }
      "OverProvisioningRatio" => self.over_provision = value.parse().map_err(bad_f)?,
      "GCThreshold" => self.gc_threshold = value.parse().map_err(bad_f)?,
      "EraseThreshold" => self.bad_block_threshold = value.parse().map_err(bad)?,
      "FillingMode" => {
        self.filling_mode = match value.parse::<u32>().map_err(bad)? {
          0 => FillingMode::SeqSeq,
          1 => FillingMode::SeqRand,
          2 => FillingMode::RandRand,
          _ => return Err(Error::Config("unknown FillingMode")),
        }
      }
      "FillRatio" => self.fill_ratio = value.parse().map_err(bad_f)?,
      "InvalidPageRatio" => self.invalid_ratio = value.parse().map_err(bad_f)?,
      "GCMode" => {
        self.gc_mode = match value.parse::<u32>().map_err(bad)? {
          0 => GcMode::FixedN,
          1 => GcMode::UpToRatio,
          _ => return Err(Error::Config("unknown GCMode")),
        }
      }
      "GCReclaimBlocks" => self.reclaim_blocks = value.parse().map_err(bad)?,
      "GCReclaimThreshold" => self.reclaim_threshold = value.parse().map_err(bad_f)?,
      "EvictPolicy" => {
        self.evict_policy = match value.parse::<u32>().map_err(bad)? {
          0 => EvictPolicy::Greedy,
          1 => EvictPolicy::CostBenefit,
          2 => EvictPolicy::Random,
          3 => EvictPolicy::DChoice,
          _ => return Err(Error::Config("unknown EvictPolicy")),
        }
      }
      "DChoiceParam" => self.d_choice_param = value.parse().map_err(bad)?,
      "EnableRandomIOTweak" => self.random_io_tweak = parse_bool(value)?,
      "GCPolicy" => {
        self.policy = match value.parse::<u32>().map_err(bad)? {
          0 => GcPolicyKind::Default,
          1 => GcPolicyKind::LazyRtgc,
          2 => GcPolicyKind::RlBaseline,
          3 => GcPolicyKind::RlIntensive,
          4 => GcPolicyKind::RlAggressive,
          _ => return Err(Error::Config("unknown GCPolicy")),
        }
      }
      "LazyRTGCThreshold" => self.lazy.threshold = value.parse().map_err(bad)?,
      "LazyRTGCMaxPageCopies" => self.lazy.max_page_copies = value.parse().map_err(bad)?,
      "LazyRTGCMetricsEnable" => self.lazy.metrics_enable = parse_bool(value)?,
      "RLGCTgcThreshold" => self.rl.tgc_threshold = value.parse().map_err(bad)?,
      "RLGCTigcThreshold" => self.rl.tigc_threshold = value.parse().map_err(bad)?,
      "RLGCMaxPageCopies" => self.rl.max_page_copies = value.parse().map_err(bad)?,
      "RLGCLearningRate" => self.rl.learning_rate = value.parse().map_err(bad_f)?,
      "RLGCDiscountFactor" => self.rl.discount_factor = value.parse().map_err(bad_f)?,
      "RLGCInitEpsilon" => self.rl.init_epsilon = value.parse().map_err(bad_f)?,
      "RLGCNumActions" => self.rl.num_actions = value.parse().map_err(bad)?,
      "RLGCDebugEnable" => self.rl.debug_enable = parse_bool(value)?,
      "RLGCMetricsEnable" => self.rl.metrics_enable = parse_bool(value)?,
      "RLAggressiveTAGCThreshold" => self.aggressive.tagc_threshold = value.parse().map_err(bad)?,
      "RLAggressiveMaxGCOps" => self.aggressive.max_gc_ops = value.parse().map_err(bad)?,
      "RLAggressiveReadTriggeredGC" => self.aggressive.read_triggered_gc = parse_bool(value)?,
      "RLAggressiveDebugEnable" => self.aggressive.debug_enable = parse_bool(value)?,
      "RLAggressiveMetricsEnable" => self.aggressive.metrics_enable = parse_bool(value)?,
      _ => return Ok(false),
    }

    Ok(true)
  }

  /// Reject inconsistent configurations before any block is touched.
  /// 在触碰任何块之前拒绝不一致的配置。
  pub fn validate(&self) -> Result<()> {
    if self.physical_blocks == 0 || self.pages_in_block == 0 {
      return Err(Error::Config("empty device geometry"));
    }

    if self.subunits_in_page == 0 || self.subunits_in_page > 64 {
      return Err(Error::Config("subunits_in_page must be in 1..=64"));
    }

    if self.parallelism == 0 || self.parallelism >= self.physical_blocks {
      return Err(Error::Config("parallelism must be in 1..physical_blocks"));
    }

    if !(0.0..1.0).contains(&self.over_provision) {
      return Err(Error::Config("OverProvisioningRatio out of [0, 1)"));
    }

    if self.gc_mode == GcMode::FixedN && self.reclaim_blocks == 0 {
      return Err(Error::Config("GCReclaimBlocks must be nonzero in fixed-n mode"));
    }

    if self.gc_mode == GcMode::UpToRatio && self.reclaim_threshold < self.gc_threshold {
      return Err(Error::Config("GCReclaimThreshold below GCThreshold"));
    }

    if !(0.0..=1.0).contains(&self.fill_ratio) {
      return Err(Error::Config("FillRatio out of [0, 1]"));
    }

    if !(0.0..=1.0).contains(&self.invalid_ratio) {
      return Err(Error::Config("InvalidPageRatio out of [0, 1]"));
    }

    if self.rl.num_actions == 0 {
      return Err(Error::Config("RLGCNumActions must be nonzero"));
    }

    if self.policy == GcPolicyKind::RlAggressive
      && self.aggressive.tagc_threshold <= self.rl.tgc_threshold
    {
      return Err(Error::Config("TAGC threshold must be above TGC threshold"));
    }

    Ok(())
  }
}

fn parse_bool(value: &str) -> Result<bool> {
  match value {
    "1" | "true" | "True" => Ok(true),
    "0" | "false" | "False" => Ok(false),
    _ => Err(Error::Config("malformed boolean option")),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_validate() {
    FtlConf::default().validate().unwrap();
  }

  #[test]
  fn set_by_name_round_trips() {
    let mut conf = FtlConf::default();
    assert!(conf.set("GCPolicy", "4").unwrap());
    assert_eq!(conf.policy, GcPolicyKind::RlAggressive);
    assert!(conf.set("LazyRTGCMaxPageCopies", "5").unwrap());
    assert_eq!(conf.lazy.max_page_copies, 5);
    assert!(!conf.set("NoSuchOption", "1").unwrap());
  }

  #[test]
  fn zero_reclaim_blocks_rejected_in_fixed_mode() {
    let mut conf = FtlConf::default();
    conf.reclaim_blocks = 0;
    assert!(conf.validate().is_err());
  }

  #[test]
  fn reclaim_threshold_below_gc_threshold_rejected() {
    let mut conf = FtlConf::default();
    conf.gc_mode = GcMode::UpToRatio;
    conf.reclaim_threshold = 0.01;
    assert!(conf.validate().is_err());
  }

  #[test]
  fn out_of_range_ratios_rejected() {
    let mut conf = FtlConf::default();
    conf.fill_ratio = 1.5;
    assert!(conf.validate().is_err());

    let mut conf = FtlConf::default();
    conf.invalid_ratio = -0.1;
    assert!(conf.validate().is_err());
  }

  #[test]
  fn aggressive_requires_tagc_above_tgc() {
    let mut conf = FtlConf::default();
    conf.policy = GcPolicyKind::RlAggressive;
    conf.aggressive.tagc_threshold = conf.rl.tgc_threshold;
    assert!(conf.validate().is_err());
  }
}
