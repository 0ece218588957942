//! Pluggable GC policies behind one trait.
//! 统一 trait 背后的可插拔 GC 策略。
//!
//! Policies never hold a pointer back into the engine: free-block counts
//! and the current tick arrive as call arguments, responses and GC
//! outcomes come back through the record hooks.
//! 策略不持有指回引擎的指针：空闲块数与当前 tick 作为调用参数传入，
//! 响应与 GC 结果经由记录钩子返回。

pub mod aggressive;
pub mod default;
pub mod lazy;
pub mod rl;

use crate::conf::{FtlConf, GcPolicyKind};
use crate::error::Result;

pub use aggressive::RlAggressiveGc;
pub use default::DefaultGc;
pub use lazy::LazyRtgc;
pub use rl::{RlBaselineGc, RlIntensiveGc};

/// Why a GC pass was requested. `Bulk` drains every victim without a copy
/// budget; the other modes run the bounded single-victim path.
/// 发起 GC 的原因。`Bulk` 无预算地清空所有牺牲块；其余模式走有界的
/// 单牺牲块路径。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
  Bulk,
  Normal,
  Intensive,
  Early,
}

/// Counters every policy exposes to the outer simulator.
/// 每个策略向外层模拟器暴露的计数器。
#[derive(Clone, Copy, Debug, Default)]
pub struct PolicyStats {
  pub gc_invocations: u64,
  pub total_page_copies: u64,
  pub valid_page_copies: u64,
  pub intensive_gc: u64,
  pub early_gc: u64,
  pub read_triggered_gc: u64,
  pub erases: u64,
  pub avg_reward: f32,
  pub reward_count: u64,
  pub avg_response_ns: f64,
}

/// Common capability set of the five GC policies.
/// 五种 GC 策略的公共能力集。
pub trait GcPolicy {
  fn name(&self) -> &'static str;

  /// Decide whether this I/O completion should start a GC pass.
  /// 判断此次 I/O 完成后是否应启动一次 GC。
  fn should_trigger(&mut self, free_blocks: u32, now: u64) -> Option<Trigger>;

  /// Read-completion side trigger; only the aggressive policy uses it.
  /// 读完成侧触发；仅激进策略使用。
  fn read_trigger(&mut self, free_blocks: u32, now: u64) -> bool {
    let _ = (free_blocks, now);
    false
  }

  /// Page-copy budget for a non-bulk trigger.
  /// 非 Bulk 触发的页复制预算。
  fn action(&mut self, free_blocks: u32, trigger: Trigger) -> u32;

  /// Response-time feedback: metrics ring, reward thresholds and the RL
  /// pending Q-update all hang off this call.
  /// 响应时间反馈：指标环、奖励阈值与 RL 的待定 Q 更新都挂在此调用上。
  fn on_response(&mut self, response_ns: u64, now: u64);

  /// One finished GC pass: superpage copies plus sub-unit copies.
  /// 一次完成的 GC：超页复制数与子单元复制数。
  fn record_gc_invocation(&mut self, copied_pages: u32, valid_copies: u32);

  fn record_block_erase(&mut self);

  fn stats(&self) -> PolicyStats;

  /// Flush the final metrics row, the summary file and any debug dumps.
  /// 落盘最后一行指标、汇总文件以及调试导出。
  fn finalize(&mut self);
}

/// Build the policy selected by the configuration.
/// 构建配置所选的策略。
pub fn build(conf: &FtlConf) -> Result<Box<dyn GcPolicy>> {
  Ok(match conf.policy {
    GcPolicyKind::Default => Box::new(DefaultGc::new(conf)),
    GcPolicyKind::LazyRtgc => Box::new(LazyRtgc::new(conf)),
    GcPolicyKind::RlBaseline => Box::new(RlBaselineGc::new(conf)),
    GcPolicyKind::RlIntensive => Box::new(RlIntensiveGc::new(conf)),
    GcPolicyKind::RlAggressive => Box::new(RlAggressiveGc::new(conf)),
  })
}
