//! Warmup filler: pre-fills the device to a target valid/invalid page mix
//! before measurement starts.
//! 预热填充：在测量开始前把设备预填充到目标的有效/失效页比例。

use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};

use crate::conf::FillingMode;
use crate::error::Result;
use crate::pal::{Dram, Pal};
use crate::Ftl;

impl<P: Pal, D: Dram> Ftl<P, D> {
  /// Fill `fill_ratio` of the logical pages, then invalidate
  /// `invalid_ratio` by overwriting, per the configured filling mode.
  /// Warmup writes bypass PAL and metrics and must never force a GC; the
  /// invalidation target is clamped to the GC headroom.
  /// 按配置的填充模式先填充 `fill_ratio` 的逻辑页，再通过覆盖写使
  /// `invalid_ratio` 失效。预热写绕过 PAL 与指标且绝不允许触发 GC；
  /// 失效目标被钳制在 GC 余量之内。
  pub fn initialize(&mut self) -> Result<()> {
    let conf = self.conf().clone();
    let total = conf.logical_pages();

    let to_fill = (total as f64 * conf.fill_ratio as f64) as u64;
    let mut to_invalidate = (total as f64 * conf.invalid_ratio as f64) as u64;

    // Pages writable before the free pool would sink below the GC
    // threshold.
    // 在空闲池跌破 GC 阈值之前可写入的页数。
    let headroom_blocks =
      (conf.physical_blocks as f64 * (1.0 - conf.gc_threshold as f64)) as u64;
    let headroom = conf.pages_in_block as u64
      * headroom_blocks.saturating_sub(conf.parallelism as u64);

    if to_fill + to_invalidate > headroom {
      warn!("ftl: too high filling ratio, adjusting InvalidPageRatio");
      to_invalidate = headroom.saturating_sub(to_fill);
    }

    info!("ftl: initialization started");
    info!("ftl: total logical pages: {}", total);
    info!(
      "ftl: pages to fill: {} ({:.2} %)",
      to_fill,
      to_fill as f64 * 100.0 / total as f64
    );
    info!(
      "ftl: invalidated pages to create: {} ({:.2} %)",
      to_invalidate,
      to_invalidate as f64 * 100.0 / total as f64
    );

    let mut rng = StdRng::seed_from_u64(conf.seed.wrapping_add(3));
    let mut tick;

    // Step 1: filling.
    // 第一步：填充。
    match conf.filling_mode {
      FillingMode::SeqSeq | FillingMode::SeqRand => {
        for lpn in 0..to_fill {
          tick = 0;
          self.warm_write(lpn, &mut tick)?;
        }
      }
      FillingMode::RandRand => {
        let dist = Uniform::new(0, total).expect("nonempty logical space");
        for _ in 0..to_fill {
          tick = 0;
          self.warm_write(dist.sample(&mut rng), &mut tick)?;
        }
      }
    }

    // Step 2: invalidating by overwrite.
    // 第二步：通过覆盖写制造失效页。
    match conf.filling_mode {
      FillingMode::SeqSeq => {
        for lpn in 0..to_invalidate {
          tick = 0;
          self.warm_write(lpn, &mut tick)?;
        }
      }
      FillingMode::SeqRand => {
        // Step 1 was sequential, so restricting the LPN range creates the
        // exact number of invalid pages.
        // 第一步是顺序填充，限制 LPN 范围即可得到精确的失效页数。
        if to_fill > 0 {
          let dist = Uniform::new(0, to_fill).expect("nonempty fill range");
          for _ in 0..to_invalidate {
            tick = 0;
            self.warm_write(dist.sample(&mut rng), &mut tick)?;
          }
        }
      }
      FillingMode::RandRand => {
        let dist = Uniform::new(0, total).expect("nonempty logical space");
        for _ in 0..to_invalidate {
          tick = 0;
          self.warm_write(dist.sample(&mut rng), &mut tick)?;
        }
      }
    }

    let (valid, invalid) = self.total_pages();
    info!("ftl: filling finished, page status:");
    info!(
      "ftl:   valid physical pages: {} (target {}, error {})",
      valid,
      to_fill,
      valid as i64 - to_fill as i64
    );
    info!("ftl:   invalid physical pages: {} (target {})", invalid, to_invalidate);
    info!("ftl: initialization finished");

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use crate::conf::{FillingMode, FtlConf};
  use crate::pal::{CpuLatency, LatencyDram, LatencyPal};
  use crate::Ftl;

  fn engine(conf: FtlConf) -> Ftl<LatencyPal, LatencyDram> {
    let mut ftl = Ftl::new(conf, LatencyPal::zero(), LatencyDram::zero()).unwrap();
    ftl.set_cpu_latency(CpuLatency::zero());
    ftl
  }

  #[test]
  fn sequential_fill_hits_the_targets() {
    let mut conf = FtlConf::default();
    conf.physical_blocks = 64;
    conf.pages_in_block = 16;
    conf.parallelism = 2;
    conf.fill_ratio = 0.5;
    conf.invalid_ratio = 0.25;
    conf.filling_mode = FillingMode::SeqSeq;

    let total = conf.logical_pages();
    let mut ftl = engine(conf);
    ftl.initialize().unwrap();

    let (valid, invalid) = ftl.total_pages();
    assert_eq!(valid, total / 2);
    assert_eq!(invalid, total / 4);
    ftl.check_consistency().unwrap();
  }

  #[test]
  fn seq_fill_random_invalidation_is_exact() {
    let mut conf = FtlConf::default();
    conf.physical_blocks = 64;
    conf.pages_in_block = 16;
    conf.parallelism = 2;
    conf.fill_ratio = 0.5;
    conf.invalid_ratio = 0.2;
    conf.filling_mode = FillingMode::SeqRand;

    let total = conf.logical_pages();
    let mut ftl = engine(conf);
    ftl.initialize().unwrap();

    let (valid, invalid) = ftl.total_pages();
    // Overwrites of already-overwritten LPNs still invalidate one page each.
    assert_eq!(valid, total / 2);
    assert_eq!(invalid, total / 5);
    ftl.check_consistency().unwrap();
  }

  #[test]
  fn excessive_ratios_are_clamped() {
    let mut conf = FtlConf::default();
    conf.physical_blocks = 32;
    conf.pages_in_block = 8;
    conf.parallelism = 2;
    conf.fill_ratio = 0.9;
    conf.invalid_ratio = 0.9;
    conf.filling_mode = FillingMode::SeqSeq;

    let mut ftl = engine(conf);
    // Must clamp instead of forcing GC during warmup.
    ftl.initialize().unwrap();
    ftl.check_consistency().unwrap();
  }
}
