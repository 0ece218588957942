//! Replay one synthetic workload against every GC policy and compare
//! tail latency.
//! 用同一合成负载重放每种 GC 策略并比较尾延迟。

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use ftl_sim::conf::{FtlConf, GcPolicyKind};
use ftl_sim::pal::{LatencyDram, LatencyPal};
use ftl_sim::{Ftl, Req};
use hdrhistogram::Histogram;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Zipf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// Logical I/Os to replay per policy.
  #[arg(short, long, default_value_t = 200_000)]
  ops: u64,

  /// Access distribution: uniform | zipf
  #[arg(short, long, default_value = "uniform")]
  dist: String,

  /// Read fraction of the workload, in [0, 1].
  #[arg(short, long, default_value_t = 0.3)]
  reads: f64,

  /// Physical erase blocks.
  #[arg(long, default_value_t = 1024)]
  blocks: u32,

  /// Pages per block.
  #[arg(long, default_value_t = 64)]
  pages: u32,

  /// RNG seed.
  #[arg(long, default_value_t = 42)]
  seed: u64,

  /// Directory for per-policy metrics files (omit to disable).
  #[arg(long)]
  out: Option<PathBuf>,
}

const POLICIES: [(&str, GcPolicyKind); 5] = [
  ("default", GcPolicyKind::Default),
  ("lazy-rtgc", GcPolicyKind::LazyRtgc),
  ("rl-baseline", GcPolicyKind::RlBaseline),
  ("rl-intensive", GcPolicyKind::RlIntensive),
  ("rl-aggressive", GcPolicyKind::RlAggressive),
];

fn main() -> Result<()> {
  let args = Args::parse();

  if let Some(dir) = &args.out {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {:?}", dir))?;
  }

  for (name, kind) in POLICIES {
    replay(name, kind, &args)?;
  }

  Ok(())
}

fn replay(name: &str, kind: GcPolicyKind, args: &Args) -> Result<()> {
  let mut conf = FtlConf::default();
  conf.physical_blocks = args.blocks;
  conf.pages_in_block = args.pages;
  conf.subunits_in_page = 1;
  conf.parallelism = 4;
  conf.policy = kind;
  conf.seed = args.seed;
  conf.fill_ratio = 0.5;
  conf.invalid_ratio = 0.2;
  conf.metrics_dir = args.out.clone();

  let mut ftl = Ftl::new(conf.clone(), LatencyPal::default(), LatencyDram::default())
    .with_context(|| format!("building engine for {}", name))?;

  println!("Initializing {} ({} blocks, {} pages/block)...", name, args.blocks, args.pages);
  ftl.initialize().context("warmup fill")?;

  let space = conf.logical_pages();
  let mut rng = StdRng::seed_from_u64(args.seed);
  let zipf = Zipf::new(space as f64, 1.07).expect("zipf parameters");

  let mut hist = Histogram::<u64>::new_with_bounds(1, 10_000_000_000, 3).expect("histogram bounds");
  let mut tick = 0u64;
  let wall = Instant::now();

  for _ in 0..args.ops {
    let lpn = if args.dist == "zipf" {
      (zipf.sample(&mut rng) as u64).saturating_sub(1)
    } else {
      rng.random_range(0..space)
    };

    let start = tick;
    if rng.random::<f64>() < args.reads {
      ftl.read(&Req::full(lpn, 1), &mut tick).context("read")?;
    } else {
      ftl.write(&Req::full(lpn, 1), &mut tick).context("write")?;
    }
    hist.saturating_record((tick - start).max(1));

    // Bursty arrivals: mostly back-to-back, sometimes idle.
    // 突发到达：大多背靠背，偶尔空闲。
    if rng.random::<f64>() < 0.2 {
      tick += rng.random_range(10_000..500_000);
    }
  }

  ftl.finalize();

  let stats = ftl.stats();
  let policy = ftl.policy_stats();
  println!(
    "{{\"type\": \"replay_summary\", \"policy\": \"{}\", \"ops\": {}, \"wall_ms\": {}}}",
    name,
    args.ops,
    wall.elapsed().as_millis()
  );
  println!(
    "{{\"type\": \"latency\", \"policy\": \"{}\", \"p50_ns\": {}, \"p99_ns\": {}, \"p9999_ns\": {}, \"max_ns\": {}}}",
    name,
    hist.value_at_quantile(0.50),
    hist.value_at_quantile(0.99),
    hist.value_at_quantile(0.9999),
    hist.max()
  );
  println!(
    "{{\"type\": \"gc\", \"policy\": \"{}\", \"engine_gc\": {}, \"reclaimed\": {}, \"page_copies\": {}, \"invocations\": {}, \"intensive\": {}, \"early\": {}, \"read_triggered\": {}, \"erases\": {}, \"avg_reward\": {:.4}, \"wear_leveling\": {:.4}}}",
    name,
    stats.gc_count,
    stats.reclaimed_blocks,
    stats.page_copies,
    policy.gc_invocations,
    policy.intensive_gc,
    policy.early_gc,
    policy.read_triggered_gc,
    policy.erases,
    policy.avg_reward,
    ftl.wear_leveling()
  );

  Ok(())
}
