//! End-to-end scenarios driving the full engine.

use ftl_sim::conf::{FillingMode, GcPolicyKind};
use ftl_sim::pal::{CpuLatency, LatencyDram, LatencyPal};
use ftl_sim::{Ftl, FtlConf, Req};
use hdrhistogram::Histogram;

fn small_conf(policy: GcPolicyKind) -> FtlConf {
  let mut conf = FtlConf::default();
  conf.physical_blocks = 64;
  conf.pages_in_block = 8;
  conf.subunits_in_page = 1;
  conf.parallelism = 2;
  conf.policy = policy;
  conf.seed = 42;
  conf
}

fn quiet_engine(conf: FtlConf) -> Ftl<LatencyPal, LatencyDram> {
  let mut ftl = Ftl::new(conf, LatencyPal::zero(), LatencyDram::zero()).unwrap();
  ftl.set_cpu_latency(CpuLatency::zero());
  ftl
}

/// Drive sequential writes at a fixed tick until the free pool shrinks to
/// `target` blocks. Zero inter-request intervals keep RL policies quiet.
fn drain_to(ftl: &mut Ftl<LatencyPal, LatencyDram>, tick: &mut u64, target: u32) {
  let mut lpn = 0u64;
  while ftl.free_blocks() > target {
    ftl.write(&Req::full(lpn, 1), tick).unwrap();
    lpn += 1;
  }
}

#[test]
fn cold_fill_then_overwrite_under_default_policy() {
  let mut conf = FtlConf::default();
  conf.physical_blocks = 256;
  conf.pages_in_block = 16;
  conf.subunits_in_page = 1;
  conf.parallelism = 2;
  conf.fill_ratio = 0.5;
  conf.invalid_ratio = 0.25;
  conf.filling_mode = FillingMode::SeqSeq;
  conf.gc_threshold = 0.05;
  conf.reclaim_blocks = 1;

  let total = conf.logical_pages();
  let mut ftl = quiet_engine(conf);
  ftl.initialize().unwrap();

  let (valid, invalid) = ftl.total_pages();
  assert_eq!(valid, total / 2);
  assert_eq!(invalid, total / 4);
  assert_eq!(ftl.stats().gc_count, 0);

  // Overwrite traffic shrinks the pool until on-demand GC has to run.
  let mut tick = 0;
  let mut lpn = 0u64;
  while ftl.stats().gc_count == 0 {
    ftl.write(&Req::full(lpn % total, 1), &mut tick).unwrap();
    lpn += 1;
    tick += 1_000;
    assert!(lpn < 200_000, "GC never triggered");
  }

  assert!(ftl.stats().gc_count >= 1);
  assert!(ftl.stats().reclaimed_blocks >= 1);
  ftl.check_consistency().unwrap();
}

#[test]
fn lazy_rtgc_bounds_per_write_work() {
  let mut conf = small_conf(GcPolicyKind::LazyRtgc);
  conf.physical_blocks = 64;
  conf.pages_in_block = 16;
  conf.lazy.threshold = 10;
  conf.lazy.max_page_copies = 3;

  let pal = LatencyPal::default();
  let cpu = CpuLatency::default();
  let mut ftl = Ftl::new(conf, pal.clone(), LatencyDram::zero()).unwrap();
  ftl.set_cpu_latency(cpu);

  // Worst case for one write: the foreground program, a GC pass copying
  // the full budget (read + program each) and one erase, plus the engine
  // CPU charges along that path.
  let budget = 3u64;
  let bound = (budget + 1) * pal.program_ns
    + budget * pal.read_ns
    + pal.erase_ns
    + cpu.write_ns
    + cpu.write_internal_ns
    + cpu.select_victim_ns
    + cpu.erase_internal_ns;

  let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
  let mut rng = fastrand::Rng::with_seed(7);
  let mut tick = 0u64;
  let mut max_delta = 0u64;

  for _ in 0..20_000 {
    let lpn = rng.u64(0..384);
    let start = tick;
    ftl.write(&Req::full(lpn, 1), &mut tick).unwrap();

    let delta = tick - start;
    max_delta = max_delta.max(delta);
    hist.record(delta.max(1)).unwrap();
    tick += 10_000;
  }

  assert!(ftl.policy_stats().gc_invocations > 0);
  assert!(
    max_delta <= bound,
    "write took {} ns, bound {} ns",
    max_delta,
    bound
  );
  assert!(hist.value_at_quantile(0.9999) <= bound);
  ftl.check_consistency().unwrap();
}

#[test]
fn aggressive_early_gc_fires_between_tgc_and_tagc() {
  let mut conf = small_conf(GcPolicyKind::RlAggressive);
  conf.rl.tgc_threshold = 10;
  conf.aggressive.tagc_threshold = 100;
  conf.aggressive.max_gc_ops = 2;
  conf.aggressive.read_triggered_gc = false;

  let mut ftl = quiet_engine(conf);
  let mut tick = 1_000;

  drain_to(&mut ftl, &mut tick, 50);
  assert_eq!(ftl.policy_stats().early_gc, 0);
  assert_eq!(ftl.policy_stats().gc_invocations, 0);

  // A write after real idle time lands in the early-GC band.
  tick += 200_000;
  ftl.write(&Req::full(9_999, 1), &mut tick).unwrap();

  let stats = ftl.policy_stats();
  assert_eq!(stats.early_gc, 1);
  assert_eq!(stats.gc_invocations, 1);
  assert!(stats.total_page_copies <= 2);
  ftl.check_consistency().unwrap();
}

#[test]
fn read_triggered_gc_fires_once_when_enabled() {
  let mut conf = small_conf(GcPolicyKind::RlAggressive);
  conf.rl.tgc_threshold = 10;
  conf.aggressive.read_triggered_gc = true;

  let mut ftl = quiet_engine(conf);
  let mut tick = 1_000;
  drain_to(&mut ftl, &mut tick, 14);
  assert_eq!(ftl.policy_stats().gc_invocations, 0);

  // Idle long enough that the current-interval bin clears the idle gate.
  tick += 50_000;
  ftl.read(&Req::full(0, 1), &mut tick).unwrap();

  let stats = ftl.policy_stats();
  assert_eq!(stats.read_triggered_gc, 1);
  assert_eq!(stats.gc_invocations, 1);
  ftl.check_consistency().unwrap();
}

#[test]
fn read_triggered_gc_stays_quiet_when_disabled() {
  let mut conf = small_conf(GcPolicyKind::RlAggressive);
  conf.rl.tgc_threshold = 10;
  conf.aggressive.read_triggered_gc = false;

  let mut ftl = quiet_engine(conf);
  let mut tick = 1_000;
  drain_to(&mut ftl, &mut tick, 14);

  tick += 50_000;
  ftl.read(&Req::full(0, 1), &mut tick).unwrap();

  let stats = ftl.policy_stats();
  assert_eq!(stats.read_triggered_gc, 0);
  assert_eq!(stats.gc_invocations, 0);
}

#[test]
fn wear_stays_level_under_random_writes() {
  let mut conf = small_conf(GcPolicyKind::LazyRtgc);
  conf.physical_blocks = 64;
  conf.pages_in_block = 16;

  let mut ftl = quiet_engine(conf);
  let mut rng = fastrand::Rng::with_seed(11);
  let mut tick = 0u64;

  for _ in 0..30_000 {
    ftl.write(&Req::full(rng.u64(0..300), 1), &mut tick).unwrap();
    tick += 1_000;
  }

  assert!(ftl.erase_count_spread() <= ftl.conf().bad_block_threshold);
  let wl = ftl.wear_leveling();
  assert!(wl > 0.0 && wl <= 1.0, "wear-leveling factor {}", wl);
  ftl.check_consistency().unwrap();
}

#[test]
fn every_policy_preserves_engine_invariants() {
  for policy in [
    GcPolicyKind::Default,
    GcPolicyKind::LazyRtgc,
    GcPolicyKind::RlBaseline,
    GcPolicyKind::RlIntensive,
    GcPolicyKind::RlAggressive,
  ] {
    let mut conf = small_conf(policy);
    conf.physical_blocks = 48;
    conf.gc_threshold = 0.15;

    let mut ftl = quiet_engine(conf);
    let mut rng = fastrand::Rng::with_seed(policy as u64 + 1);
    let mut tick = 0u64;

    for i in 0..4_000u64 {
      let lpn = rng.u64(0..120);
      match i % 16 {
        13 => ftl.read(&Req::full(lpn, 1), &mut tick).unwrap(),
        14 => ftl.trim(&Req::full(lpn, 1), &mut tick).unwrap(),
        _ => ftl.write(&Req::full(lpn, 1), &mut tick).unwrap(),
      }
      // Mixed pacing: bursts and idle gaps.
      if i % 3 == 0 {
        tick += 30_000;
      }
    }

    ftl.check_consistency().unwrap();
    assert!(ftl.free_blocks() > 0, "policy {:?} exhausted the pool", policy);

    let stats = ftl.policy_stats();
    assert!(stats.avg_reward >= -1.0 && stats.avg_reward <= 1.0);
  }
}

#[test]
fn stat_export_covers_gc_and_rl_counters() {
  let mut ftl = quiet_engine(small_conf(GcPolicyKind::RlBaseline));
  let mut tick = 0u64;
  for lpn in 0..64 {
    ftl.write(&Req::full(lpn, 1), &mut tick).unwrap();
    tick += 1_000;
  }

  let list = ftl.stat_list("cpu0.");
  let names: Vec<&str> = list.iter().map(|e| e.name.as_str()).collect();
  assert!(names.contains(&"cpu0.page_mapping.gc.count"));
  assert!(names.contains(&"cpu0.page_mapping.wear_leveling"));
  assert!(names.contains(&"cpu0.ftl.rlgc.avg_reward"));

  // Untouched device: wear leveling is the -1 sentinel.
  let wl = list
    .iter()
    .find(|e| e.name.ends_with("wear_leveling"))
    .unwrap();
  assert_eq!(wl.value, -1.0);

  let default = quiet_engine(small_conf(GcPolicyKind::Default));
  assert!(default
    .stat_list("")
    .iter()
    .all(|e| !e.name.starts_with("ftl.rlgc")));
}

#[test]
fn metrics_files_land_on_finalize() {
  let dir = std::env::temp_dir().join("ftl_sim_scenarios_metrics");
  std::fs::create_dir_all(&dir).unwrap();

  let mut conf = small_conf(GcPolicyKind::LazyRtgc);
  conf.metrics_dir = Some(dir.clone());

  let mut ftl = quiet_engine(conf);
  let mut tick = 0u64;
  for i in 0..500u64 {
    ftl.write(&Req::full(i % 100, 1), &mut tick).unwrap();
    tick += 1_000;
  }
  ftl.finalize();

  let metrics = std::fs::read_to_string(dir.join("lazy_rtgc_metrics.txt")).unwrap();
  assert!(metrics.starts_with("# Lazy-RTGC Metrics"));
  assert!(metrics.lines().count() > 2);

  let summary = std::fs::read_to_string(dir.join("lazy_rtgc_summary.txt")).unwrap();
  assert!(summary.starts_with("Lazy-RTGC Policy Summary Report"));

  std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn format_then_read_is_silent_end_to_end() {
  let mut ftl = quiet_engine(small_conf(GcPolicyKind::Default));
  let mut tick = 0u64;

  for lpn in 0..64 {
    ftl.write(&Req::full(lpn, 1), &mut tick).unwrap();
  }

  ftl
    .format(ftl_sim::LpnRange { start: 16, count: 32 }, &mut tick)
    .unwrap();

  let reads_before = ftl.pal().reads;
  for lpn in 16..48 {
    ftl.read(&Req::full(lpn, 1), &mut tick).unwrap();
  }
  assert_eq!(ftl.pal().reads, reads_before);
  assert_eq!(ftl.mapped_pages(16, 48), 0);
  assert_eq!(ftl.mapped_pages(0, 16), 16);
  ftl.check_consistency().unwrap();
}
