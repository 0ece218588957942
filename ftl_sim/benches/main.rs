use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ftl_sim::conf::{FtlConf, GcPolicyKind};
use ftl_sim::pal::{CpuLatency, LatencyDram, LatencyPal};
use ftl_sim::{Ftl, Req};

fn build(policy: GcPolicyKind) -> Ftl<LatencyPal, LatencyDram> {
  let mut conf = FtlConf::default();
  conf.physical_blocks = 256;
  conf.pages_in_block = 32;
  conf.subunits_in_page = 1;
  conf.parallelism = 4;
  conf.policy = policy;
  conf.fill_ratio = 0.5;
  conf.invalid_ratio = 0.2;
  conf.seed = 7;

  let mut ftl = Ftl::new(conf, LatencyPal::zero(), LatencyDram::zero()).unwrap();
  ftl.set_cpu_latency(CpuLatency::zero());
  ftl.initialize().unwrap();
  ftl
}

fn bench_random_writes(c: &mut Criterion) {
  let mut group = c.benchmark_group("random_writes");

  for (name, policy) in [
    ("default", GcPolicyKind::Default),
    ("lazy_rtgc", GcPolicyKind::LazyRtgc),
    ("rl_baseline", GcPolicyKind::RlBaseline),
  ] {
    group.bench_function(name, |b| {
      b.iter_batched(
        || build(policy),
        |mut ftl| {
          let mut rng = fastrand::Rng::with_seed(99);
          let space = ftl.conf().logical_pages();
          let mut tick = 0u64;
          for _ in 0..2_000 {
            ftl.write(&Req::full(rng.u64(0..space), 1), &mut tick).unwrap();
            tick += 1_000;
          }
          ftl
        },
        BatchSize::LargeInput,
      )
    });
  }

  group.finish();
}

criterion_group!(benches, bench_random_writes);
criterion_main!(benches);
