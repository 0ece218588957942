use ftl_rl::qtable::{EPSILON_CLAMP_AFTER, MIN_EPSILON};
use ftl_rl::{QTable, State};

#[test]
fn replayed_updates_are_deterministic() {
  let s0 = State::new(0, 2, 0);
  let s1 = State::new(1, 3, 1);
  let alpha = 0.3f32;
  let gamma = 0.8f32;

  // Five (state, action, reward) tuples; the next state is always s1 and
  // action 0 of s0 is updated three times.
  let sequence = [
    (s0, 0u32, 1.0f32),
    (s0, 0, 0.5),
    (s1, 1, -0.5),
    (s0, 0, 1.0),
    (s1, 1, -1.0),
  ];

  let mut q = QTable::new(alpha, gamma, 0.8, 4, 12345);
  for (state, action, reward) in sequence {
    let next = s1;
    q.update(state, action, reward, next);
  }

  // Hand-rolled replay of the same update rule.
  let mut q0 = [0.0f32; 4]; // values of s0
  let mut q1 = [0.0f32; 4]; // values of s1
  for (state, action, reward) in sequence {
    let max_next = q1.iter().copied().fold(f32::MIN, f32::max);
    let cell = if state == s0 {
      &mut q0[action as usize]
    } else {
      &mut q1[action as usize]
    };
    *cell += alpha * (reward + gamma * max_next - *cell);
  }

  assert!((q.q_value(s0, 0) - q0[0]).abs() < 1e-6);
  assert!((q.q_value(s1, 1) - q1[1]).abs() < 1e-6);
}

#[test]
fn epsilon_reaches_floor_after_1001_decisions() {
  let mut q = QTable::new(0.3, 0.8, 0.8, 10, 99);
  let s = State::default();

  for _ in 0..1001 {
    let action = q.select_action(s);
    assert!(action < 10);
    q.decay_epsilon();
  }

  assert!(q.gc_count() > EPSILON_CLAMP_AFTER);
  assert!((q.epsilon() - MIN_EPSILON).abs() < f32::EPSILON);
}

#[test]
fn csv_dumps_are_written() {
  let dir = std::env::temp_dir().join("ftl_rl_dump_test");
  std::fs::create_dir_all(&dir).unwrap();

  let mut q = QTable::new(0.3, 0.8, 0.5, 4, 5);
  q.update(State::new(0, 3, 1), 2, 1.0, State::new(1, 4, 0));
  q.update(State::new(1, 4, 0), 1, -0.5, State::new(0, 3, 1));

  let q_path = dir.join("q_table_0.csv");
  let c_path = dir.join("convergence_0.csv");
  q.dump_q_csv(&q_path).unwrap();
  q.dump_convergence_csv(&c_path).unwrap();

  let table = std::fs::read_to_string(&q_path).unwrap();
  assert!(table.starts_with("prev_interval_bin,curr_interval_bin,prev_action_bin,q0,q1,q2,q3"));
  assert_eq!(table.lines().count(), 1 + q.states());

  let conv = std::fs::read_to_string(&c_path).unwrap();
  assert!(conv.starts_with("update,max_delta,stable_ratio,converged"));
  assert_eq!(conv.lines().count(), 3);

  std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn table_shape_is_preserved_across_random_updates() {
  let mut rng = fastrand::Rng::with_seed(7);
  let mut q = QTable::new(0.3, 0.8, 0.8, 6, 7);

  for _ in 0..500 {
    let s = State::new(rng.u8(0..2), rng.u8(0..18), rng.u8(0..2));
    let next = State::new(rng.u8(0..2), rng.u8(0..18), rng.u8(0..2));
    let action = rng.u32(0..6);
    let reward = if rng.bool() { 1.0 } else { -0.5 };
    q.update(s, action, reward, next);

    // Every touched state must answer for every action.
    for a in 0..6 {
      let _ = q.q_value(s, a);
      let _ = q.q_value(next, a);
    }
  }

  assert!(q.states() <= 2 * 18 * 2);
}
