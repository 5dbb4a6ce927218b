mod common;

use common::Harness;
use retina_screen::ModelState;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn concurrent_ensure_ready_loads_exactly_once() {
    let harness = Harness::new(0.7, Duration::from_millis(50), false);
    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let engine = Arc::clone(&harness.engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (engine.ensure_ready(), engine.status())
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(harness.loads(), 1);
    assert_eq!(harness.engine.load_count(), 1);
    assert!(outcomes
        .iter()
        .all(|(ready, state)| *ready && *state == ModelState::Ready));
}

#[test]
fn concurrent_callers_observe_the_same_failure() {
    let harness = Harness::new(0.7, Duration::from_millis(30), true);
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let engine = Arc::clone(&harness.engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (engine.ensure_ready(), engine.status())
            })
        })
        .collect();

    for handle in handles {
        let (ready, state) = handle.join().unwrap();
        assert!(!ready);
        assert_eq!(state, ModelState::Failed);
    }
    assert_eq!(harness.loads(), 1);

    // 失败是终态，不会自动重试
    assert!(!harness.engine.ensure_ready());
    assert_eq!(harness.loads(), 1);
}

#[test]
fn background_load_and_on_demand_load_share_one_execution() {
    let harness = Harness::new(0.4, Duration::from_millis(80), false);
    harness.engine.start_background_load().unwrap();

    // 后台加载进行中时，按需加载阻塞等待同一次加载
    assert!(harness.engine.ensure_ready());
    assert_eq!(harness.engine.join_background_load(), Some(ModelState::Ready));
    assert_eq!(harness.loads(), 1);

    // 预热推理恰好执行一次
    assert_eq!(harness.predictions(), 1);
}

#[test]
fn status_reports_loading_until_background_load_completes() {
    let harness = Harness::new(0.4, Duration::from_millis(200), false);
    harness.engine.start_background_load().unwrap();

    let state = harness.engine.status();
    assert!(matches!(state, ModelState::Unloaded | ModelState::Loading));

    harness.engine.join_background_load();
    assert_eq!(harness.engine.status(), ModelState::Ready);
    let stats = harness.engine.stats();
    assert_eq!(stats.load_count, 1);
    assert!(stats.load_time_ms >= 200);
}
