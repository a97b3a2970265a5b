use anyhow::Result;
use cadence_agent::intercept::{self, CREATE_TIMER, JOIN_TIMER};
use cadence_agent::{lifecycle, thread_state, Config};
use cadence_shared::types::identity::TimerId;
use std::thread::sleep;
use std::time::Duration;

const MS: u64 = 1_000_000;

#[test]
fn test_join_time_is_not_attributed_to_caller() -> Result<()> {
    let _session = lifecycle::init(Config {
        stack_size: 1 << 20,
        ..Config::default()
    })?;

    let caller = TimerId::name("caller");
    let handle = thread_state::start(Some(caller.clone())).unwrap();
    sleep(Duration::from_millis(20));

    let child = intercept::spawn_named("sleeper", || sleep(Duration::from_millis(200)))?;
    child.join().unwrap();

    sleep(Duration::from_millis(20));
    thread_state::stop(handle).unwrap();

    let report = lifecycle::snapshot().unwrap();

    let caller_stats = report.timer(&caller).unwrap();
    assert_eq!(caller_stats.calls, 1);
    assert_eq!(caller_stats.yields, 1);
    assert!(caller_stats.total_ns >= 40 * MS);
    assert!(
        caller_stats.total_ns < 200 * MS,
        "caller charged {}ns",
        caller_stats.total_ns
    );

    let join = report.timer(&TimerId::name(JOIN_TIMER)).unwrap();
    assert_eq!(join.calls, 1);
    assert!(join.total_ns >= 150 * MS);

    let sleeper = report.timer(&TimerId::name("sleeper")).unwrap();
    assert_eq!(sleeper.calls, 1);
    assert!(sleeper.total_ns >= 200 * MS);

    assert_eq!(report.timer(&TimerId::name(CREATE_TIMER)).unwrap().calls, 1);

    Ok(())
}
