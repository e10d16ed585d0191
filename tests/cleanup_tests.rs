//! Lazy idle-eviction tests: the cleanup scan runs at the tail of mutating
//! administrative calls, gated by the cleanup interval, and only reclaims
//! machines with no pending work.


use std::time::Duration;

use script_farm::job::Job;
use script_farm::scheduler::MachineStatus;
use test_harness::{test_config, test_farm};

#[tokio::test]
async fn test_idle_machine_evicted_on_next_administrative_call() {
    // TTL of zero: any idle machine is expired as soon as a scan runs.
    let farm = test_farm(
        test_config()
            .with_machine_time_to_live_ms(0)
            .with_cleanup_interval(Duration::from_millis(50)),
    );

    farm.scheduler.spawn_machine("m1", "calc").await.unwrap();
    assert_eq!(
        farm.scheduler.machine_status("m1").await,
        MachineStatus::Active
    );

    // Let the cleanup interval elapse, then trigger a scan with an unrelated
    // mutating call.
    tokio::time::sleep(Duration::from_millis(80)).await;
    farm.scheduler.spawn_machine("m2", "calc").await.unwrap();

    assert_eq!(
        farm.scheduler.machine_status("m1").await,
        MachineStatus::NotFound
    );
}

#[tokio::test]
async fn test_eviction_waits_for_cleanup_interval() {
    let farm = test_farm(
        test_config()
            .with_machine_time_to_live_ms(0)
            .with_cleanup_interval(Duration::from_secs(3600)),
    );

    farm.scheduler.spawn_machine("m1", "calc").await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    farm.scheduler.spawn_machine("m2", "calc").await.unwrap();

    // The interval has not elapsed since construction; no scan has run.
    assert_eq!(
        farm.scheduler.machine_status("m1").await,
        MachineStatus::Active
    );
}

#[tokio::test]
async fn test_negative_ttl_disables_eviction() {
    let farm = test_farm(
        test_config()
            .with_machine_time_to_live_ms(-1)
            .with_cleanup_interval(Duration::from_millis(10)),
    );

    farm.scheduler.spawn_machine("m1", "calc").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    farm.scheduler.spawn_machine("m2", "calc").await.unwrap();

    assert_eq!(
        farm.scheduler.machine_status("m1").await,
        MachineStatus::Active
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_machine_with_pending_work_is_not_evicted() {
    let farm = test_farm(
        test_config()
            .with_machine_time_to_live_ms(0)
            .with_cleanup_interval(Duration::from_millis(10)),
    );

    farm.scheduler.spawn_machine("m1", "sleep").await.unwrap();
    farm.scheduler
        .submit_job("m1", Job::new("slow", "300"))
        .await
        .unwrap();

    // The job is queued or running while this scan triggers.
    tokio::time::sleep(Duration::from_millis(30)).await;
    farm.scheduler.spawn_machine("m2", "calc").await.unwrap();

    assert_eq!(
        farm.scheduler.machine_status("m1").await,
        MachineStatus::Active
    );
    farm.scheduler.wait_until_finished().await;
}

#[tokio::test]
async fn test_quiescent_scheduler_never_evicts() {
    // Eviction is lazy by design: with no administrative traffic at all, an
    // idle machine outlives its TTL indefinitely.
    let farm = test_farm(
        test_config()
            .with_machine_time_to_live_ms(0)
            .with_cleanup_interval(Duration::from_millis(10)),
    );

    farm.scheduler.spawn_machine("m1", "calc").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Status queries are not mutating calls and trigger no scan.
    assert_eq!(
        farm.scheduler.machine_status("m1").await,
        MachineStatus::Active
    );
}
