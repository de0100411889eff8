//! Scenarios against real worker processes.

use dunit_core::{BouncePhase, EnvError, VmState};
use dunit_integration_tests::cluster::{config, TestCluster};
use dunit_integration_tests::tasks::{BOOM, BUMP, INSTALLED_VM_ID, MERGED_PROPERTIES, STUBBORN};
use dunit_launcher::{BouncePolicy, InvokeError, LauncherConfig, Vm};
use dunit_types::{keys, Pid, PropertyMap, PropertyValue, RemoteError, Task, VmId};
use dunit_worker::builtins::{
    ECHO, EXIT, LOCATOR, MEMBERS, NOOP, PID, PROPERTIES, READ_FILE, SLEEP, VM_ID, WRITE_FILE,
};
use serde::{Deserialize, Serialize};
use serial_test::serial;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const WORKER: &str = env!("CARGO_BIN_EXE_integration-worker");

fn one_host(vms: usize) -> LauncherConfig {
    config(WORKER, 1, vms)
}

async fn wait_for_state(vm: &Vm, state: VmState) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while vm.state() != state {
        assert!(Instant::now() < deadline, "{} never reached {}", vm.vm_id(), state);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: u64,
    lines: Vec<(String, u32)>,
    note: Option<String>,
}

/// Three VMs: invoke, bounce, remote failure, unknown pid.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn three_vm_bounce_and_failure() {
    let cluster = TestCluster::launch(one_host(3)).await.unwrap();
    let env = cluster.env().clone();
    let host = cluster.host(0).unwrap();

    assert_eq!(host.vm_count(), 3);
    for (i, vm) in host.vms().iter().enumerate() {
        assert_eq!(vm.vm_id(), VmId::new(i as i32));
        assert_eq!(vm.state(), VmState::Running);
    }

    let vm1 = host.vm(1).unwrap();
    vm1.invoke::<()>(Task::new(NOOP)).await.unwrap();

    let old_pid = vm1.pid();
    let working_dir = vm1.working_directory().to_path_buf();
    let result = env.bounce(old_pid).await.unwrap();
    assert!(result.success);
    assert_eq!(result.previous_pid, old_pid);
    assert_ne!(result.new_pid, old_pid);

    // Same worker by id, new process behind it
    let again = cluster.host(0).unwrap().vm(1).unwrap();
    assert_eq!(again.vm_id(), VmId::new(1));
    assert_eq!(again.pid(), result.new_pid);
    assert_eq!(again.state(), VmState::Running);
    assert_eq!(again.working_directory(), working_dir);
    assert_eq!(
        env.working_directory(old_pid).unwrap(),
        env.working_directory(result.new_pid).unwrap()
    );
    let reported: u32 = again.invoke(Task::new(PID)).await.unwrap();
    assert_eq!(reported, result.new_pid.get());

    let vm2 = host.vm(2).unwrap();
    let err = vm2.invoke::<()>(Task::new(BOOM)).await.unwrap_err();
    let remote = err.remote().expect("task failure");
    assert_eq!(remote.kind, RemoteError::TASK_FAILED);
    assert_eq!(remote.message, "boom");
    assert_eq!(vm2.state(), VmState::Running);
    vm2.invoke::<()>(Task::new(NOOP)).await.unwrap();

    let err = env.bounce(Pid::new(u32::MAX)).await.unwrap_err();
    assert!(matches!(err, EnvError::UnknownProcess { .. }));
    assert!(err.is_invalid_argument());

    // The old pid is history now
    let err = env.bounce(old_pid).await.unwrap_err();
    assert!(matches!(err, EnvError::UnknownProcess { pid } if pid == old_pid));

    let err = env.working_directory(Pid::current()).unwrap_err();
    assert!(matches!(err, EnvError::UnknownProcess { .. }));

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn values_cross_the_process_boundary() {
    let cluster = TestCluster::launch(one_host(2)).await.unwrap();

    let order = Order {
        id: 42,
        lines: vec![("widget".into(), 3), ("gadget".into(), 1)],
        note: None,
    };
    for vm in cluster.hosts().vms() {
        let echoed: Order = vm
            .invoke(Task::with_args(ECHO, &order).unwrap())
            .await
            .unwrap();
        assert_eq!(echoed, order);

        let vm_id: i32 = vm.invoke(Task::new(VM_ID)).await.unwrap();
        assert_eq!(vm_id, vm.vm_id().get());
        let installed: i32 = vm.invoke(Task::new(INSTALLED_VM_ID)).await.unwrap();
        assert_eq!(installed, vm.vm_id().get());
    }

    // Wrong argument type is the caller's fault, not the worker's
    let vm = cluster.vm(0).unwrap();
    let err = vm
        .invoke::<()>(Task::with_args(SLEEP, &"soon").unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.remote().unwrap().kind, RemoteError::BAD_ARGUMENTS);

    let err = vm.invoke::<()>(Task::new("no-such-task")).await.unwrap_err();
    assert_eq!(err.remote().unwrap().kind, RemoteError::UNKNOWN_TASK);
    assert_eq!(vm.state(), VmState::Running);

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn workers_see_the_run_properties() {
    let mut config = one_host(3);
    config
        .properties
        .insert(keys::LOG_LEVEL.into(), "fine".into());
    config
        .properties
        .insert("member-timeout".into(), PropertyValue::Int(5000));
    let cluster = TestCluster::launch(config).await.unwrap();
    let locators = cluster.env().locator_string().unwrap();
    assert_eq!(locators, cluster.locator().info().to_string());

    let vm = cluster.vm(2).unwrap();
    let props: BTreeMap<String, String> = vm.invoke(Task::new(PROPERTIES)).await.unwrap();
    assert_eq!(props.get(keys::LOG_LEVEL).map(String::as_str), Some("fine"));
    assert_eq!(props.get(keys::LOCATORS), Some(&locators));
    assert_eq!(props.get(keys::MCAST_PORT).map(String::as_str), Some("0"));
    assert_eq!(props.get("member-timeout").map(String::as_str), Some("5000"));

    let reported: String = vm.invoke(Task::new(LOCATOR)).await.unwrap();
    assert_eq!(reported, locators);

    let mut caller = PropertyMap::new();
    caller.insert(keys::LOG_LEVEL.into(), "severe".into());
    let merged: PropertyMap = vm
        .invoke(Task::with_args(MERGED_PROPERTIES, &caller).unwrap())
        .await
        .unwrap();
    assert_eq!(merged.get(keys::LOG_LEVEL), Some(&"severe".into()));
    assert_eq!(merged.get(keys::LOCATORS), Some(&locators.clone().into()));
    assert_eq!(
        merged.get(keys::DISABLE_AUTO_RECONNECT),
        Some(&PropertyValue::Bool(true))
    );
    assert_eq!(merged, cluster.env().merge_properties(caller));

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn locator_tracks_members_across_bounces() {
    let cluster = TestCluster::launch(one_host(3)).await.unwrap();

    let expected: Vec<(i32, u32)> = cluster
        .hosts()
        .vms()
        .map(|vm| (vm.vm_id().get(), vm.pid().get()))
        .collect();
    let registered: Vec<(i32, u32)> = cluster
        .locator()
        .members()
        .into_iter()
        .map(|m| (m.vm_id.get(), m.pid.get()))
        .collect();
    assert_eq!(registered, expected);

    let vm0 = cluster.vm(0).unwrap();
    let bounced = vm0.bounce().await.unwrap();

    // Seen from inside another worker
    let members: Vec<(i32, u32)> = cluster
        .vm(1)
        .unwrap()
        .invoke(Task::new(MEMBERS))
        .await
        .unwrap();
    assert_eq!(members.len(), 3);
    assert!(members.contains(&(0, bounced.new_pid.get())));
    assert!(!members.contains(&(0, bounced.previous_pid.get())));

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn working_directory_outlives_the_process() {
    let cluster = TestCluster::launch(one_host(1)).await.unwrap();
    let vm = cluster.vm(0).unwrap();

    vm.invoke::<()>(Task::with_args(WRITE_FILE, &("state/marker.txt", "before")).unwrap())
        .await
        .unwrap();
    assert_eq!(vm.invoke::<u64>(Task::new(BUMP)).await.unwrap(), 1);
    assert_eq!(vm.invoke::<u64>(Task::new(BUMP)).await.unwrap(), 2);
    assert!(vm.working_directory().join("state/marker.txt").exists());

    vm.bounce().await.unwrap();

    let text: String = vm
        .invoke(Task::with_args(READ_FILE, &"state/marker.txt").unwrap())
        .await
        .unwrap();
    assert_eq!(text, "before");
    assert_eq!(vm.invoke::<u64>(Task::new(BUMP)).await.unwrap(), 3);

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn crashed_worker_comes_back_after_bounce() {
    let cluster = TestCluster::launch(one_host(1)).await.unwrap();
    let vm = cluster.vm(0).unwrap();

    let err = vm
        .invoke::<()>(Task::with_args(EXIT, &3i32).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::Disconnected { .. }), "{err:?}");

    let result = vm.bounce().await.unwrap();
    assert_ne!(result.new_pid, result.previous_pid);
    assert_eq!(vm.state(), VmState::Running);
    let pid: u32 = vm.invoke(Task::new(PID)).await.unwrap();
    assert_eq!(pid, result.new_pid.get());

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn restart_timeout_leaves_vm_dead() {
    let mut config = one_host(2);
    config.timeouts.restart_ms = 1;
    let cluster = TestCluster::launch(config).await.unwrap();
    let vm = cluster.vm(0).unwrap();
    let old_pid = vm.pid();

    let err = vm.bounce().await.unwrap_err();
    assert_eq!(
        err,
        EnvError::BounceTimeout {
            vm_id: VmId::new(0),
            phase: BouncePhase::Restart,
        }
    );
    assert!(err.is_fatal());
    assert_eq!(vm.state(), VmState::Dead);

    let started = Instant::now();
    let err = vm.invoke::<()>(Task::new(NOOP)).await.unwrap_err();
    assert!(matches!(err, InvokeError::VmDead { .. }));
    assert!(started.elapsed() < Duration::from_secs(1));

    let err = cluster.env().bounce(old_pid).await.unwrap_err();
    assert!(matches!(err, EnvError::UnknownProcess { .. }));

    // The other worker is unaffected
    cluster
        .vm(1)
        .unwrap()
        .invoke::<()>(Task::new(NOOP))
        .await
        .unwrap();

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn exit_timeout_leaves_vm_dead() {
    let mut config = one_host(2);
    config.timeouts.exit_ms = 300;
    let cluster = TestCluster::launch(config).await.unwrap();
    let vm = cluster.vm(0).unwrap();
    let pid = vm.pid();

    // The worker stays busy with SIGTERM ignored after the caller gives up
    let err = vm
        .invoke_with_timeout::<()>(
            Task::with_args(STUBBORN, &30_000u64).unwrap(),
            Duration::from_millis(500),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::Timeout { .. }), "{err:?}");
    assert_eq!(vm.state(), VmState::Running);

    let err = cluster.env().bounce(pid).await.unwrap_err();
    assert_eq!(
        err,
        EnvError::BounceTimeout {
            vm_id: VmId::new(0),
            phase: BouncePhase::Exit,
        }
    );
    assert!(err.is_fatal());
    assert_eq!(vm.state(), VmState::Dead);

    let started = Instant::now();
    let err = vm.invoke::<()>(Task::new(NOOP)).await.unwrap_err();
    assert!(matches!(err, InvokeError::VmDead { .. }));
    assert!(started.elapsed() < Duration::from_secs(1));

    cluster
        .vm(1)
        .unwrap()
        .invoke::<()>(Task::new(NOOP))
        .await
        .unwrap();

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn invoke_fails_fast_while_bouncing_under_fail_policy() {
    let mut config = one_host(1);
    config.timeouts.invoke_during_bounce = BouncePolicy::Fail;
    let cluster = TestCluster::launch(config).await.unwrap();
    let vm = cluster.vm(0).unwrap().clone();

    // Keeps the bounce waiting until it finishes
    let in_flight = tokio::spawn({
        let vm = vm.clone();
        async move { vm.invoke::<()>(Task::with_args(SLEEP, &500u64).unwrap()).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    let bounce = tokio::spawn({
        let vm = vm.clone();
        async move { vm.bounce().await }
    });
    wait_for_state(&vm, VmState::Bouncing).await;

    let err = vm.invoke::<()>(Task::new(NOOP)).await.unwrap_err();
    assert!(matches!(err, InvokeError::Bouncing { .. }));

    in_flight.await.unwrap().unwrap();
    let result = bounce.await.unwrap().unwrap();
    assert_eq!(vm.pid(), result.new_pid);
    vm.invoke::<()>(Task::new(NOOP)).await.unwrap();

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn invoke_waits_out_a_bounce_by_default() {
    let cluster = TestCluster::launch(one_host(1)).await.unwrap();
    let vm = cluster.vm(0).unwrap().clone();

    let in_flight = tokio::spawn({
        let vm = vm.clone();
        async move { vm.invoke::<()>(Task::with_args(SLEEP, &300u64).unwrap()).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    let bounce = tokio::spawn({
        let vm = vm.clone();
        async move { vm.bounce().await }
    });
    wait_for_state(&vm, VmState::Bouncing).await;

    // Lands on the replacement process
    let pid: u32 = vm.invoke(Task::new(PID)).await.unwrap();
    let result = bounce.await.unwrap().unwrap();
    assert_eq!(pid, result.new_pid.get());
    in_flight.await.unwrap().unwrap();

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn vm_ids_run_across_hosts() {
    let cluster = TestCluster::launch(config(WORKER, 2, 2)).await.unwrap();

    assert_eq!(cluster.hosts().host_count(), 2);
    let host1 = cluster.host(1).unwrap();
    let ids: Vec<i32> = host1.vms().iter().map(|vm| vm.vm_id().get()).collect();
    assert_eq!(ids, vec![2, 3]);
    assert!(host1.vm(0).is_none());

    let vm3 = cluster.vm(3).unwrap();
    assert_eq!(vm3.host(), 1);
    assert_eq!(vm3.working_directory(), cluster.base_dir().join("vm3"));
    let vm_id: i32 = vm3.invoke(Task::new(VM_ID)).await.unwrap();
    assert_eq!(vm_id, 3);

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn shutdown_lets_workers_exit() {
    let cluster = TestCluster::launch(one_host(2)).await.unwrap();
    let log = cluster.vm(1).unwrap().working_directory().join("vm.log");

    let dir = cluster.shutdown().await;
    assert!(log.starts_with(dir.path()));
    let text = std::fs::read_to_string(&log).unwrap();
    assert!(text.contains("shutdown requested"), "{text}");
    assert!(text.contains("worker stopping"), "{text}");
}
