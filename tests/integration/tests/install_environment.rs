//! Process-wide environment in the controller. Kept in its own test binary
//! since installation happens once per process.

use dunit_core::{bootstrap, EnvError};
use dunit_integration_tests::cluster::{config, TestCluster};
use dunit_types::VmId;

const WORKER: &str = env!("CARGO_BIN_EXE_integration-worker");

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn controller_installs_its_environment_once() {
    assert_eq!(bootstrap::current().unwrap_err(), EnvError::NotInitialized);

    let cluster = TestCluster::launch(config(WORKER, 1, 1)).await.unwrap();
    cluster.install_environment().unwrap();
    assert_eq!(
        cluster.install_environment().unwrap_err(),
        EnvError::AlreadyInitialized
    );

    let env = bootstrap::current().unwrap();
    assert_eq!(env.vm_id(), VmId::CONTROLLER);
    assert_eq!(
        env.locator_string().unwrap(),
        cluster.env().locator_string().unwrap()
    );

    // Bounce through the installed handle
    let vm = cluster.vm(0).unwrap();
    let old_pid = vm.pid();
    let result = env.bounce(old_pid).await.unwrap();
    assert_eq!(vm.pid(), result.new_pid);
    assert_eq!(
        env.working_directory(result.new_pid).unwrap(),
        vm.working_directory()
    );

    cluster.shutdown().await;
}
