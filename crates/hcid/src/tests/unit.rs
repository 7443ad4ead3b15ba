//! Unit tests for bootstrap and launch sequencing.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use rstest::rstest;
use tempfile::TempDir;

use hcid_config::{BusEndpoint, Config};

use crate::bootstrap::{BootstrapError, ConfigLoader, StaticConfigLoader, bootstrap_with};
use crate::process::LaunchError;
use crate::process::launch::run_daemon_with;
use crate::reactor::PollReactor;

use super::support::{HealthEvent, RecordingDriver, RecordingHealthReporter};

struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("hcid"),
            OsString::from("--bus-endpoint"),
            OsString::from("carrier-pigeon://bus"),
        ];
        Config::load_from_iter(args)
    }
}

fn unreachable_bus(dir: &TempDir) -> StaticConfigLoader {
    let path = dir.path().join("missing.sock");
    StaticConfigLoader::new(Config {
        bus_endpoint: BusEndpoint::unix(path.to_str().expect("utf-8 temp path")),
        ..Config::default()
    })
}

#[rstest]
fn bootstrap_reports_start_and_success() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let loader = StaticConfigLoader::new(Config::default());
    let bootstrapped = bootstrap_with(&loader, reporter.clone()).expect("bootstrap");
    assert_eq!(bootstrapped.config().bus_name(), "org.bluez");
    assert_eq!(
        reporter.events(),
        vec![HealthEvent::BootstrapStarting, HealthEvent::BootstrapSucceeded]
    );
}

#[rstest]
fn bootstrap_reports_configuration_failure() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let error = bootstrap_with(&FailingConfigLoader, reporter.clone())
        .err()
        .expect("configuration should fail");
    assert!(matches!(error, BootstrapError::Configuration { .. }));
    assert!(matches!(
        reporter.events().last(),
        Some(HealthEvent::BootstrapFailed(_))
    ));
}

#[rstest]
fn connect_reports_unreachable_bus() {
    let dir = TempDir::new().expect("temp dir");
    let reporter = Arc::new(RecordingHealthReporter::default());
    let bootstrapped = bootstrap_with(&unreachable_bus(&dir), reporter.clone()).expect("bootstrap");
    let error = bootstrapped
        .connect(RecordingDriver::new(), PollReactor::new())
        .err()
        .expect("bus is unreachable");
    assert!(matches!(error, BootstrapError::Bus { .. }));
    assert!(
        !reporter
            .events()
            .iter()
            .any(|event| matches!(event, HealthEvent::BusConnected(_)))
    );
}

#[rstest]
fn launch_surfaces_bootstrap_failure() {
    let dir = TempDir::new().expect("temp dir");
    let reporter = Arc::new(RecordingHealthReporter::default());
    let error = run_daemon_with(
        &unreachable_bus(&dir),
        reporter,
        RecordingDriver::new(),
        PollReactor::new(),
    )
    .expect_err("launch should fail");
    assert!(matches!(
        error,
        LaunchError::Bootstrap {
            source: BootstrapError::Bus { .. }
        }
    ));
}
