//! Launch sequencing for the daemon runtime.

use std::sync::Arc;

use tracing::info;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::driver::{AdapterDriver, UnavailableDriver};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::reactor::{PollReactor, Reactor};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::ShutdownPipe;

/// Runs the daemon using the production collaborators.
pub fn run_daemon() -> Result<(), LaunchError> {
    let reporter: Arc<dyn HealthReporter> = Arc::new(StructuredHealthReporter::new());
    run_daemon_with(
        &SystemConfigLoader,
        reporter,
        UnavailableDriver,
        PollReactor::new(),
    )
}

/// Runs the daemon with injected collaborators until a termination signal
/// arrives or the bus connection is lost.
pub(crate) fn run_daemon_with<R, D>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    driver: D,
    reactor: R,
) -> Result<(), LaunchError>
where
    R: Reactor,
    D: AdapterDriver,
{
    let bootstrapped = bootstrap_with(loader, reporter)?;
    let mut daemon = bootstrapped.connect(driver, reactor)?;
    let shutdown = ShutdownPipe::install()?;
    daemon.watch_shutdown(shutdown.fd())?;
    daemon.attach_present_adapters();
    info!(target: PROCESS_TARGET, "daemon running");

    let outcome = daemon.run();
    daemon.shutdown();
    drop(shutdown);
    outcome?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
