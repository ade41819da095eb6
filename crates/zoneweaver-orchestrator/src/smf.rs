//! `svc:/system/zones:default` state query and toggle. Mirrors the
//! `svcadm`/`svcs` idiom `zoneweaver-runtime::network::refresh_smf_service`
//! uses for `network/ipfilter`, minus the refresh step — the zones
//! service isn't manifest-reloaded here, just enabled or disabled.

use crate::error::{OrchestratorError, Result};
use zoneweaver_runtime::command::CommandRunner;

pub const ZONES_SERVICE_FMRI: &str = "svc:/system/zones:default";

/// `true` if `svcs` reports the zones service `online`.
pub async fn zones_service_online(runner: &dyn CommandRunner) -> Result<bool> {
    let out = runner
        .run_default("svcs", &["-H", "-o", "state", ZONES_SERVICE_FMRI])
        .await;
    if !out.success {
        return Err(OrchestratorError::smf_query_failed(
            out.error.unwrap_or(out.stderr),
        ));
    }
    Ok(out.stdout.trim() == "online")
}

pub async fn disable_zones_service(runner: &dyn CommandRunner) -> Result<()> {
    let out = runner.run_default("svcadm", &["disable", ZONES_SERVICE_FMRI]).await;
    if !out.success && !out.stderr.to_ascii_lowercase().contains("not running") {
        return Err(OrchestratorError::smf_toggle_failed(
            ZONES_SERVICE_FMRI,
            out.error.unwrap_or(out.stderr),
        ));
    }
    Ok(())
}

pub async fn enable_zones_service(runner: &dyn CommandRunner) -> Result<()> {
    let out = runner.run_default("svcadm", &["enable", ZONES_SERVICE_FMRI]).await;
    if !out.success {
        return Err(OrchestratorError::smf_toggle_failed(
            ZONES_SERVICE_FMRI,
            out.error.unwrap_or(out.stderr),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zoneweaver_runtime::mock::MockCommandRunner;

    #[tokio::test]
    async fn test_zones_service_online_true() {
        let runner = MockCommandRunner::new();
        runner.on_success("svcs", &["-H", "-o", "state", ZONES_SERVICE_FMRI], "online\n");
        assert!(zones_service_online(&runner).await.unwrap());
    }

    #[tokio::test]
    async fn test_zones_service_online_false() {
        let runner = MockCommandRunner::new();
        runner.on_success("svcs", &["-H", "-o", "state", ZONES_SERVICE_FMRI], "disabled\n");
        assert!(!zones_service_online(&runner).await.unwrap());
    }

    #[tokio::test]
    async fn test_disable_tolerates_not_running() {
        let runner = MockCommandRunner::new();
        runner.on_failure("svcadm", &["disable", ZONES_SERVICE_FMRI], "svc not running", 1);
        assert!(disable_zones_service(&runner).await.is_ok());
    }

    #[tokio::test]
    async fn test_enable_propagates_real_failure() {
        let runner = MockCommandRunner::new();
        runner.on_failure("svcadm", &["enable", ZONES_SERVICE_FMRI], "permission denied", 1);
        assert!(enable_zones_service(&runner).await.is_err());
    }
}
