//! Waits on the pods of a release

use blocknode_core::{
    MigrationContext, MigrationError, ResourceCondition, ResourceRef, ResourceSelector,
};

/// Label every pod of a release carries
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Selector matching all pods of `release` in `namespace`
pub fn release_pods(release: &str, namespace: &str) -> ResourceSelector {
    ResourceSelector {
        kind: "pod".to_string(),
        namespace: namespace.to_string(),
        labels: format!("{}={}", INSTANCE_LABEL, release),
    }
}

/// The first pod of the release's stateful set
pub fn primary_pod(release: &str, namespace: &str) -> ResourceRef {
    ResourceRef::namespaced("pod", namespace, format!("{}-0", release))
}

/// Waits until no pod of the context's release remains.
pub async fn wait_terminated(ctx: &MigrationContext) -> Result<(), MigrationError> {
    let release = ctx.data().release()?;
    let selector = release_pods(&release.release_name, &release.namespace);
    log::info!("waiting for pods of {} to terminate", release.release_name);

    ctx.data()
        .cluster()?
        .wait_for_resources(
            &selector,
            ResourceCondition::Deleted,
            ctx.data().timeouts().pod_terminated,
            ctx.cancellation(),
        )
        .await?;
    Ok(())
}

/// Waits until the release's primary pod reports ready.
pub async fn wait_ready(ctx: &MigrationContext) -> Result<(), MigrationError> {
    let release = ctx.data().release()?;
    let pod = primary_pod(&release.release_name, &release.namespace);
    log::info!("waiting for {} to become ready", pod);

    ctx.data()
        .cluster()?
        .wait_for_resource(
            &pod,
            ResourceCondition::PodReady,
            ctx.data().timeouts().pod_ready,
            ctx.cancellation(),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocknode_core::test_utils::FakeClusterClient;
    use blocknode_core::{ChartRef, ReleaseTarget, WaitTimeouts};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn context(cluster: FakeClusterClient) -> MigrationContext {
        let mut ctx = MigrationContext::new("block-node", "0.25.0", "0.26.2");
        ctx.data_mut().set_cluster(Arc::new(cluster));
        ctx.data_mut().set_release(ReleaseTarget {
            release_name: "bn".into(),
            namespace: "solo".into(),
            chart: ChartRef::new("block-node-server"),
        });
        ctx.data_mut().set_timeouts(WaitTimeouts {
            pvc_bound: Duration::from_millis(30),
            pod_ready: Duration::from_millis(30),
            pod_terminated: Duration::from_millis(30),
        });
        ctx
    }

    #[tokio::test]
    async fn test_waits_pass_on_settled_cluster() {
        let ctx = context(FakeClusterClient::new());
        wait_terminated(&ctx).await.unwrap();
        wait_ready(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_lingering_pod_times_out() {
        let ctx = context(
            FakeClusterClient::new()
                .with_selection("app.kubernetes.io/instance=bn", vec![json!({"metadata": {"name": "bn-0"}})]),
        );

        let err = wait_terminated(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("pod in solo matching"));
    }

    #[tokio::test]
    async fn test_unready_pod_times_out() {
        let ctx = context(FakeClusterClient::new().with_resource(
            &primary_pod("bn", "solo"),
            Some(json!({"status": {"conditions": [{"type": "Ready", "status": "False"}]}})),
        ));

        let err = wait_ready(&ctx).await.unwrap_err();
        assert!(matches!(err, MigrationError::Collaborator(ref e) if e.is_timeout()));
    }
}
