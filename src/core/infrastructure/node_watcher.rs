//! Feeds Kubernetes node add/delete events into the [`NodeManager`].

use crate::node::{NodeManager, manager::system_uuid};
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::{
    Api, Client,
    runtime::watcher::{self, Event, watcher},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::{select, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Watches `Node` objects cluster-wide.
pub struct NodeWatcher {
    nodes: Arc<NodeManager>,
    client: Client,
    restart_delay: Duration,
}

impl NodeWatcher {
    pub fn new(nodes: Arc<NodeManager>, client: Client) -> Self {
        Self {
            nodes,
            client,
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }

    pub fn with_restart_delay(mut self, restart_delay: Duration) -> Self {
        self.restart_delay = restart_delay;
        self
    }

    /// Runs until `cancellation_token` is cancelled, restarting the watch
    /// after failures.
    #[tracing::instrument(skip_all)]
    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!("Starting node watcher");

        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Node watcher shutdown requested");
                    break;
                }
                result = self.watch_nodes() => {
                    match result {
                        Ok(()) => warn!("Node watch stream ended unexpectedly, restarting"),
                        Err(e) => {
                            error!(error = %e, "Node watch failed");
                            sleep(self.restart_delay).await;
                        }
                    }
                }
            }
        }
    }

    async fn watch_nodes(&self) -> Result<(), watcher::Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        let mut stream = std::pin::pin!(watcher(api, watcher::Config::default()));
        while let Some(event) = stream.try_next().await? {
            apply_event(&self.nodes, event).await;
        }
        Ok(())
    }
}

/// Applies one watch event.
///
/// An applied node that is already registered is an update and is ignored.
pub(crate) async fn apply_event(nodes: &NodeManager, event: Event<Node>) {
    match event {
        Event::Applied(node) => {
            let known = match system_uuid(&node) {
                Some(uuid) => nodes.is_registered(uuid).await,
                None => false,
            };
            if known {
                debug!(node = ?node.metadata.name, "Node update ignored");
                return;
            }
            nodes.register_node(&node).await;
        }
        Event::Deleted(node) => nodes.unregister_node(&node).await,
        Event::Restarted(all) => {
            debug!(count = all.len(), "Node watch restarted");
            nodes.sync_registered(&all).await;
        }
    }
}
