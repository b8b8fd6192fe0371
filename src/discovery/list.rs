use super::connection_manager::ConnectionManager;
use crate::core::domain::model::discovery::ListDiscoveryInfo;
use tracing::{error, instrument};

impl ConnectionManager {
    /// Every reachable endpoint/datacenter pair, sorted by endpoint address
    /// and then datacenter name.
    ///
    /// Endpoints or datacenters that cannot be reached are logged and left out.
    #[instrument(skip(self))]
    pub async fn list_all_pairs(&self) -> Vec<ListDiscoveryInfo> {
        let mut pairs = Vec::new();

        for connection in self.endpoints() {
            if let Err(err) = self.connect_with_retry(connection).await {
                error!(server = connection.server(), error = %err, "Failed to connect to iCenter");
                continue;
            }

            let scan = self.scan_datacenters(connection).await;
            for err in &scan.errors {
                error!(server = connection.server(), error = %err, "Failed to resolve datacenter");
            }
            pairs.extend(scan.found.into_iter().map(|datacenter| ListDiscoveryInfo {
                tenant_ref: connection.config().tenant_ref().to_string(),
                ics_server: connection.server().to_string(),
                datacenter,
            }));
        }

        pairs.sort_by(|a, b| {
            a.ics_server
                .cmp(&b.ics_server)
                .then_with(|| a.datacenter.name.cmp(&b.datacenter.name))
        });
        pairs
    }
}
