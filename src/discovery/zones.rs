//! Zone and region discovery from host tags.

use super::{
    connection_manager::{ConnectionManager, EndpointConnection},
    fan_out::{self, Outcome, TaskSink},
};
use crate::core::domain::{
    error::{IcsError, IcsResult},
    model::{
        cloud_config::LabelsConfig,
        discovery::{ZoneDiscoveryInfo, ZoneRegion},
        inventory::{Datacenter, HostSystem},
    },
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

struct HostTask {
    connection: Arc<EndpointConnection>,
    datacenter: Datacenter,
    host: HostSystem,
}

impl ConnectionManager {
    /// Finds the endpoint and datacenter whose hosts carry `zone` and `region`.
    ///
    /// A lone endpoint with a lone datacenter is returned without looking at
    /// tags.
    #[instrument(skip(self, labels))]
    pub async fn which_endpoint_and_dc_by_zone(
        &self,
        labels: &LabelsConfig,
        zone: &str,
        region: &str,
    ) -> IcsResult<ZoneDiscoveryInfo> {
        if self.is_empty() {
            let err = IcsError::InvalidConfiguration(
                "at least one iCenter and datacenter is required".to_string(),
            );
            error!(error = %err, "Zone lookup without endpoints");
            return Err(err);
        }

        if self.len() == 1 {
            if let Some(found) = self.single_datacenter().await? {
                info!(server = %found.ics_server, datacenter = %found.datacenter.name, "Single iCenter/datacenter configuration detected");
                return Ok(found);
            }
        }

        if labels.zone.is_empty() || labels.region.is_empty() || zone.is_empty() || region.is_empty() {
            return Err(IcsError::InvalidConfiguration(
                "multiple iCenters or datacenters require zone and region labels".to_string(),
            ));
        }
        self.search_zone(labels, zone, region).await
    }

    /// The only datacenter of the only endpoint, if there is exactly one.
    async fn single_datacenter(&self) -> IcsResult<Option<ZoneDiscoveryInfo>> {
        let Some(connection) = self.endpoints().next() else {
            return Ok(None);
        };
        self.connect_with_retry(connection).await?;

        let mut datacenters = connection.session().list_datacenters().await?;
        if datacenters.len() != 1 {
            debug!(count = datacenters.len(), "Multi datacenter configuration detected");
            return Ok(None);
        }
        let datacenter = datacenters.remove(0);
        Ok(Some(ZoneDiscoveryInfo {
            tenant_ref: connection.config().tenant_ref().to_string(),
            ics_server: connection.server().to_string(),
            datacenter,
        }))
    }

    async fn search_zone(
        &self,
        labels: &LabelsConfig,
        zone: &str,
        region: &str,
    ) -> IcsResult<ZoneDiscoveryInfo> {
        let producer = self.clone();
        let worker = self.clone();
        let labels = Arc::new(labels.clone());
        let wanted: Arc<(String, String)> = Arc::new((zone.to_string(), region.to_string()));

        let outcome = fan_out::run(
            self.discovery(),
            move |sink| producer.enqueue_hosts(sink),
            move |task: HostTask| {
                let manager = worker.clone();
                let labels = Arc::clone(&labels);
                let wanted = Arc::clone(&wanted);
                async move { manager.check_host_zone(task, &labels, &wanted.0, &wanted.1).await }
            },
        )
        .await;

        match outcome {
            Outcome::Found(found) => Ok(found),
            Outcome::Failed(err) => Err(err),
            Outcome::Exhausted => Err(IcsError::ZoneRegionNotFound(format!(
                "zone {} region {}",
                zone, region
            ))),
        }
    }

    async fn enqueue_hosts(self, sink: TaskSink<HostTask, ZoneDiscoveryInfo>) {
        for connection in self.endpoints() {
            if sink.is_done() {
                return;
            }
            if let Err(err) = self.connect_with_retry(connection).await {
                warn!(server = connection.server(), error = %err, "Skipping unreachable iCenter");
                sink.record_error(err).await;
                continue;
            }

            let scan = self.scan_datacenters(connection).await;
            for err in scan.errors {
                sink.record_error(err).await;
            }
            for datacenter in scan.found {
                if sink.is_done() {
                    return;
                }
                let hosts = match connection.session().list_hosts(&datacenter).await {
                    Ok(hosts) => hosts,
                    Err(err) => {
                        error!(datacenter = %datacenter.name, error = %err, "Listing hosts failed");
                        sink.record_error(err).await;
                        continue;
                    }
                };
                for host in hosts {
                    let task = HostTask {
                        connection: Arc::clone(connection),
                        datacenter: datacenter.clone(),
                        host,
                    };
                    if !sink.push(task).await {
                        return;
                    }
                }
            }
        }
    }

    /// Lookup failures only skip the host.
    async fn check_host_zone(
        &self,
        task: HostTask,
        labels: &LabelsConfig,
        zone: &str,
        region: &str,
    ) -> IcsResult<Option<ZoneDiscoveryInfo>> {
        let tenant_ref = task.connection.config().tenant_ref();
        let found = match self
            .lookup_zone_by_host(tenant_ref, &task.host.id, &labels.zone, &labels.region)
            .await
        {
            Ok(found) => found,
            Err(err) => {
                error!(host = %task.host.host_name, error = %err, "Failed to read zone and region");
                return Ok(None);
            }
        };

        let matches = |value: &Option<String>, wanted: &str| {
            value.as_deref().is_some_and(|v| v.eq_ignore_ascii_case(wanted))
        };
        if !matches(&found.zone, zone) || !matches(&found.region, region) {
            debug!(host = %task.host.host_name, zone = ?found.zone, region = ?found.region, "Zone does not match");
            return Ok(None);
        }

        info!(host = %task.host.host_name, zone, region, "Found zone and region");
        Ok(Some(ZoneDiscoveryInfo {
            tenant_ref: tenant_ref.to_string(),
            ics_server: task.connection.server().to_string(),
            datacenter: task.datacenter,
        }))
    }

    /// Reads zone and region from the tags on a host, its cluster and its
    /// datacenter.
    ///
    /// A tag whose description equals a label supplies that label's value.
    /// An empty label is not looked up.
    ///
    /// # Errors
    /// `EndpointNotFound` for an unknown tenant, `ZoneRegionNotFound` when a
    /// non-empty label matches no tag.
    #[instrument(skip(self))]
    pub async fn lookup_zone_by_host(
        &self,
        tenant_ref: &str,
        host_id: &str,
        zone_label: &str,
        region_label: &str,
    ) -> IcsResult<ZoneRegion> {
        let connection = self.endpoint(tenant_ref)?;
        self.connect_endpoint(&connection).await?;

        let tags = connection.session().host_tags(host_id).await?;
        let mut result = ZoneRegion::default();
        for tag in tags {
            if !zone_label.is_empty() && tag.description == zone_label {
                debug!(tag = %tag.name, host_id, "Found zone tag");
                result.zone = Some(tag.name);
            } else if !region_label.is_empty() && tag.description == region_label {
                debug!(tag = %tag.name, host_id, "Found region tag");
                result.region = Some(tag.name);
            }
            if result.zone.is_some() && result.region.is_some() {
                return Ok(result);
            }
        }

        if !region_label.is_empty() && result.region.is_none() {
            return Err(IcsError::ZoneRegionNotFound(format!(
                "region category {} does not match any tags for host {}",
                region_label, host_id
            )));
        }
        if !zone_label.is_empty() && result.zone.is_none() {
            return Err(IcsError::ZoneRegionNotFound(format!(
                "zone category {} does not match any tags for host {}",
                zone_label, host_id
            )));
        }
        Ok(result)
    }
}
