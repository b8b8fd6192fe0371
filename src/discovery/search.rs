//! Resolves a node identifier to the VM that backs it.

use super::{
    connection_manager::{ConnectionManager, EndpointConnection},
    fan_out::{self, Outcome, TaskSink},
};
use crate::core::domain::{
    error::{IcsError, IcsResult},
    model::{
        discovery::{FindVm, VmDiscoveryInfo},
        inventory::{Datacenter, VmRecord},
    },
    value_object::canonicalize,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// One datacenter to search.
struct DatacenterTask {
    connection: Arc<EndpointConnection>,
    datacenter: Datacenter,
}

impl ConnectionManager {
    /// Finds the endpoint and datacenter holding the VM identified by
    /// `node_id`.
    ///
    /// A name search that finds nothing is repeated in full as an IP search.
    ///
    /// # Errors
    /// `VmNotFound` when nothing matches and no endpoint failed; otherwise the
    /// last failure recorded during the search.
    #[instrument(skip(self))]
    pub async fn which_endpoint_and_dc_by_node_id(
        &self,
        node_id: &str,
        search_by: FindVm,
    ) -> IcsResult<VmDiscoveryInfo> {
        let uuid = canonicalize(node_id);
        let blank = match search_by {
            FindVm::ByUuid => uuid.is_empty(),
            FindVm::ByIp | FindVm::ByName => node_id.is_empty(),
        };
        if blank {
            return Err(IcsError::VmNotFound("empty node identifier".to_string()));
        }

        match search_by {
            FindVm::ByUuid => self.search_vm(uuid, FindVm::ByUuid).await,
            FindVm::ByIp => self.search_vm(node_id.to_string(), FindVm::ByIp).await,
            FindVm::ByName => match self.search_vm(node_id.to_string(), FindVm::ByName).await {
                Ok(found) => Ok(found),
                Err(err) => {
                    debug!(node_id, error = %err, "Name search failed, retrying as IP");
                    self.search_vm(node_id.to_string(), FindVm::ByIp).await
                }
            },
        }
    }

    async fn search_vm(&self, key: String, search_by: FindVm) -> IcsResult<VmDiscoveryInfo> {
        let key: Arc<str> = Arc::from(key);
        let producer = self.clone();
        let worker = self.clone();
        let worker_key = Arc::clone(&key);

        let outcome = fan_out::run(
            self.discovery(),
            move |sink| producer.enqueue_datacenters(sink),
            move |task: DatacenterTask| {
                let manager = worker.clone();
                let key = Arc::clone(&worker_key);
                async move { manager.find_in_datacenter(task, &key, search_by).await }
            },
        )
        .await;

        match outcome {
            Outcome::Found(found) => {
                info!(
                    node_id = %key,
                    uuid = %found.uuid,
                    server = %found.ics_server,
                    datacenter = %found.datacenter.name,
                    "Found VM"
                );
                Ok(found)
            }
            Outcome::Failed(err) => Err(err),
            Outcome::Exhausted => Err(IcsError::VmNotFound(format!("{} {}", search_by, key))),
        }
    }

    async fn enqueue_datacenters(self, sink: TaskSink<DatacenterTask, VmDiscoveryInfo>) {
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
                debug!(server = connection.server(), datacenter = %datacenter.name, "Queueing datacenter");
                let task = DatacenterTask {
                    connection: Arc::clone(connection),
                    datacenter,
                };
                if !sink.push(task).await {
                    return;
                }
            }
        }
    }

    /// Looks `key` up in one datacenter.
    ///
    /// The session is (re)established through [`ConnectionManager::connect_endpoint`]
    /// first, and once more if the lookup is rejected, so an expired session is
    /// renewed by one caller and stale credentials are refreshed.
    async fn find_in_datacenter(
        &self,
        task: DatacenterTask,
        key: &str,
        search_by: FindVm,
    ) -> IcsResult<Option<VmDiscoveryInfo>> {
        self.connect_endpoint(&task.connection).await?;
        let found = match lookup_vm(&task, key, search_by).await {
            Err(err) if err.is_invalid_credentials() => {
                debug!(server = task.connection.server(), error = %err, "Lookup rejected, reconnecting");
                self.connect_endpoint(&task.connection).await?;
                lookup_vm(&task, key, search_by).await
            }
            other => other,
        };

        let vm = match found {
            Ok(vm) => vm,
            Err(IcsError::VmNotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };

        let node_name = match search_by {
            FindVm::ByIp => key.to_string(),
            FindVm::ByUuid | FindVm::ByName => vm.name.clone(),
        };
        Ok(Some(VmDiscoveryInfo {
            tenant_ref: task.connection.config().tenant_ref().to_string(),
            ics_server: task.connection.server().to_string(),
            datacenter: task.datacenter,
            uuid: canonicalize(&vm.uuid),
            node_name,
            vm,
        }))
    }
}

async fn lookup_vm(task: &DatacenterTask, key: &str, search_by: FindVm) -> IcsResult<VmRecord> {
    let session = task.connection.session();
    match search_by {
        FindVm::ByUuid => session.find_vm_by_uuid(&task.datacenter, key).await,
        FindVm::ByName => session.find_vm_by_name(&task.datacenter, key).await,
        FindVm::ByIp => session.find_vm_by_ip(&task.datacenter, key).await,
    }
}
