use crate::{
    FindVm, IcsError, NodeAddressType,
    core::infrastructure::node_watcher::apply_event,
    tests::fake_inventory::{FakeEndpoint, FakeInventory, cloud_config, k8s_node, vm},
};
use kube::runtime::watcher::Event;

const UUID_A: &str = "4210a1b2-0000-4000-8000-00000000000a";
const UUID_B: &str = "4210a1b2-0000-4000-8000-00000000000b";
const UUID_C: &str = "4210a1b2-0000-4000-8000-00000000000c";

fn inventory() -> FakeInventory {
    let mut inventory = FakeInventory::new();
    inventory.add(
        "10.1.0.1",
        FakeEndpoint::new()
            .datacenter("DC1")
            .datacenter("DC2")
            .vm("DC1", vm(UUID_A, "node-a", &[("k8s", "192.168.10.1")]))
            .vm("DC2", vm(UUID_B, "node-b", &[("k8s", "192.168.10.2")])),
    );
    inventory.add(
        "10.1.0.2",
        FakeEndpoint::new()
            .datacenter("DC1")
            .vm("DC1", vm(UUID_C, "node-c", &[("k8s", "192.168.10.3")])),
    );
    inventory
}

#[tokio::test]
async fn test_register_then_unregister_keeps_index() {
    let provider = inventory().provider(cloud_config(&["10.1.0.1", "10.1.0.2"]));
    let nodes = provider.node_manager();
    let node = k8s_node("node-a", &UUID_A.to_uppercase());

    provider.register_node(&node).await;
    assert!(nodes.is_registered(UUID_A).await);
    assert_eq!(nodes.indexed_count().await, 1);
    assert_eq!(provider.export_nodes("", "").await.unwrap().len(), 1);

    provider.unregister_node(&node).await;
    assert!(!nodes.is_registered(UUID_A).await);
    assert_eq!(nodes.indexed_count().await, 1);
    assert!(nodes.is_indexed(UUID_A).await);
    assert!(provider.export_nodes("", "").await.unwrap().is_empty());
    assert!(matches!(
        provider.find_node_info(UUID_A).await,
        Err(IcsError::VmNotFound(_))
    ));
}

#[tokio::test]
async fn test_find_node_info_ignores_case() {
    let provider = inventory().provider(cloud_config(&["10.1.0.1", "10.1.0.2"]));
    provider.register_node(&k8s_node("node-c", UUID_C)).await;

    let upper = provider.find_node_info(&UUID_C.to_uppercase()).await.unwrap();
    let padded = provider.find_node_info(&format!("  {}\n", UUID_C)).await.unwrap();
    assert_eq!(upper.uuid, UUID_C);
    assert_eq!(padded.uuid, UUID_C);
    assert_eq!(upper.ics_server, "10.1.0.2");
    assert_eq!(upper.instance_type, "ics-vm.cpu-4.mem-8gb.os-CentOS");
}

#[tokio::test]
async fn test_unresolvable_node_is_still_registered() {
    let provider = inventory().provider(cloud_config(&["10.1.0.1", "10.1.0.2"]));
    let nodes = provider.node_manager();
    let ghost = "ffffffff-0000-4000-8000-000000000000";

    provider.register_node(&k8s_node("ghost", ghost)).await;
    assert!(nodes.is_registered(ghost).await);
    assert_eq!(nodes.indexed_count().await, 0);
    assert!(provider.find_node_info(ghost).await.is_err());
}

#[tokio::test]
async fn test_node_without_system_uuid_is_ignored() {
    let provider = inventory().provider(cloud_config(&["10.1.0.1"]));
    provider.register_node(&k8s_node("blank", "  ")).await;
    assert_eq!(provider.node_manager().indexed_count().await, 0);
    assert!(!provider.node_manager().is_registered("").await);
}

#[tokio::test]
async fn test_export_filters() {
    let provider = inventory().provider(cloud_config(&["10.1.0.1", "10.1.0.2"]));
    for (name, uuid) in [("node-a", UUID_A), ("node-b", UUID_B), ("node-c", UUID_C)] {
        provider.register_node(&k8s_node(name, uuid)).await;
    }

    assert_eq!(provider.export_nodes("", "").await.unwrap().len(), 3);
    assert_eq!(provider.export_nodes("", "DC2").await.unwrap().len(), 3);
    assert_eq!(provider.export_nodes("10.1.0.1", "").await.unwrap().len(), 2);

    let dc2 = provider.export_nodes("10.1.0.1", "DC2").await.unwrap();
    assert_eq!(dc2.len(), 1);
    assert_eq!(dc2[0].uuid, UUID_B);
    assert_eq!(dc2[0].name, "node-b");

    assert!(matches!(
        provider.export_nodes("10.9.9.9", "").await,
        Err(IcsError::EndpointNotFound(_))
    ));
    assert!(matches!(
        provider.export_nodes("10.1.0.2", "DC2").await,
        Err(IcsError::DatacenterNotFound(_))
    ));
}

#[tokio::test]
async fn test_get_node_record() {
    let provider = inventory().provider(cloud_config(&["10.1.0.1", "10.1.0.2"]));
    provider.register_node(&k8s_node("node-a", UUID_A)).await;

    let record = provider.get_node(UUID_A).await.unwrap();
    assert_eq!(record.icenter, "10.1.0.1");
    assert_eq!(record.datacenter, "DC1");
    assert_eq!(record.name, "node-a");
    assert_eq!(record.dns_names, vec!["node-a".to_string()]);
    assert_eq!(record.addresses, vec!["192.168.10.1".to_string()]);
}

#[tokio::test]
async fn test_subnet_policy_through_discovery() {
    let mut inventory = FakeInventory::new();
    inventory.add(
        "10.1.1.1",
        FakeEndpoint::new().datacenter("DC1").vm(
            "DC1",
            vm(
                UUID_A,
                "node-a",
                &[("mgmt", "172.16.0.4"), ("public", "203.0.113.9"), ("ll", "169.254.0.1")],
            ),
        ),
    );
    let mut config = cloud_config(&["10.1.1.1"]);
    config.nodes.internal_network_subnet_cidr = "172.16.0.0/16".to_string();
    config.nodes.external_network_subnet_cidr = "203.0.113.0/24".to_string();
    let provider = inventory.provider(config);

    let info = provider.discover_node(UUID_A, FindVm::ByUuid).await.unwrap();
    let of = |kind: NodeAddressType| -> Vec<&str> {
        info.addresses
            .iter()
            .filter(|a| a.address_type == kind)
            .map(|a| a.address.as_str())
            .collect()
    };
    assert_eq!(of(NodeAddressType::InternalIp), vec!["172.16.0.4"]);
    assert_eq!(of(NodeAddressType::ExternalIp), vec!["203.0.113.9"]);
    assert_eq!(of(NodeAddressType::Hostname), vec!["node-a"]);
}

#[tokio::test]
async fn test_malformed_cidr_fails_build() {
    let mut config = cloud_config(&["10.1.0.1"]);
    config.nodes.internal_network_subnet_cidr = "not-a-cidr".to_string();
    let result = crate::IcsCloudProvider::builder()
        .config(config)
        .session_factory(std::sync::Arc::new(inventory()))
        .build();
    assert!(matches!(result, Err(IcsError::InvalidConfiguration(_))));
}

#[tokio::test]
async fn test_instance_metadata() {
    let provider = inventory().provider(cloud_config(&["10.1.0.1", "10.1.0.2"]));

    let metadata = provider
        .instance_metadata(&format!("ics://{}", UUID_B.to_uppercase()))
        .await
        .unwrap();
    assert_eq!(metadata.provider_id, format!("ics://{}", UUID_B));
    assert_eq!(metadata.instance_type, "ics-vm.cpu-4.mem-8gb.os-CentOS");
    assert!(
        metadata
            .node_addresses
            .iter()
            .any(|a| a.type_ == "InternalIP" && a.address == "192.168.10.2")
    );
    assert_eq!(metadata.zone, None);

    assert!(provider.instance_metadata("ics://").await.is_err());
}

#[tokio::test]
async fn test_watch_events_drive_registration() {
    let provider = inventory().provider(cloud_config(&["10.1.0.1", "10.1.0.2"]));
    let nodes = provider.node_manager();

    apply_event(
        nodes,
        Event::Restarted(vec![k8s_node("node-a", UUID_A), k8s_node("node-b", UUID_B)]),
    )
    .await;
    assert!(nodes.is_registered(UUID_A).await);
    assert!(nodes.is_registered(UUID_B).await);

    apply_event(nodes, Event::Applied(k8s_node("node-c", UUID_C))).await;
    assert!(nodes.is_registered(UUID_C).await);
    assert_eq!(nodes.indexed_count().await, 3);

    apply_event(nodes, Event::Deleted(k8s_node("node-b", UUID_B))).await;
    assert!(!nodes.is_registered(UUID_B).await);
    assert_eq!(provider.export_nodes("", "").await.unwrap().len(), 2);

    let by_name = nodes.find_node_info_by_name("node-a").await.unwrap();
    assert_eq!(by_name.uuid, UUID_A);
    assert!(nodes.find_node_info_by_name("node-b").await.is_err());
}

#[tokio::test]
async fn test_watch_restart_drops_nodes_deleted_meanwhile() {
    let provider = inventory().provider(cloud_config(&["10.1.0.1", "10.1.0.2"]));
    let nodes = provider.node_manager();
    for (name, uuid) in [("node-a", UUID_A), ("node-b", UUID_B), ("node-c", UUID_C)] {
        provider.register_node(&k8s_node(name, uuid)).await;
    }

    apply_event(
        nodes,
        Event::Restarted(vec![
            k8s_node("node-a", &UUID_A.to_uppercase()),
            k8s_node("node-c", UUID_C),
        ]),
    )
    .await;

    assert!(nodes.is_registered(UUID_A).await);
    assert!(!nodes.is_registered(UUID_B).await);
    assert!(nodes.is_registered(UUID_C).await);
    assert!(nodes.is_indexed(UUID_B).await);
    assert_eq!(provider.export_nodes("", "").await.unwrap().len(), 2);
}
