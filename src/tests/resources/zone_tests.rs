use crate::{
    IcsError,
    tests::fake_inventory::{FakeEndpoint, FakeInventory, cloud_config, vm},
};

const ZONE: &str = "k8s-zone";
const REGION: &str = "k8s-region";

fn multi_endpoint_inventory() -> FakeInventory {
    let mut inventory = FakeInventory::new();
    inventory.add(
        "10.2.0.1",
        FakeEndpoint::new()
            .datacenter("DC1")
            .host("DC1", "host-1", &[(ZONE, "zone-a"), (REGION, "region-1")])
            .host("DC1", "host-2", &[(ZONE, "zone-a")]),
    );
    inventory.add(
        "10.2.0.2",
        FakeEndpoint::new()
            .datacenter("DC1")
            .datacenter("DC2")
            .host("DC2", "host-3", &[(REGION, "Region-1"), (ZONE, "Zone-B")]),
    );
    inventory
}

fn labelled(servers: &[&str]) -> crate::CloudConfig {
    let mut config = cloud_config(servers);
    config.labels.zone = ZONE.to_string();
    config.labels.region = REGION.to_string();
    config
}

#[tokio::test]
async fn test_single_endpoint_single_datacenter_needs_no_labels() {
    let mut inventory = FakeInventory::new();
    inventory.add("10.2.1.1", FakeEndpoint::new().datacenter("Only"));
    let provider = inventory.provider(cloud_config(&["10.2.1.1"]));

    let found = provider.zone_discovery("", "").await.unwrap();
    assert_eq!(found.ics_server, "10.2.1.1");
    assert_eq!(found.datacenter.name, "Only");
}

#[tokio::test]
async fn test_zone_search_matches_case_insensitively() {
    let provider = multi_endpoint_inventory().provider(labelled(&["10.2.0.1", "10.2.0.2"]));

    let found = provider.zone_discovery("zone-b", "REGION-1").await.unwrap();
    assert_eq!(found.ics_server, "10.2.0.2");
    assert_eq!(found.datacenter.name, "DC2");
    assert_eq!(found.tenant_ref, "10.2.0.2");

    let found = provider.zone_discovery("zone-a", "region-1").await.unwrap();
    assert_eq!(found.ics_server, "10.2.0.1");
}

#[tokio::test]
async fn test_zone_search_requires_labels() {
    let provider = multi_endpoint_inventory().provider(cloud_config(&["10.2.0.1", "10.2.0.2"]));
    assert!(matches!(
        provider.zone_discovery("zone-a", "region-1").await,
        Err(IcsError::InvalidConfiguration(_))
    ));
}

#[tokio::test]
async fn test_unknown_zone_is_not_found() {
    let provider = multi_endpoint_inventory().provider(labelled(&["10.2.0.1", "10.2.0.2"]));
    assert!(matches!(
        provider.zone_discovery("zone-z", "region-1").await,
        Err(IcsError::ZoneRegionNotFound(_))
    ));
}

#[tokio::test]
async fn test_lookup_zone_by_host() {
    let provider = multi_endpoint_inventory().provider(labelled(&["10.2.0.1", "10.2.0.2"]));
    let connections = provider.connections();

    let found = connections
        .lookup_zone_by_host("10.2.0.1", "host-1", ZONE, REGION)
        .await
        .unwrap();
    assert_eq!(found.zone.as_deref(), Some("zone-a"));
    assert_eq!(found.region.as_deref(), Some("region-1"));

    assert!(matches!(
        connections.lookup_zone_by_host("10.2.0.1", "host-2", ZONE, REGION).await,
        Err(IcsError::ZoneRegionNotFound(_))
    ));
    let zone_only = connections
        .lookup_zone_by_host("10.2.0.1", "host-2", ZONE, "")
        .await
        .unwrap();
    assert_eq!(zone_only.zone.as_deref(), Some("zone-a"));
    assert_eq!(zone_only.region, None);

    assert!(matches!(
        connections.lookup_zone_by_host("nowhere", "host-1", ZONE, REGION).await,
        Err(IcsError::EndpointNotFound(_))
    ));
}

#[tokio::test]
async fn test_instance_metadata_reads_zone_from_host() {
    let uuid = "9f0c0000-0000-4000-8000-000000000001";
    let mut node_vm = vm(uuid, "node-z", &[("k8s", "192.168.20.1")]);
    node_vm.host_id = Some("host-1".to_string());

    let mut inventory = FakeInventory::new();
    inventory.add(
        "10.2.2.1",
        FakeEndpoint::new()
            .datacenter("DC1")
            .vm("DC1", node_vm)
            .host("DC1", "host-1", &[(ZONE, "zone-a"), (REGION, "region-1")]),
    );
    let provider = inventory.provider(labelled(&["10.2.2.1"]));

    let metadata = provider
        .instance_metadata(&format!("ics://{}", uuid))
        .await
        .unwrap();
    assert_eq!(metadata.zone.as_deref(), Some("zone-a"));
    assert_eq!(metadata.region.as_deref(), Some("region-1"));
}

#[tokio::test]
async fn test_host_listing_failure_is_reported() {
    let mut inventory = FakeInventory::new();
    inventory.add(
        "10.2.3.1",
        FakeEndpoint::new()
            .datacenter("DC1")
            .host("DC1", "host-1", &[(ZONE, "zone-a"), (REGION, "region-1")]),
    );
    inventory.add(
        "10.2.3.2",
        FakeEndpoint::new().datacenter("DC1").failing_host_listing(),
    );
    let provider = inventory.provider(labelled(&["10.2.3.1", "10.2.3.2"]));

    assert!(matches!(
        provider.zone_discovery("zone-b", "region-1").await,
        Err(IcsError::Connection(_))
    ));
    let found = provider.zone_discovery("zone-a", "region-1").await.unwrap();
    assert_eq!(found.ics_server, "10.2.3.1");
}
