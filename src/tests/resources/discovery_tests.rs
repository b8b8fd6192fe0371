use crate::{
    Credentials, FindVm, GLOBAL_SECRET_REF, ICenterConfig, IcsError,
    auth::application::service::credential_service::MockCredentialManager,
    tests::fake_inventory::{FakeEndpoint, FakeInventory, cloud_config, vm},
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TARGET_UUID: &str = "c7f4b777-6ffc-4473-85cc-382e3e719a85";

#[tokio::test]
async fn test_uuid_search_finds_vm_on_second_endpoint() {
    let mut inventory = FakeInventory::new();
    inventory.add(
        "10.0.0.1",
        FakeEndpoint::new()
            .datacenter("DC1")
            .vm("DC1", vm("11111111-0000-0000-0000-000000000000", "other", &[])),
    );
    inventory.add(
        "10.0.0.2",
        FakeEndpoint::new()
            .datacenter("DC1")
            .vm("DC1", vm(&TARGET_UUID.to_uppercase(), "worker-7", &[])),
    );
    let provider = inventory.provider(cloud_config(&["10.0.0.1", "10.0.0.2"]));

    let found = provider
        .connections()
        .which_endpoint_and_dc_by_node_id(&format!(" {} ", TARGET_UUID.to_uppercase()), FindVm::ByUuid)
        .await
        .unwrap();

    assert_eq!(found.ics_server, "10.0.0.2");
    assert_eq!(found.datacenter.name, "DC1");
    assert_eq!(found.uuid, TARGET_UUID);
    assert_eq!(found.node_name, "worker-7");
}

#[tokio::test]
async fn test_single_match_always_wins() {
    let mut inventory = FakeInventory::new();
    let servers = ["10.0.1.1", "10.0.1.2", "10.0.1.3"];
    for (i, server) in servers.iter().enumerate() {
        let mut endpoint = FakeEndpoint::new();
        for dc in 0..4 {
            let name = format!("DC{}", dc);
            endpoint = endpoint.datacenter(&name);
            let uuid = if i == 2 && dc == 3 {
                TARGET_UUID.to_string()
            } else {
                format!("00000000-0000-0000-000{}-00000000000{}", i, dc)
            };
            endpoint = endpoint.vm(&name, vm(&uuid, &format!("vm-{}-{}", i, dc), &[]));
        }
        inventory.add(server, endpoint);
    }
    let mut config = cloud_config(&servers);
    config.discovery.pool_size = 4;
    config.discovery.queue_size = 2;
    let provider = inventory.provider(config);

    for _ in 0..25 {
        let found = provider
            .connections()
            .which_endpoint_and_dc_by_node_id(TARGET_UUID, FindVm::ByUuid)
            .await
            .unwrap();
        assert_eq!(found.uuid, TARGET_UUID);
        assert_eq!(found.ics_server, "10.0.1.3");
        assert_eq!(found.datacenter.name, "DC3");
    }
}

#[tokio::test]
async fn test_exhausted_search_reports_vm_not_found() {
    let mut inventory = FakeInventory::new();
    let mut endpoint = FakeEndpoint::new();
    for dc in 0..20 {
        endpoint = endpoint.datacenter(&format!("DC{}", dc));
    }
    let endpoint = inventory.add("10.0.2.1", endpoint);
    let mut config = cloud_config(&["10.0.2.1"]);
    config.discovery.pool_size = 1;
    config.discovery.queue_size = 1;
    let provider = inventory.provider(config);

    let result = provider
        .connections()
        .which_endpoint_and_dc_by_node_id(TARGET_UUID, FindVm::ByUuid)
        .await;
    assert!(matches!(result, Err(IcsError::VmNotFound(_))));
    assert_eq!(endpoint.lookups.load(std::sync::atomic::Ordering::SeqCst), 20);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_skipped() {
    let mut inventory = FakeInventory::new();
    let down = inventory.add("10.0.3.1", FakeEndpoint::new().unreachable());
    inventory.add(
        "10.0.3.2",
        FakeEndpoint::new()
            .datacenter("DC1")
            .vm("DC1", vm(TARGET_UUID, "worker-1", &[])),
    );
    let provider = inventory.provider(cloud_config(&["10.0.3.1", "10.0.3.2"]));

    let found = provider
        .connections()
        .which_endpoint_and_dc_by_node_id(TARGET_UUID, FindVm::ByUuid)
        .await
        .unwrap();
    assert_eq!(found.ics_server, "10.0.3.2");
    assert_eq!(down.connect_count(), 3);
}

#[tokio::test]
async fn test_connection_failure_surfaces_when_nothing_matches() {
    let mut inventory = FakeInventory::new();
    inventory.add("10.0.4.1", FakeEndpoint::new().unreachable());
    inventory.add("10.0.4.2", FakeEndpoint::new().datacenter("DC1"));
    let provider = inventory.provider(cloud_config(&["10.0.4.1", "10.0.4.2"]));

    let result = provider
        .connections()
        .which_endpoint_and_dc_by_node_id(TARGET_UUID, FindVm::ByUuid)
        .await;
    assert!(matches!(result, Err(IcsError::Connection(_))));
}

#[tokio::test]
async fn test_name_search_falls_back_to_ip() {
    let mut inventory = FakeInventory::new();
    inventory.add(
        "10.0.5.1",
        FakeEndpoint::new().datacenter("DC1").vm(
            "DC1",
            vm(TARGET_UUID, "worker-1.cluster.local", &[("vm-net", "192.168.1.10")]),
        ),
    );
    let provider = inventory.provider(cloud_config(&["10.0.5.1"]));
    let connections = provider.connections();

    let by_name = connections
        .which_endpoint_and_dc_by_node_id("WORKER-1.cluster.local", FindVm::ByName)
        .await
        .unwrap();
    assert_eq!(by_name.node_name, "worker-1.cluster.local");

    let by_ip = connections
        .which_endpoint_and_dc_by_node_id("192.168.1.10", FindVm::ByName)
        .await
        .unwrap();
    assert_eq!(by_ip.node_name, "192.168.1.10");
    assert_eq!(by_ip.uuid, TARGET_UUID);

    assert!(matches!(
        connections
            .which_endpoint_and_dc_by_node_id("worker-2", FindVm::ByName)
            .await,
        Err(IcsError::VmNotFound(_))
    ));
}

#[tokio::test]
async fn test_datacenter_allow_list() {
    let mut inventory = FakeInventory::new();
    inventory.add(
        "10.0.6.1",
        FakeEndpoint::new()
            .datacenter("DC1")
            .datacenter("DC2")
            .vm("DC1", vm(TARGET_UUID, "worker-1", &[])),
    );

    let mut config = cloud_config(&[]);
    config.icenters.insert(
        "10.0.6.1".to_string(),
        ICenterConfig {
            datacenters: "DC2, ".to_string(),
            ..Default::default()
        },
    );
    let provider = inventory.provider(config.clone());
    assert!(matches!(
        provider
            .connections()
            .which_endpoint_and_dc_by_node_id(TARGET_UUID, FindVm::ByUuid)
            .await,
        Err(IcsError::VmNotFound(_))
    ));

    config.icenters.insert(
        "10.0.6.1".to_string(),
        ICenterConfig {
            datacenters: "DCX,DC2".to_string(),
            ..Default::default()
        },
    );
    let provider = inventory.provider(config);
    assert!(matches!(
        provider
            .connections()
            .which_endpoint_and_dc_by_node_id(TARGET_UUID, FindVm::ByUuid)
            .await,
        Err(IcsError::DatacenterNotFound(_))
    ));
}

#[tokio::test]
async fn test_secret_backed_endpoint_fetches_credentials() {
    let mut inventory = FakeInventory::new();
    let endpoint = inventory.add(
        "10.0.7.1",
        FakeEndpoint::new()
            .datacenter("DC1")
            .vm("DC1", vm(TARGET_UUID, "worker-1", &[]))
            .requires(Credentials::new("svc-k8s", "from-secret")),
    );

    let mut creds = MockCredentialManager::new();
    creds
        .expect_get_credential()
        .withf(|server| server == "10.0.7.1")
        .times(1)
        .returning(|_| Ok(Credentials::new("svc-k8s", "from-secret")));

    let provider = crate::IcsCloudProvider::builder()
        .config(cloud_config(&["10.0.7.1"]))
        .session_factory(Arc::new(inventory.clone()))
        .credential_manager(GLOBAL_SECRET_REF, Arc::new(creds))
        .build()
        .unwrap();

    let found = provider
        .connections()
        .which_endpoint_and_dc_by_node_id(TARGET_UUID, FindVm::ByUuid)
        .await
        .unwrap();
    assert_eq!(found.ics_server, "10.0.7.1");
    assert_eq!(endpoint.current_credentials().username(), "svc-k8s");
}

#[tokio::test]
async fn test_missing_credential_manager_skips_endpoint() {
    let mut inventory = FakeInventory::new();
    inventory.add(
        "10.0.8.1",
        FakeEndpoint::new()
            .datacenter("DC1")
            .requires(Credentials::new("other", "other")),
    );
    inventory.add(
        "10.0.8.2",
        FakeEndpoint::new()
            .datacenter("DC1")
            .vm("DC1", vm(TARGET_UUID, "worker-1", &[])),
    );
    let provider = inventory.provider(cloud_config(&["10.0.8.1", "10.0.8.2"]));

    let found = provider
        .connections()
        .which_endpoint_and_dc_by_node_id(TARGET_UUID, FindVm::ByUuid)
        .await
        .unwrap();
    assert_eq!(found.ics_server, "10.0.8.2");

    assert!(matches!(
        provider.verify().await,
        Err(IcsError::CredentialManagerNotFound(_))
    ));
}

#[tokio::test]
async fn test_list_all_pairs_sorted() {
    let mut inventory = FakeInventory::new();
    inventory.add("10.0.9.2", FakeEndpoint::new().datacenter("DC-B").datacenter("DC-A"));
    inventory.add("10.0.9.1", FakeEndpoint::new().datacenter("DC1"));
    inventory.add("10.0.9.3", FakeEndpoint::new().datacenter("DC9").unreachable());
    let provider = inventory.provider(cloud_config(&["10.0.9.2", "10.0.9.3", "10.0.9.1"]));

    let pairs: Vec<(String, String)> = provider
        .list_all_pairs()
        .await
        .into_iter()
        .map(|p| (p.ics_server, p.datacenter.name))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("10.0.9.1".to_string(), "DC1".to_string()),
            ("10.0.9.2".to_string(), "DC-A".to_string()),
            ("10.0.9.2".to_string(), "DC-B".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_shutdown_logs_out_connected_endpoints() {
    let mut inventory = FakeInventory::new();
    let endpoint = inventory.add("10.0.10.1", FakeEndpoint::new().datacenter("DC1"));
    let provider = inventory.provider(cloud_config(&["10.0.10.1"]));

    provider.verify().await.unwrap();
    assert!(crate::EndpointSession::is_connected(endpoint.as_ref()).await);

    provider.shutdown().await;
    assert!(!crate::EndpointSession::is_connected(endpoint.as_ref()).await);
}

#[tokio::test]
async fn test_expired_session_is_renewed_once_by_concurrent_searches() {
    let mut inventory = FakeInventory::new();
    let mut endpoint = FakeEndpoint::new().slow_login(Duration::from_millis(20));
    for dc in 0..4 {
        endpoint = endpoint.datacenter(&format!("DC{}", dc));
    }
    let endpoint = inventory.add(
        "10.0.11.1",
        endpoint.vm("DC3", vm(TARGET_UUID, "worker-1", &[])),
    );
    let mut config = cloud_config(&["10.0.11.1"]);
    config.discovery.pool_size = 4;
    let provider = inventory.provider(config);

    provider.verify().await.unwrap();
    assert_eq!(endpoint.login_count(), 1);
    endpoint.expire();

    let searches = (0..8).map(|_| {
        provider
            .connections()
            .which_endpoint_and_dc_by_node_id(TARGET_UUID, FindVm::ByUuid)
    });
    for found in futures::future::join_all(searches).await {
        assert_eq!(found.unwrap().datacenter.name, "DC3");
    }
    assert_eq!(endpoint.login_count(), 2);
}

#[tokio::test]
async fn test_match_returned_while_later_endpoint_retries() {
    let mut inventory = FakeInventory::new();
    inventory.add(
        "10.0.12.1",
        FakeEndpoint::new()
            .datacenter("DC1")
            .vm("DC1", vm(TARGET_UUID, "worker-1", &[])),
    );
    inventory.add("10.0.12.2", FakeEndpoint::new().unreachable());
    let mut config = cloud_config(&["10.0.12.1", "10.0.12.2"]);
    config.discovery.retry_delay_ms = 1000;
    let provider = inventory.provider(config);

    let started = Instant::now();
    let found = provider
        .connections()
        .which_endpoint_and_dc_by_node_id(TARGET_UUID, FindVm::ByUuid)
        .await
        .unwrap();
    assert_eq!(found.ics_server, "10.0.12.1");
    assert!(started.elapsed() < Duration::from_millis(900));
}
