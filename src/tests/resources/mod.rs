mod discovery_tests;
mod node_tests;
mod zone_tests;
