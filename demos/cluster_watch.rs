//! Example demonstrating cluster and node configuration callbacks.
//!
//! This example shows how to:
//! - Register named callbacks per scope
//! - Receive changes written by another participant through the store
//! - Replace and deregister callbacks
//! - Close the manager and cancel its watches
//!
//! Run with: cargo run --example cluster_watch

use cluster_config::prelude::*;
use cluster_config::store::MemoryStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
struct ClusterSpec {
    description: String,
    replicas: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeSpec {
    zone: String,
    weight: u32,
}

fn settle() {
    thread::sleep(Duration::from_millis(100));
}

fn main() -> Result<()> {
    println!("=== Cluster Watch Example ===\n");

    // One store shared by two participants.
    let store = Arc::new(MemoryStore::new());
    let manager = ConfigManager::new(store.clone())?;
    let peer = ConfigManager::new(store.clone())?;

    let notifications = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&notifications);
    manager.register_cluster_callback("cluster-logger", move |id, record| {
        counter.fetch_add(1, Ordering::SeqCst);
        let spec: ClusterSpec = record.decode_json()?;
        println!("[cluster-logger] {} {:?}: {:?}", id, record.action, spec);
        Ok(())
    })?;

    manager.register_node_callback("placement", |id, record| {
        if record.is_delete() {
            println!("[placement] node {} left", id);
            return Ok(());
        }
        let spec: NodeSpec = record.decode_json()?;
        println!("[placement] node {} in {} weight {}", id, spec.zone, spec.weight);
        Ok(())
    })?;

    manager.register_node_callback("strict-validator", |id, record| {
        let spec: NodeSpec = record.decode_json()?;
        if spec.weight == 0 {
            return Err(format!("node {} has zero weight", id).into());
        }
        Ok(())
    })?;

    println!("--- Peer writes cluster and node configuration ---");
    peer.set_cluster_config_json(
        "main",
        &ClusterSpec {
            description: "production".to_string(),
            replicas: 3,
        },
    )?;
    peer.set_node_config_json(
        "node-1",
        &NodeSpec {
            zone: "us-east-1a".to_string(),
            weight: 10,
        },
    )?;
    settle();

    println!("\n--- A zero weight fails one callback; the others still run ---");
    peer.set_node_config_json(
        "node-2",
        &NodeSpec {
            zone: "us-east-1b".to_string(),
            weight: 0,
        },
    )?;
    settle();

    println!("\n--- Replacing cluster-logger and removing strict-validator ---");
    manager.register_cluster_callback("cluster-logger", |id, _record| {
        println!("[cluster-logger v2] {} changed", id);
        Ok(())
    })?;
    manager.deregister_node_callback("strict-validator");
    peer.set_cluster_config_json(
        "main",
        &ClusterSpec {
            description: "production".to_string(),
            replicas: 5,
        },
    )?;
    peer.delete_node_config("node-2")?;
    settle();

    let current: ClusterSpec = manager.get_cluster_config_json("main")?;
    println!("\nCurrent cluster spec: {:?}", current);
    let nodes: Vec<String> = manager
        .enumerate_node_configs()?
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    println!("Nodes: {:?}", nodes);
    println!(
        "First cluster-logger saw {} change(s)",
        notifications.load(Ordering::SeqCst)
    );

    manager.close()?;
    peer.close()?;
    println!("\nWatches remaining: {}", store.active_watches());
    println!("Example complete!");

    Ok(())
}
