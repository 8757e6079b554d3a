//! # Data Plane Flows
//!
//! Message delivery, duplicate suppression and neighbor loss across
//! several nodes.

#[cfg(test)]
mod tests {
    use super::super::harness::*;
    use node_runtime::NodeToNode;
    use shared_bus::NodeEvent;

    // =========================================================================
    // DELIVERY
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_full_mesh_delivers_each_message_once_per_node() {
        let mut mesh = Mesh::subscribed(3, &config(1)).await;
        mesh.instruct_full_mesh(1);
        settle().await;
        for mesh_node in &mut mesh.nodes {
            mesh_node.drain_events();
        }

        let publisher = Mesh::node_id(0);
        for n in 0..5 {
            mesh.node(0).publish(chained_message(&publisher, n)).unwrap();
        }
        settle().await;

        let mut total_duplicates = 0;
        for mesh_node in &mut mesh.nodes {
            let events = mesh_node.drain_events();
            assert_eq!(count_unseen(&events), 5, "node {}", mesh_node.node.node_id());
            total_duplicates += count_duplicates(&events);
        }
        // Four deliveries per message, two of them first-seen.
        assert_eq!(total_duplicates, 2 * 5);
        mesh.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_line_topology_relays_through_middle_node() {
        let mut mesh = Mesh::subscribed(3, &config(1)).await;
        mesh.instruct(0, &[1], 1);
        mesh.instruct(1, &[0, 2], 1);
        mesh.instruct(2, &[1], 1);
        settle().await;
        mesh.nodes[2].drain_events();

        let message = chained_message(&Mesh::node_id(0), 0);
        mesh.node(0).publish(message.clone()).unwrap();
        settle().await;

        let events = mesh.nodes[2].drain_events();
        assert!(events.contains(&NodeEvent::UnseenMessageReceived {
            message,
            source: Some(Mesh::node_id(1)),
        }));
        assert_eq!(count_duplicates(&events), 0);
        mesh.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_neighbor_receives_message_still_propagating() {
        let mut mesh = Mesh::subscribed(3, &config(1)).await;
        mesh.instruct(0, &[1], 1);
        mesh.instruct(1, &[0], 1);
        settle().await;

        let message = chained_message(&Mesh::node_id(0), 0);
        mesh.node(0).publish(message.clone()).unwrap();
        settle().await;
        assert_eq!(mesh.node(0).num_of_active_propagation_tasks(), 1);
        mesh.nodes[2].drain_events();

        mesh.instruct(0, &[1, 2], 2);
        mesh.instruct(2, &[0], 1);
        settle().await;

        let events = mesh.nodes[2].drain_events();
        assert!(events.contains(&NodeEvent::UnseenMessageReceived {
            message,
            source: Some(Mesh::node_id(0)),
        }));
        assert_eq!(mesh.node(0).num_of_active_propagation_tasks(), 0);
        mesh.stop().await;
    }

    // =========================================================================
    // NEIGHBOR LOSS
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_crashed_node_is_removed_from_every_neighbor_set() {
        let mesh = Mesh::subscribed(3, &config(1)).await;
        mesh.instruct_full_mesh(1);
        settle().await;

        let crashed = Mesh::node_id(2);
        mesh.network.endpoint(&crashed).unwrap().stop().await;
        settle().await;

        for i in 0..2 {
            let neighbors = mesh.node(i).get_neighbors_for_stream_part(&stream_part()).unwrap();
            assert!(!neighbors.contains(&crashed), "node {i} still lists {crashed}");
            let last = mesh.nodes[i].tracker.statuses_for(&stream_part()).pop().unwrap();
            assert!(!last.stream_part.neighbors.contains(&crashed));
        }
        mesh.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_connection_closed_after_wait_time() {
        let cfg = config(1);
        let mesh = Mesh::subscribed(2, &cfg).await;
        mesh.instruct(0, &[1], 1);
        mesh.instruct(1, &[0], 1);
        settle().await;
        assert!(mesh.network.is_connected(&Mesh::node_id(0), &Mesh::node_id(1)));

        mesh.node(0).unsubscribe_from_stream_part(&stream_part()).unwrap();
        mesh.instruct(1, &[], 2);
        settle().await;
        assert!(mesh.network.is_connected(&Mesh::node_id(0), &Mesh::node_id(1)));

        tokio::time::sleep(cfg.disconnection_wait_time).await;
        settle().await;

        assert!(!mesh.network.is_connected(&Mesh::node_id(0), &Mesh::node_id(1)));
        assert!(mesh.node(1).get_neighbors().is_empty());
        mesh.stop().await;
    }
}
