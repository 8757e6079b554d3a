//! # Tracker Flows
//!
//! Instruction handling, join operations and status reporting as seen from
//! the tracker side.

#[cfg(test)]
mod tests {
    use super::super::harness::*;
    use node_runtime::NodeError;
    use shared_bus::NodeEvent;
    use sm_03_tracker_sync::NodeToTracker;
    use std::time::Duration;

    // =========================================================================
    // JOIN OPERATIONS
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_join_completes_with_neighbor_count() {
        let mesh = Mesh::start(3, &config(1));
        let node = mesh.node(0).clone();
        let waiter = tokio::spawn(async move {
            node.subscribe_and_wait_for_join_operation(&stream_part(), None)
                .await
        });
        settle().await;

        mesh.instruct(0, &[1, 2], 1);

        assert_eq!(waiter.await.unwrap(), Ok(2));
        mesh.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_fails_when_every_target_is_unreachable() {
        let mesh = Mesh::start(2, &config(1));
        mesh.network.set_unreachable(&Mesh::node_id(1), true);
        let node = mesh.node(0).clone();
        let waiter = tokio::spawn(async move {
            node.subscribe_and_wait_for_join_operation(&stream_part(), None)
                .await
        });
        settle().await;

        mesh.instruct(0, &[1], 1);

        assert!(matches!(
            waiter.await.unwrap(),
            Err(NodeError::JoinFailed { .. })
        ));
        mesh.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_join_reports_reachable_neighbors() {
        let mesh = Mesh::start(3, &config(1));
        mesh.network.set_unreachable(&Mesh::node_id(2), true);
        let node = mesh.node(0).clone();
        let waiter = tokio::spawn(async move {
            node.subscribe_and_wait_for_join_operation(&stream_part(), None)
                .await
        });
        settle().await;

        mesh.instruct(0, &[1, 2], 1);

        assert_eq!(waiter.await.unwrap(), Ok(1));
        let last = mesh.nodes[0].tracker.statuses_for(&stream_part()).pop().unwrap();
        assert_eq!(last.stream_part.neighbors, vec![Mesh::node_id(1)]);
        mesh.stop().await;
    }

    // =========================================================================
    // INSTRUCTIONS
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_newer_instruction_replaces_neighbors() {
        let mut mesh = Mesh::subscribed(3, &config(1)).await;
        mesh.instruct(0, &[1], 1);
        settle().await;
        mesh.nodes[0].drain_events();

        mesh.instruct(0, &[2], 2);
        settle().await;

        assert_eq!(
            mesh.node(0).get_neighbors_for_stream_part(&stream_part()).unwrap(),
            vec![Mesh::node_id(2)]
        );
        let events = mesh.nodes[0].drain_events();
        assert!(events.contains(&NodeEvent::NodeUnsubscribed {
            node_id: Mesh::node_id(1),
            stream_part_id: stream_part(),
        }));
        assert!(events.contains(&NodeEvent::NodeSubscribed {
            node_id: Mesh::node_id(2),
            stream_part_id: stream_part(),
        }));
        mesh.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_instruction_is_dropped() {
        let mesh = Mesh::subscribed(3, &config(1)).await;
        mesh.instruct(0, &[1], 5);
        settle().await;

        mesh.instruct(0, &[2], 3);
        settle().await;

        assert_eq!(
            mesh.node(0).get_neighbors_for_stream_part(&stream_part()).unwrap(),
            vec![Mesh::node_id(1)]
        );
        mesh.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_instruction_from_unexpected_tracker_is_ignored() {
        let mesh = Mesh::subscribed(2, &config(3)).await;
        let owner = mesh.node(0).get_tracker_id(&stream_part());
        let stranger = trackers(3)
            .into_iter()
            .map(|t| t.id)
            .find(|id| *id != owner)
            .unwrap();

        mesh.instruct_from(0, &[1], 1, stranger);
        settle().await;
        assert!(mesh.node(0).get_neighbors().is_empty());

        mesh.instruct_from(0, &[1], 2, owner);
        settle().await;
        assert_eq!(mesh.node(0).get_neighbors(), vec![Mesh::node_id(1)]);
        mesh.stop().await;
    }

    // =========================================================================
    // STATUS REPORTING
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_statuses_go_to_owning_tracker_only() {
        let mesh = Mesh::subscribed(1, &config(3)).await;
        let owner = mesh.node(0).get_tracker_id(&stream_part());

        let statuses = mesh.nodes[0].tracker.statuses();
        assert!(!statuses.is_empty());
        assert!(statuses.iter().all(|(tracker_id, _)| *tracker_id == owner));
        for record in trackers(3) {
            assert_eq!(mesh.nodes[0].tracker.is_connected(&record.id), record.id == owner);
        }
        mesh.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_resent_after_tracker_reconnect() {
        let cfg = config(1);
        let mesh = Mesh::subscribed(1, &cfg).await;
        let tracker = &mesh.nodes[0].tracker;
        let owner = mesh.node(0).get_tracker_id(&stream_part());
        let sent_before = tracker.statuses().len();

        tracker.disconnect_from_tracker(&owner).await;
        tokio::time::sleep(cfg.tracker.tracker_connection_maintenance_interval + Duration::from_millis(1)).await;
        settle().await;

        assert!(tracker.is_connected(&owner));
        assert!(tracker.statuses().len() > sent_before);
        mesh.stop().await;
    }
}
