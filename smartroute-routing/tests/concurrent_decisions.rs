use std::{sync::Arc, time::Duration};

use smartroute_routing::{
    Decision, FLEET, GroupConfig, MxCache, Router, RoutingConfig, RuleConfig, ServerConfig,
    StaticMxLookup,
};

fn router() -> Arc<Router> {
    let lookup = StaticMxLookup::new()
        .with("example.com", ["mx.example.com"])
        .with("bulk.example", ["in1.bulk.example", "in2.bulk.example"]);

    let config = RoutingConfig {
        servers: vec![
            ServerConfig::new("mx1", "relay:[10.0.0.1]:25", 40),
            ServerConfig::new("mx2", "relay:[10.0.0.2]:25", 40),
            ServerConfig::new("mx3", "relay:[10.0.0.3]:25", 20),
        ],
        groups: vec![GroupConfig::new("good", ["mx1", "mx2", "mx3"])],
        rules: vec![
            RuleConfig::new("default", ""),
            RuleConfig::new("example.com", "good"),
        ],
    };

    let cache = MxCache::new(Arc::new(lookup), Duration::from_secs(60));
    Arc::new(Router::new(&config, cache))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_keep_exact_counts() {
    let router = router();

    let tasks: Vec<_> = (0..8)
        .map(|task| {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                for i in 0..250 {
                    let request = if (task + i) % 2 == 0 {
                        "user@example.com"
                    } else {
                        "user@bulk.example"
                    };
                    let decision = router.decide(request).await;
                    assert!(matches!(decision, Decision::Route(_)), "{decision:?}");
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = router.snapshot();
    let group = snapshot.registry("good").unwrap();
    let fleet = snapshot.registry(FLEET).unwrap();

    assert_eq!(group.total_sent(), 1000);
    assert_eq!(fleet.total_sent(), 1000);

    // Convergence holds regardless of interleaving
    for stats in [group, fleet] {
        for server in &stats.servers {
            assert!(
                (server.current_fraction - server.target_fraction).abs() < 0.01,
                "{stats}"
            );
        }
    }

    assert_eq!(router.mx_cache().len(), 2);
}
