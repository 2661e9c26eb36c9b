use futures::future::try_join_all;
use proptest::prelude::*;
use repliquay::config::{HostTarget, RunConfig};
use repliquay::registry::transport::ApiRequest;
use repliquay::registry::{Dispatcher, HttpTransport};
use repliquay::testing::MockTransport;
use std::sync::Arc;
use std::time::Duration;

const HOST: &str = "quay.example.com";

fn run_burst(max_connections: usize, calls: usize, latency_ms: u64) -> (usize, usize, u64) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();

    runtime.block_on(async {
        let mock = MockTransport::new();
        mock.set_latency(Duration::from_millis(latency_ms));
        let config = RunConfig {
            sleep_period: Duration::from_millis(1),
            ..RunConfig::default()
        };
        let dispatcher = Dispatcher::new(
            HostTarget::new(HOST, "token", max_connections),
            &config,
            Arc::clone(&mock) as Arc<dyn HttpTransport>,
        );

        let requests: Vec<_> = (0..calls)
            .map(|i| ApiRequest::get(format!("/api/v1/organization/org{}", i), format!("get org{}", i)))
            .collect();
        try_join_all(requests.iter().map(|r| dispatcher.execute(r)))
            .await
            .unwrap();

        let stats = dispatcher.stats();
        (
            mock.peak_concurrency(HOST),
            stats.admission.peak_in_flight,
            stats.admission.completed,
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_in_flight_never_exceeds_max_connections(
        max_connections in 1usize..6,
        calls in 1usize..40,
        latency_ms in 1u64..20,
    ) {
        let (observed_peak, gate_peak, completed) = run_burst(max_connections, calls, latency_ms);

        prop_assert!(observed_peak <= max_connections);
        prop_assert!(gate_peak <= max_connections);
        prop_assert_eq!(completed, calls as u64);
    }
}

#[test]
fn test_cap_is_reached_under_load() {
    let (observed_peak, _, _) = run_burst(3, 20, 10);
    assert_eq!(observed_peak, 3);
}
