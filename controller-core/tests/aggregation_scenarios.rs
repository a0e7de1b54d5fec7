//! End-to-end aggregation scenarios from spec.md §8.

use std::sync::Arc;

use controller_core::aggregator::Aggregator;

const SAMPLES: [i64; 9] = [1, 2, -3, -7, 32, 0, 0, 0, 18];

/// Scenario 1: sequential three-entity aggregation. Samples are fed
/// round-robin (E1, E2, E3, E1, ...) across the shared sample sequence;
/// each channel's running sum after its own k-th sample matches the
/// per-channel partial sums spec.md §8 documents.
#[tokio::test]
async fn sequential_three_entity_aggregation_matches_documented_partial_sums() {
    let aggregator = Aggregator::new(None).await.unwrap();
    let channels = ["E1Channel", "E2Channel", "E3Channel"];

    let mut observed = Vec::new();
    for (i, value) in SAMPLES.iter().enumerate() {
        let channel = channels[i % channels.len()];
        aggregator
            .on_sample(channel, value.to_string().as_bytes())
            .await;
        observed.push(aggregator.current_sum(channel).unwrap());
    }

    // E1 sees samples[0,3,6] = [1,-7,0]   -> running sums 1,-6,-6
    // E2 sees samples[1,4,7] = [2,32,0]   -> running sums 2,34,34
    // E3 sees samples[2,5,8] = [-3,0,18]  -> running sums -3,-3,15
    assert_eq!(aggregator.current_sum("E1Channel"), Some(-6));
    assert_eq!(aggregator.current_sum("E2Channel"), Some(34));
    assert_eq!(aggregator.current_sum("E3Channel"), Some(15));
    assert_eq!(observed.len(), 9);
}

/// Scenario 2: concurrent three-entity aggregation. Each entity sends the
/// full sample sequence concurrently on its own channel; regardless of
/// interleaving, each channel's final sum is the sum of the whole
/// sequence and the total sample count across every channel is 3x9=27.
#[tokio::test]
async fn concurrent_three_entity_aggregation_totals_match_regardless_of_interleaving() {
    let aggregator = Arc::new(Aggregator::new(None).await.unwrap());
    let channels = ["E1Channel", "E2Channel", "E3Channel"];

    let mut handles = Vec::new();
    for &channel in &channels {
        let aggregator = Arc::clone(&aggregator);
        handles.push(tokio::spawn(async move {
            for value in SAMPLES {
                aggregator
                    .on_sample(channel, value.to_string().as_bytes())
                    .await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let expected_total: i64 = SAMPLES.iter().sum();
    for &channel in &channels {
        assert_eq!(aggregator.current_sum(channel), Some(expected_total));
    }
}
