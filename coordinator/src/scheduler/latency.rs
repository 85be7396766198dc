use crate::{configs::SimulationConfig, error::ConfigErr};

/// When a client retrieves and commits, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientLatencyProfile {
    pub retrieve_tick: u64,
    pub commit_latency: u64,
}

impl ClientLatencyProfile {
    pub fn new(retrieve_tick: u64, commit_latency: u64) -> Self {
        Self {
            retrieve_tick,
            commit_latency,
        }
    }

    /// The length in ticks of one retrieve-train-commit cycle.
    pub fn cycle_phase(&self) -> u64 {
        self.retrieve_tick + self.commit_latency + 1
    }

    /// Whether the client retrieves the current snapshot at `tick`.
    pub fn starts_at(&self, tick: u64) -> bool {
        let phase = self.cycle_phase();
        self.retrieve_tick % phase == tick % phase
    }

    /// Whether the client commits its update at `tick`.
    pub fn stops_at(&self, tick: u64) -> bool {
        let phase = self.cycle_phase();
        (self.retrieve_tick + self.commit_latency) % phase == tick % phase
    }
}

/// Splits `n_clients` among the buckets of `distribution`.
///
/// Each bucket first gets the floor of its share, capped by the clients still
/// unassigned. Whatever is left is then handed out one client at a time, in bucket
/// order and cycling, to the buckets that still have room.
///
/// # Arguments
/// * `distribution` - The fraction of clients per bucket, adding up to at most 1.
/// * `n_clients` - The amount of clients to distribute.
///
/// # Returns
/// The amount of clients per bucket, always adding up to `n_clients`.
pub fn bucket_assignment(distribution: &[f64], n_clients: usize) -> Result<Vec<usize>, ConfigErr> {
    if distribution.is_empty() && n_clients > 0 {
        return Err(ConfigErr::Invalid(
            "can't assign clients without any bucket".into(),
        ));
    }

    let mut remaining = n_clients;
    let mut counts: Vec<usize> = distribution
        .iter()
        .map(|fraction| {
            let share = (fraction.max(0.0) * n_clients as f64).floor() as usize;
            let count = share.min(remaining);
            remaining -= count;
            count
        })
        .collect();

    while remaining > 0 {
        for count in counts.iter_mut().filter(|count| **count < n_clients) {
            if remaining == 0 {
                break;
            }

            *count += 1;
            remaining -= 1;
        }
    }

    Ok(counts)
}

/// Computes the latency profile of every client of a run.
///
/// Clients fill the buckets in order, so the first `counts[0]` clients get the
/// latency of the first bucket and so on.
pub fn profiles(config: &SimulationConfig) -> Result<Vec<ClientLatencyProfile>, ConfigErr> {
    let counts = bucket_assignment(&config.retrieve_distribution, config.n_clients)?;

    let profiles = counts
        .iter()
        .zip(&config.commit_latency)
        .flat_map(|(&count, &latency)| {
            std::iter::repeat_n(ClientLatencyProfile::new(0, latency), count)
        })
        .collect();

    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn test_largest_remainder_example() {
        assert_eq!(bucket_assignment(&[0.5, 0.4], 4).unwrap(), [3, 1]);
    }

    #[test]
    fn test_exact_split() {
        assert_eq!(bucket_assignment(&[0.25, 0.75], 8).unwrap(), [2, 6]);
        assert_eq!(bucket_assignment(&[1.0], 3).unwrap(), [3]);
    }

    #[test]
    fn test_zero_fractions_take_leftovers() {
        assert_eq!(bucket_assignment(&[0.0, 0.0], 3).unwrap(), [2, 1]);
    }

    #[test]
    fn test_no_buckets() {
        assert!(bucket_assignment(&[], 2).is_err());
        assert_eq!(bucket_assignment(&[], 0).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn test_assignment_always_sums_to_clients() {
        let mut rng = rand::rng();

        for _ in 0..500 {
            let buckets = rng.random_range(1..=6);
            let mut budget = 1.0;
            let distribution: Vec<f64> = (0..buckets)
                .map(|_| {
                    let fraction = rng.random_range(0.0..=budget);
                    budget -= fraction;
                    fraction
                })
                .collect();
            let n_clients = rng.random_range(0..200);

            let counts = bucket_assignment(&distribution, n_clients).unwrap();
            assert_eq!(counts.iter().sum::<usize>(), n_clients, "{distribution:?}");
        }
    }

    #[test]
    fn test_two_clients_one_tick_latency() {
        let profile = ClientLatencyProfile::new(0, 1);
        assert_eq!(profile.cycle_phase(), 2);

        assert!(profile.starts_at(0));
        assert!(!profile.stops_at(0));
        assert!(!profile.starts_at(1));
        assert!(profile.stops_at(1));
        assert!(profile.starts_at(2));
    }

    #[test]
    fn test_zero_latency_starts_and_stops_every_tick() {
        let profile = ClientLatencyProfile::new(0, 0);

        for tick in 0..5 {
            assert!(profile.starts_at(tick));
            assert!(profile.stops_at(tick));
        }
    }

    #[test]
    fn test_profiles_follow_bucket_order() {
        let config: SimulationConfig = serde_json::from_value(serde_json::json!({
            "name": "p",
            "n_clients": 4,
            "retrieve_distribution": [0.5, 0.4],
            "commit_latency": [1, 3],
            "max_rounds": 1
        }))
        .unwrap();

        let latencies: Vec<_> = profiles(&config)
            .unwrap()
            .iter()
            .map(|p| p.commit_latency)
            .collect();
        assert_eq!(latencies, [1, 1, 1, 3]);
    }
}
