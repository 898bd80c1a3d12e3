//! Population profiles: target number of virtual users over time

use std::time::Duration;

use kobra_core::ProfileConfig;

/// How the target population changes during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopulationProfile {
    /// Same population throughout the run
    Constant { users: usize },

    /// Linear change from one population to another over `ramp_duration`
    Ramp {
        from: usize,
        to: usize,
        ramp_duration: Duration,
    },

    /// Baseline -> spike -> baseline
    Spike {
        baseline: usize,
        spike: usize,
        spike_start: Duration,
        spike_duration: Duration,
    },
}

impl PopulationProfile {
    /// Target population at a given time offset from run start
    pub fn users_at(&self, elapsed: Duration) -> usize {
        match self {
            Self::Constant { users } => *users,

            Self::Ramp {
                from,
                to,
                ramp_duration,
            } => {
                if elapsed >= *ramp_duration {
                    *to
                } else {
                    let progress = elapsed.as_secs_f64() / ramp_duration.as_secs_f64();
                    let delta = (*to as f64 - *from as f64) * progress;
                    (*from as f64 + delta).round() as usize
                }
            }

            Self::Spike {
                baseline,
                spike,
                spike_start,
                spike_duration,
            } => {
                let spike_end = *spike_start + *spike_duration;
                if elapsed >= *spike_start && elapsed < spike_end {
                    *spike
                } else {
                    *baseline
                }
            }
        }
    }

    /// Largest population the profile ever asks for
    pub fn peak(&self) -> usize {
        match self {
            Self::Constant { users } => *users,
            Self::Ramp { from, to, .. } => (*from).max(*to),
            Self::Spike {
                baseline, spike, ..
            } => (*baseline).max(*spike),
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Constant { users } => format!("Constant {} users", users),
            Self::Ramp { from, to, ramp_duration } => {
                format!("Ramp {} → {} users over {:?}", from, to, ramp_duration)
            }
            Self::Spike {
                baseline, spike, ..
            } => format!("Spike {} → {} users", baseline, spike),
        }
    }
}

impl From<&ProfileConfig> for PopulationProfile {
    fn from(config: &ProfileConfig) -> Self {
        match *config {
            ProfileConfig::Constant { users } => Self::Constant { users },
            ProfileConfig::Ramp {
                from,
                to,
                ramp_secs,
            } => Self::Ramp {
                from,
                to,
                ramp_duration: Duration::from_secs(ramp_secs),
            },
            ProfileConfig::Spike {
                baseline,
                spike,
                start_secs,
                duration_secs,
            } => Self::Spike {
                baseline,
                spike,
                spike_start: Duration::from_secs(start_secs),
                spike_duration: Duration::from_secs(duration_secs),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_profile() {
        let profile = PopulationProfile::Constant { users: 10 };

        assert_eq!(profile.users_at(Duration::from_secs(0)), 10);
        assert_eq!(profile.users_at(Duration::from_secs(60)), 10);
        assert_eq!(profile.peak(), 10);
    }

    #[test]
    fn test_ramp_profile() {
        let profile = PopulationProfile::Ramp {
            from: 0,
            to: 20,
            ramp_duration: Duration::from_secs(10),
        };

        assert_eq!(profile.users_at(Duration::from_secs(0)), 0);
        assert_eq!(profile.users_at(Duration::from_secs(5)), 10); // Midpoint
        assert_eq!(profile.users_at(Duration::from_secs(10)), 20);
        assert_eq!(profile.users_at(Duration::from_secs(15)), 20); // After ramp
    }

    #[test]
    fn test_ramp_down_profile() {
        let profile = PopulationProfile::Ramp {
            from: 20,
            to: 4,
            ramp_duration: Duration::from_secs(8),
        };

        assert_eq!(profile.users_at(Duration::from_secs(4)), 12);
        assert_eq!(profile.users_at(Duration::from_secs(8)), 4);
        assert_eq!(profile.peak(), 20);
    }

    #[test]
    fn test_spike_profile() {
        let profile = PopulationProfile::Spike {
            baseline: 5,
            spike: 50,
            spike_start: Duration::from_secs(5),
            spike_duration: Duration::from_secs(3),
        };

        assert_eq!(profile.users_at(Duration::from_secs(0)), 5); // Before spike
        assert_eq!(profile.users_at(Duration::from_secs(6)), 50); // During spike
        assert_eq!(profile.users_at(Duration::from_secs(10)), 5); // After spike
    }

    #[test]
    fn test_from_config() {
        let profile = PopulationProfile::from(&ProfileConfig::Spike {
            baseline: 1,
            spike: 9,
            start_secs: 2,
            duration_secs: 4,
        });

        assert_eq!(profile.users_at(Duration::from_secs(3)), 9);
        assert_eq!(profile.description(), "Spike 1 → 9 users");
    }
}
