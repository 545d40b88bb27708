use std::fmt::{Display, Formatter};

use geo_tunnel_runner::prelude::ConfigurationError;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Write,
    Range,
    Knn,
    Pip,
    Point,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Write,
        OperationKind::Range,
        OperationKind::Knn,
        OperationKind::Pip,
        OperationKind::Point,
    ];
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            OperationKind::Write => "write",
            OperationKind::Range => "range",
            OperationKind::Knn => "knn",
            OperationKind::Pip => "pip",
            OperationKind::Point => "point",
        };
        f.write_str(label)
    }
}

/// A search radius. The unit decides how it is written into the request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Radius {
    /// Written as a whole number.
    Metres(u32),
    /// Written with one decimal place.
    Kilometres(f64),
}

impl Display for Radius {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Radius::Metres(metres) => write!(f, "{metres}"),
            Radius::Kilometres(km) => write!(f, "{km:.1}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RadiusTemplate {
    Fixed(Radius),
    /// Whole metres between `min` and `max`, inclusive.
    UniformMetres { min: u32, max: u32 },
    /// Kilometres between `min` and `max`, rounded to a tenth.
    UniformKilometres { min: f64, max: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountTemplate {
    Fixed(u32),
    /// Between `min` and `max`, inclusive.
    Uniform { min: u32, max: u32 },
}

/// Where the point-in-polygon rectangle sits relative to the record's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipAnchor {
    /// The position is the centre, the rectangle extends `offset` degrees in every direction.
    Center,
    /// The position is the south west corner, the rectangle extends `offset` degrees north and
    /// east.
    Corner,
}

/// One entry of a workload mix, turned into an [OperationSpec] at every iteration that picks it.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationTemplate {
    Write { random_bearing: bool },
    Range { radius: RadiusTemplate },
    Knn { neighbours: CountTemplate },
    Pip { offset: f64, anchor: PipAnchor },
    /// Look up one user from the pool `user_0` to `user_{pool_size - 1}`.
    Point { pool_size: u32 },
}

impl OperationTemplate {
    pub fn write() -> Self {
        Self::Write {
            random_bearing: false,
        }
    }

    pub fn range(radius: RadiusTemplate) -> Self {
        Self::Range { radius }
    }

    pub fn knn(neighbours: CountTemplate) -> Self {
        Self::Knn { neighbours }
    }

    pub fn pip(offset: f64, anchor: PipAnchor) -> Self {
        Self::Pip { offset, anchor }
    }

    pub fn point(pool_size: u32) -> Self {
        Self::Point { pool_size }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            OperationTemplate::Write { .. } => OperationKind::Write,
            OperationTemplate::Range { .. } => OperationKind::Range,
            OperationTemplate::Knn { .. } => OperationKind::Knn,
            OperationTemplate::Pip { .. } => OperationKind::Pip,
            OperationTemplate::Point { .. } => OperationKind::Point,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let field = format!("{} operation", self.kind());
        match self {
            OperationTemplate::Write { .. } => Ok(()),
            OperationTemplate::Range { radius } => match radius {
                RadiusTemplate::Fixed(Radius::Kilometres(km)) if !km.is_finite() || *km <= 0.0 => {
                    Err(ConfigurationError::invalid(field, "radius must be positive"))
                }
                RadiusTemplate::UniformMetres { min, max } if min > max => Err(
                    ConfigurationError::invalid(field, format!("radius range {min}..={max}")),
                ),
                RadiusTemplate::UniformKilometres { min, max }
                    if !min.is_finite() || !max.is_finite() || min >= max || *min < 0.0 =>
                {
                    Err(ConfigurationError::invalid(
                        field,
                        format!("radius range {min}..{max}"),
                    ))
                }
                _ => Ok(()),
            },
            OperationTemplate::Knn { neighbours } => match neighbours {
                CountTemplate::Fixed(0) => Err(ConfigurationError::invalid(
                    field,
                    "neighbour count must be positive",
                )),
                CountTemplate::Uniform { min, max } if *min == 0 || min > max => Err(
                    ConfigurationError::invalid(field, format!("neighbour range {min}..={max}")),
                ),
                _ => Ok(()),
            },
            OperationTemplate::Pip { offset, .. } if !offset.is_finite() || *offset <= 0.0 => Err(
                ConfigurationError::invalid(field, "polygon offset must be positive"),
            ),
            OperationTemplate::Pip { .. } => Ok(()),
            OperationTemplate::Point { pool_size: 0 } => {
                Err(ConfigurationError::invalid(field, "user pool is empty"))
            }
            OperationTemplate::Point { .. } => Ok(()),
        }
    }

    /// Draw the parameters for one request. `user_id` is the identity a write is made for.
    pub fn instantiate<R: Rng + ?Sized>(&self, rng: &mut R, user_id: String) -> OperationSpec {
        match self {
            OperationTemplate::Write { random_bearing } => OperationSpec::Write {
                user_id,
                bearing: random_bearing.then(|| rng.gen_range(0..360) as f64),
            },
            OperationTemplate::Range { radius } => OperationSpec::Range {
                radius: match radius {
                    RadiusTemplate::Fixed(radius) => *radius,
                    RadiusTemplate::UniformMetres { min, max } => {
                        Radius::Metres(rng.gen_range(*min..=*max))
                    }
                    RadiusTemplate::UniformKilometres { min, max } => {
                        let km: f64 = rng.gen_range(*min..*max);
                        Radius::Kilometres((km * 10.0).round() / 10.0)
                    }
                },
            },
            OperationTemplate::Knn { neighbours } => OperationSpec::Knn {
                k: match neighbours {
                    CountTemplate::Fixed(k) => *k,
                    CountTemplate::Uniform { min, max } => rng.gen_range(*min..=*max),
                },
            },
            OperationTemplate::Pip { offset, anchor } => OperationSpec::Pip {
                offset: *offset,
                anchor: *anchor,
            },
            OperationTemplate::Point { pool_size } => OperationSpec::Point {
                user_id: format!("user_{}", rng.gen_range(0..*pool_size)),
            },
        }
    }
}

/// One concrete operation, ready for the request builder.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationSpec {
    Write {
        user_id: String,
        /// Replaces the bearing from the profile's telemetry.
        bearing: Option<f64>,
    },
    Range {
        radius: Radius,
    },
    Knn {
        k: u32,
    },
    Pip {
        offset: f64,
        anchor: PipAnchor,
    },
    Point {
        user_id: String,
    },
}

impl OperationSpec {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationSpec::Write { .. } => OperationKind::Write,
            OperationSpec::Range { .. } => OperationKind::Range,
            OperationSpec::Knn { .. } => OperationKind::Knn,
            OperationSpec::Pip { .. } => OperationKind::Pip,
            OperationSpec::Point { .. } => OperationKind::Point,
        }
    }
}

/// Where a virtual user is in the run, as far as naming users goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub vu_id: usize,
    pub iteration: u64,
    pub global_iteration: Option<u64>,
}

/// How the user id sent with a write is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIdStrategy {
    /// `{trajectory id}_v{vu id}`, so every virtual user moves its own copy of a trajectory.
    TrajectoryPerVu,
    /// `user_{n}` with `n` drawn uniformly from `0..size`.
    RandomPool { size: u32 },
    /// `user_{n}` with `n` the run wide iteration index, unique under shared iterations.
    GlobalIteration,
    /// `user_{n}` with `n` the virtual user's own iteration count.
    LocalIteration,
}

impl UserIdStrategy {
    /// `None` if the strategy needs a global iteration index and the executor doesn't hand them
    /// out.
    pub fn user_id<R: Rng + ?Sized>(
        &self,
        trajectory_id: &str,
        identity: Identity,
        rng: &mut R,
    ) -> Option<String> {
        match self {
            UserIdStrategy::TrajectoryPerVu => {
                Some(format!("{trajectory_id}_v{}", identity.vu_id))
            }
            UserIdStrategy::RandomPool { size } => {
                Some(format!("user_{}", rng.gen_range(0..(*size).max(1))))
            }
            UserIdStrategy::GlobalIteration => identity
                .global_iteration
                .map(|iteration| format!("user_{iteration}")),
            UserIdStrategy::LocalIteration => Some(format!("user_{}", identity.iteration)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn identity() -> Identity {
        Identity {
            vu_id: 7,
            iteration: 3,
            global_iteration: None,
        }
    }

    #[test]
    fn user_ids() {
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(
            Some("trj-1_v7".to_string()),
            UserIdStrategy::TrajectoryPerVu.user_id("trj-1", identity(), &mut rng)
        );
        assert_eq!(
            Some("user_3".to_string()),
            UserIdStrategy::LocalIteration.user_id("trj-1", identity(), &mut rng)
        );
        assert_eq!(
            None,
            UserIdStrategy::GlobalIteration.user_id("trj-1", identity(), &mut rng)
        );
        assert_eq!(
            Some("user_99".to_string()),
            UserIdStrategy::GlobalIteration.user_id(
                "trj-1",
                Identity {
                    global_iteration: Some(99),
                    ..identity()
                },
                &mut rng
            )
        );

        for _ in 0..100 {
            let id = UserIdStrategy::RandomPool { size: 10 }
                .user_id("trj-1", identity(), &mut rng)
                .unwrap();
            let n: u32 = id.strip_prefix("user_").unwrap().parse().unwrap();
            assert!(n < 10);
        }
    }

    #[test]
    fn drawn_parameters_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(2);
        let range_m = OperationTemplate::range(RadiusTemplate::UniformMetres { min: 500, max: 5000 });
        let range_km =
            OperationTemplate::range(RadiusTemplate::UniformKilometres { min: 1.0, max: 10.0 });
        let knn = OperationTemplate::knn(CountTemplate::Uniform { min: 10, max: 50 });
        let write = OperationTemplate::Write {
            random_bearing: true,
        };

        for _ in 0..1000 {
            match range_m.instantiate(&mut rng, String::new()) {
                OperationSpec::Range {
                    radius: Radius::Metres(m),
                } => assert!((500..=5000).contains(&m)),
                other => panic!("Unexpected {other:?}"),
            }
            match range_km.instantiate(&mut rng, String::new()) {
                OperationSpec::Range {
                    radius: Radius::Kilometres(km),
                } => {
                    assert!((1.0..=10.0).contains(&km));
                    assert_eq!(km, (km * 10.0).round() / 10.0);
                }
                other => panic!("Unexpected {other:?}"),
            }
            match knn.instantiate(&mut rng, String::new()) {
                OperationSpec::Knn { k } => assert!((10..=50).contains(&k)),
                other => panic!("Unexpected {other:?}"),
            }
            match write.instantiate(&mut rng, "u".to_string()) {
                OperationSpec::Write {
                    bearing: Some(bearing),
                    ..
                } => assert!((0.0..360.0).contains(&bearing) && bearing.fract() == 0.0),
                other => panic!("Unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn radius_formatting() {
        assert_eq!("5000", Radius::Metres(5000).to_string());
        assert_eq!("5.0", Radius::Kilometres(5.0).to_string());
        assert_eq!("2.3", Radius::Kilometres(2.3).to_string());
    }

    #[test]
    fn invalid_templates() {
        assert!(OperationTemplate::point(0).validate().is_err());
        assert!(OperationTemplate::knn(CountTemplate::Fixed(0)).validate().is_err());
        assert!(OperationTemplate::knn(CountTemplate::Uniform { min: 5, max: 1 })
            .validate()
            .is_err());
        assert!(OperationTemplate::pip(0.0, PipAnchor::Center).validate().is_err());
        assert!(
            OperationTemplate::range(RadiusTemplate::UniformKilometres { min: 2.0, max: 2.0 })
                .validate()
                .is_err()
        );
        assert!(OperationTemplate::range(RadiusTemplate::Fixed(Radius::Metres(5000)))
            .validate()
            .is_ok());
    }
}
