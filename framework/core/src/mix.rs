use rand::Rng;

use crate::error::ConfigurationError;

/// How far the sum of the weights in a mix may be from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// One branch of a [WeightedMix], either a concrete choice or another mix that gets its own draw.
#[derive(Debug, Clone, PartialEq)]
pub enum MixEntry<T> {
    Leaf(T),
    Nested(WeightedMix<T>),
}

/// A declarative weighted-choice table.
///
/// Weights are declared once and stored as a cumulative distribution, so a single uniform draw
/// `r` in `[0, 1)` resolves to the first entry whose cumulative weight exceeds `r`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedMix<T> {
    /// Never empty.
    entries: Vec<MixEntry<T>>,
    cumulative: Vec<f64>,
}

impl<T> WeightedMix<T> {
    pub fn builder() -> WeightedMixBuilder<T> {
        WeightedMixBuilder {
            entries: Vec::new(),
        }
    }

    /// Build a mix from `(weight, entry)` pairs. The weights must be finite, non-negative and sum
    /// to 1.0.
    pub fn new(entries: Vec<(f64, MixEntry<T>)>) -> Result<Self, ConfigurationError> {
        if entries.is_empty() {
            return Err(ConfigurationError::EmptyMix);
        }

        let mut cumulative = Vec::with_capacity(entries.len());
        let mut sum = 0.0;
        for (index, (weight, _)) in entries.iter().enumerate() {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigurationError::InvalidWeight {
                    index,
                    weight: *weight,
                });
            }
            sum += weight;
            cumulative.push(sum);
        }

        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigurationError::WeightsDoNotSumToOne { sum });
        }

        Ok(Self {
            entries: entries.into_iter().map(|(_, entry)| entry).collect(),
            cumulative,
        })
    }

    /// Every entry gets the same weight.
    pub fn uniform(items: Vec<T>) -> Result<Self, ConfigurationError> {
        let weight = 1.0 / items.len().max(1) as f64;
        Self::new(
            items
                .into_iter()
                .map(|item| (weight, MixEntry::Leaf(item)))
                .collect(),
        )
    }

    /// Resolve one level of the mix for the draw `r`.
    ///
    /// Draws at or above the final cumulative weight, which only happens through floating point
    /// rounding, resolve to the last entry.
    pub fn select(&self, r: f64) -> &MixEntry<T> {
        let index = self
            .cumulative
            .partition_point(|c| *c <= r)
            .min(self.entries.len() - 1);
        &self.entries[index]
    }

    /// Walk the mix down to a leaf, taking a fresh draw from `rng` at every level.
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        let mut mix = self;
        loop {
            match mix.select(rng.gen::<f64>()) {
                MixEntry::Leaf(value) => return value,
                MixEntry::Nested(nested) => mix = nested,
            }
        }
    }

    /// All leaves, depth first.
    pub fn leaves(&self) -> Vec<&T> {
        let mut out = Vec::new();
        for entry in &self.entries {
            match entry {
                MixEntry::Leaf(value) => out.push(value),
                MixEntry::Nested(nested) => out.extend(nested.leaves()),
            }
        }
        out
    }

    /// The effective probability of every leaf, with nested weights multiplied through.
    pub fn flattened_weights(&self) -> Vec<(&T, f64)> {
        let mut out = Vec::new();
        let mut previous = 0.0;
        for (entry, cumulative) in self.entries.iter().zip(&self.cumulative) {
            let weight = cumulative - previous;
            previous = *cumulative;
            match entry {
                MixEntry::Leaf(value) => out.push((value, weight)),
                MixEntry::Nested(nested) => out.extend(
                    nested
                        .flattened_weights()
                        .into_iter()
                        .map(|(value, inner)| (value, inner * weight)),
                ),
            }
        }
        out
    }
}

pub struct WeightedMixBuilder<T> {
    entries: Vec<(f64, MixEntry<T>)>,
}

impl<T> WeightedMixBuilder<T> {
    pub fn with(mut self, weight: f64, value: T) -> Self {
        self.entries.push((weight, MixEntry::Leaf(value)));
        self
    }

    pub fn with_nested(mut self, weight: f64, mix: WeightedMix<T>) -> Self {
        self.entries.push((weight, MixEntry::Nested(mix)));
        self
    }

    pub fn build(self) -> Result<WeightedMix<T>, ConfigurationError> {
        WeightedMix::new(self.entries)
    }
}
