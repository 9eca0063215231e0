use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::traits::DimensionSource;
use crate::types::DimensionSpacePoint;

/// Configured content dimensions: dimension name to its legal values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDimensions {
    dimensions: BTreeMap<String, Vec<String>>,
}

impl ContentDimensions {
    pub fn new() -> Self { Self::default() }

    pub fn with_dimension<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.dimensions.insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool { self.dimensions.is_empty() }

    /// Cartesian product of all dimension values.
    ///
    /// No configured dimensions yields the single point without dimensions;
    /// a dimension without values yields the empty set.
    pub fn expand(&self) -> BTreeSet<DimensionSpacePoint> {
        let mut points = BTreeSet::from([DimensionSpacePoint::without_dimensions()]);
        for (name, values) in &self.dimensions {
            let values: BTreeSet<&String> = values.iter().collect();
            points = points
                .iter()
                .flat_map(|point| values.iter().map(move |value| point.clone().with(name.clone(), (*value).clone())))
                .collect();
        }
        points
    }
}

impl DimensionSource for ContentDimensions {
    fn all_dimension_combinations(&self) -> BTreeSet<DimensionSpacePoint> { self.expand() }
}
