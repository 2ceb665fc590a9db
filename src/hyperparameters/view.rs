//! Nested and flat views over per-block hyperparameter maps.

use indexmap::IndexMap;

/// `block name -> parameter name -> T`.
pub type Nested<T> = IndexMap<String, IndexMap<String, T>>;

/// `(block name, parameter name) -> T`.
pub type Flat<T> = IndexMap<(String, String), T>;

/// Per-block values in either nested or flat form.
///
/// Both forms carry the same information; order follows block order and then
/// parameter order.
#[derive(Debug, Clone, PartialEq)]
pub enum HyperparameterView<T> {
    Nested(Nested<T>),
    Flat(Flat<T>),
}

impl<T> HyperparameterView<T> {
    /// Build a view from nested values, flattening if requested.
    pub fn from_nested(nested: Nested<T>, flat: bool) -> Self {
        if flat {
            HyperparameterView::Flat(flatten(nested))
        } else {
            HyperparameterView::Nested(nested)
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, HyperparameterView::Flat(_))
    }

    pub fn into_nested(self) -> Nested<T> {
        match self {
            HyperparameterView::Nested(nested) => nested,
            HyperparameterView::Flat(flat) => nest(flat),
        }
    }

    pub fn into_flat(self) -> Flat<T> {
        match self {
            HyperparameterView::Nested(nested) => flatten(nested),
            HyperparameterView::Flat(flat) => flat,
        }
    }

    /// Total number of `(block, parameter)` entries.
    pub fn len(&self) -> usize {
        match self {
            HyperparameterView::Nested(nested) => nested.values().map(IndexMap::len).sum(),
            HyperparameterView::Flat(flat) => flat.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> From<Nested<T>> for HyperparameterView<T> {
    fn from(nested: Nested<T>) -> Self {
        HyperparameterView::Nested(nested)
    }
}

impl<T> From<Flat<T>> for HyperparameterView<T> {
    fn from(flat: Flat<T>) -> Self {
        HyperparameterView::Flat(flat)
    }
}

pub fn flatten<T>(nested: Nested<T>) -> Flat<T> {
    nested
        .into_iter()
        .flat_map(|(block, params)| {
            params
                .into_iter()
                .map(move |(name, value)| ((block.clone(), name), value))
        })
        .collect()
}

/// Group flat entries by block, in order of first appearance.
pub fn nest<T>(flat: Flat<T>) -> Nested<T> {
    let mut nested: Nested<T> = IndexMap::new();
    for ((block, name), value) in flat {
        nested.entry(block).or_default().insert(name, value);
    }
    nested
}
