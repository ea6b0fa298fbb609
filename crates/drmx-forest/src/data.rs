//! Instances and partition splits.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub values: Vec<f64>,
}

impl Instance {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }
}

/// Split `data` into `num_maps` contiguous partitions of `len / num_maps`
/// instances each; the last partition also takes the remainder.
pub fn split_instances<T: Clone>(data: &[T], num_maps: usize) -> Vec<Vec<T>> {
    if num_maps == 0 {
        return Vec::new();
    }
    let size = data.len() / num_maps;
    (0..num_maps)
        .map(|p| {
            let from = p * size;
            let to = if p == num_maps - 1 { data.len() } else { (p + 1) * size };
            data[from..to].to_vec()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_split_takes_remainder() {
        let data: Vec<u32> = (0..13).collect();
        let splits = split_instances(&data, 5);
        let sizes: Vec<usize> = splits.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 2, 2, 5]);
        assert_eq!(splits.concat(), data);
        assert!(split_instances(&data, 0).is_empty());
    }
}
