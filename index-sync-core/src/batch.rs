use crate::error::ConfigError;

/// Split `items` into consecutive slices of `size` elements; the last may be shorter.
///
/// Returns no batches for empty input. A `size` of zero is a configuration
/// error rather than an empty result.
pub fn create_batches<T>(items: &[T], size: usize) -> Result<Vec<&[T]>, ConfigError> {
    if size == 0 {
        return Err(ConfigError::Invalid {
            key: "sync.batch_size",
            reason: "batch size must be greater than zero".into(),
        });
    }
    Ok(items.chunks(size).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenation_reconstructs_input() {
        let items: Vec<u32> = (0..47).collect();
        for size in 1..=50 {
            let batches = create_batches(&items, size).unwrap();
            let rebuilt: Vec<u32> = batches.iter().flat_map(|b| b.iter().copied()).collect();
            assert_eq!(rebuilt, items, "size {size}");
            assert_eq!(batches.len(), items.len().div_ceil(size), "size {size}");
            for batch in &batches[..batches.len() - 1] {
                assert_eq!(batch.len(), size);
            }
            assert!(!batches.last().unwrap().is_empty());
        }
    }

    #[test]
    fn twenty_five_by_ten() {
        let items: Vec<u32> = (0..25).collect();
        let sizes: Vec<usize> = create_batches(&items, 10)
            .unwrap()
            .iter()
            .map(|b| b.len())
            .collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[test]
    fn empty_input_has_no_batches() {
        let items: Vec<u32> = Vec::new();
        assert!(create_batches(&items, 3).unwrap().is_empty());
    }

    #[test]
    fn zero_size_fails_fast() {
        let err = create_batches(&[1, 2, 3], 0).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "sync.batch_size", .. }));
    }
}
