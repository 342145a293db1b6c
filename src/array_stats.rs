//! Small array statistics used on sample chains

use ndarray::ArrayView1;

/// Find the index of the maximum element in an array
///
/// NaN values never win the comparison, the first maximum is returned on ties.
pub fn argmax(arr: ArrayView1<f64>) -> Option<usize> {
    if arr.is_empty() {
        return None;
    }

    let (idx, _) = arr
        .iter()
        .enumerate()
        .fold((0, arr[0]), |(max_idx, max_val), (idx, &val)| {
            if val > max_val || (max_val.is_nan() && !val.is_nan()) {
                (idx, val)
            } else {
                (max_idx, max_val)
            }
        });

    Some(idx)
}

/// Median of the array, the mean of the two middle elements for even lengths
pub fn median(arr: ArrayView1<f64>) -> Option<f64> {
    if arr.is_empty() {
        return None;
    }
    let mut sorted = arr.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let i = (sorted.len() - 1) / 2;
    if sorted.len() % 2 == 0 {
        Some(0.5 * (sorted[i] + sorted[i + 1]))
    } else {
        Some(sorted[i])
    }
}

pub fn mean(arr: ArrayView1<f64>) -> Option<f64> {
    if arr.is_empty() {
        None
    } else {
        Some(arr.sum() / arr.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, array};

    #[test]
    fn test_argmax_basic() {
        let arr = array![1.0, 3.0, 2.0, 5.0, 4.0];
        assert_eq!(argmax(arr.view()), Some(3));
    }

    #[test]
    fn test_argmax_first_of_ties() {
        let arr = array![5.0, 1.0, 5.0];
        assert_eq!(argmax(arr.view()), Some(0));
    }

    #[test]
    fn test_argmax_skips_leading_nan() {
        let arr = array![f64::NAN, 1.0, 2.0];
        assert_eq!(argmax(arr.view()), Some(2));
    }

    #[test]
    fn test_argmax_neg_infinity() {
        let arr = array![f64::NEG_INFINITY, f64::NEG_INFINITY, -3.0];
        assert_eq!(argmax(arr.view()), Some(2));
    }

    #[test]
    fn test_argmax_empty() {
        let arr: Array1<f64> = Array1::from(vec![]);
        assert_eq!(argmax(arr.view()), None);
    }

    #[test]
    fn test_median_odd() {
        let arr = array![3.0, 1.0, 2.0];
        assert_eq!(median(arr.view()), Some(2.0));
    }

    #[test]
    fn test_median_even() {
        let arr = array![4.0, 1.0, 3.0, 2.0];
        assert_eq!(median(arr.view()), Some(2.5));
    }

    #[test]
    fn test_mean() {
        let arr = array![1.0, 2.0, 3.0, 6.0];
        assert_eq!(mean(arr.view()), Some(3.0));
        assert_eq!(mean(Array1::<f64>::zeros(0).view()), None);
    }
}
