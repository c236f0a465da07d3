//! Small numeric helpers shared by every table lookup.
//!
//! All lookups here degrade to a boundary value instead of panicking, so a
//! short or empty table never stops the protection logic mid-frame.

/// First index in `start..end` whose element is not less than `value`.
///
/// `slice[start..end]` must be sorted. Returns `end` when every element is
/// less than `value`.
pub fn lower_bound<T: PartialOrd>(slice: &[T], start: usize, end: usize, value: &T) -> usize {
    let end = end.min(slice.len());
    let mut low = start;
    let mut high = end;
    while low < high {
        let mid = low + ((high - low) >> 1);
        if slice[mid] < *value {
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    low
}

/// First index in `start..end` whose element is greater than `value`.
pub fn upper_bound<T: PartialOrd>(slice: &[T], start: usize, end: usize, value: &T) -> usize {
    let end = end.min(slice.len());
    let mut low = start;
    let mut high = end;
    while low < high {
        let mid = low + ((high - low) >> 1);
        if slice[mid] <= *value {
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    low
}

/// Indexed access clamped to the first/last element.
///
/// An empty slice yields `T::default()`.
pub fn get_clamped<T: Copy + Default>(slice: &[T], index: i64) -> T {
    let Some(&last) = slice.last() else {
        return T::default();
    };
    if index < 0 {
        slice[0]
    } else if index as usize >= slice.len() {
        last
    } else {
        slice[index as usize]
    }
}

/// Straight-line interpolation through `(x0, y0)` and `(x1, y1)`.
pub fn lerp(x0: f64, y0: f64, x1: f64, y1: f64, x: f64) -> f64 {
    if x1 == x0 {
        y0
    } else {
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}

/// Look up `x` in a sorted key column, interpolating between neighbouring rows.
///
/// Keys outside the column clamp to the first/last row.
pub fn interpolate(keys: &[f64], values: &[f64], x: f64) -> f64 {
    if keys.is_empty() || values.is_empty() {
        return 0.0;
    }
    let back = lower_bound(keys, 0, keys.len(), &x) as i64;
    if back < keys.len() as i64 && keys[back as usize] == x {
        return get_clamped(values, back);
    }
    let front = back - 1;
    lerp(
        get_clamped(keys, front),
        get_clamped(values, front),
        get_clamped(keys, back),
        get_clamped(values, back),
        x,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_bracket_repeated_values() {
        let data = [0, 30, 70, 70, 120];
        assert_eq!(lower_bound(&data, 0, data.len(), &70), 2);
        assert_eq!(upper_bound(&data, 0, data.len(), &70), 4);
        assert_eq!(lower_bound(&data, 0, data.len(), &500), 5);
        assert_eq!(upper_bound(&data, 0, data.len(), &-1), 0);
    }

    #[test]
    fn bounds_respect_sub_range() {
        let data = [0.0, 1.0, 4.0, 9.0, 16.0];
        assert_eq!(lower_bound(&data, 1, 4, &0.0), 1);
        assert_eq!(lower_bound(&data, 1, 4, &100.0), 4);
    }

    #[test]
    fn clamped_access_never_panics() {
        let data = [3, 5, 8];
        assert_eq!(get_clamped(&data, -4), 3);
        assert_eq!(get_clamped(&data, 1), 5);
        assert_eq!(get_clamped(&data, 99), 8);
        assert_eq!(get_clamped::<f64>(&[], 2), 0.0);
    }

    #[test]
    fn lerp_handles_degenerate_span() {
        assert_eq!(lerp(1.0, 7.0, 1.0, 9.0, 3.0), 7.0);
        assert!((lerp(0.0, 0.0, 10.0, 5.0, 4.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn interpolate_between_and_beyond_rows() {
        let keys = [0.0, 40.0, 80.0];
        let values = [3.0, 3.0, 1.0];
        assert_eq!(interpolate(&keys, &values, 40.0), 3.0);
        assert!((interpolate(&keys, &values, 60.0) - 2.0).abs() < 1e-12);
        assert_eq!(interpolate(&keys, &values, 120.0), 1.0);
        assert_eq!(interpolate(&keys, &values, -5.0), 3.0);
    }
}
