//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Separable filters.
//!

use crate::volume::Shape;
use super::process_lines;

/// Returns index `i` reflected into [0, n) with the edge sample repeated (`d c b a | a b c d | d c b a`).
pub fn reflect_index(i: isize, n: usize) -> usize {
    let n = n as isize;
    let i = i.rem_euclid(2 * n);
    (if i >= n { 2 * n - 1 - i } else { i }) as usize
}

/// Returns index `i` mirrored into [0, n) without repeating the edge sample (`d c b | a b c d | c b a`).
pub fn mirror_index(i: isize, n: usize) -> usize {
    if n == 1 { return 0; }
    let period = 2 * (n as isize - 1);
    let i = i.rem_euclid(period);
    (if i >= n as isize { period - i } else { i }) as usize
}

/// Replaces `line` with its running mean over `size` samples centered on each element.
fn box_filter_line(line: &mut [f64], size: usize) {
    let n = line.len();
    let radius = (size / 2) as isize;
    let extended: Vec<f64> = (-radius..n as isize + radius).map(|i| line[reflect_index(i, n)]).collect();

    let mut sum: f64 = extended[..size].iter().sum();
    line[0] = sum / size as f64;
    for i in 1..n {
        sum += extended[i + size - 1] - extended[i - 1];
        line[i] = sum / size as f64;
    }
}

/// Applies a `size`^3 uniform (mean) filter to `data` in place; borders are reflected.
///
/// # Parameters
///
/// * `shape` - Dimensions of `data`.
/// * `data` - Values in array order.
/// * `size` - Window length along each axis; must be odd.
///
pub fn box_filter_3d(shape: Shape, data: &mut [f64], size: usize) {
    assert!(size % 2 == 1);
    assert!(data.len() == shape[0] * shape[1] * shape[2]);

    for axis in 0..3 {
        process_lines(data, shape, axis, |line| box_filter_line(line, size));
    }
}
