use ndarray::Array2;

/// Fetch a sample, treating everything outside the image as zero.
#[inline]
fn tap(data: &Array2<f32>, x: i64, y: i64) -> f64 {
    if x < 0 || y < 0 {
        return 0.0;
    }
    match data.get((y as usize, x as usize)) {
        Some(&v) => v as f64,
        None => 0.0,
    }
}

/// Nearest-neighbour lookup. `(sx, sy)` is a continuous position where
/// pixel `(i, j)` covers `[i, i+1) x [j, j+1)`.
pub fn sample_nearest(data: &Array2<f32>, sx: f64, sy: f64) -> f32 {
    tap(data, sx.floor() as i64, sy.floor() as i64) as f32
}

/// Bilinear interpolation between the four pixel centers around `(sx, sy)`.
pub fn sample_bilinear(data: &Array2<f32>, sx: f64, sy: f64) -> f32 {
    let fx = sx - 0.5;
    let fy = sy - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let top = tap(data, x0, y0) * (1.0 - tx) + tap(data, x0 + 1, y0) * tx;
    let bottom = tap(data, x0, y0 + 1) * (1.0 - tx) + tap(data, x0 + 1, y0 + 1) * tx;
    (top * (1.0 - ty) + bottom * ty) as f32
}

/// Catmull-Rom cubic weight (a = -0.5).
#[inline]
fn cubic_weight(t: f64) -> f64 {
    const A: f64 = -0.5;
    let t = t.abs();
    if t <= 1.0 {
        ((A + 2.0) * t - (A + 3.0)) * t * t + 1.0
    } else if t < 2.0 {
        ((A * t - 5.0 * A) * t + 8.0 * A) * t - 4.0 * A
    } else {
        0.0
    }
}

/// Bicubic interpolation over the 4x4 neighbourhood of `(sx, sy)`.
pub fn sample_bicubic(data: &Array2<f32>, sx: f64, sy: f64) -> f32 {
    let fx = sx - 0.5;
    let fy = sy - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let wx = [
        cubic_weight(1.0 + tx),
        cubic_weight(tx),
        cubic_weight(1.0 - tx),
        cubic_weight(2.0 - tx),
    ];
    let wy = [
        cubic_weight(1.0 + ty),
        cubic_weight(ty),
        cubic_weight(1.0 - ty),
        cubic_weight(2.0 - ty),
    ];

    let mut acc = 0.0;
    for (j, wyj) in wy.iter().enumerate() {
        if *wyj == 0.0 {
            continue;
        }
        let y = y0 - 1 + j as i64;
        let mut row = 0.0;
        for (i, wxi) in wx.iter().enumerate() {
            if *wxi != 0.0 {
                row += tap(data, x0 - 1 + i as i64, y) * wxi;
            }
        }
        acc += row * wyj;
    }
    acc as f32
}
