use autotrack_proto::Point;

/// Extrapolates the tracked point `ahead` steps past the newest position.
///
/// `history[j]` is the position `j` steps before the newest one, `None` where
/// that step has no data. Per axis the constant-acceleration model is used when
/// the latest jerk is smaller than the mean acceleration, otherwise constant
/// velocity when the latest acceleration is smaller than the mean velocity,
/// otherwise the newest position. The result is clamped to the frame.
pub fn predict(history: &[Option<Point>], ahead: u32, width: u32, height: u32) -> Option<Point> {
    let p0 = history.first().copied().flatten()?;
    let at = |j: usize| history.get(j).copied().flatten();
    if at(1).is_none() || ahead == 0 {
        return Some(clamp(p0, width, height));
    }

    let pts: Vec<Option<(f64, f64)>> = history.iter().map(|p| p.map(|p| (p.x, p.y))).collect();
    let veloc = differences(&pts);
    let accel = differences(&veloc);
    let jerk = differences(&accel);
    let (vmx, vmy) = mean_abs(&veloc);
    let (amx, amy) = mean_abs(&accel);

    let t = ahead as f64;
    let has2 = at(2).is_some();
    let has3 = at(3).is_some();
    let v0 = veloc[0].unwrap_or_default();
    let a0 = accel.first().copied().flatten().unwrap_or_default();
    let j0 = jerk.first().copied().flatten().unwrap_or_default();

    let axis = |p: f64, v: f64, a: f64, j: f64, vmean: f64, amean: f64| {
        let accel_ok = has2 && (!has3 || j.abs() < amean);
        let veloc_ok = !has2 || a.abs() < vmean;
        if accel_ok {
            p + v * t + a * t * (t + 1.0) / 2.0
        } else if veloc_ok {
            p + v * t
        } else {
            p
        }
    };
    let x = axis(p0.x, v0.0, a0.0, j0.0, vmx, amx);
    let y = axis(p0.y, v0.1, a0.1, j0.1, vmy, amy);
    Some(clamp(Point::new(x, y), width, height))
}

fn differences(seq: &[Option<(f64, f64)>]) -> Vec<Option<(f64, f64)>> {
    seq.windows(2)
        .map(|w| match (w[0], w[1]) {
            (Some(a), Some(b)) => Some((a.0 - b.0, a.1 - b.1)),
            _ => None,
        })
        .collect()
}

fn mean_abs(seq: &[Option<(f64, f64)>]) -> (f64, f64) {
    let (mut sx, mut sy, mut n) = (0.0, 0.0, 0usize);
    for (x, y) in seq.iter().flatten() {
        sx += x;
        sy += y;
        n += 1;
    }
    if n == 0 {
        return (0.0, 0.0);
    }
    ((sx / n as f64).abs(), (sy / n as f64).abs())
}

fn clamp(p: Point, width: u32, height: u32) -> Point {
    let max_x = width.saturating_sub(1) as f64;
    let max_y = height.saturating_sub(1) as f64;
    Point::new(p.x.clamp(0.0, max_x), p.y.clamp(0.0, max_y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(v: &[(f64, f64)]) -> Vec<Option<Point>> {
        v.iter().map(|&(x, y)| Some(Point::new(x, y))).collect()
    }

    #[test]
    fn constant_velocity_extrapolates() {
        // newest first: moving +3 in x, still in y
        let h = pts(&[(30.0, 50.0), (27.0, 50.0), (24.0, 50.0), (21.0, 50.0)]);
        let p = predict(&h, 1, 640, 480).unwrap();
        assert_eq!((p.x, p.y), (33.0, 50.0));
        let p = predict(&h, 3, 640, 480).unwrap();
        assert_eq!(p.x, 39.0);
    }

    #[test]
    fn constant_acceleration_extrapolates() {
        // x = t^2 at t = 4, 3, 2, 1
        let h = pts(&[(16.0, 0.0), (9.0, 0.0), (4.0, 0.0), (1.0, 0.0)]);
        let p = predict(&h, 1, 640, 480).unwrap();
        assert_eq!(p.x, 25.0);
        let p = predict(&h, 2, 640, 480).unwrap();
        assert_eq!(p.x, 36.0);
    }

    #[test]
    fn single_point_or_gap_stays_put() {
        let h = vec![Some(Point::new(5.0, 6.0)), None, Some(Point::new(1.0, 1.0))];
        assert_eq!(predict(&h, 2, 640, 480), Some(Point::new(5.0, 6.0)));
        assert_eq!(predict(&[None], 1, 640, 480), None);
    }

    #[test]
    fn prediction_is_clamped_to_frame() {
        let h = pts(&[(630.0, 5.0), (600.0, 25.0), (570.0, 45.0)]);
        let p = predict(&h, 2, 640, 480).unwrap();
        assert_eq!((p.x, p.y), (639.0, 0.0));
    }
}
