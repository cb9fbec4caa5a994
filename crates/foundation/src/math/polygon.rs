use crate::geo::LngLat;

/// Even-odd ray casting test against one ring (closing vertex optional).
pub fn ring_contains(ring: &[LngLat], p: LngLat) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[j];
        if (a.lat > p.lat) != (b.lat > p.lat) {
            let x = (b.lng - a.lng) * (p.lat - a.lat) / (b.lat - a.lat) + a.lng;
            if p.lng < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Polygon containment: inside the outer ring and outside every hole.
pub fn polygon_contains(rings: &[Vec<LngLat>], p: LngLat) -> bool {
    let Some(outer) = rings.first() else {
        return false;
    };
    if !ring_contains(outer, p) {
        return false;
    }
    !rings[1..].iter().any(|hole| ring_contains(hole, p))
}

#[cfg(test)]
mod tests {
    use super::polygon_contains;
    use crate::geo::LngLat;

    fn square(min: f64, max: f64) -> Vec<LngLat> {
        vec![
            LngLat::new(min, min),
            LngLat::new(max, min),
            LngLat::new(max, max),
            LngLat::new(min, max),
            LngLat::new(min, min),
        ]
    }

    #[test]
    fn holes_are_excluded() {
        let rings = vec![square(0.0, 10.0), square(4.0, 6.0)];
        assert!(polygon_contains(&rings, LngLat::new(1.0, 1.0)));
        assert!(!polygon_contains(&rings, LngLat::new(5.0, 5.0)));
        assert!(!polygon_contains(&rings, LngLat::new(11.0, 5.0)));
    }
}
