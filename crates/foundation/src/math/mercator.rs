use crate::geo::{Camera, LngLat, ScreenPoint, Viewport};

/// Tile size the zoom scale is expressed in (MapLibre convention).
pub const TILE_SIZE: f64 = 512.0;

/// Latitude limit of the square Web-Mercator world.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * 2f64.powf(zoom)
}

/// Projects to Web-Mercator world pixels at `zoom`.
pub fn project_world(p: LngLat, zoom: f64) -> [f64; 2] {
    let size = world_size(zoom);
    let lat = p.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (p.lng + 180.0) / 360.0 * size;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / std::f64::consts::PI) / 2.0 * size;
    [x, y]
}

pub fn unproject_world(xy: [f64; 2], zoom: f64) -> LngLat {
    let size = world_size(zoom);
    let lng = xy[0] / size * 360.0 - 180.0;
    let n = std::f64::consts::PI * (1.0 - 2.0 * xy[1] / size);
    let lat = n.sinh().atan().to_degrees();
    LngLat::new(lng, lat)
}

/// Geographic position to screen pixels for a camera centered in `viewport`.
pub fn project(p: LngLat, camera: &Camera, viewport: Viewport) -> ScreenPoint {
    let c = project_world(camera.center, camera.zoom);
    let w = project_world(p, camera.zoom);
    ScreenPoint::new(
        w[0] - c[0] + viewport.width / 2.0,
        w[1] - c[1] + viewport.height / 2.0,
    )
}

pub fn unproject(point: ScreenPoint, camera: &Camera, viewport: Viewport) -> LngLat {
    let c = project_world(camera.center, camera.zoom);
    unproject_world(
        [
            c[0] + point.x - viewport.width / 2.0,
            c[1] + point.y - viewport.height / 2.0,
        ],
        camera.zoom,
    )
}

#[cfg(test)]
mod tests {
    use super::{project, unproject};
    use crate::geo::{Camera, LngLat, ScreenPoint, Viewport};

    #[test]
    fn camera_center_projects_to_viewport_center() {
        let cam = Camera::new(LngLat::new(139.7, 35.7), 5.0);
        let vp = Viewport::new(800.0, 600.0);
        let p = project(cam.center, &cam, vp);
        assert!((p.x - 400.0).abs() < 1e-6);
        assert!((p.y - 300.0).abs() < 1e-6);
    }

    #[test]
    fn unproject_inverts_project() {
        let cam = Camera::new(LngLat::new(10.0, 45.0), 3.0);
        let vp = Viewport::default();
        let geo = unproject(ScreenPoint::new(100.0, 250.0), &cam, vp);
        let back = project(geo, &cam, vp);
        assert!((back.x - 100.0).abs() < 1e-6);
        assert!((back.y - 250.0).abs() < 1e-6);
    }
}
