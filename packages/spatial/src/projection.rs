//! Pure-Rust map projections on the GRS80 ellipsoid (Snyder 1987, USGS
//! Professional Paper 1395).
//!
//! Patches are stored in the CONUS Albers equal-area conic projection.
//! Representative points are additionally reported in UTM and as
//! geographic degrees. NAD83 and WGS84 are treated as coincident (they
//! differ by about a meter, below the 30 m processing resolution).

// ── Ellipsoid ────────────────────────────────────────────────────────────

/// A reference ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Semi-major axis (m).
    pub a: f64,
    /// Flattening.
    pub f: f64,
}

impl Ellipsoid {
    /// GRS80, the NAD83 ellipsoid.
    pub const GRS80: Self = Self {
        a: 6_378_137.0,
        f: 1.0 / 298.257_222_101,
    };

    /// Eccentricity squared.
    #[must_use]
    pub fn e2(&self) -> f64 {
        self.f.mul_add(-self.f, 2.0 * self.f)
    }

    /// Eccentricity.
    #[must_use]
    pub fn e(&self) -> f64 {
        self.e2().sqrt()
    }
}

// ── Albers equal-area conic ──────────────────────────────────────────────

/// Albers equal-area conic projection parameters (degrees, meters).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Albers {
    /// Ellipsoid.
    pub ellipsoid: Ellipsoid,
    /// Central meridian.
    pub lon0: f64,
    /// Latitude of origin.
    pub lat0: f64,
    /// First standard parallel.
    pub lat1: f64,
    /// Second standard parallel.
    pub lat2: f64,
    /// False easting.
    pub false_easting: f64,
    /// False northing.
    pub false_northing: f64,
}

impl Albers {
    /// `USA_Contiguous_Albers_Equal_Area_Conic_USGS_version` on NAD83.
    pub const CONUS: Self = Self {
        ellipsoid: Ellipsoid::GRS80,
        lon0: -96.0,
        lat0: 23.0,
        lat1: 29.5,
        lat2: 45.5,
        false_easting: 0.0,
        false_northing: 0.0,
    };

    fn q(&self, sin_phi: f64) -> f64 {
        let e2 = self.ellipsoid.e2();
        let e = self.ellipsoid.e();
        let es = e * sin_phi;
        (1.0 - e2)
            * (sin_phi / es.mul_add(-es, 1.0) - (1.0 / (2.0 * e)) * ((1.0 - es) / (1.0 + es)).ln())
    }

    fn m(&self, phi: f64) -> f64 {
        let es = self.ellipsoid.e() * phi.sin();
        phi.cos() / es.mul_add(-es, 1.0).sqrt()
    }

    /// Cone constant `n`, `C` and `rho0` (Snyder eqs. 14-12 to 14-14).
    fn constants(&self) -> (f64, f64, f64) {
        let phi0 = self.lat0.to_radians();
        let phi1 = self.lat1.to_radians();
        let phi2 = self.lat2.to_radians();
        let m1 = self.m(phi1);
        let m2 = self.m(phi2);
        let q0 = self.q(phi0.sin());
        let q1 = self.q(phi1.sin());
        let q2 = self.q(phi2.sin());
        let n = m1.mul_add(m1, -(m2 * m2)) / (q2 - q1);
        let c = n.mul_add(q1, m1 * m1);
        let rho0 = self.ellipsoid.a * n.mul_add(-q0, c).sqrt() / n;
        (n, c, rho0)
    }

    /// Projects geographic degrees to `(x, y)` meters.
    #[must_use]
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (n, c, rho0) = self.constants();
        let q = self.q(lat.to_radians().sin());
        let rho = self.ellipsoid.a * n.mul_add(-q, c).max(0.0).sqrt() / n;
        let theta = n * (lon - self.lon0).to_radians();
        (
            rho.mul_add(theta.sin(), self.false_easting),
            rho.mul_add(-theta.cos(), rho0) + self.false_northing,
        )
    }

    /// Unprojects `(x, y)` meters to geographic degrees.
    #[must_use]
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let (n, c, rho0) = self.constants();
        let a = self.ellipsoid.a;
        let e2 = self.ellipsoid.e2();
        let e = self.ellipsoid.e();

        let x = x - self.false_easting;
        let y = y - self.false_northing;
        let dy = rho0 - y;
        let rho = x.hypot(dy);
        let theta = if n >= 0.0 {
            x.atan2(dy)
        } else {
            (-x).atan2(-dy)
        };
        let q = (c - (rho * rho * n * n) / (a * a)) / n;

        // Snyder eq. 3-16, iterated to convergence.
        let mut phi = (q / 2.0).clamp(-1.0, 1.0).asin();
        for _ in 0..15 {
            let sin_phi = phi.sin();
            let es = e * sin_phi;
            let one_minus = es.mul_add(-es, 1.0);
            let delta = (one_minus * one_minus / (2.0 * phi.cos()))
                * (q / (1.0 - e2) - sin_phi / one_minus
                    + (1.0 / (2.0 * e)) * ((1.0 - es) / (1.0 + es)).ln());
            phi += delta;
            if delta.abs() < 1e-12 {
                break;
            }
        }

        (self.lon0 + (theta / n).to_degrees(), phi.to_degrees())
    }
}

// ── Transverse Mercator (UTM) ────────────────────────────────────────────

const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A UTM zone on an ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utm {
    /// Ellipsoid.
    pub ellipsoid: Ellipsoid,
    /// Zone number, 1-60.
    pub zone: u8,
    /// Northern hemisphere.
    pub north: bool,
}

impl Utm {
    /// NAD83 UTM zone, northern hemisphere.
    #[must_use]
    pub const fn nad83_north(zone: u8) -> Self {
        Self {
            ellipsoid: Ellipsoid::GRS80,
            zone,
            north: true,
        }
    }

    /// Central meridian of the zone in degrees.
    #[must_use]
    pub fn central_meridian(&self) -> f64 {
        f64::from(self.zone).mul_add(6.0, -183.0)
    }

    /// Projects geographic degrees to `(easting, northing)` meters
    /// (Snyder eqs. 8-9, 8-10).
    #[must_use]
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let e2 = self.ellipsoid.e2();
        let ep2 = e2 / (1.0 - e2);
        let lat = lat.to_radians();
        let lon = lon.to_radians();
        let lon0 = self.central_meridian().to_radians();

        let sin_lat = lat.sin();
        let cos_lat = lat.cos();
        let tan_lat = lat.tan();

        let n = self.ellipsoid.a / (e2 * sin_lat).mul_add(-sin_lat, 1.0).sqrt();
        let t = tan_lat * tan_lat;
        let c = ep2 * cos_lat * cos_lat;
        let a_coeff = cos_lat * (lon - lon0);
        let m = self.meridional_arc(lat);

        let a2 = a_coeff * a_coeff;
        let a4 = a2 * a2;
        let a6 = a4 * a2;

        let easting = UTM_K0
            * n
            * (a_coeff
                + (1.0 - t + c) * a2 * a_coeff / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a4 * a_coeff / 120.0)
            + UTM_FALSE_EASTING;

        let northing = UTM_K0
            * (m + n
                * tan_lat
                * (a2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0));

        let northing = if self.north {
            northing
        } else {
            northing + UTM_FALSE_NORTHING_SOUTH
        };
        (easting, northing)
    }

    /// Meridional arc from the equator to `lat` radians (Snyder eq. 3-21).
    fn meridional_arc(&self, lat: f64) -> f64 {
        let e2 = self.ellipsoid.e2();
        let e4 = e2 * e2;
        let e6 = e4 * e2;

        self.ellipsoid.a
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
    }
}

// ── Projection files ─────────────────────────────────────────────────────

/// ESRI WKT for `USA_Contiguous_Albers_Equal_Area_Conic_USGS_version`.
pub const ALBERS_CONUS_ESRI_WKT: &str = concat!(
    "PROJCS[\"USA_Contiguous_Albers_Equal_Area_Conic_USGS_version\",",
    "GEOGCS[\"GCS_North_American_1983\",DATUM[\"D_North_American_1983\",",
    "SPHEROID[\"GRS_1980\",6378137.0,298.257222101]],PRIMEM[\"Greenwich\",0.0],",
    "UNIT[\"Degree\",0.0174532925199433]],PROJECTION[\"Albers\"],",
    "PARAMETER[\"False_Easting\",0.0],PARAMETER[\"False_Northing\",0.0],",
    "PARAMETER[\"Central_Meridian\",-96.0],PARAMETER[\"Standard_Parallel_1\",29.5],",
    "PARAMETER[\"Standard_Parallel_2\",45.5],PARAMETER[\"Latitude_Of_Origin\",23.0],",
    "UNIT[\"Meter\",1.0]]"
);

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64, msg: &str) {
        let diff = (a - b).abs();
        assert!(
            diff < tol,
            "{msg}: expected {b}, got {a}, diff {diff} exceeds tolerance {tol}"
        );
    }

    #[test]
    fn albers_origin_maps_to_zero() {
        let (x, y) = Albers::CONUS.forward(-96.0, 23.0);
        assert_close(x, 0.0, 1e-6, "x");
        assert_close(y, 0.0, 1e-6, "y");
    }

    #[test]
    fn albers_is_symmetric_about_central_meridian() {
        let (xw, yw) = Albers::CONUS.forward(-100.0, 40.0);
        let (xe, ye) = Albers::CONUS.forward(-92.0, 40.0);
        assert_close(xw, -xe, 1e-6, "x");
        assert_close(yw, ye, 1e-6, "y");
    }

    #[test]
    fn albers_round_trip() {
        for &(lon, lat) in &[(-123.5, 47.8), (-121.7, 46.85), (-70.0, 44.0)] {
            let (x, y) = Albers::CONUS.forward(lon, lat);
            let (lon2, lat2) = Albers::CONUS.inverse(x, y);
            assert_close(lon2, lon, 1e-9, "lon");
            assert_close(lat2, lat, 1e-9, "lat");
        }
    }

    #[test]
    fn utm_zone_10_central_meridian() {
        let utm = Utm::nad83_north(10);
        assert_close(utm.central_meridian(), -123.0, 1e-12, "cm");
        let (e, n) = utm.forward(-123.0, 0.0);
        assert_close(e, 500_000.0, 0.01, "easting at CM");
        assert_close(n, 0.0, 0.01, "northing at equator");
    }

    // Same point as the WGS84 reference (-3.7037, 40.4168) -> UTM 30N
    // (440298.94, 4474257.31); GRS80 differs by well under a meter.
    #[test]
    fn utm_matches_reference_point() {
        let (e, n) = Utm::nad83_north(30).forward(-3.7037, 40.4168);
        assert_close(e, 440_298.94, 1.0, "easting");
        assert_close(n, 4_474_257.31, 1.0, "northing");
    }
}
