use tracing::debug;

use super::projection::polygon_area;
use super::{Line, Location};
use crate::error::{NrmlError, Result};

/// 単純断層面。地表トレース、傾斜角、地震発生層の上下限深さから組み立てる
#[derive(Debug, Clone)]
pub struct SimpleFaultSurface {
    top_edge: Line,
    upper_edge: Vec<Location>,
    lower_edge: Vec<Location>,
    upper_depth: f64,
    lower_depth: f64,
    dip: f64,
}

impl SimpleFaultSurface {
    /// NRML の断層上端（lon lat depth）から断層面を復元する。
    ///
    /// 上端の各頂点を傾斜方向の逆向き（走向 + 270°）に水平 `depth / tan(dip)`、
    /// 鉛直 `-depth` だけ移動して地表トレースを得てから断層面を作る。
    pub fn from_top_edge(
        top_edge: Vec<Location>,
        upper_depth: f64,
        lower_depth: f64,
        dip: f64,
    ) -> Result<Self> {
        validate(&top_edge, upper_depth, lower_depth, dip)?;

        let strike = top_edge[0].azimuth_to(&top_edge[1]);
        let up_dip = (strike + 270.0) % 360.0;
        let depth = top_edge[0].depth;
        let horizontal = depth / dip.to_radians().tan();

        let trace: Vec<Location> = top_edge
            .iter()
            .map(|p| p.point_at(horizontal, -depth, up_dip))
            .collect();

        let mut surface = Self::from_trace(trace, upper_depth, lower_depth, dip)?;
        surface.top_edge = Line::new(top_edge);
        Ok(surface)
    }

    /// 地表トレースから断層面を作る
    pub fn from_trace(
        trace: Vec<Location>,
        upper_depth: f64,
        lower_depth: f64,
        dip: f64,
    ) -> Result<Self> {
        validate(&trace, upper_depth, lower_depth, dip)?;

        let trace = Line::new(trace);
        let down_dip = (trace.average_azimuth() + 90.0) % 360.0;
        let tan_dip = dip.to_radians().tan();

        let project = |target_depth: f64| -> Vec<Location> {
            trace
                .points()
                .iter()
                .map(|p| {
                    let vertical = target_depth - p.depth;
                    p.point_at(vertical / tan_dip, vertical, down_dip)
                })
                .collect()
        };

        let upper_edge = project(upper_depth);
        let lower_edge = project(lower_depth);

        debug!(
            "Simple fault surface: {} trace points, dip {}, depths {}-{}",
            trace.len(),
            dip,
            upper_depth,
            lower_depth
        );

        Ok(Self {
            top_edge: trace,
            upper_edge,
            lower_edge,
            upper_depth,
            lower_depth,
            dip,
        })
    }

    /// 断層面の外周（上端 → 下端を逆順、閉じたリング）
    pub fn outline(&self) -> Vec<(f64, f64)> {
        outline(&self.upper_edge, &self.lower_edge)
    }

    /// 断層面の面積 (km²)：上端の長さ × 傾斜方向の幅
    pub fn area(&self) -> f64 {
        let width = (self.lower_depth - self.upper_depth) / self.dip.to_radians().sin();
        self.top_edge.length() * width
    }

    /// 外周を地表に投影したポリゴンの面積 (km²)
    pub fn footprint_area(&self) -> f64 {
        polygon_area(&self.outline())
    }
}

/// 複雑断層面。上端と下端の2本の折れ線で定義する
#[derive(Debug, Clone)]
pub struct ComplexFaultSurface {
    top_edge: Line,
    bottom_edge: Line,
    mesh_spacing: f64,
}

impl ComplexFaultSurface {
    pub fn from_edges(
        top_edge: Vec<Location>,
        bottom_edge: Vec<Location>,
        mesh_spacing: f64,
    ) -> Result<Self> {
        if top_edge.len() < 2 || bottom_edge.len() < 2 {
            return Err(NrmlError::InvalidGeometry(
                "complex fault edges need at least two points each".to_string(),
            ));
        }
        if mesh_spacing <= 0.0 {
            return Err(NrmlError::InvalidGeometry(format!(
                "mesh spacing must be positive, got {}",
                mesh_spacing
            )));
        }

        Ok(Self {
            top_edge: Line::new(top_edge),
            bottom_edge: Line::new(bottom_edge),
            mesh_spacing,
        })
    }

    pub fn outline(&self) -> Vec<(f64, f64)> {
        outline(self.top_edge.points(), self.bottom_edge.points())
    }

    /// 両端を同じ点数に再サンプリングしたメッシュのセル面積の合計 (km²)
    pub fn area(&self) -> f64 {
        let longest = self.top_edge.length().max(self.bottom_edge.length());
        let count = ((longest / self.mesh_spacing).ceil() as usize + 1).max(2);

        let top = self.top_edge.resample(count);
        let bottom = self.bottom_edge.resample(count);

        top.points()
            .windows(2)
            .zip(bottom.points().windows(2))
            .map(|(t, b)| {
                let (t0, t1) = (t[0].to_cartesian(), t[1].to_cartesian());
                let (b0, b1) = (b[0].to_cartesian(), b[1].to_cartesian());
                triangle_area(t0, t1, b1) + triangle_area(t0, b1, b0)
            })
            .sum()
    }

    pub fn footprint_area(&self) -> f64 {
        polygon_area(&self.outline())
    }
}

fn validate(edge: &[Location], upper_depth: f64, lower_depth: f64, dip: f64) -> Result<()> {
    if edge.len() < 2 {
        return Err(NrmlError::InvalidGeometry(
            "fault trace needs at least two points".to_string(),
        ));
    }
    if !(dip > 0.0 && dip <= 90.0) {
        return Err(NrmlError::InvalidGeometry(format!(
            "dip must be in (0, 90], got {}",
            dip
        )));
    }
    if upper_depth < 0.0 || lower_depth <= upper_depth {
        return Err(NrmlError::InvalidGeometry(format!(
            "seismogenic depths must satisfy 0 <= upper < lower, got {} and {}",
            upper_depth, lower_depth
        )));
    }
    Ok(())
}

fn outline(upper: &[Location], lower: &[Location]) -> Vec<(f64, f64)> {
    let mut ring: Vec<(f64, f64)> = upper
        .iter()
        .chain(lower.iter().rev())
        .map(|p| (p.lon, p.lat))
        .collect();
    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }
    ring
}

fn triangle_area(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> f64 {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let cross = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    0.5 * (cross[0] * cross[0] + cross[1] * cross[1] + cross[2] * cross[2]).sqrt()
}
