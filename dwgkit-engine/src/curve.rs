use std::f64::consts::TAU;

use dwgkit_core::curve::{CurvePayload, CurveType};
use dwgkit_core::document::{PolylineFlags, Polyline2d};
use dwgkit_core::geometry::{Point3, Vector3};

/// 顶点标志：曲线拟合生成的额外顶点。
pub const VERTEX_CURVE_FIT_EXTRA: u8 = 0x01;
/// 顶点标志：定义了切向。
pub const VERTEX_HAS_TANGENT: u8 = 0x02;
/// 顶点标志：样条拟合生成的顶点。
pub const VERTEX_SPLINE_VERTEX: u8 = 0x08;
/// 顶点标志：样条框架控制点。
pub const VERTEX_SPLINE_FRAME: u8 = 0x10;

const GENERATED_VERTEX_MASK: u8 = VERTEX_CURVE_FIT_EXTRA | VERTEX_SPLINE_VERTEX;
const ANGLE_UNIT_EPSILON: f64 = 1.0e-3;
const MIN_SPLINE_DEGREE: u8 = 2;

/// 曲线拟合、样条拟合，或曲线类型为纯样条/贝塞尔时需要按曲线导出。
pub fn should_interpolate(flags: PolylineFlags, label: Option<CurveType>) -> bool {
    flags.curve_fit || flags.spline_fit || label.is_some_and(CurveType::is_spline)
}

/// 闭合点集若首尾重合则去掉末点，返回是否发生了剥离。
pub fn strip_duplicate_closure(points: &mut Vec<Point3>) -> bool {
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
        true
    } else {
        false
    }
}

/// 选出参与曲线拟合的顶点下标。
///
/// 优先使用样条框架控制点（至少两个），否则剔除拟合生成的顶点（剩余至少两个），
/// 否则使用全部顶点。
pub fn select_curve_indices(vertex_flags: &[u8], point_count: usize) -> Vec<usize> {
    let all = || (0..point_count).collect::<Vec<_>>();
    let count = point_count.min(vertex_flags.len());
    if point_count < 2 || count < 2 {
        return all();
    }

    let flags = &vertex_flags[..count];
    let frame: Vec<usize> = (0..count)
        .filter(|&i| flags[i] & VERTEX_SPLINE_FRAME != 0)
        .collect();
    if frame.len() >= 2 {
        return frame;
    }

    let defining: Vec<usize> = (0..count)
        .filter(|&i| flags[i] & GENERATED_VERTEX_MASK == 0)
        .collect();
    if defining.len() >= 2 {
        return defining;
    }
    all()
}

/// 开放均匀（夹紧）节点向量，长度为 `n + p + 1`。
pub fn open_uniform_knot_vector(control_point_count: usize, degree: usize) -> Vec<f64> {
    let n = control_point_count;
    if n < 2 {
        return Vec::new();
    }
    let p = degree.clamp(1, n - 1);
    (0..n + p + 1)
        .map(|i| {
            if i <= p {
                0.0
            } else if i >= n {
                1.0
            } else {
                (i - p) as f64 / (n - p) as f64
            }
        })
        .collect()
}

/// 按曲线类型取推荐阶数并夹紧到 [2, n-1]，不低于 2。
pub fn spline_degree(label: Option<CurveType>, point_count: usize) -> u8 {
    let preferred = label.map_or(3, CurveType::preferred_degree);
    let upper = point_count.saturating_sub(1).max(MIN_SPLINE_DEGREE as usize);
    (preferred as usize).min(upper).max(MIN_SPLINE_DEGREE as usize) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleUnit {
    Radians,
    Degrees,
}

/// 上游大多给出弧度；任一有限角度超过一整圈时整体按角度制处理。
pub fn detect_angle_unit(angles: &[f64]) -> AngleUnit {
    let max_abs = angles
        .iter()
        .filter(|angle| angle.is_finite())
        .map(|angle| angle.abs())
        .fold(None, |max: Option<f64>, value| Some(max.map_or(value, |m| m.max(value))));
    match max_abs {
        Some(value) if value > TAU + ANGLE_UNIT_EPSILON => AngleUnit::Degrees,
        _ => AngleUnit::Radians,
    }
}

/// 开放曲线的起止切向：取所选顶点中首个与末个带切向标志的顶点。
pub fn spline_tangents(
    point_count: usize,
    indices: &[usize],
    tangent_dirs: &[f64],
    vertex_flags: &[u8],
) -> Option<[Vector3; 2]> {
    if point_count < 2 || indices.len() < 2 {
        return None;
    }
    let limit = point_count.min(vertex_flags.len()).min(tangent_dirs.len());
    if limit < 2 {
        return None;
    }

    let unit = detect_angle_unit(tangent_dirs);
    let tangent_at = |index: &usize| -> Option<Vector3> {
        let index = *index;
        if index >= limit || vertex_flags[index] & VERTEX_HAS_TANGENT == 0 {
            return None;
        }
        let angle = tangent_dirs[index];
        if !angle.is_finite() {
            return None;
        }
        let radians = match unit {
            AngleUnit::Radians => angle,
            AngleUnit::Degrees => angle.to_radians(),
        };
        Some(Vector3::from_angle(radians))
    };

    let start = indices.iter().find_map(tangent_at)?;
    let end = indices.iter().rev().find_map(tangent_at)?;
    Some([start, end])
}

/// 为二维多段线生成样条导出数据；不需要按曲线导出或点数不足时返回 `None`。
///
/// 纯样条类型且未设置拟合标志时输出控制点样条，其余情况输出拟合点样条，
/// 拟合点优先采用上游插值结果。
pub fn build_payload(polyline: &Polyline2d) -> Option<CurvePayload> {
    let label = polyline.curve_type_label;
    let flags = polyline.flag_bits;
    let samples_usable = polyline.interpolation_applied && polyline.interpolated_points.len() >= 2;
    let wanted = if polyline.interpolation_applied {
        samples_usable
    } else {
        should_interpolate(flags, label) && polyline.points.len() >= 2
    };
    if !wanted {
        return None;
    }

    let indices = select_curve_indices(&polyline.vertex_flags, polyline.points.len());
    let selected: Vec<Point3> = indices
        .iter()
        .filter_map(|index| polyline.points.get(*index).copied())
        .collect();

    let pure_spline = label.is_some_and(CurveType::is_spline);
    if pure_spline && !flags.curve_fit && !flags.spline_fit {
        let mut control_points = close_points(selected.clone(), polyline.closed);
        strip_duplicate_closure(&mut control_points);
        if control_points.len() >= 2 {
            let degree = spline_degree(label, control_points.len());
            return Some(CurvePayload::Control {
                knots: open_uniform_knot_vector(control_points.len(), degree as usize),
                control_points,
                degree,
                closed: polyline.closed,
            });
        }
    }

    let source = if samples_usable {
        polyline.interpolated_points.clone()
    } else {
        selected
    };
    let fit_points = close_points(source, polyline.closed);
    if fit_points.len() < 2 {
        return None;
    }
    let tangents = if polyline.closed {
        None
    } else {
        spline_tangents(
            polyline.points.len(),
            &indices,
            &polyline.tangent_dirs,
            &polyline.vertex_flags,
        )
    };

    Some(CurvePayload::Fit {
        degree: spline_degree(label, fit_points.len()),
        fit_points,
        tangents,
        closed: polyline.closed,
    })
}

/// 闭合曲线补上首点，开放曲线去掉与首点重合的尾点。
fn close_points(mut points: Vec<Point3>, closed: bool) -> Vec<Point3> {
    if points.len() < 2 {
        return points;
    }
    if closed {
        if points.first() != points.last() {
            points.push(points[0]);
        }
    } else {
        while points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
    }
    points
}
