//! 按实体类型组装不可变的实体快照。
//!
//! 每个类型先整体读取行数据（失败即返回错误），再逐行补充颜色、
//! 归属关系、曲线与 ACIS 引用图。补充步骤中的数据问题只会让对应字段
//! 退化为缺省值，不会中断整个序列。

use std::collections::{HashMap, HashSet};

use dwgkit_core::curve::CurveType;
use dwgkit_core::document::{
    Arc, Circle, Entity, EntityData, EntityKind, Handle, Line, LwPolyline, ModelerBody,
    PfaceFace, Polyline2d, Polyline3d, PolylineFlags, PolylineMesh, PolylinePface, Seqend,
    SequenceMembers, SequenceVertex, Vertex2d,
};
use dwgkit_core::geometry::Point3;
use dwgkit_source::{
    ArcRow, Feed, InterpolatedPolylineRow, LwPolylineRow, ModelerRow, Polyline2dInterpretation,
    Polyline2dRow, RecordSource, SourceError,
};
use tracing::{debug, warn};

use crate::curve;
use crate::errors::EngineError;
use crate::session::DocumentSession;
use crate::style::StyleResolver;

/// 组装指定类型的全部实体，保持记录源给出的顺序。
pub fn assemble<S: RecordSource>(
    session: &DocumentSession<S>,
    kind: EntityKind,
) -> Result<Vec<Entity>, EngineError> {
    let entities = match kind {
        EntityKind::Line => lines(session)?,
        EntityKind::Arc => arcs(session)?,
        EntityKind::Circle => circles(session)?,
        EntityKind::LwPolyline => lwpolylines(session)?,
        EntityKind::Polyline2d => polylines_2d(session)?,
        EntityKind::Vertex2d => vertices_2d(session)?,
        EntityKind::Polyline3d => polylines_3d(session)?,
        EntityKind::PolylineMesh => polyline_meshes(session)?,
        EntityKind::PolylinePface => polyline_pfaces(session)?,
        EntityKind::Vertex3d | EntityKind::VertexMesh | EntityKind::VertexPface => {
            point_vertices(session, kind)?
        }
        EntityKind::VertexPfaceFace => pface_faces(session)?,
        EntityKind::Seqend => seqends(session)?,
        EntityKind::Solid3d | EntityKind::Body | EntityKind::Region => {
            modeler_entities(session, kind)?
        }
    };
    debug!(kind = %kind, count = entities.len(), "实体组装完成");
    Ok(entities)
}

fn feed<T>(kind: EntityKind, rows: Result<Vec<T>, SourceError>) -> Result<Vec<T>, EngineError> {
    rows.map_err(|err| EngineError::source(Feed::Entities(kind), err))
}

fn lines<S: RecordSource>(session: &DocumentSession<S>) -> Result<Vec<Entity>, EngineError> {
    let kind = EntityKind::Line;
    let rows = feed(kind, session.source().lines())?;
    let styles = session.styles();
    let supplementary = styles.supplementary_lines(&rows);
    Ok(rows
        .into_iter()
        .map(|row| {
            let mut style = styles.resolve(row.handle, kind);
            if supplementary.contains(&row.handle) {
                StyleResolver::mark_supplementary(&mut style);
            }
            let data = EntityData::Line(Line {
                start: row.start,
                end: row.end,
            });
            Entity::new(row.handle, style, data)
        })
        .collect())
}

fn arcs<S: RecordSource>(session: &DocumentSession<S>) -> Result<Vec<Entity>, EngineError> {
    let kind = EntityKind::Arc;
    let rows = feed(kind, session.source().arcs())?;
    let styles = session.styles();
    Ok(rows
        .into_iter()
        .map(|row| {
            let handle = row.handle;
            Entity::new(handle, styles.resolve(handle, kind), EntityData::Arc(arc_from_row(row)))
        })
        .collect())
}

fn circles<S: RecordSource>(session: &DocumentSession<S>) -> Result<Vec<Entity>, EngineError> {
    let kind = EntityKind::Circle;
    let rows = feed(kind, session.source().circles())?;
    let styles = session.styles();
    let supplementary = styles.supplementary_circles(&rows);
    Ok(rows
        .into_iter()
        .map(|row| {
            let mut style = styles.resolve(row.handle, kind);
            if supplementary.contains(&row.handle) {
                StyleResolver::mark_supplementary(&mut style);
            }
            let data = EntityData::Circle(Circle {
                center: row.center,
                radius: row.radius,
            });
            Entity::new(row.handle, style, data)
        })
        .collect())
}

fn lwpolylines<S: RecordSource>(session: &DocumentSession<S>) -> Result<Vec<Entity>, EngineError> {
    let kind = EntityKind::LwPolyline;
    let rows = feed(kind, session.source().lwpolylines())?;
    let styles = session.styles();
    Ok(rows
        .into_iter()
        .map(|row| {
            let handle = row.handle;
            let data = EntityData::LwPolyline(lwpolyline_from_row(row));
            Entity::new(handle, styles.resolve(handle, kind), data)
        })
        .collect())
}

fn polylines_2d<S: RecordSource>(session: &DocumentSession<S>) -> Result<Vec<Entity>, EngineError> {
    let kind = EntityKind::Polyline2d;
    let rows = feed(kind, session.source().polylines_2d())?;
    let source = session.source();
    let styles = session.styles();
    let relationships = session.relationships();

    let interpretations: HashMap<Handle, Polyline2dInterpretation> = source
        .polyline_2d_interpretations()
        .unwrap_or_else(|err| {
            warn!(error = %err, "POLYLINE_2D 解读数据不可用，按原始标志位处理");
            Vec::new()
        })
        .into_iter()
        .map(|interpretation| (interpretation.handle, interpretation))
        .collect();

    let wants_samples: HashSet<Handle> = rows
        .iter()
        .filter(|row| {
            let interpretation = interpretations.get(&row.handle);
            let (flags, label) = effective_curve_flags(row, interpretation);
            curve::should_interpolate(flags, label)
        })
        .map(|row| row.handle)
        .collect();
    let samples: HashMap<Handle, InterpolatedPolylineRow> = if wants_samples.is_empty() {
        HashMap::new()
    } else {
        source
            .polyline_2d_interpolated(session.config().curve.interpolation_segments)
            .unwrap_or_else(|err| {
                warn!(error = %err, "插值采样点不可用，改用顶点拟合");
                Vec::new()
            })
            .into_iter()
            .filter(|sample| sample.applied && wants_samples.contains(&sample.handle))
            .map(|sample| (sample.handle, sample))
            .collect()
    };

    Ok(rows
        .into_iter()
        .map(|row| {
            let handle = row.handle;
            let sequence = relationships.members(handle).cloned().unwrap_or_default();
            let polyline = polyline_2d_from_row(
                row,
                interpretations.get(&handle),
                samples.get(&handle),
                sequence,
            );
            Entity::new(
                handle,
                styles.resolve(handle, kind),
                EntityData::Polyline2d(polyline),
            )
        })
        .collect())
}

fn vertices_2d<S: RecordSource>(session: &DocumentSession<S>) -> Result<Vec<Entity>, EngineError> {
    let kind = EntityKind::Vertex2d;
    let rows = feed(kind, session.source().vertices_2d())?;
    let styles = session.styles();
    let relationships = session.relationships();
    Ok(rows
        .into_iter()
        .map(|row| {
            let data = EntityData::Vertex2d(Vertex2d {
                position: row.position,
                flags: row.flags,
                start_width: row.start_width,
                end_width: row.end_width,
                bulge: row.bulge,
                tangent_dir: row.tangent_dir,
                owner: relationships.owner_of(row.handle),
            });
            Entity::new(row.handle, styles.resolve(row.handle, kind), data)
        })
        .collect())
}

fn polylines_3d<S: RecordSource>(session: &DocumentSession<S>) -> Result<Vec<Entity>, EngineError> {
    let kind = EntityKind::Polyline3d;
    let rows = feed(kind, session.source().polylines_3d())?;
    let styles = session.styles();
    let relationships = session.relationships();
    Ok(rows
        .into_iter()
        .map(|row| {
            let data = EntityData::Polyline3d(Polyline3d {
                points: row.points,
                flags: row.flags,
                closed: row.closed,
                sequence: relationships.members(row.handle).cloned().unwrap_or_default(),
            });
            Entity::new(row.handle, styles.resolve(row.handle, kind), data)
        })
        .collect())
}

fn polyline_meshes<S: RecordSource>(
    session: &DocumentSession<S>,
) -> Result<Vec<Entity>, EngineError> {
    let kind = EntityKind::PolylineMesh;
    let rows = feed(kind, session.source().polyline_meshes())?;
    let styles = session.styles();
    let relationships = session.relationships();
    Ok(rows
        .into_iter()
        .map(|row| {
            let data = EntityData::PolylineMesh(PolylineMesh {
                points: row.points,
                flags: row.flags,
                m_vertex_count: row.m_vertex_count,
                n_vertex_count: row.n_vertex_count,
                closed: row.closed,
                sequence: relationships.members(row.handle).cloned().unwrap_or_default(),
            });
            Entity::new(row.handle, styles.resolve(row.handle, kind), data)
        })
        .collect())
}

fn polyline_pfaces<S: RecordSource>(
    session: &DocumentSession<S>,
) -> Result<Vec<Entity>, EngineError> {
    let kind = EntityKind::PolylinePface;
    let rows = feed(kind, session.source().polyline_pfaces())?;
    let styles = session.styles();
    let relationships = session.relationships();
    Ok(rows
        .into_iter()
        .map(|row| {
            let data = EntityData::PolylinePface(PolylinePface {
                num_vertices: row.num_vertices,
                num_faces: row.num_faces,
                vertices: row.vertices,
                faces: row.faces,
                sequence: relationships.members(row.handle).cloned().unwrap_or_default(),
            });
            Entity::new(row.handle, styles.resolve(row.handle, kind), data)
        })
        .collect())
}

fn point_vertices<S: RecordSource>(
    session: &DocumentSession<S>,
    kind: EntityKind,
) -> Result<Vec<Entity>, EngineError> {
    let rows = feed(kind, session.source().point_vertices(kind))?;
    let styles = session.styles();
    let relationships = session.relationships();
    Ok(rows
        .into_iter()
        .map(|row| {
            let vertex = SequenceVertex {
                position: row.position,
                flags: row.flags,
                owner: relationships.owner_of(row.handle),
            };
            let data = match kind {
                EntityKind::VertexMesh => EntityData::VertexMesh(vertex),
                EntityKind::VertexPface => EntityData::VertexPface(vertex),
                _ => EntityData::Vertex3d(vertex),
            };
            Entity::new(row.handle, styles.resolve(row.handle, kind), data)
        })
        .collect())
}

fn pface_faces<S: RecordSource>(session: &DocumentSession<S>) -> Result<Vec<Entity>, EngineError> {
    let kind = EntityKind::VertexPfaceFace;
    let rows = feed(kind, session.source().pface_faces())?;
    let styles = session.styles();
    let relationships = session.relationships();
    Ok(rows
        .into_iter()
        .map(|row| {
            let data = EntityData::VertexPfaceFace(PfaceFace {
                indices: row.indices,
                owner: relationships.owner_of(row.handle),
            });
            Entity::new(row.handle, styles.resolve(row.handle, kind), data)
        })
        .collect())
}

/// SEQEND 没有独立的行数据，句柄直接取自对象头索引。
fn seqends<S: RecordSource>(session: &DocumentSession<S>) -> Result<Vec<Entity>, EngineError> {
    let kind = EntityKind::Seqend;
    let headers = session
        .source()
        .object_headers()
        .map_err(|err| EngineError::source(Feed::ObjectHeaders, err))?;
    let styles = session.styles();
    let relationships = session.relationships();
    Ok(headers
        .into_iter()
        .filter(|header| header.entity_kind() == Some(kind))
        .map(|header| {
            let data = EntityData::Seqend(Seqend {
                owner: relationships.seqend_owner(header.handle),
            });
            Entity::new(header.handle, styles.resolve(header.handle, kind), data)
        })
        .collect())
}

fn modeler_entities<S: RecordSource>(
    session: &DocumentSession<S>,
    kind: EntityKind,
) -> Result<Vec<Entity>, EngineError> {
    let rows = feed(kind, session.source().modeler_entities(kind))?;
    let styles = session.styles();
    let graphs = session.acis_graphs();
    Ok(rows
        .into_iter()
        .map(|row| {
            let handle = row.handle;
            let acis_handles = modeler_acis_handles(&row, styles.layer_of(handle));
            let body = ModelerBody {
                acis_handles,
                acis: graphs.build(handle),
            };
            let data = match kind {
                EntityKind::Body => EntityData::Body(body),
                EntityKind::Region => EntityData::Region(body),
                _ => EntityData::Solid3d(body),
            };
            Entity::new(handle, styles.resolve(handle, kind), data)
        })
        .collect())
}

/// 去掉空句柄、图层句柄与重复项。
pub fn modeler_acis_handles(row: &ModelerRow, layer: Option<Handle>) -> Vec<Handle> {
    let mut seen = HashSet::new();
    row.acis_handles
        .iter()
        .copied()
        .filter(|handle| !handle.is_null() && Some(*handle) != layer && seen.insert(*handle))
        .collect()
}

pub fn arc_from_row(row: ArcRow) -> Arc {
    Arc {
        center: row.center,
        radius: row.radius,
        start_angle: row.start_angle.to_degrees(),
        end_angle: row.end_angle.to_degrees(),
    }
}

/// 凸度与宽度补齐或截断到顶点数；没有逐点宽度时用常量宽度展开。
pub fn lwpolyline_from_row(row: LwPolylineRow) -> LwPolyline {
    let count = row.points.len();
    let points: Vec<Point3> = row
        .points
        .iter()
        .map(|(x, y)| Point3::new(*x, *y, 0.0))
        .collect();

    let mut bulges = row.bulges;
    bulges.resize(count, 0.0);

    let mut widths = match (row.widths.is_empty(), row.const_width) {
        (true, Some(width)) => vec![(width, width); count],
        _ => row.widths,
    };
    widths.resize(count, (0.0, 0.0));

    LwPolyline {
        points,
        flags: row.flags,
        closed: row.flags & 0x01 != 0,
        bulges,
        widths,
        const_width: row.const_width,
    }
}

/// 标志位与曲线类型：有解读数据时以解读数据为准。
fn effective_curve_flags(
    row: &Polyline2dRow,
    interpretation: Option<&Polyline2dInterpretation>,
) -> (PolylineFlags, Option<CurveType>) {
    match interpretation {
        Some(interpretation) => (interpretation.flags, Some(curve_label(interpretation))),
        None => (PolylineFlags::from_bits(row.flags), None),
    }
}

fn curve_label(interpretation: &Polyline2dInterpretation) -> CurveType {
    let label = interpretation.curve_type_label.trim();
    if let Some(curve_type) = CurveType::from_label(label) {
        return curve_type;
    }
    if !label.is_empty() {
        let err = SourceError::malformed(
            "POLYLINE_2D interpretation",
            interpretation.handle,
            format!("unknown curve type label {label:?}"),
        );
        warn!(error = %err, "曲线类型标签无法识别，改用类型码");
    }
    CurveType::from_code(interpretation.curve_type)
}

/// 由原始行、可选的解读数据与插值采样组装 POLYLINE_2D。
///
/// 闭合多段线末尾重复的首点会被去掉，并同步去掉各逐点数组的末项。
pub fn polyline_2d_from_row(
    row: Polyline2dRow,
    interpretation: Option<&Polyline2dInterpretation>,
    samples: Option<&InterpolatedPolylineRow>,
    sequence: SequenceMembers,
) -> Polyline2d {
    let (flag_bits, curve_type_label) = effective_curve_flags(&row, interpretation);
    let closed = flag_bits.closed;

    let mut points = Vec::with_capacity(row.vertices.len());
    let mut bulges = Vec::with_capacity(row.vertices.len());
    let mut widths = Vec::with_capacity(row.vertices.len());
    let mut tangent_dirs = Vec::with_capacity(row.vertices.len());
    let mut vertex_flags = Vec::with_capacity(row.vertices.len());
    for vertex in &row.vertices {
        points.push(vertex.position);
        bulges.push(vertex.bulge);
        widths.push((vertex.start_width, vertex.end_width));
        tangent_dirs.push(vertex.tangent_dir);
        vertex_flags.push(vertex.flags);
    }
    if closed && curve::strip_duplicate_closure(&mut points) {
        bulges.pop();
        widths.pop();
        tangent_dirs.pop();
        vertex_flags.pop();
    }

    let should_interpolate = curve::should_interpolate(flag_bits, curve_type_label);
    let (interpolation_applied, interpolated_points) =
        match samples.filter(|sample| should_interpolate && sample.applied) {
            Some(sample) => {
                let mut sampled = sample.points.clone();
                if closed {
                    curve::strip_duplicate_closure(&mut sampled);
                }
                (true, sampled)
            }
            None => (false, Vec::new()),
        };

    let mut polyline = Polyline2d {
        points,
        flags: row.flags,
        flag_bits,
        closed,
        bulges,
        widths,
        tangent_dirs,
        vertex_flags,
        curve_type: interpretation.map(|interpretation| interpretation.curve_type),
        curve_type_label,
        should_interpolate,
        interpolation_applied,
        interpolated_points,
        curve: None,
        sequence,
    };
    polyline.curve = curve::build_payload(&polyline);
    polyline
}
