use dwgkit_core::document::{EntityKind, Handle, PolylineFlags};
use dwgkit_core::geometry::Point3;
use serde::{Deserialize, Serialize};

use crate::SourceError;

/// 对象头索引中的一行。`type_class` 为 `E`/`ENTITY` 时表示图形实体。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHeader {
    pub handle: Handle,
    pub offset: u32,
    pub data_size: u32,
    pub type_code: u16,
    pub type_name: String,
    #[serde(default)]
    pub type_class: String,
}

impl ObjectHeader {
    pub fn new(
        handle: u64,
        offset: u32,
        data_size: u32,
        type_code: u16,
        type_name: impl Into<String>,
        type_class: impl Into<String>,
    ) -> Self {
        Self {
            handle: Handle::new(handle),
            offset,
            data_size,
            type_code,
            type_name: type_name.into(),
            type_class: type_class.into(),
        }
    }

    /// 去除空白并转为大写的类型名。
    pub fn canonical_type_name(&self) -> String {
        self.type_name.trim().to_ascii_uppercase()
    }

    pub fn canonical_type_class(&self) -> String {
        self.type_class.trim().to_ascii_uppercase()
    }

    #[inline]
    pub fn is_entity(&self) -> bool {
        matches!(self.canonical_type_class().as_str(), "E" | "ENTITY")
    }

    /// 解码器无法识别的动态类型，名称形如 `UNKNOWN(0x221)`。
    #[inline]
    pub fn is_unknown(&self) -> bool {
        self.canonical_type_name().starts_with("UNKNOWN(")
    }

    pub fn entity_kind(&self) -> Option<EntityKind> {
        EntityKind::from_name(&self.type_name)
    }
}

/// 按句柄读取的原始记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub handle: Handle,
    pub offset: u32,
    pub data_size: u32,
    pub type_code: u16,
    #[serde(default)]
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleRow {
    pub handle: Handle,
    pub color_index: Option<u16>,
    pub true_color: Option<u32>,
    pub layer_handle: Handle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerColorRow {
    pub handle: Handle,
    pub color_index: u16,
    pub true_color: Option<u32>,
}

/// 多段线族的成员关系：顶点、面与 SEQEND 分别作为独立记录存放在文件中。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceMembersRow {
    pub owner_handle: Handle,
    pub owner_type: String,
    #[serde(default)]
    pub vertex_handles: Vec<Handle>,
    #[serde(default)]
    pub face_handles: Vec<Handle>,
    #[serde(default)]
    pub seqend_handle: Option<Handle>,
}

impl SequenceMembersRow {
    pub fn owner_kind(&self) -> Result<EntityKind, SourceError> {
        match EntityKind::from_name(&self.owner_type) {
            Some(kind) if kind.is_polyline_owner() => Ok(kind),
            _ => Err(SourceError::malformed(
                "sequence",
                self.owner_handle,
                format!("unexpected owner type {:?}", self.owner_type),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRow {
    pub handle: Handle,
    pub start: Point3,
    pub end: Point3,
}

/// 角度单位为弧度。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcRow {
    pub handle: Handle,
    pub center: Point3,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleRow {
    pub handle: Handle,
    pub center: Point3,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LwPolylineRow {
    pub handle: Handle,
    pub flags: u16,
    pub points: Vec<(f64, f64)>,
    #[serde(default)]
    pub bulges: Vec<f64>,
    #[serde(default)]
    pub widths: Vec<(f64, f64)>,
    #[serde(default)]
    pub const_width: Option<f64>,
}

/// POLYLINE_2D 的顶点数据，`tangent_dir` 的单位由上游决定（通常为弧度）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Polyline2dVertex {
    pub position: Point3,
    #[serde(default)]
    pub start_width: f64,
    #[serde(default)]
    pub end_width: f64,
    #[serde(default)]
    pub bulge: f64,
    #[serde(default)]
    pub tangent_dir: f64,
    #[serde(default)]
    pub flags: u8,
}

impl Polyline2dVertex {
    pub fn at(position: Point3) -> Self {
        Self {
            position,
            start_width: 0.0,
            end_width: 0.0,
            bulge: 0.0,
            tangent_dir: 0.0,
            flags: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline2dRow {
    pub handle: Handle,
    pub flags: u16,
    #[serde(default)]
    pub vertices: Vec<Polyline2dVertex>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex2dRow {
    pub handle: Handle,
    pub flags: u8,
    pub position: Point3,
    #[serde(default)]
    pub start_width: f64,
    #[serde(default)]
    pub end_width: f64,
    #[serde(default)]
    pub bulge: f64,
    #[serde(default)]
    pub tangent_dir: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline3dRow {
    pub handle: Handle,
    pub flags: u16,
    pub closed: bool,
    #[serde(default)]
    pub points: Vec<Point3>,
}

/// VERTEX_3D / VERTEX_MESH / VERTEX_PFACE 行。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointVertexRow {
    pub handle: Handle,
    pub flags: u8,
    pub position: Point3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolylineMeshRow {
    pub handle: Handle,
    pub flags: u16,
    pub m_vertex_count: u16,
    pub n_vertex_count: u16,
    pub closed: bool,
    #[serde(default)]
    pub points: Vec<Point3>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolylinePfaceRow {
    pub handle: Handle,
    pub num_vertices: u16,
    pub num_faces: u16,
    #[serde(default)]
    pub vertices: Vec<Point3>,
    #[serde(default)]
    pub faces: Vec<[i16; 4]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PfaceFaceRow {
    pub handle: Handle,
    pub indices: [i16; 4],
}

/// 3DSOLID / BODY / REGION 行，`acis_handles` 为解码器直接读到的引用。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelerRow {
    pub handle: Handle,
    #[serde(default)]
    pub acis_handles: Vec<Handle>,
}

/// 旁路通道：对 POLYLINE_2D 标志位和曲线类型的高置信度解读。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polyline2dInterpretation {
    pub handle: Handle,
    pub curve_type: u16,
    pub curve_type_label: String,
    #[serde(flatten)]
    pub flags: PolylineFlags,
}

/// 旁路通道：上游已插值的采样点。`applied` 为假时该行不可用。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolatedPolylineRow {
    pub handle: Handle,
    pub flags: u16,
    pub applied: bool,
    #[serde(default)]
    pub points: Vec<Point3>,
}

/// 旁路通道：ACIS 伴随记录的解码提示。`confidence` 预期在 [0, 100]。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcisCandidateInfo {
    pub handle: Handle,
    pub type_code: u16,
    pub data_size: u32,
    #[serde(default)]
    pub role_hint: String,
    #[serde(default)]
    pub refs: Vec<Handle>,
    #[serde(default)]
    pub confidence: i32,
}
