pub mod geometry {
    use glam::DVec3;
    use serde::{Deserialize, Serialize};

    /// 端点量化精度（小数点后 6 位），用于按坐标分组。
    const SNAP_SCALE: f64 = 1.0e6;

    /// 三维点，内部以 `glam::DVec3` 表示，序列化为 `[x, y, z]`。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn vector_to(self, other: Point3) -> Vector3 {
            Vector3(other.0 - self.0)
        }

        /// 量化后的坐标键，两个点在 1e-6 精度内重合时键相同。
        #[inline]
        pub fn snap_key(self) -> (i64, i64, i64) {
            (
                (self.0.x * SNAP_SCALE).round() as i64,
                (self.0.y * SNAP_SCALE).round() as i64,
                (self.0.z * SNAP_SCALE).round() as i64,
            )
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    impl From<(f64, f64, f64)> for Point3 {
        fn from((x, y, z): (f64, f64, f64)) -> Self {
            Self::new(x, y, z)
        }
    }

    /// 三维向量，目前用于样条端点切向。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector3(pub DVec3);

    impl Vector3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        /// XY 平面内、与 X 轴夹角为 `radians` 的单位向量。
        #[inline]
        pub fn from_angle(radians: f64) -> Self {
            Self::new(radians.cos(), radians.sin(), 0.0)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        /// 在 XY 平面上的投影长度。
        #[inline]
        pub fn planar_length(self) -> f64 {
            self.0.x.hypot(self.0.y)
        }
    }

    impl From<DVec3> for Vector3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }
}

pub mod document {
    use std::error::Error;
    use std::fmt::{self, Display, Formatter};
    use std::str::FromStr;

    use serde::{Deserialize, Serialize};

    use crate::acis::AcisGraph;
    use crate::curve::{CurvePayload, CurveType};
    use crate::geometry::Point3;

    /// DWG 对象句柄。同一文档内唯一且不会复用；缺省值为空句柄 0。
    #[derive(
        Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    )]
    #[serde(transparent)]
    pub struct Handle(u64);

    impl Handle {
        #[inline]
        pub const fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub const fn get(self) -> u64 {
            self.0
        }

        #[inline]
        pub const fn is_null(self) -> bool {
            self.0 == 0
        }
    }

    impl From<u64> for Handle {
        fn from(value: u64) -> Self {
            Self(value)
        }
    }

    impl Display for Handle {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "{:X}", self.0)
        }
    }

    /// 名称解析失败（版本号或实体类型）。
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct UnknownName {
        pub what: &'static str,
        pub value: String,
    }

    impl Display for UnknownName {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "unknown {}: {}", self.what, self.value)
        }
    }

    impl Error for UnknownName {}

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum DwgVersion {
        #[serde(rename = "AC1014")]
        R14,
        #[serde(rename = "AC1015")]
        R2000,
        #[serde(rename = "AC1018")]
        R2004,
        #[serde(rename = "AC1021")]
        R2007,
        #[serde(rename = "AC1024")]
        R2010,
        #[serde(rename = "AC1027")]
        R2013,
        #[serde(rename = "AC1032")]
        R2018,
    }

    impl DwgVersion {
        pub const ALL: [DwgVersion; 7] = [
            DwgVersion::R14,
            DwgVersion::R2000,
            DwgVersion::R2004,
            DwgVersion::R2007,
            DwgVersion::R2010,
            DwgVersion::R2013,
            DwgVersion::R2018,
        ];

        /// 文件头中的版本标识，例如 `AC1032`。
        pub fn code(self) -> &'static str {
            match self {
                DwgVersion::R14 => "AC1014",
                DwgVersion::R2000 => "AC1015",
                DwgVersion::R2004 => "AC1018",
                DwgVersion::R2007 => "AC1021",
                DwgVersion::R2010 => "AC1024",
                DwgVersion::R2013 => "AC1027",
                DwgVersion::R2018 => "AC1032",
            }
        }
    }

    impl Display for DwgVersion {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            f.write_str(self.code())
        }
    }

    impl FromStr for DwgVersion {
        type Err = UnknownName;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let code = s.trim().to_ascii_uppercase();
            DwgVersion::ALL
                .into_iter()
                .find(|version| version.code() == code)
                .ok_or(UnknownName {
                    what: "DWG version",
                    value: s.to_string(),
                })
        }
    }

    /// 重建层支持的实体类型。序列化名称与 DXF 类型标签一致。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub enum EntityKind {
        #[serde(rename = "LINE")]
        Line,
        #[serde(rename = "ARC")]
        Arc,
        #[serde(rename = "CIRCLE")]
        Circle,
        #[serde(rename = "LWPOLYLINE")]
        LwPolyline,
        #[serde(rename = "POLYLINE_2D")]
        Polyline2d,
        #[serde(rename = "VERTEX_2D")]
        Vertex2d,
        #[serde(rename = "POLYLINE_3D")]
        Polyline3d,
        #[serde(rename = "VERTEX_3D")]
        Vertex3d,
        #[serde(rename = "POLYLINE_MESH")]
        PolylineMesh,
        #[serde(rename = "VERTEX_MESH")]
        VertexMesh,
        #[serde(rename = "POLYLINE_PFACE")]
        PolylinePface,
        #[serde(rename = "VERTEX_PFACE")]
        VertexPface,
        #[serde(rename = "VERTEX_PFACE_FACE")]
        VertexPfaceFace,
        #[serde(rename = "SEQEND")]
        Seqend,
        #[serde(rename = "3DSOLID")]
        Solid3d,
        #[serde(rename = "BODY")]
        Body,
        #[serde(rename = "REGION")]
        Region,
    }

    impl EntityKind {
        /// 默认查询顺序。
        pub const ALL: [EntityKind; 17] = [
            EntityKind::Line,
            EntityKind::LwPolyline,
            EntityKind::Polyline2d,
            EntityKind::Vertex2d,
            EntityKind::Polyline3d,
            EntityKind::Vertex3d,
            EntityKind::PolylineMesh,
            EntityKind::VertexMesh,
            EntityKind::PolylinePface,
            EntityKind::VertexPface,
            EntityKind::VertexPfaceFace,
            EntityKind::Seqend,
            EntityKind::Solid3d,
            EntityKind::Body,
            EntityKind::Region,
            EntityKind::Arc,
            EntityKind::Circle,
        ];

        pub fn dxftype(self) -> &'static str {
            match self {
                EntityKind::Line => "LINE",
                EntityKind::Arc => "ARC",
                EntityKind::Circle => "CIRCLE",
                EntityKind::LwPolyline => "LWPOLYLINE",
                EntityKind::Polyline2d => "POLYLINE_2D",
                EntityKind::Vertex2d => "VERTEX_2D",
                EntityKind::Polyline3d => "POLYLINE_3D",
                EntityKind::Vertex3d => "VERTEX_3D",
                EntityKind::PolylineMesh => "POLYLINE_MESH",
                EntityKind::VertexMesh => "VERTEX_MESH",
                EntityKind::PolylinePface => "POLYLINE_PFACE",
                EntityKind::VertexPface => "VERTEX_PFACE",
                EntityKind::VertexPfaceFace => "VERTEX_PFACE_FACE",
                EntityKind::Seqend => "SEQEND",
                EntityKind::Solid3d => "3DSOLID",
                EntityKind::Body => "BODY",
                EntityKind::Region => "REGION",
            }
        }

        /// 按名称查找（忽略大小写与首尾空白）。
        pub fn from_name(name: &str) -> Option<Self> {
            let name = name.trim().to_ascii_uppercase();
            EntityKind::ALL
                .into_iter()
                .find(|kind| kind.dxftype() == name)
        }

        /// 顶点与 SEQEND 只在显式点名时返回，不进入默认查询集合。
        pub fn is_explicit_only(self) -> bool {
            matches!(
                self,
                EntityKind::Vertex2d
                    | EntityKind::Vertex3d
                    | EntityKind::VertexMesh
                    | EntityKind::VertexPface
                    | EntityKind::VertexPfaceFace
                    | EntityKind::Seqend
            )
        }

        /// 携带 ACIS 数据的建模实体。
        pub fn is_modeler(self) -> bool {
            matches!(
                self,
                EntityKind::Solid3d | EntityKind::Body | EntityKind::Region
            )
        }

        pub fn is_polyline_owner(self) -> bool {
            matches!(
                self,
                EntityKind::Polyline2d
                    | EntityKind::Polyline3d
                    | EntityKind::PolylineMesh
                    | EntityKind::PolylinePface
            )
        }
    }

    impl Display for EntityKind {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            f.write_str(self.dxftype())
        }
    }

    impl FromStr for EntityKind {
        type Err = UnknownName;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            EntityKind::from_name(s).ok_or(UnknownName {
                what: "entity type",
                value: s.to_string(),
            })
        }
    }

    /// ACI 取值 0/256/257 分别表示 ByBlock/ByLayer/ByEntity，缺省值视同 ByLayer。
    #[inline]
    pub fn is_color_sentinel(index: Option<u16>) -> bool {
        matches!(index, None | Some(0) | Some(256) | Some(257))
    }

    /// 颜色对：ACI 索引与 24 位真彩色，二者均可缺省。
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ColorSpec {
        pub index: Option<u16>,
        pub true_color: Option<u32>,
    }

    impl ColorSpec {
        #[inline]
        pub const fn new(index: Option<u16>, true_color: Option<u32>) -> Self {
            Self { index, true_color }
        }

        #[inline]
        pub const fn aci(index: u16) -> Self {
            Self {
                index: Some(index),
                true_color: None,
            }
        }

        /// 索引为哨兵值且没有真彩色时需要从图层继承。
        #[inline]
        pub fn is_by_layer(self) -> bool {
            is_color_sentinel(self.index) && self.true_color.is_none()
        }

        /// 数据兼容处理：索引为哨兵值而真彩色落在 [1, 257] 时，
        /// 该值实际是 ACI 索引而非 RGB。
        pub fn normalized(self) -> Self {
            match self.true_color {
                Some(value @ 1..=257) if is_color_sentinel(self.index) => Self {
                    index: Some(value as u16),
                    true_color: None,
                },
                _ => self,
            }
        }
    }

    /// 实体样式：原始颜色、所在图层以及解析后的有效颜色。
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct EntityStyle {
        pub color_index: Option<u16>,
        pub true_color: Option<u32>,
        pub layer_handle: Option<Handle>,
        pub resolved_color_index: Option<u16>,
        pub resolved_true_color: Option<u32>,
        /// 仅影响显示颜色的辅助线标记。
        #[serde(default)]
        pub supplementary: bool,
    }

    impl EntityStyle {
        #[inline]
        pub fn resolved(&self) -> ColorSpec {
            ColorSpec::new(self.resolved_color_index, self.resolved_true_color)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct OwnerRef {
        pub handle: Handle,
        pub kind: EntityKind,
    }

    /// 多段线族拥有的顶点、面与 SEQEND 终止记录。
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SequenceMembers {
        pub vertex_handles: Vec<Handle>,
        pub face_handles: Vec<Handle>,
        pub seqend_handle: Option<Handle>,
    }

    impl SequenceMembers {
        pub fn is_empty(&self) -> bool {
            self.vertex_handles.is_empty()
                && self.face_handles.is_empty()
                && self.seqend_handle.is_none()
        }
    }

    /// POLYLINE 组码 70 的位定义。
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PolylineFlags {
        pub closed: bool,
        pub curve_fit: bool,
        pub spline_fit: bool,
        pub is_3d_polyline: bool,
        pub is_3d_mesh: bool,
        pub is_closed_mesh: bool,
        pub is_polyface_mesh: bool,
        pub continuous_linetype: bool,
    }

    impl PolylineFlags {
        pub fn from_bits(bits: u16) -> Self {
            Self {
                closed: bits & 0x01 != 0,
                curve_fit: bits & 0x02 != 0,
                spline_fit: bits & 0x04 != 0,
                is_3d_polyline: bits & 0x08 != 0,
                is_3d_mesh: bits & 0x10 != 0,
                is_closed_mesh: bits & 0x20 != 0,
                is_polyface_mesh: bits & 0x40 != 0,
                continuous_linetype: bits & 0x80 != 0,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point3,
        pub end: Point3,
    }

    /// 角度单位为度。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point3,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point3,
        pub radius: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct LwPolyline {
        pub points: Vec<Point3>,
        pub flags: u16,
        pub closed: bool,
        pub bulges: Vec<f64>,
        pub widths: Vec<(f64, f64)>,
        pub const_width: Option<f64>,
    }

    /// 旧式二维多段线。`curve` 为导出时应使用的样条数据（若需要插值）。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Polyline2d {
        pub points: Vec<Point3>,
        pub flags: u16,
        pub flag_bits: PolylineFlags,
        pub closed: bool,
        pub bulges: Vec<f64>,
        pub widths: Vec<(f64, f64)>,
        pub tangent_dirs: Vec<f64>,
        pub vertex_flags: Vec<u8>,
        pub curve_type: Option<u16>,
        pub curve_type_label: Option<CurveType>,
        pub should_interpolate: bool,
        pub interpolation_applied: bool,
        pub interpolated_points: Vec<Point3>,
        pub curve: Option<CurvePayload>,
        pub sequence: SequenceMembers,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Vertex2d {
        pub position: Point3,
        pub flags: u8,
        pub start_width: f64,
        pub end_width: f64,
        pub bulge: f64,
        pub tangent_dir: f64,
        pub owner: Option<OwnerRef>,
    }

    /// VERTEX_3D / VERTEX_MESH / VERTEX_PFACE 共用的顶点数据。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SequenceVertex {
        pub position: Point3,
        pub flags: u8,
        pub owner: Option<OwnerRef>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Polyline3d {
        pub points: Vec<Point3>,
        pub flags: u16,
        pub closed: bool,
        pub sequence: SequenceMembers,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PolylineMesh {
        pub points: Vec<Point3>,
        pub flags: u16,
        pub m_vertex_count: u16,
        pub n_vertex_count: u16,
        pub closed: bool,
        pub sequence: SequenceMembers,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PolylinePface {
        pub num_vertices: u16,
        pub num_faces: u16,
        pub vertices: Vec<Point3>,
        pub faces: Vec<[i16; 4]>,
        pub sequence: SequenceMembers,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PfaceFace {
        pub indices: [i16; 4],
        pub owner: Option<OwnerRef>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Seqend {
        pub owner: Option<OwnerRef>,
    }

    /// 3DSOLID / BODY / REGION。`acis` 为伴随记录重建出的引用图。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ModelerBody {
        pub acis_handles: Vec<Handle>,
        pub acis: AcisGraph,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "dxftype", content = "data")]
    pub enum EntityData {
        #[serde(rename = "LINE")]
        Line(Line),
        #[serde(rename = "ARC")]
        Arc(Arc),
        #[serde(rename = "CIRCLE")]
        Circle(Circle),
        #[serde(rename = "LWPOLYLINE")]
        LwPolyline(LwPolyline),
        #[serde(rename = "POLYLINE_2D")]
        Polyline2d(Polyline2d),
        #[serde(rename = "VERTEX_2D")]
        Vertex2d(Vertex2d),
        #[serde(rename = "POLYLINE_3D")]
        Polyline3d(Polyline3d),
        #[serde(rename = "VERTEX_3D")]
        Vertex3d(SequenceVertex),
        #[serde(rename = "POLYLINE_MESH")]
        PolylineMesh(PolylineMesh),
        #[serde(rename = "VERTEX_MESH")]
        VertexMesh(SequenceVertex),
        #[serde(rename = "POLYLINE_PFACE")]
        PolylinePface(PolylinePface),
        #[serde(rename = "VERTEX_PFACE")]
        VertexPface(SequenceVertex),
        #[serde(rename = "VERTEX_PFACE_FACE")]
        VertexPfaceFace(PfaceFace),
        #[serde(rename = "SEQEND")]
        Seqend(Seqend),
        #[serde(rename = "3DSOLID")]
        Solid3d(ModelerBody),
        #[serde(rename = "BODY")]
        Body(ModelerBody),
        #[serde(rename = "REGION")]
        Region(ModelerBody),
    }

    impl EntityData {
        pub fn kind(&self) -> EntityKind {
            match self {
                EntityData::Line(_) => EntityKind::Line,
                EntityData::Arc(_) => EntityKind::Arc,
                EntityData::Circle(_) => EntityKind::Circle,
                EntityData::LwPolyline(_) => EntityKind::LwPolyline,
                EntityData::Polyline2d(_) => EntityKind::Polyline2d,
                EntityData::Vertex2d(_) => EntityKind::Vertex2d,
                EntityData::Polyline3d(_) => EntityKind::Polyline3d,
                EntityData::Vertex3d(_) => EntityKind::Vertex3d,
                EntityData::PolylineMesh(_) => EntityKind::PolylineMesh,
                EntityData::VertexMesh(_) => EntityKind::VertexMesh,
                EntityData::PolylinePface(_) => EntityKind::PolylinePface,
                EntityData::VertexPface(_) => EntityKind::VertexPface,
                EntityData::VertexPfaceFace(_) => EntityKind::VertexPfaceFace,
                EntityData::Seqend(_) => EntityKind::Seqend,
                EntityData::Solid3d(_) => EntityKind::Solid3d,
                EntityData::Body(_) => EntityKind::Body,
                EntityData::Region(_) => EntityKind::Region,
            }
        }

        /// 顶点、面与 SEQEND 的所属多段线。
        pub fn owner(&self) -> Option<OwnerRef> {
            match self {
                EntityData::Vertex2d(vertex) => vertex.owner,
                EntityData::Vertex3d(vertex)
                | EntityData::VertexMesh(vertex)
                | EntityData::VertexPface(vertex) => vertex.owner,
                EntityData::VertexPfaceFace(face) => face.owner,
                EntityData::Seqend(seqend) => seqend.owner,
                _ => None,
            }
        }

        pub fn modeler_body(&self) -> Option<&ModelerBody> {
            match self {
                EntityData::Solid3d(body) | EntityData::Body(body) | EntityData::Region(body) => {
                    Some(body)
                }
                _ => None,
            }
        }
    }

    /// 重建后的实体快照。构造后不可变，交付给调用方独占。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Entity {
        handle: Handle,
        style: EntityStyle,
        #[serde(flatten)]
        data: EntityData,
    }

    impl Entity {
        pub fn new(handle: Handle, style: EntityStyle, data: EntityData) -> Self {
            Self {
                handle,
                style,
                data,
            }
        }

        #[inline]
        pub fn handle(&self) -> Handle {
            self.handle
        }

        #[inline]
        pub fn kind(&self) -> EntityKind {
            self.data.kind()
        }

        #[inline]
        pub fn dxftype(&self) -> &'static str {
            self.kind().dxftype()
        }

        #[inline]
        pub fn style(&self) -> &EntityStyle {
            &self.style
        }

        #[inline]
        pub fn data(&self) -> &EntityData {
            &self.data
        }

        pub fn into_data(self) -> EntityData {
            self.data
        }
    }
}

pub mod curve {
    use std::fmt::{self, Display, Formatter};

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Point3, Vector3};

    /// 二维多段线的平滑曲线类型（组码 75）。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum CurveType {
        None,
        QuadraticBSpline,
        CubicBSpline,
        Bezier,
        Unknown(u16),
    }

    impl CurveType {
        pub fn from_code(code: u16) -> Self {
            match code {
                0 => CurveType::None,
                5 => CurveType::QuadraticBSpline,
                6 => CurveType::CubicBSpline,
                8 => CurveType::Bezier,
                other => CurveType::Unknown(other),
            }
        }

        /// 解析旁路通道给出的标签，无法识别时返回 `None`。
        pub fn from_label(label: &str) -> Option<Self> {
            match label.trim() {
                "None" => Some(CurveType::None),
                "QuadraticBSpline" => Some(CurveType::QuadraticBSpline),
                "CubicBSpline" => Some(CurveType::CubicBSpline),
                "Bezier" => Some(CurveType::Bezier),
                _ => None,
            }
        }

        /// 纯样条/贝塞尔类型。
        pub fn is_spline(self) -> bool {
            matches!(
                self,
                CurveType::QuadraticBSpline | CurveType::CubicBSpline | CurveType::Bezier
            )
        }

        /// 按曲线类型推荐的样条阶数。
        pub fn preferred_degree(self) -> u8 {
            match self {
                CurveType::QuadraticBSpline => 2,
                _ => 3,
            }
        }
    }

    impl Display for CurveType {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            match self {
                CurveType::None => f.write_str("None"),
                CurveType::QuadraticBSpline => f.write_str("QuadraticBSpline"),
                CurveType::CubicBSpline => f.write_str("CubicBSpline"),
                CurveType::Bezier => f.write_str("Bezier"),
                CurveType::Unknown(code) => write!(f, "Unknown({code})"),
            }
        }
    }

    /// 导出为样条时的数据：控制点样条或拟合点样条。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "kind", rename_all = "snake_case")]
    pub enum CurvePayload {
        Control {
            control_points: Vec<Point3>,
            degree: u8,
            knots: Vec<f64>,
            closed: bool,
        },
        Fit {
            fit_points: Vec<Point3>,
            degree: u8,
            /// 起点与终点切向，仅开放曲线可能提供。
            tangents: Option<[Vector3; 2]>,
            closed: bool,
        },
    }

    impl CurvePayload {
        pub fn degree(&self) -> u8 {
            match self {
                CurvePayload::Control { degree, .. } | CurvePayload::Fit { degree, .. } => *degree,
            }
        }

        pub fn is_closed(&self) -> bool {
            match self {
                CurvePayload::Control { closed, .. } | CurvePayload::Fit { closed, .. } => *closed,
            }
        }

        pub fn points(&self) -> &[Point3] {
            match self {
                CurvePayload::Control { control_points, .. } => control_points,
                CurvePayload::Fit { fit_points, .. } => fit_points,
            }
        }
    }
}

pub mod acis {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};

    use crate::document::Handle;

    /// 伴随记录在 ACIS 数据中的推测角色。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum RoleHint {
        AcisHeader,
        AcisTextHeader,
        AcisLinkTable,
        AcisPayloadMain,
        AcisPayloadChunk,
        AcisAux,
        #[default]
        Unknown,
    }

    impl RoleHint {
        pub fn as_str(self) -> &'static str {
            match self {
                RoleHint::AcisHeader => "acis-header",
                RoleHint::AcisTextHeader => "acis-text-header",
                RoleHint::AcisLinkTable => "acis-link-table",
                RoleHint::AcisPayloadMain => "acis-payload-main",
                RoleHint::AcisPayloadChunk => "acis-payload-chunk",
                RoleHint::AcisAux => "acis-aux",
                RoleHint::Unknown => "unknown",
            }
        }

        pub fn from_label(label: &str) -> Option<Self> {
            match label.trim() {
                "acis-header" => Some(RoleHint::AcisHeader),
                "acis-text-header" => Some(RoleHint::AcisTextHeader),
                "acis-link-table" => Some(RoleHint::AcisLinkTable),
                "acis-payload-main" => Some(RoleHint::AcisPayloadMain),
                "acis-payload-chunk" => Some(RoleHint::AcisPayloadChunk),
                "acis-aux" => Some(RoleHint::AcisAux),
                "unknown" => Some(RoleHint::Unknown),
                _ => None,
            }
        }

        #[inline]
        pub fn is_header(self) -> bool {
            matches!(self, RoleHint::AcisHeader | RoleHint::AcisTextHeader)
        }

        #[inline]
        pub fn is_payload(self) -> bool {
            matches!(self, RoleHint::AcisPayloadMain | RoleHint::AcisPayloadChunk)
        }
    }

    /// 父引用列表的来源策略。低置信度结果通过该字段保持可见。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum RefStrategy {
        #[default]
        None,
        ScanOnly,
        Stream,
        StreamOverlap,
        StreamScanOverlap,
        StreamMid,
        LowconfDrop,
        LowconfEntityFallback,
    }

    impl RefStrategy {
        pub fn as_str(self) -> &'static str {
            match self {
                RefStrategy::None => "none",
                RefStrategy::ScanOnly => "scan-only",
                RefStrategy::Stream => "stream",
                RefStrategy::StreamOverlap => "stream-overlap",
                RefStrategy::StreamScanOverlap => "stream-scan-overlap",
                RefStrategy::StreamMid => "stream-mid",
                RefStrategy::LowconfDrop => "lowconf-drop",
                RefStrategy::LowconfEntityFallback => "lowconf-entity-fallback",
            }
        }

        pub fn is_low_confidence(self) -> bool {
            matches!(
                self,
                RefStrategy::LowconfDrop | RefStrategy::LowconfEntityFallback
            )
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ParentKind {
        #[default]
        None,
        Entity,
        Candidate,
        External,
    }

    /// 选出父句柄的规则名称。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum ParentRule {
        #[default]
        None,
        HeaderPrefersEntity,
        HeaderFallbackCandidate,
        LinkPrefersHeader,
        LinkFallbackCandidate,
        LinkFallbackEntity,
        PayloadPrefersLink,
        PayloadPrefersPayload,
        PayloadFallbackHeader,
        PayloadFallbackCandidate,
        PayloadFallbackEntity,
        GenericEntity,
        GenericCandidate,
        ExternalFallback,
    }

    impl ParentRule {
        pub fn as_str(self) -> &'static str {
            match self {
                ParentRule::None => "none",
                ParentRule::HeaderPrefersEntity => "header-prefers-entity",
                ParentRule::HeaderFallbackCandidate => "header-fallback-candidate",
                ParentRule::LinkPrefersHeader => "link-prefers-header",
                ParentRule::LinkFallbackCandidate => "link-fallback-candidate",
                ParentRule::LinkFallbackEntity => "link-fallback-entity",
                ParentRule::PayloadPrefersLink => "payload-prefers-link",
                ParentRule::PayloadPrefersPayload => "payload-prefers-payload",
                ParentRule::PayloadFallbackHeader => "payload-fallback-header",
                ParentRule::PayloadFallbackCandidate => "payload-fallback-candidate",
                ParentRule::PayloadFallbackEntity => "payload-fallback-entity",
                ParentRule::GenericEntity => "generic-entity",
                ParentRule::GenericCandidate => "generic-candidate",
                ParentRule::ExternalFallback => "external-fallback",
            }
        }
    }

    /// 引用目标在对象头索引中的描述。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct HandleRefDetail {
        pub handle: Handle,
        pub offset: u32,
        pub data_size: u32,
        pub type_code: u16,
        pub type_name: String,
        pub type_class: String,
    }

    /// 单条 ACIS 伴随记录。
    ///
    /// 前半部分字段来自文档级分析（原始字节、旁路通道），随文档缓存；
    /// 后半部分（`candidate_index` 起）在为某个实体组装引用图时填充。
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AcisCandidateRecord {
        pub handle: Handle,
        pub offset: u32,
        pub data_size: u32,
        pub type_code: u16,
        pub type_name: String,
        pub record_size: Option<usize>,
        pub ascii_preview: Option<String>,
        pub likely_handle_refs: Vec<Handle>,
        pub likely_handle_ref_details: Vec<HandleRefDetail>,
        pub stream_refs: Vec<Handle>,
        pub scanned_refs: Vec<Handle>,
        pub parent_ref_handles: Vec<Handle>,
        pub parent_ref_strategy: RefStrategy,
        pub ref_confidence: u8,
        pub role_hint: RoleHint,

        pub candidate_index: usize,
        pub effective_strategy: RefStrategy,
        pub entity_ref_handles: Vec<Handle>,
        pub candidate_ref_handles: Vec<Handle>,
        pub external_ref_handles: Vec<Handle>,
        pub parent_handle: Option<Handle>,
        pub parent_kind: ParentKind,
        pub parent_rule: ParentRule,
        pub child_candidate_handles: Vec<Handle>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AcisEdge {
        pub source: Handle,
        pub target: Handle,
        pub kind: ParentKind,
    }

    /// 每条候选记录至多一条的主边：指向选中的父句柄。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AcisPrimaryEdge {
        pub source: Handle,
        pub target: Handle,
        pub kind: ParentKind,
        pub rule: ParentRule,
    }

    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AcisGraph {
        pub candidate_handles: Vec<Handle>,
        pub records: Vec<AcisCandidateRecord>,
        pub edges: Vec<AcisEdge>,
        pub primary_edges: Vec<AcisPrimaryEdge>,
        /// 父句柄 → 以其为父的候选句柄。
        pub children: BTreeMap<Handle, Vec<Handle>>,
    }

    impl AcisGraph {
        pub fn is_empty(&self) -> bool {
            self.candidate_handles.is_empty()
        }

        pub fn record(&self, handle: Handle) -> Option<&AcisCandidateRecord> {
            self.records.iter().find(|record| record.handle == handle)
        }
    }
}
