//! 记录源边界：底层 DWG 位流解码器以按类型的行数据形式提供对象，
//! 本 crate 把这些行固定为显式结构体，之后的重建层不再处理形状不确定的元组。

pub mod memory;
pub mod rows;

use std::fmt::{self, Display, Formatter};

use dwgkit_core::document::{DwgVersion, EntityKind, Handle};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemorySource;
pub use rows::*;

/// 记录源提供的一类数据。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    ObjectHeaders,
    ObjectRecords,
    EntityStyles,
    LayerColors,
    SequenceMembers,
    Entities(EntityKind),
    Polyline2dInterpretations,
    Polyline2dInterpolated,
    AcisCandidateInfos,
}

impl Display for Feed {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Feed::ObjectHeaders => f.write_str("object headers"),
            Feed::ObjectRecords => f.write_str("object records"),
            Feed::EntityStyles => f.write_str("entity styles"),
            Feed::LayerColors => f.write_str("layer colors"),
            Feed::SequenceMembers => f.write_str("polyline sequence members"),
            Feed::Entities(kind) => write!(f, "{kind} entities"),
            Feed::Polyline2dInterpretations => f.write_str("interpreted POLYLINE_2D data"),
            Feed::Polyline2dInterpolated => f.write_str("interpolated POLYLINE_2D points"),
            Feed::AcisCandidateInfos => f.write_str("ACIS candidate infos"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to decode {feed}: {message}")]
    Decode { feed: Feed, message: String },
    #[error("{feed} is not available from this source")]
    Unavailable { feed: Feed },
    #[error("malformed {context} record {handle}: {message}")]
    MalformedRecord {
        context: &'static str,
        handle: Handle,
        message: String,
    },
}

impl SourceError {
    pub fn decode(feed: Feed, message: impl Into<String>) -> Self {
        Self::Decode {
            feed,
            message: message.into(),
        }
    }

    pub fn malformed(context: &'static str, handle: Handle, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            context,
            handle,
            message: message.into(),
        }
    }
}

/// 底层解码器对外暴露的接口。
///
/// 每个方法返回一整类行数据；整类解码失败以 `Err` 报告。
/// 旁路通道（解释后的曲线信息、ACIS 引用提示）为可选能力，默认返回空集合。
pub trait RecordSource {
    fn version(&self) -> DwgVersion;

    /// 全文档对象头索引。
    fn object_headers(&self) -> Result<Vec<ObjectHeader>, SourceError>;

    /// 按句柄读取原始记录字节，未知句柄直接跳过。
    fn object_records(&self, handles: &[Handle]) -> Result<Vec<ObjectRecord>, SourceError>;

    fn entity_styles(&self) -> Result<Vec<StyleRow>, SourceError>;
    fn layer_colors(&self) -> Result<Vec<LayerColorRow>, SourceError>;
    fn sequence_members(&self) -> Result<Vec<SequenceMembersRow>, SourceError>;

    fn lines(&self) -> Result<Vec<LineRow>, SourceError>;
    fn arcs(&self) -> Result<Vec<ArcRow>, SourceError>;
    fn circles(&self) -> Result<Vec<CircleRow>, SourceError>;
    fn lwpolylines(&self) -> Result<Vec<LwPolylineRow>, SourceError>;
    fn polylines_2d(&self) -> Result<Vec<Polyline2dRow>, SourceError>;
    fn vertices_2d(&self) -> Result<Vec<Vertex2dRow>, SourceError>;
    fn polylines_3d(&self) -> Result<Vec<Polyline3dRow>, SourceError>;
    fn polyline_meshes(&self) -> Result<Vec<PolylineMeshRow>, SourceError>;
    fn polyline_pfaces(&self) -> Result<Vec<PolylinePfaceRow>, SourceError>;
    fn pface_faces(&self) -> Result<Vec<PfaceFaceRow>, SourceError>;

    /// VERTEX_3D / VERTEX_MESH / VERTEX_PFACE 的顶点行。
    fn point_vertices(&self, kind: EntityKind) -> Result<Vec<PointVertexRow>, SourceError>;

    /// 3DSOLID / BODY / REGION 的实体行。
    fn modeler_entities(&self, kind: EntityKind) -> Result<Vec<ModelerRow>, SourceError>;

    fn polyline_2d_interpretations(&self) -> Result<Vec<Polyline2dInterpretation>, SourceError> {
        Ok(Vec::new())
    }

    fn polyline_2d_interpolated(
        &self,
        _segments_per_span: usize,
    ) -> Result<Vec<InterpolatedPolylineRow>, SourceError> {
        Ok(Vec::new())
    }

    fn acis_candidate_infos(
        &self,
        _handles: &[Handle],
    ) -> Result<Vec<AcisCandidateInfo>, SourceError> {
        Ok(Vec::new())
    }
}

impl<S: RecordSource + ?Sized> RecordSource for &S {
    fn version(&self) -> DwgVersion {
        (**self).version()
    }

    fn object_headers(&self) -> Result<Vec<ObjectHeader>, SourceError> {
        (**self).object_headers()
    }

    fn object_records(&self, handles: &[Handle]) -> Result<Vec<ObjectRecord>, SourceError> {
        (**self).object_records(handles)
    }

    fn entity_styles(&self) -> Result<Vec<StyleRow>, SourceError> {
        (**self).entity_styles()
    }

    fn layer_colors(&self) -> Result<Vec<LayerColorRow>, SourceError> {
        (**self).layer_colors()
    }

    fn sequence_members(&self) -> Result<Vec<SequenceMembersRow>, SourceError> {
        (**self).sequence_members()
    }

    fn lines(&self) -> Result<Vec<LineRow>, SourceError> {
        (**self).lines()
    }

    fn arcs(&self) -> Result<Vec<ArcRow>, SourceError> {
        (**self).arcs()
    }

    fn circles(&self) -> Result<Vec<CircleRow>, SourceError> {
        (**self).circles()
    }

    fn lwpolylines(&self) -> Result<Vec<LwPolylineRow>, SourceError> {
        (**self).lwpolylines()
    }

    fn polylines_2d(&self) -> Result<Vec<Polyline2dRow>, SourceError> {
        (**self).polylines_2d()
    }

    fn vertices_2d(&self) -> Result<Vec<Vertex2dRow>, SourceError> {
        (**self).vertices_2d()
    }

    fn polylines_3d(&self) -> Result<Vec<Polyline3dRow>, SourceError> {
        (**self).polylines_3d()
    }

    fn polyline_meshes(&self) -> Result<Vec<PolylineMeshRow>, SourceError> {
        (**self).polyline_meshes()
    }

    fn polyline_pfaces(&self) -> Result<Vec<PolylinePfaceRow>, SourceError> {
        (**self).polyline_pfaces()
    }

    fn pface_faces(&self) -> Result<Vec<PfaceFaceRow>, SourceError> {
        (**self).pface_faces()
    }

    fn point_vertices(&self, kind: EntityKind) -> Result<Vec<PointVertexRow>, SourceError> {
        (**self).point_vertices(kind)
    }

    fn modeler_entities(&self, kind: EntityKind) -> Result<Vec<ModelerRow>, SourceError> {
        (**self).modeler_entities(kind)
    }

    fn polyline_2d_interpretations(&self) -> Result<Vec<Polyline2dInterpretation>, SourceError> {
        (**self).polyline_2d_interpretations()
    }

    fn polyline_2d_interpolated(
        &self,
        segments_per_span: usize,
    ) -> Result<Vec<InterpolatedPolylineRow>, SourceError> {
        (**self).polyline_2d_interpolated(segments_per_span)
    }

    fn acis_candidate_infos(
        &self,
        handles: &[Handle],
    ) -> Result<Vec<AcisCandidateInfo>, SourceError> {
        (**self).acis_candidate_infos(handles)
    }
}
