use std::collections::HashSet;

use dwgkit_core::document::{DwgVersion, EntityKind, Handle};
use serde::{Deserialize, Serialize};

use crate::rows::*;
use crate::{Feed, RecordSource, SourceError};

fn default_version() -> DwgVersion {
    DwgVersion::R2000
}

/// 内存中的记录源，可直接从 JSON 记录转储反序列化。
///
/// `failed_feeds` 列出转储时提取失败的数据类别，读取它们会返回解码错误。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySource {
    #[serde(default = "default_version")]
    pub version: DwgVersion,
    #[serde(default)]
    pub headers: Vec<ObjectHeader>,
    #[serde(default)]
    pub records: Vec<ObjectRecord>,
    #[serde(default)]
    pub styles: Vec<StyleRow>,
    #[serde(default)]
    pub layers: Vec<LayerColorRow>,
    #[serde(default)]
    pub sequences: Vec<SequenceMembersRow>,
    #[serde(default)]
    pub lines: Vec<LineRow>,
    #[serde(default)]
    pub arcs: Vec<ArcRow>,
    #[serde(default)]
    pub circles: Vec<CircleRow>,
    #[serde(default)]
    pub lwpolylines: Vec<LwPolylineRow>,
    #[serde(default)]
    pub polylines_2d: Vec<Polyline2dRow>,
    #[serde(default)]
    pub vertices_2d: Vec<Vertex2dRow>,
    #[serde(default)]
    pub polylines_3d: Vec<Polyline3dRow>,
    #[serde(default)]
    pub vertices_3d: Vec<PointVertexRow>,
    #[serde(default)]
    pub polyline_meshes: Vec<PolylineMeshRow>,
    #[serde(default)]
    pub vertices_mesh: Vec<PointVertexRow>,
    #[serde(default)]
    pub polyline_pfaces: Vec<PolylinePfaceRow>,
    #[serde(default)]
    pub vertices_pface: Vec<PointVertexRow>,
    #[serde(default)]
    pub pface_faces: Vec<PfaceFaceRow>,
    #[serde(default)]
    pub solids: Vec<ModelerRow>,
    #[serde(default)]
    pub bodies: Vec<ModelerRow>,
    #[serde(default)]
    pub regions: Vec<ModelerRow>,
    #[serde(default)]
    pub interpretations: Vec<Polyline2dInterpretation>,
    #[serde(default)]
    pub interpolated: Vec<InterpolatedPolylineRow>,
    #[serde(default)]
    pub acis_infos: Vec<AcisCandidateInfo>,
    #[serde(default)]
    pub failed_feeds: Vec<Feed>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new(default_version())
    }
}

impl MemorySource {
    pub fn new(version: DwgVersion) -> Self {
        Self {
            version,
            headers: Vec::new(),
            records: Vec::new(),
            styles: Vec::new(),
            layers: Vec::new(),
            sequences: Vec::new(),
            lines: Vec::new(),
            arcs: Vec::new(),
            circles: Vec::new(),
            lwpolylines: Vec::new(),
            polylines_2d: Vec::new(),
            vertices_2d: Vec::new(),
            polylines_3d: Vec::new(),
            vertices_3d: Vec::new(),
            polyline_meshes: Vec::new(),
            vertices_mesh: Vec::new(),
            polyline_pfaces: Vec::new(),
            vertices_pface: Vec::new(),
            pface_faces: Vec::new(),
            solids: Vec::new(),
            bodies: Vec::new(),
            regions: Vec::new(),
            interpretations: Vec::new(),
            interpolated: Vec::new(),
            acis_infos: Vec::new(),
            failed_feeds: Vec::new(),
        }
    }

    /// 标记某类数据提取失败。
    pub fn fail_feed(&mut self, feed: Feed) {
        if !self.failed_feeds.contains(&feed) {
            self.failed_feeds.push(feed);
        }
    }

    fn read<T: Clone>(&self, feed: Feed, rows: &[T]) -> Result<Vec<T>, SourceError> {
        if self.failed_feeds.contains(&feed) {
            return Err(SourceError::decode(feed, "extraction failed when the dump was taken"));
        }
        Ok(rows.to_vec())
    }
}

impl RecordSource for MemorySource {
    fn version(&self) -> DwgVersion {
        self.version
    }

    fn object_headers(&self) -> Result<Vec<ObjectHeader>, SourceError> {
        self.read(Feed::ObjectHeaders, &self.headers)
    }

    fn object_records(&self, handles: &[Handle]) -> Result<Vec<ObjectRecord>, SourceError> {
        let wanted: HashSet<Handle> = handles.iter().copied().collect();
        let records = self.read(Feed::ObjectRecords, &self.records)?;
        Ok(records
            .into_iter()
            .filter(|record| wanted.contains(&record.handle))
            .collect())
    }

    fn entity_styles(&self) -> Result<Vec<StyleRow>, SourceError> {
        self.read(Feed::EntityStyles, &self.styles)
    }

    fn layer_colors(&self) -> Result<Vec<LayerColorRow>, SourceError> {
        self.read(Feed::LayerColors, &self.layers)
    }

    fn sequence_members(&self) -> Result<Vec<SequenceMembersRow>, SourceError> {
        self.read(Feed::SequenceMembers, &self.sequences)
    }

    fn lines(&self) -> Result<Vec<LineRow>, SourceError> {
        self.read(Feed::Entities(EntityKind::Line), &self.lines)
    }

    fn arcs(&self) -> Result<Vec<ArcRow>, SourceError> {
        self.read(Feed::Entities(EntityKind::Arc), &self.arcs)
    }

    fn circles(&self) -> Result<Vec<CircleRow>, SourceError> {
        self.read(Feed::Entities(EntityKind::Circle), &self.circles)
    }

    fn lwpolylines(&self) -> Result<Vec<LwPolylineRow>, SourceError> {
        self.read(Feed::Entities(EntityKind::LwPolyline), &self.lwpolylines)
    }

    fn polylines_2d(&self) -> Result<Vec<Polyline2dRow>, SourceError> {
        self.read(Feed::Entities(EntityKind::Polyline2d), &self.polylines_2d)
    }

    fn vertices_2d(&self) -> Result<Vec<Vertex2dRow>, SourceError> {
        self.read(Feed::Entities(EntityKind::Vertex2d), &self.vertices_2d)
    }

    fn polylines_3d(&self) -> Result<Vec<Polyline3dRow>, SourceError> {
        self.read(Feed::Entities(EntityKind::Polyline3d), &self.polylines_3d)
    }

    fn polyline_meshes(&self) -> Result<Vec<PolylineMeshRow>, SourceError> {
        self.read(Feed::Entities(EntityKind::PolylineMesh), &self.polyline_meshes)
    }

    fn polyline_pfaces(&self) -> Result<Vec<PolylinePfaceRow>, SourceError> {
        self.read(Feed::Entities(EntityKind::PolylinePface), &self.polyline_pfaces)
    }

    fn pface_faces(&self) -> Result<Vec<PfaceFaceRow>, SourceError> {
        self.read(Feed::Entities(EntityKind::VertexPfaceFace), &self.pface_faces)
    }

    fn point_vertices(&self, kind: EntityKind) -> Result<Vec<PointVertexRow>, SourceError> {
        let rows = match kind {
            EntityKind::Vertex3d => &self.vertices_3d,
            EntityKind::VertexMesh => &self.vertices_mesh,
            EntityKind::VertexPface => &self.vertices_pface,
            _ => return Err(SourceError::Unavailable { feed: Feed::Entities(kind) }),
        };
        self.read(Feed::Entities(kind), rows)
    }

    fn modeler_entities(&self, kind: EntityKind) -> Result<Vec<ModelerRow>, SourceError> {
        let rows = match kind {
            EntityKind::Solid3d => &self.solids,
            EntityKind::Body => &self.bodies,
            EntityKind::Region => &self.regions,
            _ => return Err(SourceError::Unavailable { feed: Feed::Entities(kind) }),
        };
        self.read(Feed::Entities(kind), rows)
    }

    fn polyline_2d_interpretations(&self) -> Result<Vec<Polyline2dInterpretation>, SourceError> {
        self.read(Feed::Polyline2dInterpretations, &self.interpretations)
    }

    fn polyline_2d_interpolated(
        &self,
        _segments_per_span: usize,
    ) -> Result<Vec<InterpolatedPolylineRow>, SourceError> {
        self.read(Feed::Polyline2dInterpolated, &self.interpolated)
    }

    fn acis_candidate_infos(
        &self,
        handles: &[Handle],
    ) -> Result<Vec<AcisCandidateInfo>, SourceError> {
        let wanted: HashSet<Handle> = handles.iter().copied().collect();
        let infos = self.read(Feed::AcisCandidateInfos, &self.acis_infos)?;
        Ok(infos
            .into_iter()
            .filter(|info| wanted.contains(&info.handle))
            .collect())
    }
}
