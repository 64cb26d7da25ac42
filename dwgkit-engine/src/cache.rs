use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use dwgkit_config::{AppConfig, CurveConfig};
use dwgkit_core::document::{EntityKind, Handle};
use dwgkit_source::{Feed, RecordSource, SourceError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::session::DocumentSession;

/// 文档指纹：版本号、对象头索引、原始记录字节与各类行数据的 SHA-256。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentFingerprint([u8; 32]);

impl DocumentFingerprint {
    /// 对象头索引不可用时返回错误；其余数据源读取失败时记入其错误文本。
    pub fn of<S: RecordSource + ?Sized>(source: &S) -> Result<Self, SourceError> {
        let headers = source.object_headers()?;
        let handles: Vec<Handle> = headers.iter().map(|header| header.handle).collect();

        let mut digest = FeedDigest::default();
        digest.hasher.update(source.version().code().as_bytes());
        digest.rows(Feed::ObjectHeaders, Ok(headers));
        digest.rows(Feed::ObjectRecords, source.object_records(&handles));
        digest.rows(Feed::EntityStyles, source.entity_styles());
        digest.rows(Feed::LayerColors, source.layer_colors());
        digest.rows(Feed::SequenceMembers, source.sequence_members());
        digest.rows(Feed::Entities(EntityKind::Line), source.lines());
        digest.rows(Feed::Entities(EntityKind::Arc), source.arcs());
        digest.rows(Feed::Entities(EntityKind::Circle), source.circles());
        digest.rows(Feed::Entities(EntityKind::LwPolyline), source.lwpolylines());
        digest.rows(Feed::Entities(EntityKind::Polyline2d), source.polylines_2d());
        digest.rows(Feed::Entities(EntityKind::Vertex2d), source.vertices_2d());
        digest.rows(Feed::Entities(EntityKind::Polyline3d), source.polylines_3d());
        digest.rows(Feed::Entities(EntityKind::PolylineMesh), source.polyline_meshes());
        digest.rows(Feed::Entities(EntityKind::PolylinePface), source.polyline_pfaces());
        digest.rows(Feed::Entities(EntityKind::VertexPfaceFace), source.pface_faces());
        for kind in [EntityKind::Vertex3d, EntityKind::VertexMesh, EntityKind::VertexPface] {
            digest.rows(Feed::Entities(kind), source.point_vertices(kind));
        }
        for kind in [EntityKind::Solid3d, EntityKind::Body, EntityKind::Region] {
            digest.rows(Feed::Entities(kind), source.modeler_entities(kind));
        }
        digest.rows(
            Feed::Polyline2dInterpretations,
            source.polyline_2d_interpretations(),
        );
        digest.rows(
            Feed::Polyline2dInterpolated,
            source.polyline_2d_interpolated(CurveConfig::default().interpolation_segments),
        );
        digest.rows(Feed::AcisCandidateInfos, source.acis_candidate_infos(&handles));
        Ok(Self(digest.hasher.finalize().into()))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

#[derive(Default)]
struct FeedDigest {
    hasher: Sha256,
}

impl FeedDigest {
    fn rows<T: Serialize>(&mut self, feed: Feed, rows: Result<Vec<T>, SourceError>) {
        self.hasher.update(feed.to_string().as_bytes());
        self.hasher.update([0_u8]);
        let encoded = rows.map_err(|err| err.to_string()).and_then(|rows| {
            serde_json::to_writer(&mut self.hasher, &rows).map_err(|err| err.to_string())
        });
        if let Err(message) = encoded {
            self.hasher.update([1_u8]);
            self.hasher.update(message.as_bytes());
        }
        self.hasher.update([0_u8]);
    }
}

impl fmt::Display for DocumentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// 按指纹复用文档会话，超出容量时淘汰最久未使用的会话。
pub struct SessionCache<S> {
    capacity: usize,
    config: AppConfig,
    entries: VecDeque<(DocumentFingerprint, Rc<DocumentSession<S>>)>,
}

impl<S: RecordSource> SessionCache<S> {
    pub fn new(config: AppConfig) -> Self {
        Self {
            capacity: config.cache.capacity.max(1),
            config,
            entries: VecDeque::new(),
        }
    }

    /// 打开文档。指纹相同的文档复用已有会话；无法计算指纹时返回不入缓存的新会话。
    pub fn open(&mut self, source: S) -> Rc<DocumentSession<S>> {
        let fingerprint = match DocumentFingerprint::of(&source) {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                warn!(error = %err, "无法计算文档指纹，会话不进入缓存");
                return Rc::new(DocumentSession::with_config(source, self.config.clone()));
            }
        };

        if let Some(position) = self.entries.iter().position(|(key, _)| *key == fingerprint) {
            if let Some(entry) = self.entries.remove(position) {
                let session = Rc::clone(&entry.1);
                self.entries.push_back(entry);
                debug!(fingerprint = %fingerprint, "复用已缓存的文档会话");
                return session;
            }
        }

        let session = Rc::new(DocumentSession::with_config(source, self.config.clone()));
        self.entries.push_back((fingerprint, Rc::clone(&session)));
        while self.entries.len() > self.capacity {
            if let Some((evicted, _)) = self.entries.pop_front() {
                debug!(fingerprint = %evicted, "淘汰文档会话");
            }
        }
        session
    }

    pub fn contains(&self, fingerprint: &DocumentFingerprint) -> bool {
        self.entries.iter().any(|(key, _)| key == fingerprint)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwgkit_core::document::DwgVersion;
    use dwgkit_core::geometry::Point3;
    use dwgkit_source::{LineRow, MemorySource, ObjectHeader};

    fn source(handle: u64) -> MemorySource {
        let mut source = MemorySource::default();
        source
            .headers
            .push(ObjectHeader::new(handle, 0, 16, 0x13, "LINE", "E"));
        source
    }

    fn cache(capacity: usize) -> SessionCache<MemorySource> {
        let mut config = AppConfig::default();
        config.cache.capacity = capacity;
        SessionCache::new(config)
    }

    #[test]
    fn fingerprint_tracks_version_and_headers() {
        let base = DocumentFingerprint::of(&source(0x20)).expect("fingerprint");
        assert_eq!(base, DocumentFingerprint::of(&source(0x20)).expect("fingerprint"));
        assert_ne!(base, DocumentFingerprint::of(&source(0x21)).expect("fingerprint"));

        let mut newer = source(0x20);
        newer.version = DwgVersion::R2018;
        assert_ne!(base, DocumentFingerprint::of(&newer).expect("fingerprint"));
        assert_eq!(base.to_string().len(), 64);
    }

    fn with_line(end_x: f64) -> MemorySource {
        let mut source = source(0x20);
        source.lines.push(LineRow {
            handle: Handle::new(0x20),
            start: Point3::new(0.0, 0.0, 0.0),
            end: Point3::new(end_x, 0.0, 0.0),
        });
        source
    }

    #[test]
    fn fingerprint_covers_row_content() {
        let short = DocumentFingerprint::of(&with_line(1.0)).expect("fingerprint");
        let long = DocumentFingerprint::of(&with_line(99.0)).expect("fingerprint");
        assert_ne!(short, long);

        let mut broken = with_line(1.0);
        broken.fail_feed(Feed::Entities(EntityKind::Line));
        assert_ne!(short, DocumentFingerprint::of(&broken).expect("fingerprint"));
    }

    #[test]
    fn documents_with_equal_headers_get_their_own_sessions() {
        let mut cache = cache(4);
        let first = cache.open(with_line(1.0));
        let second = cache.open(with_line(99.0));
        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 2);

        let lines = second.entities(EntityKind::Line).expect("组装 LINE 失败");
        let dwgkit_core::document::EntityData::Line(line) = lines[0].data() else {
            panic!("expected LINE, got {:?}", lines[0].kind());
        };
        assert_eq!(line.end.x(), 99.0);
    }

    #[test]
    fn identical_documents_share_a_session() {
        let mut cache = cache(4);
        let first = cache.open(source(0x20));
        let second = cache.open(source(0x20));
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn oldest_session_is_evicted_beyond_capacity() {
        let mut cache = cache(2);
        cache.open(source(0x20));
        cache.open(source(0x21));
        // 命中后 0x20 变为最近使用
        cache.open(source(0x20));
        cache.open(source(0x22));

        let key = |handle| DocumentFingerprint::of(&source(handle)).expect("fingerprint");
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&key(0x20)));
        assert!(!cache.contains(&key(0x21)));
        assert!(cache.contains(&key(0x22)));
    }

    #[test]
    fn unfingerprintable_source_still_opens() {
        let mut cache = cache(2);
        let mut broken = source(0x20);
        broken.fail_feed(Feed::ObjectHeaders);
        let session = cache.open(broken);
        assert!(session.headers().is_empty());
        assert!(cache.is_empty());
    }
}
