use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;

use dwgkit_core::document::{Entity, EntityKind};
use dwgkit_engine::{DocumentFingerprint, DocumentSession, TypeSelection};
use dwgkit_source::RecordSource;
use serde::Serialize;
use tracing::warn;

/// 单个记录转储的检查结果。句柄以十六进制字符串输出。
#[derive(Debug, Default, Serialize)]
pub struct DocumentReport {
    pub path: String,
    pub version: String,
    pub fingerprint: Option<String>,
    pub counts: BTreeMap<String, usize>,
    pub orphan_members: Vec<OrphanMember>,
    pub modelers: Vec<ModelerSummary>,
    pub flagged_candidates: Vec<FlaggedCandidate>,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct OrphanMember {
    pub handle: String,
    pub dxftype: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ModelerSummary {
    pub handle: String,
    pub dxftype: &'static str,
    pub candidates: usize,
    pub edges: usize,
    pub primary_edges: usize,
}

/// 低置信度或没有解析出父句柄的伴随记录。
#[derive(Debug, Serialize)]
pub struct FlaggedCandidate {
    pub entity: String,
    pub candidate: String,
    pub role_hint: &'static str,
    pub strategy: &'static str,
    pub effective_strategy: &'static str,
    pub confidence: u8,
    pub parent: Option<String>,
}

impl DocumentReport {
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(&mut self, entity: &Entity) {
        *self.counts.entry(entity.dxftype().to_string()).or_default() += 1;

        if entity.kind().is_explicit_only() && entity.data().owner().is_none() {
            self.orphan_members.push(OrphanMember {
                handle: entity.handle().to_string(),
                dxftype: entity.dxftype(),
            });
        }

        let Some(body) = entity.data().modeler_body() else {
            return;
        };
        let graph = &body.acis;
        self.modelers.push(ModelerSummary {
            handle: entity.handle().to_string(),
            dxftype: entity.dxftype(),
            candidates: graph.candidate_handles.len(),
            edges: graph.edges.len(),
            primary_edges: graph.primary_edges.len(),
        });
        for record in &graph.records {
            let low_confidence = record.parent_ref_strategy.is_low_confidence()
                || record.effective_strategy.is_low_confidence();
            if low_confidence || record.parent_handle.is_none() {
                self.flagged_candidates.push(FlaggedCandidate {
                    entity: entity.handle().to_string(),
                    candidate: record.handle.to_string(),
                    role_hint: record.role_hint.as_str(),
                    strategy: record.parent_ref_strategy.as_str(),
                    effective_strategy: record.effective_strategy.as_str(),
                    confidence: record.ref_confidence,
                    parent: record.parent_handle.map(|handle| handle.to_string()),
                });
            }
        }
    }
}

/// 遍历查询结果生成报告。整类解码失败记入 `errors`，其余类型照常统计。
pub fn inspect<S: RecordSource>(
    path: &Path,
    session: &DocumentSession<S>,
    selection: &TypeSelection,
) -> DocumentReport {
    let mut report = DocumentReport {
        path: path.display().to_string(),
        version: session.version().to_string(),
        fingerprint: match DocumentFingerprint::of(session.source()) {
            Ok(fingerprint) => Some(fingerprint.to_string()),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "无法计算文档指纹");
                None
            }
        },
        ..DocumentReport::default()
    };

    let kinds = selection.resolve(&session.present_types());
    for kind in kinds {
        match session.entities(kind) {
            Ok(entities) => {
                for entity in &entities {
                    report.record(entity);
                }
            }
            Err(err) => {
                warn!(path = %path.display(), kind = %kind, error = %err, "实体类型读取失败");
                report.errors.push(err.to_string());
            }
        }
    }
    report
}

/// 人类可读的文本报告。
pub fn write_text(out: &mut impl Write, reports: &[DocumentReport]) -> io::Result<()> {
    for report in reports {
        writeln!(out, "{} ({})", report.path, report.version)?;
        if let Some(fingerprint) = &report.fingerprint {
            writeln!(out, "  指纹: {fingerprint}")?;
        }
        for kind in EntityKind::ALL {
            if let Some(count) = report.counts.get(kind.dxftype()) {
                writeln!(out, "  {:<18} {count}", kind.dxftype())?;
            }
        }
        if !report.orphan_members.is_empty() {
            writeln!(out, "  无所属成员: {}", report.orphan_members.len())?;
            for member in &report.orphan_members {
                writeln!(out, "    {} {}", member.dxftype, member.handle)?;
            }
        }
        for modeler in &report.modelers {
            writeln!(
                out,
                "  {} {}: 伴随记录 {}，引用边 {}，主引用边 {}",
                modeler.dxftype, modeler.handle, modeler.candidates, modeler.edges, modeler.primary_edges
            )?;
        }
        for flagged in &report.flagged_candidates {
            writeln!(
                out,
                "    {} -> {} [{}] {} / {} 置信度 {} 父句柄 {}",
                flagged.entity,
                flagged.candidate,
                flagged.role_hint,
                flagged.strategy,
                flagged.effective_strategy,
                flagged.confidence,
                flagged.parent.as_deref().unwrap_or("-")
            )?;
        }
        for error in &report.errors {
            writeln!(out, "  错误: {error}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwgkit_core::document::Handle;
    use dwgkit_core::geometry::Point3;
    use dwgkit_source::{Feed, MemorySource, ModelerRow, ObjectHeader, PointVertexRow};

    fn source() -> MemorySource {
        let mut source = MemorySource::default();
        source.headers = vec![
            ObjectHeader::new(0x100, 0, 32, 0x26, "3DSOLID", "E"),
            ObjectHeader::new(0x101, 32, 8, 0x222, "UNKNOWN(0x222)", ""),
            ObjectHeader::new(0x200, 64, 16, 0x0B, "VERTEX_3D", "E"),
        ];
        source.solids.push(ModelerRow {
            handle: Handle::new(0x100),
            acis_handles: vec![Handle::new(0x101)],
        });
        source.vertices_3d.push(PointVertexRow {
            handle: Handle::new(0x200),
            flags: 0x20,
            position: Point3::new(1.0, 2.0, 3.0),
        });
        source
    }

    #[test]
    fn report_counts_and_flags_unresolved_candidates() {
        let session = DocumentSession::new(source());
        let selection = TypeSelection::parse("3DSOLID VERTEX_3D").expect("parse");
        let report = inspect(Path::new("dump.json"), &session, &selection);

        assert!(report.is_clean());
        assert_eq!(report.counts["3DSOLID"], 1);
        assert_eq!(report.counts["VERTEX_3D"], 1);
        assert_eq!(report.orphan_members.len(), 1);
        assert_eq!(report.modelers[0].candidates, 1);
        // 没有原始字节，伴随记录只有占位信息，父句柄无法解析
        assert_eq!(report.flagged_candidates.len(), 1);
        assert_eq!(report.flagged_candidates[0].strategy, "none");
        assert_eq!(report.flagged_candidates[0].role_hint, "acis-payload-chunk");
    }

    #[test]
    fn decode_failure_is_reported_per_type() {
        let mut broken = source();
        broken.fail_feed(Feed::Entities(EntityKind::Vertex3d));
        let session = DocumentSession::new(broken);
        let selection = TypeSelection::parse("VERTEX_3D,3DSOLID").expect("parse");
        let report = inspect(Path::new("dump.json"), &session, &selection);

        assert!(!report.is_clean());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.counts.get("3DSOLID"), Some(&1));

        let mut text = Vec::new();
        write_text(&mut text, &[report]).expect("write report");
        let text = String::from_utf8(text).expect("utf-8");
        assert!(text.contains("3DSOLID"));
        assert!(text.contains("VERTEX_3D entities"));
    }
}
