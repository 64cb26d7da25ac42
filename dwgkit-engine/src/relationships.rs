use std::collections::HashMap;

use dwgkit_core::document::{Handle, OwnerRef, SequenceMembers};
use dwgkit_source::{RecordSource, SequenceMembersRow};
use tracing::{debug, warn};

/// 多段线族的归属索引：多段线 → 成员、成员 → 多段线、SEQEND → 多段线。
///
/// 同一成员出现在多条记录中时以最后一条为准；同一多段线的多条记录合并。
#[derive(Debug, Clone, Default)]
pub struct RelationshipIndex {
    polylines: HashMap<Handle, SequenceMembers>,
    member_owners: HashMap<Handle, OwnerRef>,
    seqend_owners: HashMap<Handle, OwnerRef>,
}

impl RelationshipIndex {
    pub fn build(rows: impl IntoIterator<Item = SequenceMembersRow>) -> Self {
        let mut index = Self::default();
        for row in rows {
            let kind = match row.owner_kind() {
                Ok(kind) => kind,
                Err(err) => {
                    warn!(error = %err, "跳过无法识别的多段线成员记录");
                    continue;
                }
            };
            let owner = OwnerRef {
                handle: row.owner_handle,
                kind,
            };
            let vertices = non_null(row.vertex_handles);
            let faces = non_null(row.face_handles);
            let seqend = row.seqend_handle.filter(|handle| !handle.is_null());

            for member in vertices.iter().chain(&faces) {
                index.member_owners.insert(*member, owner);
            }

            // 同一多段线拆成多条记录时合并成员列表
            let members = index.polylines.entry(owner.handle).or_default();
            extend_unique(&mut members.vertex_handles, vertices);
            extend_unique(&mut members.face_handles, faces);
            if let Some(seqend) = seqend {
                if let Some(stale) = members.seqend_handle.replace(seqend) {
                    if stale != seqend {
                        index.seqend_owners.remove(&stale);
                    }
                }
                index.seqend_owners.insert(seqend, owner);
            }
        }
        index
    }

    /// 成员数据不可用时三张表均为空，调用方把“找不到所属”视为正常状态。
    pub fn from_source<S: RecordSource + ?Sized>(source: &S) -> Self {
        match source.sequence_members() {
            Ok(rows) => {
                let index = Self::build(rows);
                debug!(
                    polylines = index.polylines.len(),
                    members = index.member_owners.len(),
                    "已建立多段线归属索引"
                );
                index
            }
            Err(err) => {
                warn!(error = %err, "多段线成员数据不可用，归属索引为空");
                Self::default()
            }
        }
    }

    pub fn members(&self, owner: Handle) -> Option<&SequenceMembers> {
        self.polylines.get(&owner)
    }

    /// 顶点或面所属的多段线。
    pub fn owner_of(&self, member: Handle) -> Option<OwnerRef> {
        self.member_owners.get(&member).copied()
    }

    pub fn seqend_owner(&self, seqend: Handle) -> Option<OwnerRef> {
        self.seqend_owners.get(&seqend).copied()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.polylines.is_empty()
    }

    pub fn member_owners(&self) -> impl Iterator<Item = (Handle, OwnerRef)> + '_ {
        self.member_owners
            .iter()
            .map(|(member, owner)| (*member, *owner))
    }
}

fn non_null(handles: Vec<Handle>) -> Vec<Handle> {
    handles.into_iter().filter(|handle| !handle.is_null()).collect()
}

fn extend_unique(target: &mut Vec<Handle>, handles: Vec<Handle>) {
    for handle in handles {
        if !target.contains(&handle) {
            target.push(handle);
        }
    }
}
