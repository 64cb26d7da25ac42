use std::collections::HashMap;

use dwgkit_core::document::{EntityKind, Handle};
use dwgkit_source::{ObjectHeader, RecordSource};
use tracing::warn;

/// 全文档对象头索引，按记录源给出的顺序保存，并提供按句柄查找。
#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    headers: Vec<ObjectHeader>,
    positions: HashMap<Handle, usize>,
}

impl HeaderIndex {
    pub fn new(headers: Vec<ObjectHeader>) -> Self {
        let mut positions = HashMap::with_capacity(headers.len());
        for (position, header) in headers.iter().enumerate() {
            positions.insert(header.handle, position);
        }
        Self { headers, positions }
    }

    /// 读取失败时退化为空索引。
    pub fn from_source<S: RecordSource + ?Sized>(source: &S) -> Self {
        match source.object_headers() {
            Ok(headers) => Self::new(headers),
            Err(err) => {
                warn!(error = %err, "对象头索引不可用，按空索引处理");
                Self::default()
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn get(&self, handle: Handle) -> Option<&ObjectHeader> {
        self.positions
            .get(&handle)
            .and_then(|position| self.headers.get(*position))
    }

    #[inline]
    pub fn contains(&self, handle: Handle) -> bool {
        self.positions.contains_key(&handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectHeader> + '_ {
        self.headers.iter()
    }

    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.positions.keys().copied()
    }

    /// 指定类型的句柄，保持索引顺序。
    pub fn handles_of(&self, kind: EntityKind) -> Vec<Handle> {
        self.headers
            .iter()
            .filter(|header| header.entity_kind() == Some(kind))
            .map(|header| header.handle)
            .collect()
    }

    /// 文档中出现过的受支持类型，按默认查询顺序排列。
    pub fn present_kinds(&self) -> Vec<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .filter(|kind| {
                self.headers
                    .iter()
                    .any(|header| header.entity_kind() == Some(*kind))
            })
            .collect()
    }
}
