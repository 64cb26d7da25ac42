use std::collections::VecDeque;
use std::iter::FusedIterator;

use dwgkit_config::AppConfig;
use dwgkit_core::document::{DwgVersion, Entity, EntityKind};
use dwgkit_source::RecordSource;
use once_cell::unsync::OnceCell;
use tracing::debug;

use crate::acis::{AcisDocumentIndex, AcisGraphBuilder};
use crate::assembler;
use crate::errors::EngineError;
use crate::headers::HeaderIndex;
use crate::relationships::RelationshipIndex;
use crate::selection::TypeSelection;
use crate::style::StyleResolver;

/// 单个文档的会话：持有记录源与按需构建、只构建一次的派生索引。
///
/// 索引在首次使用时从记录源读取，之后的查询都复用同一份结果；
/// 会话释放时一并释放。
pub struct DocumentSession<S> {
    source: S,
    config: AppConfig,
    headers: OnceCell<HeaderIndex>,
    relationships: OnceCell<RelationshipIndex>,
    styles: OnceCell<StyleResolver>,
    acis: OnceCell<AcisDocumentIndex>,
}

impl<S: RecordSource> DocumentSession<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, AppConfig::default())
    }

    pub fn with_config(source: S, config: AppConfig) -> Self {
        Self {
            source,
            config,
            headers: OnceCell::new(),
            relationships: OnceCell::new(),
            styles: OnceCell::new(),
            acis: OnceCell::new(),
        }
    }

    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[inline]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn version(&self) -> DwgVersion {
        self.source.version()
    }

    pub fn headers(&self) -> &HeaderIndex {
        self.headers.get_or_init(|| {
            let index = HeaderIndex::from_source(&self.source);
            debug!(objects = index.len(), "已建立对象头索引");
            index
        })
    }

    pub fn relationships(&self) -> &RelationshipIndex {
        self.relationships
            .get_or_init(|| RelationshipIndex::from_source(&self.source))
    }

    pub fn styles(&self) -> &StyleResolver {
        self.styles
            .get_or_init(|| StyleResolver::from_source(&self.source, &self.config.heuristics))
    }

    pub fn acis_index(&self) -> &AcisDocumentIndex {
        self.acis.get_or_init(|| {
            AcisDocumentIndex::build(&self.source, self.headers(), &self.config.acis)
        })
    }

    pub fn acis_graphs(&self) -> AcisGraphBuilder<'_> {
        AcisGraphBuilder::new(self.acis_index())
    }

    /// 文档中出现过的受支持类型。
    pub fn present_types(&self) -> Vec<EntityKind> {
        self.headers().present_kinds()
    }

    /// 一次性组装某个类型的全部实体。整类解码失败时返回错误。
    pub fn entities(&self, kind: EntityKind) -> Result<Vec<Entity>, EngineError> {
        assembler::assemble(self, kind)
    }

    /// 按类型集合惰性地产出实体。每次调用都从缓存的索引重新派生。
    pub fn query(&self, selection: &TypeSelection) -> EntityStream<'_, S> {
        let kinds = selection.resolve(&self.present_types());
        debug!(kinds = ?kinds, "开始查询实体");
        EntityStream {
            session: self,
            pending: kinds.into(),
            batch: Vec::new().into_iter(),
            finished: false,
        }
    }

    /// 解析类型名列表后查询；未知类型名立即返回 `UnsupportedType`。
    pub fn query_types(&self, names: &str) -> Result<EntityStream<'_, S>, EngineError> {
        let selection = TypeSelection::parse(names)?;
        Ok(self.query(&selection))
    }
}

/// 按类型依次组装、逐个产出实体的惰性序列。
///
/// 某个类型整体解码失败时产出一次错误，随后序列结束。
pub struct EntityStream<'a, S> {
    session: &'a DocumentSession<S>,
    pending: VecDeque<EntityKind>,
    batch: std::vec::IntoIter<Entity>,
    finished: bool,
}

impl<S> EntityStream<'_, S> {
    /// 尚未开始组装的类型。
    pub fn remaining_kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.pending.iter().copied()
    }
}

impl<S: RecordSource> Iterator for EntityStream<'_, S> {
    type Item = Result<Entity, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if let Some(entity) = self.batch.next() {
                return Some(Ok(entity));
            }
            let Some(kind) = self.pending.pop_front() else {
                self.finished = true;
                return None;
            };
            match self.session.entities(kind) {
                Ok(entities) => self.batch = entities.into_iter(),
                Err(err) => {
                    self.finished = true;
                    self.pending.clear();
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<S: RecordSource> FusedIterator for EntityStream<'_, S> {}
