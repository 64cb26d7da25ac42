//! 重建层：把记录源给出的扁平行数据组装成带有颜色、归属关系、
//! 曲线和 ACIS 引用图的实体快照。

pub mod acis;
pub mod assembler;
pub mod cache;
pub mod curve;
pub mod headers;
pub mod relationships;
pub mod selection;
pub mod session;
pub mod style;

pub mod errors {
    use dwgkit_source::{Feed, SourceError};
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("unsupported entity type: {0}")]
        UnsupportedType(String),
        #[error("failed to read {feed}: {source}")]
        Source {
            feed: Feed,
            #[source]
            source: SourceError,
        },
    }

    impl EngineError {
        pub fn source(feed: Feed, source: SourceError) -> Self {
            Self::Source { feed, source }
        }
    }
}

pub use acis::{AcisDocumentIndex, AcisGraphBuilder};
pub use cache::{DocumentFingerprint, SessionCache};
pub use errors::EngineError;
pub use headers::HeaderIndex;
pub use relationships::RelationshipIndex;
pub use selection::TypeSelection;
pub use session::{DocumentSession, EntityStream};
pub use style::{LayerOverride, StyleResolver};
