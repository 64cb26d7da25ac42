//! 3DSOLID / BODY / REGION 之后紧跟若干无类型的 `UNKNOWN(...)` 伴随记录，
//! 其中承载嵌入的 ACIS 数据。本模块负责发现这些记录、分析其字节内容，
//! 并为每个建模实体重建尽力而为的引用图。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::RangeInclusive;

use dwgkit_config::AcisConfig;
use dwgkit_core::acis::{
    AcisCandidateRecord, AcisEdge, AcisGraph, AcisPrimaryEdge, HandleRefDetail, ParentKind,
    ParentRule, RefStrategy, RoleHint,
};
use dwgkit_core::document::{EntityKind, Handle};
use dwgkit_source::{AcisCandidateInfo, ObjectHeader, ObjectRecord, RecordSource, SourceError};
use tracing::{debug, warn};

use crate::headers::HeaderIndex;

/// 伴随记录所在的动态类型码区间。
pub const ACIS_TYPE_CODES: RangeInclusive<u16> = 0x214..=0x225;
const LINK_TABLE_CODE: u16 = 0x214;
const HEADER_CODE: u16 = 0x221;
const PAYLOAD_CODES: RangeInclusive<u16> = 0x222..=0x225;
const PAYLOAD_MAIN_MIN_SIZE: usize = 128;

/// 不低于该置信度时直接采用旁路通道的引用。
pub const TRUSTED_CONFIDENCE: u8 = 60;
/// 不低于该置信度时，即使与扫描结果无交集也采用旁路通道的引用。
pub const MID_CONFIDENCE: u8 = 40;
const MAX_CONFIDENCE: i32 = 100;

/// 沿对象头索引为每个建模实体收集紧随其后的伴随记录。
///
/// 分别按偏移和按句柄排序扫描，遇到下一条实体记录即停止；
/// 优先采用按句柄排序得到的非空结果。
pub fn discover_candidates(headers: &HeaderIndex) -> BTreeMap<Handle, Vec<Handle>> {
    let mut by_offset: Vec<&ObjectHeader> = headers.iter().collect();
    by_offset.sort_by_key(|header| (header.offset, header.handle));
    let mut by_handle: Vec<&ObjectHeader> = headers.iter().collect();
    by_handle.sort_by_key(|header| (header.handle, header.offset));

    let mut offset_map = scan_candidates(&by_offset);
    let handle_map = scan_candidates(&by_handle);

    let mut merged = BTreeMap::new();
    for (entity, candidates) in handle_map {
        let fallback = offset_map.remove(&entity).unwrap_or_default();
        merged.insert(
            entity,
            if candidates.is_empty() {
                fallback
            } else {
                candidates
            },
        );
    }
    merged.extend(offset_map);
    merged
}

fn scan_candidates(sorted: &[&ObjectHeader]) -> HashMap<Handle, Vec<Handle>> {
    let mut out = HashMap::new();
    for (position, header) in sorted.iter().enumerate() {
        let is_modeler = header.is_entity() && header.entity_kind().is_some_and(EntityKind::is_modeler);
        if !is_modeler {
            continue;
        }
        let candidates = sorted[position + 1..]
            .iter()
            .take_while(|next| !next.is_entity())
            .filter(|next| next.is_unknown() && ACIS_TYPE_CODES.contains(&next.type_code))
            .map(|next| next.handle)
            .collect();
        out.insert(header.handle, candidates);
    }
    out
}

/// 最长的可打印 ASCII 片段（去除首尾空白），过长时截断并以省略号结尾。
pub fn ascii_preview(bytes: &[u8], min_run: usize, max_len: usize) -> Option<String> {
    let mut best: Option<String> = None;
    for run in bytes.split(|byte| !(0x20..=0x7E).contains(byte)) {
        if run.len() < min_run.max(1) {
            continue;
        }
        let text = String::from_utf8_lossy(run).trim().to_string();
        if text.is_empty() {
            continue;
        }
        if best.as_ref().is_none_or(|current| text.len() > current.len()) {
            best = Some(text);
        }
    }

    // 过短的上限放不下省略号时直接截断
    best.filter(|_| max_len > 0).map(|text| {
        if text.len() <= max_len {
            text
        } else if max_len <= 3 {
            text[..max_len].to_string()
        } else {
            format!("{}...", &text[..max_len - 3])
        }
    })
}

struct RoleInput {
    type_code: u16,
    record_size: Option<usize>,
    has_preview: bool,
}

type RolePredicate = fn(&RoleInput) -> bool;

/// 角色推断规则，按顺序取第一条命中的规则。
const ROLE_RULES: &[(RolePredicate, RoleHint)] = &[
    (
        |input| input.type_code == HEADER_CODE && input.has_preview,
        RoleHint::AcisTextHeader,
    ),
    (|input| input.type_code == HEADER_CODE, RoleHint::AcisHeader),
    (
        |input| {
            PAYLOAD_CODES.contains(&input.type_code)
                && input
                    .record_size
                    .is_some_and(|size| size >= PAYLOAD_MAIN_MIN_SIZE)
        },
        RoleHint::AcisPayloadMain,
    ),
    (
        |input| PAYLOAD_CODES.contains(&input.type_code),
        RoleHint::AcisPayloadChunk,
    ),
    (
        |input| input.type_code == LINK_TABLE_CODE,
        RoleHint::AcisLinkTable,
    ),
    (
        |input| ACIS_TYPE_CODES.contains(&input.type_code),
        RoleHint::AcisAux,
    ),
];

/// 由类型码、记录字节长度与是否存在文本预览推断记录角色。
pub fn role_hint(type_code: u16, record_size: Option<usize>, has_preview: bool) -> RoleHint {
    let input = RoleInput {
        type_code,
        record_size,
        has_preview,
    };
    ROLE_RULES
        .iter()
        .find(|(matches, _)| matches(&input))
        .map_or(RoleHint::Unknown, |(_, role)| *role)
}

fn read_le(chunk: &[u8]) -> u64 {
    chunk
        .iter()
        .rev()
        .fold(0_u64, |value, byte| (value << 8) | u64::from(*byte))
}

/// 在记录前若干字节中按 4 字节、再按 8 字节小端整数寻找已知句柄。
///
/// 小于 `min_handle` 的数值不视为句柄；结果去重并保持首次出现的顺序。
pub fn scan_handle_refs(bytes: &[u8], known: &HashSet<Handle>, config: &AcisConfig) -> Vec<Handle> {
    let mut found = Vec::new();
    if bytes.is_empty() || known.is_empty() || config.max_scanned_refs == 0 {
        return found;
    }
    let window = &bytes[..bytes.len().min(config.scan_window)];
    let mut seen = HashSet::new();

    for width in [4_usize, 8] {
        for chunk in window.windows(width) {
            let value = read_le(chunk);
            if value < config.min_handle {
                continue;
            }
            let handle = Handle::new(value);
            if known.contains(&handle) && seen.insert(handle) {
                found.push(handle);
                if found.len() >= config.max_scanned_refs {
                    return found;
                }
            }
        }
    }
    found
}

/// 合并两组引用：去掉空句柄与重复项，保持先后顺序。
pub fn merge_refs(primary: &[Handle], secondary: &[Handle]) -> Vec<Handle> {
    let mut seen = HashSet::new();
    primary
        .iter()
        .chain(secondary)
        .copied()
        .filter(|handle| !handle.is_null() && seen.insert(*handle))
        .collect()
}

/// 依据旁路通道引用、扫描引用和置信度选出父引用列表及其策略。
pub fn select_parent_refs(
    stream_refs: &[Handle],
    scanned_refs: &[Handle],
    confidence: u8,
) -> (Vec<Handle>, RefStrategy) {
    if stream_refs.is_empty() {
        return (scanned_refs.to_vec(), RefStrategy::ScanOnly);
    }
    if confidence >= TRUSTED_CONFIDENCE {
        return (stream_refs.to_vec(), RefStrategy::Stream);
    }

    let scanned: HashSet<Handle> = scanned_refs.iter().copied().collect();
    let overlap: Vec<Handle> = stream_refs
        .iter()
        .copied()
        .filter(|handle| scanned.contains(handle))
        .collect();
    if !overlap.is_empty() {
        let strategy = if confidence >= MID_CONFIDENCE {
            RefStrategy::StreamOverlap
        } else {
            RefStrategy::StreamScanOverlap
        };
        return (overlap, strategy);
    }
    if confidence >= MID_CONFIDENCE {
        return (stream_refs.to_vec(), RefStrategy::StreamMid);
    }
    (Vec::new(), RefStrategy::LowconfDrop)
}

fn ref_details(handles: &[Handle], headers: &HeaderIndex) -> Vec<HandleRefDetail> {
    handles
        .iter()
        .map(|handle| match headers.get(*handle) {
            Some(header) => HandleRefDetail {
                handle: *handle,
                offset: header.offset,
                data_size: header.data_size,
                type_code: header.type_code,
                type_name: header.canonical_type_name(),
                type_class: header.canonical_type_class(),
            },
            None => HandleRefDetail {
                handle: *handle,
                offset: 0,
                data_size: 0,
                type_code: 0,
                type_name: "UNKNOWN".to_string(),
                type_class: String::new(),
            },
        })
        .collect()
}

/// 旁路通道给出的角色标签优先；标签为空或无法识别时按类型码推断。
fn side_channel_role(info: Option<&AcisCandidateInfo>) -> Option<RoleHint> {
    let info = info?;
    let label = info.role_hint.trim();
    if label.is_empty() {
        return None;
    }
    let role = RoleHint::from_label(label);
    if role.is_none() {
        let err = SourceError::malformed(
            "ACIS candidate info",
            info.handle,
            format!("unknown role hint {label:?}"),
        );
        warn!(error = %err, "忽略无法识别的角色标签");
    }
    role
}

/// 分析一条可读取字节的伴随记录。
pub fn analyze_record(
    record: &ObjectRecord,
    info: Option<&AcisCandidateInfo>,
    headers: &HeaderIndex,
    known: &HashSet<Handle>,
    config: &AcisConfig,
) -> AcisCandidateRecord {
    let handle = record.handle;
    let mut type_code = record.type_code;
    let mut data_size = record.data_size;
    let mut confidence = 0_u8;
    let mut stream_refs = Vec::new();

    if let Some(info) = info {
        if info.type_code > 0 {
            type_code = info.type_code;
        }
        if info.data_size > 0 {
            data_size = info.data_size;
        }
        confidence = info.confidence.clamp(0, MAX_CONFIDENCE) as u8;
        stream_refs = merge_refs(&info.refs, &[])
            .into_iter()
            .filter(|target| *target != handle && known.contains(target))
            .collect();
    }

    let scanned_refs: Vec<Handle> = scan_handle_refs(&record.bytes, known, config)
        .into_iter()
        .filter(|target| *target != handle)
        .collect();

    let likely_handle_refs = if stream_refs.is_empty() {
        scanned_refs.clone()
    } else if confidence < MID_CONFIDENCE {
        merge_refs(&stream_refs, &scanned_refs)
    } else {
        stream_refs.clone()
    };
    let (parent_ref_handles, parent_ref_strategy) =
        select_parent_refs(&stream_refs, &scanned_refs, confidence);
    if parent_ref_strategy == RefStrategy::LowconfDrop {
        debug!(handle = %handle, confidence, "低置信度引用已丢弃");
    }

    let ascii_preview = ascii_preview(&record.bytes, config.preview_min_run, config.preview_max_len);
    let role_hint = side_channel_role(info).unwrap_or_else(|| {
        role_hint(type_code, Some(record.bytes.len()), ascii_preview.is_some())
    });
    let type_name = headers
        .get(handle)
        .map(ObjectHeader::canonical_type_name)
        .unwrap_or_else(|| format!("UNKNOWN(0x{type_code:X})"));

    AcisCandidateRecord {
        handle,
        offset: record.offset,
        data_size,
        type_code,
        type_name,
        record_size: Some(record.bytes.len()),
        ascii_preview,
        likely_handle_ref_details: ref_details(&likely_handle_refs, headers),
        likely_handle_refs,
        stream_refs,
        scanned_refs,
        parent_ref_handles,
        parent_ref_strategy,
        ref_confidence: confidence,
        role_hint,
        ..AcisCandidateRecord::default()
    }
}

/// 无法读取字节的伴随记录：只保留对象头信息，策略为 `none`。
pub fn placeholder_record(
    handle: Handle,
    info: Option<&AcisCandidateInfo>,
    headers: &HeaderIndex,
) -> AcisCandidateRecord {
    let (offset, data_size, type_code, type_name) = match headers.get(handle) {
        Some(header) => (
            header.offset,
            header.data_size,
            header.type_code,
            header.canonical_type_name(),
        ),
        None => (0, 0, 0, "UNKNOWN".to_string()),
    };
    AcisCandidateRecord {
        handle,
        offset,
        data_size,
        type_code,
        type_name,
        role_hint: side_channel_role(info).unwrap_or_else(|| role_hint(type_code, None, false)),
        ..AcisCandidateRecord::default()
    }
}

/// 文档级伴随记录分析结果，随会话缓存。
#[derive(Debug, Clone, Default)]
pub struct AcisDocumentIndex {
    candidates: BTreeMap<Handle, Vec<Handle>>,
    records: HashMap<Handle, AcisCandidateRecord>,
}

impl AcisDocumentIndex {
    /// 原始字节或旁路通道不可用时分别退化为占位记录与纯扫描。
    pub fn build<S: RecordSource + ?Sized>(
        source: &S,
        headers: &HeaderIndex,
        config: &AcisConfig,
    ) -> Self {
        let candidates = discover_candidates(headers);
        let mut handles: Vec<Handle> = candidates
            .values()
            .flatten()
            .copied()
            .filter(|handle| !handle.is_null())
            .collect();
        handles.sort();
        handles.dedup();
        if handles.is_empty() {
            return Self {
                candidates,
                records: HashMap::new(),
            };
        }

        let rows = source.object_records(&handles).unwrap_or_else(|err| {
            warn!(error = %err, "无法读取 ACIS 伴随记录字节，改用占位记录");
            Vec::new()
        });
        let infos = source.acis_candidate_infos(&handles).unwrap_or_else(|err| {
            warn!(error = %err, "ACIS 旁路通道不可用，仅使用字节扫描");
            Vec::new()
        });
        let info_map: HashMap<Handle, AcisCandidateInfo> =
            infos.into_iter().map(|info| (info.handle, info)).collect();
        let known: HashSet<Handle> = headers.handles().collect();
        let wanted: HashSet<Handle> = handles.iter().copied().collect();

        let mut records = HashMap::with_capacity(handles.len());
        for row in rows.iter().filter(|row| wanted.contains(&row.handle)) {
            let record = analyze_record(row, info_map.get(&row.handle), headers, &known, config);
            records.insert(row.handle, record);
        }
        for handle in &handles {
            records
                .entry(*handle)
                .or_insert_with(|| placeholder_record(*handle, info_map.get(handle), headers));
        }

        debug!(
            entities = candidates.len(),
            candidates = records.len(),
            "已分析 ACIS 伴随记录"
        );
        Self {
            candidates,
            records,
        }
    }

    pub fn candidates_for(&self, entity: Handle) -> &[Handle] {
        self.candidates
            .get(&entity)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn record(&self, handle: Handle) -> Option<&AcisCandidateRecord> {
        self.records.get(&handle)
    }

    #[inline]
    pub fn candidate_count(&self) -> usize {
        self.records.len()
    }
}

#[derive(Debug, Clone, Copy)]
enum Bucket {
    Entity,
    Candidate(Option<&'static [RoleHint]>),
}

type ParentRules = &'static [(Bucket, ParentRule)];

const HEADER_ROLES: &[RoleHint] = &[RoleHint::AcisHeader, RoleHint::AcisTextHeader];
const LINK_ROLES: &[RoleHint] = &[RoleHint::AcisLinkTable];
const PAYLOAD_ROLES: &[RoleHint] = &[RoleHint::AcisPayloadMain, RoleHint::AcisPayloadChunk];

const HEADER_RULES: ParentRules = &[
    (Bucket::Entity, ParentRule::HeaderPrefersEntity),
    (
        Bucket::Candidate(Some(HEADER_ROLES)),
        ParentRule::HeaderFallbackCandidate,
    ),
];

const LINK_RULES: ParentRules = &[
    (
        Bucket::Candidate(Some(HEADER_ROLES)),
        ParentRule::LinkPrefersHeader,
    ),
    (Bucket::Candidate(None), ParentRule::LinkFallbackCandidate),
    (Bucket::Entity, ParentRule::LinkFallbackEntity),
];

const PAYLOAD_RULES: ParentRules = &[
    (
        Bucket::Candidate(Some(LINK_ROLES)),
        ParentRule::PayloadPrefersLink,
    ),
    (
        Bucket::Candidate(Some(PAYLOAD_ROLES)),
        ParentRule::PayloadPrefersPayload,
    ),
    (
        Bucket::Candidate(Some(HEADER_ROLES)),
        ParentRule::PayloadFallbackHeader,
    ),
    (Bucket::Candidate(None), ParentRule::PayloadFallbackCandidate),
    (Bucket::Entity, ParentRule::PayloadFallbackEntity),
];

const GENERIC_RULES: ParentRules = &[
    (Bucket::Entity, ParentRule::GenericEntity),
    (Bucket::Candidate(None), ParentRule::GenericCandidate),
];

fn parent_rules(role: RoleHint) -> ParentRules {
    match role {
        RoleHint::AcisHeader | RoleHint::AcisTextHeader => HEADER_RULES,
        RoleHint::AcisLinkTable => LINK_RULES,
        RoleHint::AcisPayloadMain | RoleHint::AcisPayloadChunk => PAYLOAD_RULES,
        RoleHint::AcisAux | RoleHint::Unknown => GENERIC_RULES,
    }
}

struct CandidateLookup {
    positions: HashMap<Handle, usize>,
    roles: HashMap<Handle, RoleHint>,
}

impl CandidateLookup {
    /// 符合角色要求的候选中，取排在当前记录之前且最靠近的一条，否则取第一条。
    fn select(
        &self,
        current: usize,
        refs: &[Handle],
        allowed: Option<&[RoleHint]>,
    ) -> Option<Handle> {
        let filtered: Vec<Handle> = refs
            .iter()
            .copied()
            .filter(|handle| {
                allowed.is_none_or(|roles| {
                    roles.contains(&self.roles.get(handle).copied().unwrap_or_default())
                })
            })
            .collect();
        let position = |handle: Handle| self.positions.get(&handle).copied();
        filtered
            .iter()
            .filter(|handle| position(**handle).is_some_and(|index| index < current))
            .max_by_key(|handle| position(**handle))
            .or_else(|| filtered.first())
            .copied()
    }
}

fn select_parent(
    record: &AcisCandidateRecord,
    lookup: &CandidateLookup,
) -> Option<(Handle, ParentKind, ParentRule)> {
    for (bucket, rule) in parent_rules(record.role_hint) {
        let found = match bucket {
            Bucket::Entity => record
                .entity_ref_handles
                .first()
                .map(|handle| (*handle, ParentKind::Entity)),
            Bucket::Candidate(allowed) => lookup
                .select(record.candidate_index, &record.candidate_ref_handles, *allowed)
                .map(|handle| (handle, ParentKind::Candidate)),
        };
        if let Some((handle, kind)) = found {
            return Some((handle, kind, *rule));
        }
    }
    record
        .external_ref_handles
        .first()
        .map(|handle| (*handle, ParentKind::External, ParentRule::ExternalFallback))
}

/// 由按发现顺序排列的文档级记录组装单个实体的引用图。
pub fn assemble_graph(entity: Handle, mut records: Vec<AcisCandidateRecord>) -> AcisGraph {
    let mut seen = HashSet::new();
    records.retain(|record| !record.handle.is_null() && seen.insert(record.handle));

    let candidate_handles: Vec<Handle> = records.iter().map(|record| record.handle).collect();
    let positions: HashMap<Handle, usize> = candidate_handles
        .iter()
        .enumerate()
        .map(|(index, handle)| (*handle, index))
        .collect();

    for (index, record) in records.iter_mut().enumerate() {
        let mut refs = merge_refs(&record.parent_ref_handles, &[]);
        let mut strategy = record.parent_ref_strategy;
        // 低置信度丢弃后，若合并列表中仍有所属实体，则只恢复这一条引用
        if refs.is_empty()
            && strategy == RefStrategy::LowconfDrop
            && record.likely_handle_refs.contains(&entity)
        {
            refs = vec![entity];
            strategy = RefStrategy::LowconfEntityFallback;
            debug!(entity = %entity, candidate = %record.handle, "低置信度记录回退到所属实体");
        }

        let own = record.handle;
        record.candidate_index = index;
        record.effective_strategy = strategy;
        record.entity_ref_handles = refs.iter().copied().filter(|r| *r == entity).collect();
        record.candidate_ref_handles = refs
            .iter()
            .copied()
            .filter(|r| positions.contains_key(r) && *r != own)
            .collect();
        record.external_ref_handles = refs
            .iter()
            .copied()
            .filter(|r| !positions.contains_key(r) && *r != entity)
            .collect();
    }

    let lookup = CandidateLookup {
        roles: records
            .iter()
            .map(|record| (record.handle, record.role_hint))
            .collect(),
        positions,
    };
    let mut edges = Vec::new();
    let mut primary_edges = Vec::new();
    let mut children: BTreeMap<Handle, Vec<Handle>> = BTreeMap::new();

    for record in records.iter_mut() {
        let source = record.handle;
        edges.extend(record.entity_ref_handles.iter().map(|target| AcisEdge {
            source,
            target: *target,
            kind: ParentKind::Entity,
        }));
        edges.extend(record.candidate_ref_handles.iter().map(|target| AcisEdge {
            source,
            target: *target,
            kind: ParentKind::Candidate,
        }));
        edges.extend(record.external_ref_handles.iter().map(|target| AcisEdge {
            source,
            target: *target,
            kind: ParentKind::External,
        }));

        if let Some((parent, kind, rule)) = select_parent(record, &lookup) {
            record.parent_handle = Some(parent);
            record.parent_kind = kind;
            record.parent_rule = rule;
            primary_edges.push(AcisPrimaryEdge {
                source,
                target: parent,
                kind,
                rule,
            });
            if kind == ParentKind::Candidate {
                children.entry(parent).or_default().push(source);
            }
        }
    }

    for record in records.iter_mut() {
        record.child_candidate_handles = children.get(&record.handle).cloned().unwrap_or_default();
    }

    AcisGraph {
        candidate_handles,
        records,
        edges,
        primary_edges,
        children,
    }
}

/// 以文档级分析结果为输入，为单个建模实体生成引用图。
#[derive(Debug, Clone, Copy)]
pub struct AcisGraphBuilder<'a> {
    index: &'a AcisDocumentIndex,
}

impl<'a> AcisGraphBuilder<'a> {
    pub fn new(index: &'a AcisDocumentIndex) -> Self {
        Self { index }
    }

    pub fn build(&self, entity: Handle) -> AcisGraph {
        let records = self
            .index
            .candidates_for(entity)
            .iter()
            .map(|handle| {
                self.index
                    .record(*handle)
                    .cloned()
                    .unwrap_or_else(|| AcisCandidateRecord {
                        handle: *handle,
                        ..AcisCandidateRecord::default()
                    })
            })
            .collect();
        assemble_graph(entity, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(raw: u64) -> Handle {
        Handle::new(raw)
    }

    fn candidate(handle: u64, role: RoleHint, parents: &[u64], strategy: RefStrategy) -> AcisCandidateRecord {
        AcisCandidateRecord {
            handle: h(handle),
            role_hint: role,
            parent_ref_handles: parents.iter().copied().map(h).collect(),
            parent_ref_strategy: strategy,
            ..AcisCandidateRecord::default()
        }
    }

    #[test]
    fn discovery_stops_at_next_entity() {
        let headers = HeaderIndex::new(vec![
            ObjectHeader::new(0x100, 1000, 40, 0x26, "3DSOLID", "E"),
            ObjectHeader::new(0x101, 1040, 40, 0x221, "UNKNOWN(0x221)", ""),
            ObjectHeader::new(0x102, 1080, 40, 0x33, "LAYER", "O"),
            ObjectHeader::new(0x103, 1120, 40, 0x300, "UNKNOWN(0x300)", ""),
            ObjectHeader::new(0x104, 1160, 40, 0x222, "UNKNOWN(0x222)", ""),
            ObjectHeader::new(0x105, 1200, 40, 0x13, "LINE", "E"),
            ObjectHeader::new(0x106, 1240, 40, 0x223, "UNKNOWN(0x223)", ""),
        ]);
        let found = discover_candidates(&headers);
        assert_eq!(found.len(), 1);
        assert_eq!(found[&h(0x100)], vec![h(0x101), h(0x104)]);
    }

    #[test]
    fn discovery_falls_back_to_offset_order() {
        // 句柄顺序中实体后紧跟另一实体，偏移顺序中伴随记录紧跟实体
        let headers = HeaderIndex::new(vec![
            ObjectHeader::new(0x100, 5000, 40, 0x27, "BODY", "E"),
            ObjectHeader::new(0x101, 100, 40, 0x13, "LINE", "E"),
            ObjectHeader::new(0x090, 5040, 40, 0x222, "UNKNOWN(0x222)", ""),
        ]);
        let found = discover_candidates(&headers);
        assert_eq!(found[&h(0x100)], vec![h(0x090)]);
    }

    #[test]
    fn preview_keeps_longest_run() {
        let bytes = b"\x00\x01abc\x02ACIS BinaryFile\x00  tiny  \x05";
        assert_eq!(ascii_preview(bytes, 6, 96).as_deref(), Some("ACIS BinaryFile"));
        assert_eq!(ascii_preview(b"\x00abc\x00", 6, 96), None);

        let long = vec![b'A'; 120];
        let preview = ascii_preview(&long, 6, 96).expect("preview");
        assert_eq!(preview.len(), 96);
        assert!(preview.ends_with("..."));

        for max_len in 1..=4 {
            let preview = ascii_preview(&long, 6, max_len).expect("preview");
            assert!(preview.len() <= max_len, "{preview:?} exceeds {max_len}");
        }
        assert_eq!(ascii_preview(&long, 6, 3).as_deref(), Some("AAA"));
        assert_eq!(ascii_preview(&long, 6, 4).as_deref(), Some("A..."));
        assert_eq!(ascii_preview(&long, 6, 0), None);
    }

    #[test]
    fn role_rules_follow_type_code() {
        assert_eq!(role_hint(0x221, Some(10), false), RoleHint::AcisHeader);
        assert_eq!(role_hint(0x221, Some(10), true), RoleHint::AcisTextHeader);
        assert_eq!(role_hint(0x222, Some(127), false), RoleHint::AcisPayloadChunk);
        assert_eq!(role_hint(0x225, Some(128), false), RoleHint::AcisPayloadMain);
        assert_eq!(role_hint(0x223, None, false), RoleHint::AcisPayloadChunk);
        assert_eq!(role_hint(0x214, Some(4), true), RoleHint::AcisLinkTable);
        assert_eq!(role_hint(0x218, Some(4), false), RoleHint::AcisAux);
        assert_eq!(role_hint(0x300, Some(4), false), RoleHint::Unknown);
    }

    #[test]
    fn scan_finds_known_handles_in_order() {
        let known: HashSet<Handle> = [h(0x1F4), h(0x10), h(0x2_0000_0000)].into_iter().collect();
        let mut bytes = vec![0_u8; 16];
        bytes[2..6].copy_from_slice(&0x1F4_u32.to_le_bytes());
        bytes[8] = 0x10;
        let mut wide = vec![0_u8; 8];
        wide.copy_from_slice(&0x2_0000_0000_u64.to_le_bytes());
        bytes.extend(wide);

        let found = scan_handle_refs(&bytes, &known, &AcisConfig::default());
        // 0x10 低于最小句柄阈值
        assert_eq!(found, vec![h(0x1F4), h(0x2_0000_0000)]);

        let limited = AcisConfig {
            max_scanned_refs: 1,
            ..AcisConfig::default()
        };
        assert_eq!(scan_handle_refs(&bytes, &known, &limited), vec![h(0x1F4)]);

        let narrow = AcisConfig {
            scan_window: 8,
            ..AcisConfig::default()
        };
        assert_eq!(scan_handle_refs(&bytes, &known, &narrow), vec![h(0x1F4)]);
    }

    #[test]
    fn parent_ref_strategies() {
        let (refs, strategy) = select_parent_refs(&[], &[h(70)], 0);
        assert_eq!((refs, strategy), (vec![h(70)], RefStrategy::ScanOnly));

        let (refs, strategy) = select_parent_refs(&[h(80), h(81)], &[], 75);
        assert_eq!((refs, strategy), (vec![h(80), h(81)], RefStrategy::Stream));

        let (refs, strategy) = select_parent_refs(&[h(80), h(81)], &[h(81)], 45);
        assert_eq!((refs, strategy), (vec![h(81)], RefStrategy::StreamOverlap));

        let (refs, strategy) = select_parent_refs(&[h(80), h(81)], &[h(81)], 20);
        assert_eq!((refs, strategy), (vec![h(81)], RefStrategy::StreamScanOverlap));

        let (refs, strategy) = select_parent_refs(&[h(80)], &[h(90)], 40);
        assert_eq!((refs, strategy), (vec![h(80)], RefStrategy::StreamMid));
    }

    #[test]
    fn low_confidence_without_overlap_drops_refs() {
        let line = h(0x200);
        let other_line = h(0x201);
        let (refs, strategy) = select_parent_refs(&[line], &[other_line], 9);
        assert!(refs.is_empty());
        assert_eq!(strategy, RefStrategy::LowconfDrop);
    }

    #[test]
    fn analysis_merges_low_confidence_stream_with_scan() {
        let headers = HeaderIndex::new(vec![
            ObjectHeader::new(0x100, 0, 40, 0x26, "3DSOLID", "E"),
            ObjectHeader::new(0x101, 40, 40, 0x222, "UNKNOWN(0x222)", ""),
            ObjectHeader::new(0x200, 80, 40, 0x13, "LINE", "E"),
            ObjectHeader::new(0x201, 120, 40, 0x13, "LINE", "E"),
        ]);
        let known: HashSet<Handle> = headers.handles().collect();
        let mut bytes = vec![0_u8; 8];
        bytes[0..4].copy_from_slice(&0x201_u32.to_le_bytes());
        let record = ObjectRecord {
            handle: h(0x101),
            offset: 40,
            data_size: 8,
            type_code: 0x222,
            bytes,
        };
        let info = AcisCandidateInfo {
            handle: h(0x101),
            type_code: 0,
            data_size: 0,
            role_hint: String::new(),
            refs: vec![h(0x200), h(0x101), h(0x999)],
            confidence: 9,
        };

        let analyzed = analyze_record(&record, Some(&info), &headers, &known, &AcisConfig::default());
        assert_eq!(analyzed.stream_refs, vec![h(0x200)]);
        assert_eq!(analyzed.scanned_refs, vec![h(0x201)]);
        assert_eq!(analyzed.likely_handle_refs, vec![h(0x200), h(0x201)]);
        assert_eq!(analyzed.parent_ref_strategy, RefStrategy::LowconfDrop);
        assert!(analyzed.parent_ref_handles.is_empty());
        assert_eq!(analyzed.ref_confidence, 9);
        assert_eq!(analyzed.role_hint, RoleHint::AcisPayloadChunk);
        assert_eq!(analyzed.likely_handle_ref_details[1].type_name, "LINE");
    }

    #[test]
    fn side_channel_role_and_confidence_clamp() {
        let headers = HeaderIndex::default();
        let info = AcisCandidateInfo {
            handle: h(0x101),
            type_code: 0x214,
            data_size: 64,
            role_hint: "acis-payload-main".to_string(),
            refs: vec![],
            confidence: 250,
        };
        let record = ObjectRecord {
            handle: h(0x101),
            offset: 0,
            data_size: 4,
            type_code: 0x221,
            bytes: vec![1, 2, 3, 4],
        };
        let analyzed = analyze_record(&record, Some(&info), &headers, &HashSet::new(), &AcisConfig::default());
        assert_eq!(analyzed.role_hint, RoleHint::AcisPayloadMain);
        assert_eq!(analyzed.type_code, 0x214);
        assert_eq!(analyzed.data_size, 64);
        assert_eq!(analyzed.ref_confidence, 100);
        assert_eq!(analyzed.type_name, "UNKNOWN(0x214)");

        let placeholder = placeholder_record(h(0x102), None, &headers);
        assert_eq!(placeholder.parent_ref_strategy, RefStrategy::None);
        assert_eq!(placeholder.record_size, None);
        assert_eq!(placeholder.role_hint, RoleHint::Unknown);
    }

    #[test]
    fn header_candidate_prefers_owning_entity() {
        let entity = h(0x100);
        let graph = assemble_graph(
            entity,
            vec![candidate(0x101, RoleHint::AcisHeader, &[0x100], RefStrategy::Stream)],
        );
        assert_eq!(
            graph.primary_edges,
            vec![AcisPrimaryEdge {
                source: h(0x101),
                target: entity,
                kind: ParentKind::Entity,
                rule: ParentRule::HeaderPrefersEntity,
            }]
        );
        assert_eq!(graph.records[0].parent_handle, Some(entity));
        assert!(graph.children.is_empty());
    }

    #[test]
    fn payload_chain_prefers_link_table_then_nearest_payload() {
        let entity = h(0x100);
        let graph = assemble_graph(
            entity,
            vec![
                candidate(0x101, RoleHint::AcisTextHeader, &[0x100], RefStrategy::Stream),
                candidate(0x102, RoleHint::AcisLinkTable, &[0x101, 0x100], RefStrategy::Stream),
                candidate(0x103, RoleHint::AcisPayloadMain, &[0x101, 0x102], RefStrategy::Stream),
                candidate(0x104, RoleHint::AcisPayloadChunk, &[0x101, 0x103], RefStrategy::ScanOnly),
                candidate(0x105, RoleHint::AcisPayloadChunk, &[0x103, 0x104], RefStrategy::ScanOnly),
            ],
        );
        let rules: Vec<(Option<Handle>, ParentRule)> = graph
            .records
            .iter()
            .map(|record| (record.parent_handle, record.parent_rule))
            .collect();
        assert_eq!(
            rules,
            vec![
                (Some(h(0x100)), ParentRule::HeaderPrefersEntity),
                (Some(h(0x101)), ParentRule::LinkPrefersHeader),
                (Some(h(0x102)), ParentRule::PayloadPrefersLink),
                (Some(h(0x103)), ParentRule::PayloadPrefersPayload),
                (Some(h(0x104)), ParentRule::PayloadPrefersPayload),
            ]
        );
        assert_eq!(graph.children[&h(0x101)], vec![h(0x102)]);
        assert_eq!(graph.records[2].child_candidate_handles, vec![h(0x104)]);
        assert_eq!(graph.edges.len(), 9);
    }

    #[test]
    fn low_confidence_drop_recovers_owning_entity_only() {
        let entity = h(0x100);
        let mut dropped = candidate(0x101, RoleHint::AcisAux, &[], RefStrategy::LowconfDrop);
        dropped.likely_handle_refs = vec![h(0x200), entity];
        let mut noisy = candidate(0x102, RoleHint::AcisAux, &[], RefStrategy::LowconfDrop);
        noisy.likely_handle_refs = vec![h(0x200)];

        let graph = assemble_graph(entity, vec![dropped, noisy]);
        let first = &graph.records[0];
        assert_eq!(first.parent_ref_strategy, RefStrategy::LowconfDrop);
        assert_eq!(first.effective_strategy, RefStrategy::LowconfEntityFallback);
        assert_eq!(first.parent_rule, ParentRule::GenericEntity);
        let second = &graph.records[1];
        assert_eq!(second.effective_strategy, RefStrategy::LowconfDrop);
        assert_eq!(second.parent_kind, ParentKind::None);
        assert_eq!(graph.primary_edges.len(), 1);
    }

    #[test]
    fn unresolved_candidate_falls_back_to_external_ref() {
        let graph = assemble_graph(
            h(0x100),
            vec![candidate(0x101, RoleHint::AcisHeader, &[0x300, 0x301], RefStrategy::ScanOnly)],
        );
        let record = &graph.records[0];
        assert_eq!(record.external_ref_handles, vec![h(0x300), h(0x301)]);
        assert_eq!(record.parent_handle, Some(h(0x300)));
        assert_eq!(record.parent_kind, ParentKind::External);
        assert_eq!(record.parent_rule, ParentRule::ExternalFallback);
    }
}
