use std::fs;
use std::path::PathBuf;

use dwgkit_core::document::{Entity, EntityData, EntityKind, Handle};
use dwgkit_core::geometry::Point3;
use dwgkit_engine::{DocumentSession, EngineError, TypeSelection};
use dwgkit_source::{Feed, MemorySource};

fn load(name: &str) -> MemorySource {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    let text = fs::read_to_string(&path).expect("读取记录转储失败");
    serde_json::from_str(&text).expect("解析记录转储失败")
}

fn query_all(session: &DocumentSession<MemorySource>, names: &str) -> Vec<Entity> {
    session
        .query_types(names)
        .expect("类型名无效")
        .collect::<Result<Vec<_>, _>>()
        .expect("查询失败")
}

#[test]
fn closed_polyline_drops_repeated_first_vertex() {
    let session = DocumentSession::new(load("polylines.json"));
    let entities = query_all(&session, "POLYLINE_2D");
    assert_eq!(entities.len(), 1);

    let EntityData::Polyline2d(polyline) = entities[0].data() else {
        panic!("expected POLYLINE_2D, got {:?}", entities[0].kind());
    };
    assert!(polyline.closed);
    assert_eq!(
        polyline.points,
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(4.0, 3.0, 0.0),
        ]
    );
    assert!(!polyline.should_interpolate);
    assert_eq!(polyline.sequence.seqend_handle, Some(Handle::new(517)));
}

#[test]
fn default_query_follows_kind_order_and_skips_members() {
    let session = DocumentSession::new(load("polylines.json"));
    let handles: Vec<u64> = session
        .query(&TypeSelection::defaults())
        .map(|entity| entity.expect("查询失败").handle().get())
        .collect();
    assert_eq!(handles, vec![1024, 512, 768]);
}

#[test]
fn every_member_points_back_to_a_listing_owner() {
    let session = DocumentSession::new(load("polylines.json"));
    let owners: Vec<Entity> = query_all(&session, "POLYLINE_*");
    let members = query_all(&session, "VERTEX_2D VERTEX_PFACE VERTEX_PFACE_FACE SEQEND");
    assert_eq!(members.len(), 8);

    for member in &members {
        let owner = member
            .data()
            .owner()
            .unwrap_or_else(|| panic!("{} {} has no owner", member.dxftype(), member.handle()));
        let listed = owners
            .iter()
            .find(|candidate| candidate.handle() == owner.handle)
            .expect("owner entity present");
        assert_eq!(listed.kind(), owner.kind);

        let sequence = match listed.data() {
            EntityData::Polyline2d(polyline) => &polyline.sequence,
            EntityData::PolylinePface(pface) => &pface.sequence,
            other => panic!("unexpected owner {other:?}"),
        };
        let handle = member.handle();
        assert!(
            sequence.vertex_handles.contains(&handle)
                || sequence.face_handles.contains(&handle)
                || sequence.seqend_handle == Some(handle),
            "{handle} is not listed by {}",
            owner.handle
        );
    }
}

#[test]
fn by_layer_line_takes_layer_color() {
    let session = DocumentSession::new(load("polylines.json"));
    let lines = session.entities(EntityKind::Line).expect("组装 LINE 失败");
    let style = lines[0].style();
    assert_eq!(style.color_index, Some(256));
    assert_eq!(style.resolved_color_index, Some(3));
    assert!(!style.supplementary);
}

#[test]
fn unknown_type_is_rejected_before_reading_rows() {
    let mut source = load("polylines.json");
    source.fail_feed(Feed::Entities(EntityKind::Line));
    let session = DocumentSession::new(source);

    let err = session.query_types("LINE, HATCH").err().expect("HATCH must be rejected");
    assert!(matches!(err, EngineError::UnsupportedType(name) if name == "HATCH"));
}

#[test]
fn whole_type_failure_ends_the_stream() {
    let mut source = load("polylines.json");
    source.fail_feed(Feed::Entities(EntityKind::Polyline2d));
    let session = DocumentSession::new(source);

    let mut stream = session
        .query_types("LINE POLYLINE_2D POLYLINE_PFACE")
        .expect("类型名有效");
    let line = stream.next().expect("LINE entity").expect("LINE 组装失败");
    assert_eq!(line.kind(), EntityKind::Line);

    match stream.next() {
        Some(Err(EngineError::Source { feed, .. })) => {
            assert_eq!(feed, Feed::Entities(EntityKind::Polyline2d));
        }
        other => panic!("expected a decode failure, got {other:?}"),
    }
    assert!(stream.next().is_none());
    assert!(stream.next().is_none());
}

#[test]
fn missing_relationships_leave_members_unowned() {
    let mut source = load("polylines.json");
    source.fail_feed(Feed::SequenceMembers);
    let session = DocumentSession::new(source);

    let vertices = query_all(&session, "VERTEX_2D");
    assert_eq!(vertices.len(), 4);
    assert!(vertices.iter().all(|vertex| vertex.data().owner().is_none()));

    let polylines = query_all(&session, "POLYLINE_2D");
    let EntityData::Polyline2d(polyline) = polylines[0].data() else {
        panic!("expected POLYLINE_2D");
    };
    assert!(polyline.sequence.is_empty());
}

#[test]
fn queries_restart_from_cached_indexes() {
    let session = DocumentSession::new(load("polylines.json"));
    let first = query_all(&session, "*");
    let second = query_all(&session, "*");
    assert_eq!(first, second);
}
