use tenebra::{
    ClassKind, Context, ContextOptions, Direction, GraphFilter, PropertyType, Record,
    RecordDescriptor, Result, ResultCursor, TenebraError, Transaction, TraverseOptions, TxnMode,
};
use tempfile::TempDir;

fn open_db() -> (TempDir, Context) {
    let dir = TempDir::new().unwrap();
    let ctx = Context::open(dir.path(), ContextOptions::default()).unwrap();
    (dir, ctx)
}

fn traversal_schema(ctx: &Context) {
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();
    txn.create_class("nodes", ClassKind::Vertex).unwrap();
    txn.add_property("nodes", "name", PropertyType::Text).unwrap();
    txn.create_class("eA", ClassKind::Edge).unwrap();
    txn.add_property("eA", "weight", PropertyType::UnsignedInteger).unwrap();
    txn.create_class("eB", ClassKind::Edge).unwrap();
    txn.add_property("eB", "weight", PropertyType::UnsignedInteger).unwrap();
    txn.commit().unwrap();
}

fn vertex(txn: &mut Transaction<'_>, name: &str) -> RecordDescriptor {
    txn.create_vertex("nodes", &Record::new().with("name", name))
        .unwrap()
}

fn names_at_depth(results: &[tenebra::RecordResult]) -> Vec<(String, u32)> {
    results
        .iter()
        .map(|r| {
            (
                r.record.get("name").unwrap().to_text().unwrap(),
                r.record.depth().unwrap(),
            )
        })
        .collect()
}

#[test]
fn bfs_levels_and_depth_window() -> Result<()> {
    let (_dir, ctx) = open_db();
    traversal_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    // v1 -> v2 -> v4, v1 -> v3 -> v4 -> v5 (diamond with a tail)
    let v1 = vertex(&mut txn, "v1");
    let v2 = vertex(&mut txn, "v2");
    let v3 = vertex(&mut txn, "v3");
    let v4 = vertex(&mut txn, "v4");
    let v5 = vertex(&mut txn, "v5");
    txn.create_edge("eA", &v1, &v2, &Record::new())?;
    txn.create_edge("eA", &v1, &v3, &Record::new())?;
    txn.create_edge("eA", &v2, &v4, &Record::new())?;
    txn.create_edge("eA", &v3, &v4, &Record::new())?;
    txn.create_edge("eA", &v4, &v5, &Record::new())?;

    let all = txn.bfs(&v1, Direction::Out, &TraverseOptions::new())?;
    let got = names_at_depth(&all);
    assert_eq!(got[0], ("v1".into(), 0));
    assert_eq!(got.len(), 5);
    assert!(got.contains(&("v4".into(), 2)));
    assert!(got.contains(&("v5".into(), 3)));

    // min depth hides the near shell, max depth cuts the far one
    let windowed = txn.bfs(
        &v1,
        Direction::Out,
        &TraverseOptions::new().min_depth(2).max_depth(2),
    )?;
    assert_eq!(names_at_depth(&windowed), vec![("v4".into(), 2)]);

    // incoming direction walks the graph backwards
    let upstream = txn.bfs(&v5, Direction::In, &TraverseOptions::new().min_depth(1))?;
    let names: Vec<String> = upstream.iter().map(|r| r.record.get("name").unwrap().to_text().unwrap()).collect();
    assert_eq!(names.len(), 4);
    assert!(names.contains(&"v1".to_string()));
    Ok(())
}

#[test]
fn bfs_with_edge_class_filter() -> Result<()> {
    let (_dir, ctx) = open_db();
    traversal_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    let v1 = vertex(&mut txn, "v1");
    let v2 = vertex(&mut txn, "v2");
    let v3 = vertex(&mut txn, "v3");
    let v4 = vertex(&mut txn, "v4");
    let v5 = vertex(&mut txn, "v5");
    txn.create_edge("eA", &v1, &v3, &Record::new())?;
    txn.create_edge("eB", &v1, &v4, &Record::new())?;
    txn.create_edge("eA", &v2, &v3, &Record::new())?;
    txn.create_edge("eB", &v2, &v4, &Record::new())?;
    txn.create_edge("eA", &v3, &v5, &Record::new())?;

    let opts = TraverseOptions::new()
        .min_depth(1)
        .max_depth(1)
        .edge_filter(GraphFilter::new().only(["eA"]));
    let reached = txn.bfs(&v2, Direction::All, &opts)?;
    assert_eq!(names_at_depth(&reached), vec![("v3".into(), 1)]);
    Ok(())
}

#[test]
fn bfs_vertex_filter_prunes_expansion() -> Result<()> {
    let (_dir, ctx) = open_db();
    traversal_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    let v1 = vertex(&mut txn, "v1");
    let v2 = vertex(&mut txn, "v2");
    let v3 = vertex(&mut txn, "v3");
    txn.create_edge("eA", &v1, &v2, &Record::new())?;
    txn.create_edge("eA", &v2, &v3, &Record::new())?;

    fn not_v2(record: &Record) -> bool {
        record
            .get("name")
            .and_then(|b| b.to_text().ok())
            .is_some_and(|n| n != "v2")
    }
    let opts = TraverseOptions::new().vertex_filter(GraphFilter::function(not_v2));
    let reached = txn.bfs(&v1, Direction::Out, &opts)?;
    // v2 fails the filter, so v3 is never discovered through it
    assert_eq!(names_at_depth(&reached), vec![("v1".into(), 0)]);
    Ok(())
}

#[test]
fn dfs_preorder_is_stable() -> Result<()> {
    let (_dir, ctx) = open_db();
    traversal_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    let root = vertex(&mut txn, "root");
    let a = vertex(&mut txn, "a");
    let b = vertex(&mut txn, "b");
    let a1 = vertex(&mut txn, "a1");
    let b1 = vertex(&mut txn, "b1");
    txn.create_edge("eA", &root, &a, &Record::new())?;
    txn.create_edge("eA", &root, &b, &Record::new())?;
    txn.create_edge("eA", &a, &a1, &Record::new())?;
    txn.create_edge("eA", &b, &b1, &Record::new())?;

    let walk = txn.dfs(&root, Direction::Out, &TraverseOptions::new())?;
    let names: Vec<String> = walk
        .iter()
        .map(|r| r.record.get("name").unwrap().to_text().unwrap())
        .collect();
    // children are visited in adjacency order, each branch fully first
    assert_eq!(names, vec!["root", "a", "a1", "b", "b1"]);

    let depths: Vec<u32> = walk.iter().map(|r| r.record.depth().unwrap()).collect();
    assert_eq!(depths, vec![0, 1, 2, 1, 2]);

    let shallow = txn.dfs(&root, Direction::Out, &TraverseOptions::new().max_depth(1))?;
    assert_eq!(shallow.len(), 3);
    Ok(())
}

#[test]
fn traversal_from_missing_vertex_fails() -> Result<()> {
    let (_dir, ctx) = open_db();
    traversal_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    let v = vertex(&mut txn, "v");
    txn.delete(&v)?;
    assert!(matches!(
        txn.bfs(&v, Direction::Out, &TraverseOptions::new()),
        Err(TenebraError::NoSuchVertex(_))
    ));
    assert!(matches!(
        txn.shortest_path(&v, &v, &GraphFilter::new(), &GraphFilter::new()),
        Err(TenebraError::NoSuchSrcVertex(_))
    ));
    Ok(())
}

#[test]
fn shortest_path_follows_edge_direction() -> Result<()> {
    let (_dir, ctx) = open_db();
    traversal_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    // v1 -> v2 -> v3 -> v5 and the shortcut v1 -> v4 -> v5
    let v1 = vertex(&mut txn, "v1");
    let v2 = vertex(&mut txn, "v2");
    let v3 = vertex(&mut txn, "v3");
    let v4 = vertex(&mut txn, "v4");
    let v5 = vertex(&mut txn, "v5");
    txn.create_edge("eA", &v1, &v2, &Record::new())?;
    txn.create_edge("eA", &v2, &v3, &Record::new())?;
    txn.create_edge("eA", &v3, &v5, &Record::new())?;
    txn.create_edge("eA", &v1, &v4, &Record::new())?;
    txn.create_edge("eA", &v4, &v5, &Record::new())?;

    let path = txn.shortest_path(&v1, &v5, &GraphFilter::new(), &GraphFilter::new())?;
    assert_eq!(names_at_depth(&path).len(), 3);
    assert_eq!(names_at_depth(&path)[0], ("v1".into(), 0));
    assert_eq!(names_at_depth(&path)[2], ("v5".into(), 2));

    // edges are directed: nothing leads back from v5 to v1
    let reverse = txn.shortest_path(&v5, &v1, &GraphFilter::new(), &GraphFilter::new())?;
    assert!(reverse.is_empty());

    // a path to oneself is the single-vertex path
    let self_path = txn.shortest_path(&v1, &v1, &GraphFilter::new(), &GraphFilter::new())?;
    assert_eq!(names_at_depth(&self_path), vec![("v1".into(), 0)]);
    Ok(())
}

#[test]
fn dijkstra_with_unit_costs_matches_bfs() -> Result<()> {
    let (_dir, ctx) = open_db();
    traversal_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    let v1 = vertex(&mut txn, "v1");
    let v2 = vertex(&mut txn, "v2");
    let v3 = vertex(&mut txn, "v3");
    let v4 = vertex(&mut txn, "v4");
    txn.create_edge("eA", &v1, &v2, &Record::new())?;
    txn.create_edge("eA", &v2, &v4, &Record::new())?;
    txn.create_edge("eA", &v1, &v3, &Record::new())?;
    txn.create_edge("eA", &v3, &v4, &Record::new())?;

    let bfs_path = txn.shortest_path(&v1, &v4, &GraphFilter::new(), &GraphFilter::new())?;
    let (cost, dijkstra_path) = txn.dijkstra_shortest_path(
        &v1,
        &v4,
        |_, _| Ok(1u64),
        &GraphFilter::new(),
        &GraphFilter::new(),
    )?;
    assert_eq!(cost as usize, bfs_path.len() - 1);
    assert_eq!(dijkstra_path.len(), bfs_path.len());
    Ok(())
}

#[test]
fn dijkstra_prefers_cheap_detours() -> Result<()> {
    let (_dir, ctx) = open_db();
    traversal_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    let v1 = vertex(&mut txn, "v1");
    let v2 = vertex(&mut txn, "v2");
    let v3 = vertex(&mut txn, "v3");
    // direct hop costs 10, the two-hop detour costs 2
    txn.create_edge("eA", &v1, &v3, &Record::new().with("weight", 10u32))?;
    txn.create_edge("eA", &v1, &v2, &Record::new().with("weight", 1u32))?;
    txn.create_edge("eA", &v2, &v3, &Record::new().with("weight", 1u32))?;

    let (cost, path) = txn.dijkstra_shortest_path(
        &v1,
        &v3,
        |txn, edge| {
            let record = txn.fetch_record(edge)?;
            Ok(u64::from(record.get("weight").unwrap().to_u32()?))
        },
        &GraphFilter::new(),
        &GraphFilter::new(),
    )?;
    assert_eq!(cost, 2);
    assert_eq!(names_at_depth(&path).len(), 3);

    let unreachable = txn.dijkstra_shortest_path(
        &v3,
        &v1,
        |_, _| Ok(1u64),
        &GraphFilter::new(),
        &GraphFilter::new(),
    )?;
    assert_eq!(unreachable.0, 0);
    assert!(unreachable.1.is_empty());
    Ok(())
}

#[test]
fn traversal_cursors_report_depth() -> Result<()> {
    let (_dir, ctx) = open_db();
    traversal_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    let v1 = vertex(&mut txn, "v1");
    let v2 = vertex(&mut txn, "v2");
    txn.create_edge("eA", &v1, &v2, &Record::new())?;

    let mut cursor = txn.bfs_cursor(&v1, Direction::Out, &TraverseOptions::new())?;
    assert_eq!(ResultCursor::count(&cursor), 2);
    let first = cursor.next().unwrap()?;
    assert_eq!(first.record.depth(), Some(0));
    let second = cursor.next().unwrap()?;
    assert_eq!(second.record.depth(), Some(1));
    assert!(cursor.next().is_none());
    Ok(())
}
